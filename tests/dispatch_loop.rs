//! End-to-end tests driving a full `Simulator` over hand-assembled RV32I machine code: the
//! fetch/decode/build/chain pipeline, the bus, and the user-mode exit syscall all have to agree
//! for these to pass, so they exercise the seams unit tests can't see across.

use pretty_assertions::assert_eq;
use rv32block_core::config::{Config, EmulatorMode};
use rv32block_core::Simulator;

const OPCODE_IMM: u32 = 0x13;
const OPCODE_SYSTEM: u32 = 0x73;
const OPCODE_JALR: u32 = 0x67;
const SYS_EXIT: u32 = 93;
const REG_RA: u32 = 1;

fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
    ((imm as u32 & 0xFFF) << 20) | (rs1 << 15) | (rd << 7) | OPCODE_IMM
}

fn jalr(rd: u32, rs1: u32, imm: i32) -> u32 {
    ((imm as u32 & 0xFFF) << 20) | (rs1 << 15) | (rd << 7) | OPCODE_JALR
}

fn ecall() -> u32 {
    OPCODE_SYSTEM
}

fn user_config() -> Config {
    let mut config = Config::default();
    config.mode = EmulatorMode::User;
    config
}

/// `addi a0, x0, 42; addi a7, x0, 93; ecall` should retire three instructions and exit with 42.
#[test]
fn straight_line_program_exits_with_guest_supplied_code() {
    let mut sim = Simulator::new(&user_config());
    let program = [addi(10, 0, 42), addi(17, 0, SYS_EXIT as i32), ecall()];
    let mut bytes = Vec::new();
    for word in program {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    sim.cpu.bus.load_binary_at(&bytes, 0);

    let code = sim.run();

    assert_eq!(code, 42);
    assert_eq!(sim.cpu.stats.instructions_retired, 3);
    assert_eq!(sim.cpu.stats.blocks_built, 1);
}

/// An indirect jump through `ra` to a second block should retire correctly even though it's an
/// `Indirect` successor edge the chainer never links — the dispatch loop falls back to the
/// keyed cache lookup for it every time.
#[test]
fn indirect_jump_through_link_register_reaches_second_block() {
    let mut sim = Simulator::new(&user_config());
    let program = [
        addi(10, 0, 56), // pc 0: a0 = 56
        jalr(0, REG_RA as u32, 0), // pc 4: jump to ra
        addi(17, 0, SYS_EXIT as i32), // pc 8
        ecall(),                      // pc 12
    ];
    let mut bytes = Vec::new();
    for word in program {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    sim.cpu.bus.load_binary_at(&bytes, 0);
    sim.cpu.regs.write(REG_RA as usize, 8);

    let code = sim.run();

    assert_eq!(code, 56);
    assert_eq!(sim.cpu.stats.instructions_retired, 4);
    assert_eq!(sim.cpu.stats.blocks_built, 2);
}

/// A backward branch that loops a fixed number of times before exiting should hit the block
/// cache (and, once chaining kicks in, the chain path) instead of rebuilding every iteration.
///
/// `addi a1, x0, 3`           ; counter = 3
/// loop: `addi a1, a1, -1`    ; counter -= 1
///       `bne a1, x0, loop`   ; branch back while nonzero
/// `addi a0, x0, 7; addi a7, x0, 93; ecall`
#[test]
fn looping_program_reuses_cached_block_on_backward_branch() {
    fn bne(rs1: u32, rs2: u32, imm: i32) -> u32 {
        let imm = imm as u32;
        let imm12 = (imm >> 12) & 1;
        let imm10_5 = (imm >> 5) & 0x3F;
        let imm4_1 = (imm >> 1) & 0xF;
        let imm11 = (imm >> 11) & 1;
        (imm12 << 31)
            | (imm10_5 << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (0b001 << 12)
            | (imm4_1 << 8)
            | (imm11 << 7)
            | 0x63
    }

    let mut sim = Simulator::new(&user_config());
    let loop_pc = 4u32;
    let program = [
        addi(11, 0, 3),       // pc 0: a1 = 3
        addi(11, 11, -1),     // pc 4: a1 -= 1  (loop target)
        bne(11, 0, loop_pc as i32 - 8),
        addi(10, 0, 7),       // pc 12
        addi(17, 0, SYS_EXIT as i32),
        ecall(),
    ];
    let mut bytes = Vec::new();
    for word in program {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    sim.cpu.bus.load_binary_at(&bytes, 0);

    let code = sim.run();

    assert_eq!(code, 7);
    // The loop body (2 instructions) runs 3 times, plus the 1-instruction preamble block and the
    // 3-instruction exit block: 2*3 + 1 + 3 = 10 retired instructions from 3 distinct blocks.
    assert_eq!(sim.cpu.stats.instructions_retired, 10);
    assert_eq!(sim.cpu.stats.blocks_built, 3);
    // Every iteration after the first reuses a resident block, either via the key-indexed cache
    // or a resolved chain slot.
    assert!(sim.cpu.stats.block_cache_hits + sim.cpu.stats.chained_dispatches >= 2);
}
