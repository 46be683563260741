//! Basic-block builder.
//!
//! Walks guest code starting at a PC, decoding one instruction at a time, until a
//! control-transfer instruction ends the block (§4.2). Each compressed half-word is fetched and
//! translated independently of its neighbor, since a 4-byte instruction that straddles a page
//! boundary needs its own translation per half.

use tracing::trace;

use crate::common::error::Trap;
use crate::common::{AccessType, VirtAddr};
use crate::core::arch::csr::Csrs;
use crate::core::arch::mode::PrivilegeMode;
use crate::core::block::basic_block::{Block, Successor};
use crate::core::mmu::Mmu;
use crate::isa::decode;
use crate::isa::instruction::Decoded;
use crate::isa::mnemonic::Mnemonic;
use crate::soc::bus::Bus;

fn fetch_u16(
    mmu: &mut Mmu,
    bus: &mut Bus,
    csrs: &Csrs,
    privilege: PrivilegeMode,
    vaddr: u32,
) -> Result<u16, Trap> {
    let phys = mmu.translate(bus, csrs, VirtAddr::new(vaddr), AccessType::Fetch, privilege)?;
    Ok(bus.read_u16(phys))
}

/// Fetches the 32-bit decode window at `pc`: the low half is always fetched and translated; the
/// high half is fetched only if the low half's bottom two bits mark a full-width encoding, so a
/// compressed instruction at the last two bytes of an unmapped page never triggers a spurious
/// fault on the page after it.
fn fetch_word(
    mmu: &mut Mmu,
    bus: &mut Bus,
    csrs: &Csrs,
    privilege: PrivilegeMode,
    pc: u32,
) -> Result<u32, Trap> {
    let lo = fetch_u16(mmu, bus, csrs, privilege, pc)?;
    if lo & 0b11 != 0b11 {
        return Ok(lo as u32);
    }
    let hi = fetch_u16(mmu, bus, csrs, privilege, pc.wrapping_add(2))?;
    Ok((lo as u32) | ((hi as u32) << 16))
}

fn successor_of(op: Mnemonic, pc: u32, len: u32, imm: i32) -> Successor {
    if op == Mnemonic::Jal {
        Successor::Direct(pc.wrapping_add(imm as u32))
    } else if op.is_branch() {
        Successor::Conditional {
            taken: pc.wrapping_add(imm as u32),
            not_taken: pc.wrapping_add(len),
        }
    } else {
        Successor::Indirect
    }
}

/// True when `prev` is the first half of a recognized macro-op pair and `d` is the `addi` that
/// completes it: `auipc`+`addi` (PC-relative address materialization) or `lui`+`addi` (32-bit
/// constant materialization), per the builder's macro-op fusion peephole.
fn fuses_with(prev: &Decoded, d: &Decoded) -> bool {
    matches!(prev.op, Mnemonic::Auipc | Mnemonic::Lui) && d.op == Mnemonic::Addi && d.rs1 == prev.rd
}

/// Builds the basic block starting at `start_pc`, translating and fetching through `mmu`/`bus`.
/// When `mop_fusion` is set, tags the second half of an `auipc`+`addi`/`lui`+`addi` pair so the
/// constant-propagation pass can recognize it without re-deriving the fusion from scratch; the
/// final folded state is identical either way (§4.2).
pub fn build(
    start_pc: u32,
    mmu: &mut Mmu,
    bus: &mut Bus,
    csrs: &Csrs,
    privilege: PrivilegeMode,
    mop_fusion: bool,
) -> Result<Block, Trap> {
    let mut instrs: Vec<Decoded> = Vec::new();
    let mut pc = start_pc;

    loop {
        let word = fetch_word(mmu, bus, csrs, privilege, pc)?;
        let mut d = match decode::decode(word, pc) {
            Ok(d) => d,
            Err(trap) => {
                // Fetch faults above propagate and are never cached; an illegal encoding is
                // different (§4.2 Failure semantics): the prefix decoded so far is still a valid,
                // reusable block, and the fault itself is deferred to a terminator that only
                // raises it if control actually reaches this instruction slot.
                let mut pseudo = Decoded::new(Mnemonic::Trap, pc, 4);
                pseudo.imm = trap.tval() as i32;
                instrs.push(pseudo);
                trace!(start_pc, end_pc = pc, count = instrs.len(), "block built (illegal instruction)");
                return Ok(Block::new(start_pc, instrs, Successor::Indirect));
            }
        };
        if mop_fusion {
            if let Some(prev) = instrs.last() {
                if fuses_with(prev, &d) {
                    d.fused = true;
                }
            }
        }
        let terminator = d.op.is_terminator();
        let (op, len, imm) = (d.op, d.len, d.imm);
        instrs.push(d);

        if terminator {
            trace!(start_pc, end_pc = pc, count = instrs.len(), "block built");
            let successor = successor_of(op, pc, len, imm);
            return Ok(Block::new(start_pc, instrs, successor));
        }
        pc = pc.wrapping_add(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arch::csr::SATP;

    fn setup() -> (Mmu, Bus, Csrs) {
        (Mmu::new(), Bus::new_with_ram(64 * 1024), Csrs::new())
    }

    #[test]
    fn straight_line_block_ends_at_jump() {
        let (mut mmu, mut bus, csrs) = setup();
        // addi x1, x0, 1 ; jal x0, 0
        bus.write_u32(0, (1 << 20) | (0 << 15) | (0 << 12) | (1 << 7) | 0b0010011);
        bus.write_u32(4, 0b1101111);
        let block = build(0, &mut mmu, &mut bus, &csrs, PrivilegeMode::Machine, false).unwrap();
        assert_eq!(block.instrs.len(), 2);
        assert_eq!(block.successor, Successor::Direct(4));
    }

    #[test]
    fn conditional_branch_records_both_targets() {
        let (mut mmu, mut bus, csrs) = setup();
        // beq x0, x0, 8
        let imm = 8i32;
        let b11 = ((imm >> 11) & 1) as u32;
        let b12 = ((imm >> 12) & 1) as u32;
        let b10_5 = ((imm >> 5) & 0x3F) as u32;
        let b4_1 = ((imm >> 1) & 0xF) as u32;
        let word = (b12 << 31) | (b10_5 << 25) | (b4_1 << 8) | (b11 << 7) | 0b1100011;
        bus.write_u32(0, word);
        let block = build(0, &mut mmu, &mut bus, &csrs, PrivilegeMode::Machine, false).unwrap();
        assert_eq!(
            block.successor,
            Successor::Conditional {
                taken: 8,
                not_taken: 4
            }
        );
    }

    #[test]
    fn unmapped_fetch_faults() {
        let (mut mmu, mut bus, mut csrs) = setup();
        csrs.write(SATP, 1 << 31); // enable Sv32 with an empty root table: root page reads as 0
        let err = build(0, &mut mmu, &mut bus, &csrs, PrivilegeMode::User, false).unwrap_err();
        assert!(matches!(err, Trap::InstructionPageFault(_)));
    }

    #[test]
    fn illegal_instruction_is_deferred_not_propagated() {
        let (mut mmu, mut bus, csrs) = setup();
        // addi x1, x0, 1 ; <all-zero word, an illegal encoding>
        bus.write_u32(0, (1 << 20) | (0 << 15) | (0 << 12) | (1 << 7) | 0b0010011);
        bus.write_u32(4, 0);
        let block = build(0, &mut mmu, &mut bus, &csrs, PrivilegeMode::Machine, false).unwrap();
        assert_eq!(block.instrs.len(), 2);
        assert_eq!(block.instrs[0].op, Mnemonic::Addi);
        assert_eq!(block.instrs[1].op, Mnemonic::Trap);
        assert_eq!(block.successor, Successor::Indirect);
    }

    #[test]
    fn mop_fusion_tags_lui_addi_pair_when_enabled() {
        let (mut mmu, mut bus, csrs) = setup();
        // lui x1, 0x1000 ; addi x1, x1, 4 ; jal x0, 0
        bus.write_u32(0, (0x1000 << 12) | (1 << 7) | 0b0110111);
        bus.write_u32(4, (4 << 20) | (1 << 15) | (0 << 12) | (1 << 7) | 0b0010011);
        bus.write_u32(8, 0b1101111);
        let block = build(0, &mut mmu, &mut bus, &csrs, PrivilegeMode::Machine, true).unwrap();
        assert!(block.instrs[1].fused);
    }

    #[test]
    fn mop_fusion_leaves_pair_untagged_when_disabled() {
        let (mut mmu, mut bus, csrs) = setup();
        bus.write_u32(0, (0x1000 << 12) | (1 << 7) | 0b0110111);
        bus.write_u32(4, (4 << 20) | (1 << 15) | (0 << 12) | (1 << 7) | 0b0010011);
        bus.write_u32(8, 0b1101111);
        let block = build(0, &mut mmu, &mut bus, &csrs, PrivilegeMode::Machine, false).unwrap();
        assert!(!block.instrs[1].fused);
    }
}
