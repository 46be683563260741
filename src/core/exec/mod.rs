//! Opcode execution handlers (§4.6).
//!
//! One function, [`execute`], matches on a [`Decoded`]'s [`Mnemonic`] and mutates [`Cpu`] state
//! accordingly, returning the next PC. There is no handler table: per the mnemonic-as-handler-
//! reference design note, the `match` itself *is* the dispatch.

use crate::common::error::Trap;
use crate::common::{AccessType, VirtAddr};
use crate::config::EmulatorMode;
use crate::core::cpu::Cpu;
use crate::isa::abi;
use crate::isa::instruction::Decoded;
use crate::isa::mnemonic::Mnemonic;
use crate::isa::privileged::opcodes::SYS_EXIT;

fn rg(cpu: &Cpu, idx: usize) -> i32 {
    cpu.regs.read(idx) as i32
}

fn rgu(cpu: &Cpu, idx: usize) -> u32 {
    cpu.regs.read(idx)
}

fn wg(cpu: &mut Cpu, idx: usize, val: i32) {
    cpu.regs.write(idx, val as u32);
}

fn wgu(cpu: &mut Cpu, idx: usize, val: u32) {
    cpu.regs.write(idx, val);
}

fn rf(cpu: &Cpu, idx: usize) -> f32 {
    f32::from_bits(cpu.regs.read_f(idx))
}

fn wf(cpu: &mut Cpu, idx: usize, val: f32) {
    cpu.regs.write_f(idx, val.to_bits());
}

fn translate(cpu: &mut Cpu, vaddr: u32, access: AccessType) -> Result<u32, Trap> {
    cpu.mmu
        .translate(&mut cpu.bus, &cpu.csrs, VirtAddr::new(vaddr), access, cpu.privilege)
}

/// True for opcodes whose extension is gated by [`crate::config::ExtensionsConfig`]; decode
/// itself is extension-unaware (§4.1), so gating happens here, at dispatch.
fn gate(cpu: &Cpu, d: &Decoded) -> Result<(), Trap> {
    let ext = &cpu.extensions;
    let enabled = if d.len == 2 {
        ext.c
    } else {
        match d.op {
            Mnemonic::Mul
            | Mnemonic::Mulh
            | Mnemonic::Mulhsu
            | Mnemonic::Mulhu
            | Mnemonic::Div
            | Mnemonic::Divu
            | Mnemonic::Rem
            | Mnemonic::Remu => ext.m,

            Mnemonic::LrW
            | Mnemonic::ScW
            | Mnemonic::AmoswapW
            | Mnemonic::AmoaddW
            | Mnemonic::AmoxorW
            | Mnemonic::AmoandW
            | Mnemonic::AmoorW
            | Mnemonic::AmominW
            | Mnemonic::AmomaxW
            | Mnemonic::AmominuW
            | Mnemonic::AmomaxuW => ext.a,

            Mnemonic::Flw
            | Mnemonic::Fsw
            | Mnemonic::FmaddS
            | Mnemonic::FmsubS
            | Mnemonic::FnmsubS
            | Mnemonic::FnmaddS
            | Mnemonic::FaddS
            | Mnemonic::FsubS
            | Mnemonic::FmulS
            | Mnemonic::FdivS
            | Mnemonic::FsqrtS
            | Mnemonic::FsgnjS
            | Mnemonic::FsgnjnS
            | Mnemonic::FsgnjxS
            | Mnemonic::FminS
            | Mnemonic::FmaxS
            | Mnemonic::FcvtWS
            | Mnemonic::FcvtWuS
            | Mnemonic::FmvXW
            | Mnemonic::FeqS
            | Mnemonic::FltS
            | Mnemonic::FleS
            | Mnemonic::FclassS
            | Mnemonic::FcvtSW
            | Mnemonic::FcvtSWu
            | Mnemonic::FmvWX => ext.f,

            Mnemonic::Sh1add | Mnemonic::Sh2add | Mnemonic::Sh3add => ext.zba,

            Mnemonic::Andn
            | Mnemonic::Orn
            | Mnemonic::Xnor
            | Mnemonic::Clz
            | Mnemonic::Ctz
            | Mnemonic::Cpop
            | Mnemonic::Max
            | Mnemonic::Maxu
            | Mnemonic::Min
            | Mnemonic::Minu
            | Mnemonic::SextB
            | Mnemonic::SextH
            | Mnemonic::ZextH
            | Mnemonic::Rol
            | Mnemonic::Ror
            | Mnemonic::Rori
            | Mnemonic::OrcB
            | Mnemonic::Rev8 => ext.zbb,

            Mnemonic::Clmul | Mnemonic::Clmulh | Mnemonic::Clmulr => ext.zbc,

            Mnemonic::Bclr
            | Mnemonic::Bclri
            | Mnemonic::Bext
            | Mnemonic::Bexti
            | Mnemonic::Binv
            | Mnemonic::Binvi
            | Mnemonic::Bset
            | Mnemonic::Bseti => ext.zbs,

            Mnemonic::Csrrw
            | Mnemonic::Csrrs
            | Mnemonic::Csrrc
            | Mnemonic::Csrrwi
            | Mnemonic::Csrrsi
            | Mnemonic::Csrrci => ext.zicsr,

            Mnemonic::FenceI => ext.zifencei,

            _ => true,
        }
    };
    if enabled {
        Ok(())
    } else {
        Err(Trap::IllegalInstruction(d.pc))
    }
}

/// True for any opcode whose execution invalidates an outstanding `lr.w` reservation: every
/// store and AMO, plus `sc.w` itself (win or lose). Single-hart model (§5): no other writer
/// exists, so a plain store by this hart is the only thing that can break a reservation.
fn invalidates_reservation(op: Mnemonic) -> bool {
    matches!(
        op,
        Mnemonic::Sb
            | Mnemonic::Sh
            | Mnemonic::Sw
            | Mnemonic::Fsw
            | Mnemonic::ScW
            | Mnemonic::AmoswapW
            | Mnemonic::AmoaddW
            | Mnemonic::AmoxorW
            | Mnemonic::AmoandW
            | Mnemonic::AmoorW
            | Mnemonic::AmominW
            | Mnemonic::AmomaxW
            | Mnemonic::AmominuW
            | Mnemonic::AmomaxuW
    )
}

/// Checked per jump/branch target: with the C extension disabled, `IALIGN` is 32 bits rather
/// than 16, so a non-word-aligned target faults.
fn check_target_alignment(cpu: &Cpu, target: u32) -> Result<(), Trap> {
    if !cpu.extensions.c && target % 4 != 0 {
        Err(Trap::InstructionAddressMisaligned(target))
    } else {
        Ok(())
    }
}

fn amo_result(op: Mnemonic, old: u32, rhs: u32) -> u32 {
    match op {
        Mnemonic::AmoswapW => rhs,
        Mnemonic::AmoaddW => old.wrapping_add(rhs),
        Mnemonic::AmoxorW => old ^ rhs,
        Mnemonic::AmoandW => old & rhs,
        Mnemonic::AmoorW => old | rhs,
        Mnemonic::AmominW => ((old as i32).min(rhs as i32)) as u32,
        Mnemonic::AmomaxW => ((old as i32).max(rhs as i32)) as u32,
        Mnemonic::AmominuW => old.min(rhs),
        Mnemonic::AmomaxuW => old.max(rhs),
        _ => unreachable!("amo_result called with non-AMO mnemonic"),
    }
}

fn clmul64(a: u32, b: u32) -> u64 {
    let mut x: u64 = 0;
    for i in 0..32 {
        if (b >> i) & 1 == 1 {
            x ^= (a as u64) << i;
        }
    }
    x
}

fn fclass(v: f32) -> u32 {
    let bits = v.to_bits();
    let sign = bits >> 31;
    if v.is_nan() {
        let quiet = (bits >> 22) & 1 != 0;
        return if quiet { 1 << 9 } else { 1 << 8 };
    }
    if v.is_infinite() {
        return if sign == 1 { 1 << 0 } else { 1 << 7 };
    }
    if v == 0.0 {
        return if sign == 1 { 1 << 3 } else { 1 << 4 };
    }
    if v.is_subnormal() {
        return if sign == 1 { 1 << 2 } else { 1 << 5 };
    }
    if sign == 1 {
        1 << 1
    } else {
        1 << 6
    }
}

fn fmin(a: f32, b: f32) -> f32 {
    if a.is_nan() && b.is_nan() {
        return f32::from_bits(0x7fc0_0000);
    }
    if a.is_nan() {
        return b;
    }
    if b.is_nan() {
        return a;
    }
    if a == 0.0 && b == 0.0 {
        if a.is_sign_negative() {
            a
        } else {
            b
        }
    } else {
        a.min(b)
    }
}

fn fmax(a: f32, b: f32) -> f32 {
    if a.is_nan() && b.is_nan() {
        return f32::from_bits(0x7fc0_0000);
    }
    if a.is_nan() {
        return b;
    }
    if b.is_nan() {
        return a;
    }
    if a == 0.0 && b == 0.0 {
        if a.is_sign_positive() {
            a
        } else {
            b
        }
    } else {
        a.max(b)
    }
}

/// Float-to-int conversions round toward zero regardless of `rm` — a documented simplification
/// (no cycle-accurate backend depends on the other three rounding modes here); out-of-range and
/// NaN inputs saturate per the RISC-V F-extension's conversion rules.
fn f32_to_i32(v: f32) -> i32 {
    if v.is_nan() || v >= 2147483648.0 {
        i32::MAX
    } else if v <= -2147483649.0 {
        i32::MIN
    } else {
        v as i32
    }
}

fn f32_to_u32(v: f32) -> u32 {
    if v.is_nan() || v >= 4294967296.0 {
        u32::MAX
    } else if v <= -1.0 {
        0
    } else {
        v as u32
    }
}

/// Executes one decoded instruction, returning the architectural next PC on success.
#[allow(clippy::too_many_lines)]
pub fn execute(cpu: &mut Cpu, d: &Decoded) -> Result<u32, Trap> {
    gate(cpu, d)?;
    if invalidates_reservation(d.op) {
        cpu.load_reservation = None;
    }
    let fallthrough = d.pc.wrapping_add(d.len);

    match d.op {
        Mnemonic::Lui => {
            wg(cpu, d.rd, d.imm);
            Ok(fallthrough)
        }
        Mnemonic::Auipc => {
            let v = d.pc.wrapping_add(d.imm as u32) as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Jal => {
            let target = d.pc.wrapping_add(d.imm as u32);
            check_target_alignment(cpu, target)?;
            wgu(cpu, d.rd, fallthrough);
            Ok(target)
        }
        Mnemonic::Jalr => {
            let target = rgu(cpu, d.rs1).wrapping_add(d.imm as u32) & !1u32;
            check_target_alignment(cpu, target)?;
            wgu(cpu, d.rd, fallthrough);
            Ok(target)
        }
        Mnemonic::Beq
        | Mnemonic::Bne
        | Mnemonic::Blt
        | Mnemonic::Bge
        | Mnemonic::Bltu
        | Mnemonic::Bgeu => {
            let taken = match d.op {
                Mnemonic::Beq => rg(cpu, d.rs1) == rg(cpu, d.rs2),
                Mnemonic::Bne => rg(cpu, d.rs1) != rg(cpu, d.rs2),
                Mnemonic::Blt => rg(cpu, d.rs1) < rg(cpu, d.rs2),
                Mnemonic::Bge => rg(cpu, d.rs1) >= rg(cpu, d.rs2),
                Mnemonic::Bltu => rgu(cpu, d.rs1) < rgu(cpu, d.rs2),
                Mnemonic::Bgeu => rgu(cpu, d.rs1) >= rgu(cpu, d.rs2),
                _ => unreachable!(),
            };
            let target = if taken {
                d.pc.wrapping_add(d.imm as u32)
            } else {
                fallthrough
            };
            if taken {
                check_target_alignment(cpu, target)?;
            }
            Ok(target)
        }

        // --- Loads/stores ---
        Mnemonic::Lb => {
            let vaddr = rgu(cpu, d.rs1).wrapping_add(d.imm as u32);
            let phys = translate(cpu, vaddr, AccessType::Read)?;
            let v = cpu.bus.try_read_u8(phys)? as i8 as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Lbu => {
            let vaddr = rgu(cpu, d.rs1).wrapping_add(d.imm as u32);
            let phys = translate(cpu, vaddr, AccessType::Read)?;
            let v = cpu.bus.try_read_u8(phys)? as u32;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Lh => {
            let vaddr = rgu(cpu, d.rs1).wrapping_add(d.imm as u32);
            if vaddr % 2 != 0 {
                return Err(Trap::LoadAddressMisaligned(vaddr));
            }
            let phys = translate(cpu, vaddr, AccessType::Read)?;
            let v = cpu.bus.try_read_u16(phys)? as i16 as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Lhu => {
            let vaddr = rgu(cpu, d.rs1).wrapping_add(d.imm as u32);
            if vaddr % 2 != 0 {
                return Err(Trap::LoadAddressMisaligned(vaddr));
            }
            let phys = translate(cpu, vaddr, AccessType::Read)?;
            let v = cpu.bus.try_read_u16(phys)? as u32;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Lw => {
            let vaddr = rgu(cpu, d.rs1).wrapping_add(d.imm as u32);
            if vaddr % 4 != 0 {
                return Err(Trap::LoadAddressMisaligned(vaddr));
            }
            let phys = translate(cpu, vaddr, AccessType::Read)?;
            let v = cpu.bus.try_read_u32(phys)?;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Sb => {
            let rs2v = rgu(cpu, d.rs2) as u8;
            let vaddr = rgu(cpu, d.rs1).wrapping_add(d.imm as u32);
            let phys = translate(cpu, vaddr, AccessType::Write)?;
            cpu.bus.try_write_u8(phys, rs2v)?;
            Ok(fallthrough)
        }
        Mnemonic::Sh => {
            let rs2v = rgu(cpu, d.rs2) as u16;
            let vaddr = rgu(cpu, d.rs1).wrapping_add(d.imm as u32);
            if vaddr % 2 != 0 {
                return Err(Trap::StoreAddressMisaligned(vaddr));
            }
            let phys = translate(cpu, vaddr, AccessType::Write)?;
            cpu.bus.try_write_u16(phys, rs2v)?;
            Ok(fallthrough)
        }
        Mnemonic::Sw => {
            let rs2v = rgu(cpu, d.rs2);
            let vaddr = rgu(cpu, d.rs1).wrapping_add(d.imm as u32);
            if vaddr % 4 != 0 {
                return Err(Trap::StoreAddressMisaligned(vaddr));
            }
            let phys = translate(cpu, vaddr, AccessType::Write)?;
            cpu.bus.try_write_u32(phys, rs2v)?;
            Ok(fallthrough)
        }

        // --- ALU immediate ---
        Mnemonic::Addi => {
            let v = rg(cpu, d.rs1).wrapping_add(d.imm);
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Slti => {
            let v = (rg(cpu, d.rs1) < d.imm) as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Sltiu => {
            let v = (rgu(cpu, d.rs1) < d.imm as u32) as u32;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Xori => {
            let v = rg(cpu, d.rs1) ^ d.imm;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Ori => {
            let v = rg(cpu, d.rs1) | d.imm;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Andi => {
            let v = rg(cpu, d.rs1) & d.imm;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Slli => {
            let v = rgu(cpu, d.rs1) << (d.shamt & 0x1F);
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Srli => {
            let v = rgu(cpu, d.rs1) >> (d.shamt & 0x1F);
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Srai => {
            let v = rg(cpu, d.rs1) >> (d.shamt & 0x1F);
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }

        // --- ALU register, M extension ---
        Mnemonic::Add => {
            let v = rg(cpu, d.rs1).wrapping_add(rg(cpu, d.rs2));
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Sub => {
            let v = rg(cpu, d.rs1).wrapping_sub(rg(cpu, d.rs2));
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Sll => {
            let v = rgu(cpu, d.rs1) << (rgu(cpu, d.rs2) & 0x1F);
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Slt => {
            let v = (rg(cpu, d.rs1) < rg(cpu, d.rs2)) as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Sltu => {
            let v = (rgu(cpu, d.rs1) < rgu(cpu, d.rs2)) as u32;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Xor => {
            let v = rg(cpu, d.rs1) ^ rg(cpu, d.rs2);
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Srl => {
            let v = rgu(cpu, d.rs1) >> (rgu(cpu, d.rs2) & 0x1F);
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Sra => {
            let v = rg(cpu, d.rs1) >> (rgu(cpu, d.rs2) & 0x1F);
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Or => {
            let v = rg(cpu, d.rs1) | rg(cpu, d.rs2);
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::And => {
            let v = rg(cpu, d.rs1) & rg(cpu, d.rs2);
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Mul => {
            let v = rg(cpu, d.rs1).wrapping_mul(rg(cpu, d.rs2));
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Mulh => {
            let v = (((rg(cpu, d.rs1) as i64) * (rg(cpu, d.rs2) as i64)) >> 32) as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Mulhsu => {
            let v = (((rg(cpu, d.rs1) as i64) * (rgu(cpu, d.rs2) as i64)) >> 32) as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Mulhu => {
            let v = (((rgu(cpu, d.rs1) as u64) * (rgu(cpu, d.rs2) as u64)) >> 32) as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Div => {
            let (a, b) = (rg(cpu, d.rs1), rg(cpu, d.rs2));
            let v = if b == 0 {
                -1
            } else if a == i32::MIN && b == -1 {
                i32::MIN
            } else {
                a.wrapping_div(b)
            };
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Divu => {
            let (a, b) = (rgu(cpu, d.rs1), rgu(cpu, d.rs2));
            let v = if b == 0 { u32::MAX } else { a / b };
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Rem => {
            let (a, b) = (rg(cpu, d.rs1), rg(cpu, d.rs2));
            let v = if b == 0 {
                a
            } else if a == i32::MIN && b == -1 {
                0
            } else {
                a.wrapping_rem(b)
            };
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Remu => {
            let (a, b) = (rgu(cpu, d.rs1), rgu(cpu, d.rs2));
            let v = if b == 0 { a } else { a % b };
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }

        // --- Zba ---
        Mnemonic::Sh1add => {
            let v = (rgu(cpu, d.rs1) << 1).wrapping_add(rgu(cpu, d.rs2));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Sh2add => {
            let v = (rgu(cpu, d.rs1) << 2).wrapping_add(rgu(cpu, d.rs2));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Sh3add => {
            let v = (rgu(cpu, d.rs1) << 3).wrapping_add(rgu(cpu, d.rs2));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }

        // --- Zbb ---
        Mnemonic::Andn => {
            let v = rgu(cpu, d.rs1) & !rgu(cpu, d.rs2);
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Orn => {
            let v = rgu(cpu, d.rs1) | !rgu(cpu, d.rs2);
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Xnor => {
            let v = !(rgu(cpu, d.rs1) ^ rgu(cpu, d.rs2));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Clz => {
            let v = rgu(cpu, d.rs1).leading_zeros() as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Ctz => {
            let v = rgu(cpu, d.rs1).trailing_zeros() as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Cpop => {
            let v = rgu(cpu, d.rs1).count_ones() as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Max => {
            let v = rg(cpu, d.rs1).max(rg(cpu, d.rs2));
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Maxu => {
            let v = rgu(cpu, d.rs1).max(rgu(cpu, d.rs2));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Min => {
            let v = rg(cpu, d.rs1).min(rg(cpu, d.rs2));
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Minu => {
            let v = rgu(cpu, d.rs1).min(rgu(cpu, d.rs2));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::SextB => {
            let v = rgu(cpu, d.rs1) as i8 as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::SextH => {
            let v = rgu(cpu, d.rs1) as i16 as i32;
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::ZextH => {
            let v = rgu(cpu, d.rs1) & 0xFFFF;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Rol => {
            let v = rgu(cpu, d.rs1).rotate_left(rgu(cpu, d.rs2) & 0x1F);
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Ror => {
            let v = rgu(cpu, d.rs1).rotate_right(rgu(cpu, d.rs2) & 0x1F);
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Rori => {
            let v = rgu(cpu, d.rs1).rotate_right(d.shamt & 0x1F);
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::OrcB => {
            let a = rgu(cpu, d.rs1);
            let mut v = 0u32;
            for i in 0..4 {
                let byte = (a >> (i * 8)) & 0xFF;
                if byte != 0 {
                    v |= 0xFF << (i * 8);
                }
            }
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Rev8 => {
            let v = rgu(cpu, d.rs1).swap_bytes();
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }

        // --- Zbc ---
        Mnemonic::Clmul => {
            let v = clmul64(rgu(cpu, d.rs1), rgu(cpu, d.rs2)) as u32;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Clmulh => {
            let v = (clmul64(rgu(cpu, d.rs1), rgu(cpu, d.rs2)) >> 32) as u32;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Clmulr => {
            let v = (clmul64(rgu(cpu, d.rs1), rgu(cpu, d.rs2)) >> 31) as u32;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }

        // --- Zbs ---
        Mnemonic::Bclr => {
            let v = rgu(cpu, d.rs1) & !(1u32 << (rgu(cpu, d.rs2) & 0x1F));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Bclri => {
            let v = rgu(cpu, d.rs1) & !(1u32 << (d.shamt & 0x1F));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Bext => {
            let v = (rgu(cpu, d.rs1) >> (rgu(cpu, d.rs2) & 0x1F)) & 1;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Bexti => {
            let v = (rgu(cpu, d.rs1) >> (d.shamt & 0x1F)) & 1;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Binv => {
            let v = rgu(cpu, d.rs1) ^ (1u32 << (rgu(cpu, d.rs2) & 0x1F));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Binvi => {
            let v = rgu(cpu, d.rs1) ^ (1u32 << (d.shamt & 0x1F));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Bset => {
            let v = rgu(cpu, d.rs1) | (1u32 << (rgu(cpu, d.rs2) & 0x1F));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::Bseti => {
            let v = rgu(cpu, d.rs1) | (1u32 << (d.shamt & 0x1F));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }

        // --- A extension ---
        Mnemonic::LrW => {
            let vaddr = rgu(cpu, d.rs1);
            if vaddr % 4 != 0 {
                return Err(Trap::LoadAddressMisaligned(vaddr));
            }
            let phys = translate(cpu, vaddr, AccessType::Write)?;
            let v = cpu.bus.try_read_u32(phys)?;
            cpu.load_reservation = Some(phys);
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::ScW => {
            let vaddr = rgu(cpu, d.rs1);
            if vaddr % 4 != 0 {
                return Err(Trap::StoreAddressMisaligned(vaddr));
            }
            let phys = translate(cpu, vaddr, AccessType::Write)?;
            let succeeds = cpu.load_reservation == Some(phys);
            if succeeds {
                let rs2v = rgu(cpu, d.rs2);
                cpu.bus.try_write_u32(phys, rs2v)?;
            }
            wgu(cpu, d.rd, if succeeds { 0 } else { 1 });
            Ok(fallthrough)
        }
        Mnemonic::AmoswapW
        | Mnemonic::AmoaddW
        | Mnemonic::AmoxorW
        | Mnemonic::AmoandW
        | Mnemonic::AmoorW
        | Mnemonic::AmominW
        | Mnemonic::AmomaxW
        | Mnemonic::AmominuW
        | Mnemonic::AmomaxuW => {
            let vaddr = rgu(cpu, d.rs1);
            if vaddr % 4 != 0 {
                return Err(Trap::StoreAddressMisaligned(vaddr));
            }
            let phys = translate(cpu, vaddr, AccessType::Write)?;
            let old = cpu.bus.try_read_u32(phys)?;
            let rhs = rgu(cpu, d.rs2);
            let new = amo_result(d.op, old, rhs);
            cpu.bus.try_write_u32(phys, new)?;
            wgu(cpu, d.rd, old);
            Ok(fallthrough)
        }

        // --- F extension ---
        Mnemonic::Flw => {
            let vaddr = rgu(cpu, d.rs1).wrapping_add(d.imm as u32);
            if vaddr % 4 != 0 {
                return Err(Trap::LoadAddressMisaligned(vaddr));
            }
            let phys = translate(cpu, vaddr, AccessType::Read)?;
            let bits = cpu.bus.try_read_u32(phys)?;
            cpu.regs.write_f(d.rd, bits);
            Ok(fallthrough)
        }
        Mnemonic::Fsw => {
            let bits = cpu.regs.read_f(d.rs2);
            let vaddr = rgu(cpu, d.rs1).wrapping_add(d.imm as u32);
            if vaddr % 4 != 0 {
                return Err(Trap::StoreAddressMisaligned(vaddr));
            }
            let phys = translate(cpu, vaddr, AccessType::Write)?;
            cpu.bus.try_write_u32(phys, bits)?;
            Ok(fallthrough)
        }
        Mnemonic::FaddS => {
            let v = rf(cpu, d.rs1) + rf(cpu, d.rs2);
            wf(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FsubS => {
            let v = rf(cpu, d.rs1) - rf(cpu, d.rs2);
            wf(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FmulS => {
            let v = rf(cpu, d.rs1) * rf(cpu, d.rs2);
            wf(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FdivS => {
            let (a, b) = (rf(cpu, d.rs1), rf(cpu, d.rs2));
            if b == 0.0 {
                cpu.csrs.accrue_fp_flags(1 << 3); // DZ
            }
            wf(cpu, d.rd, a / b);
            Ok(fallthrough)
        }
        Mnemonic::FsqrtS => {
            let a = rf(cpu, d.rs1);
            if a < 0.0 {
                cpu.csrs.accrue_fp_flags(1 << 4); // NV
            }
            wf(cpu, d.rd, a.sqrt());
            Ok(fallthrough)
        }
        Mnemonic::FmaddS => {
            let v = rf(cpu, d.rs1).mul_add(rf(cpu, d.rs2), rf(cpu, d.rs3));
            wf(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FmsubS => {
            let v = rf(cpu, d.rs1).mul_add(rf(cpu, d.rs2), -rf(cpu, d.rs3));
            wf(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FnmsubS => {
            let v = (-rf(cpu, d.rs1)).mul_add(rf(cpu, d.rs2), rf(cpu, d.rs3));
            wf(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FnmaddS => {
            let v = (-rf(cpu, d.rs1)).mul_add(rf(cpu, d.rs2), -rf(cpu, d.rs3));
            wf(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FsgnjS => {
            let v = (cpu.regs.read_f(d.rs1) & 0x7FFF_FFFF) | (cpu.regs.read_f(d.rs2) & 0x8000_0000);
            cpu.regs.write_f(d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FsgnjnS => {
            let v =
                (cpu.regs.read_f(d.rs1) & 0x7FFF_FFFF) | (!cpu.regs.read_f(d.rs2) & 0x8000_0000);
            cpu.regs.write_f(d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FsgnjxS => {
            let v = (cpu.regs.read_f(d.rs1) & 0x7FFF_FFFF)
                | ((cpu.regs.read_f(d.rs1) ^ cpu.regs.read_f(d.rs2)) & 0x8000_0000);
            cpu.regs.write_f(d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FminS => {
            let v = fmin(rf(cpu, d.rs1), rf(cpu, d.rs2));
            wf(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FmaxS => {
            let v = fmax(rf(cpu, d.rs1), rf(cpu, d.rs2));
            wf(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FcvtWS => {
            let v = f32_to_i32(rf(cpu, d.rs1));
            wg(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FcvtWuS => {
            let v = f32_to_u32(rf(cpu, d.rs1));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FmvXW => {
            let v = cpu.regs.read_f(d.rs1);
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FeqS => {
            let v = (rf(cpu, d.rs1) == rf(cpu, d.rs2)) as u32;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FltS => {
            let v = (rf(cpu, d.rs1) < rf(cpu, d.rs2)) as u32;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FleS => {
            let v = (rf(cpu, d.rs1) <= rf(cpu, d.rs2)) as u32;
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FclassS => {
            let v = fclass(rf(cpu, d.rs1));
            wgu(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FcvtSW => {
            let v = rg(cpu, d.rs1) as f32;
            wf(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FcvtSWu => {
            let v = rgu(cpu, d.rs1) as f32;
            wf(cpu, d.rd, v);
            Ok(fallthrough)
        }
        Mnemonic::FmvWX => {
            let v = rgu(cpu, d.rs1);
            cpu.regs.write_f(d.rd, v);
            Ok(fallthrough)
        }

        // --- Zicsr ---
        Mnemonic::Csrrw
        | Mnemonic::Csrrs
        | Mnemonic::Csrrc
        | Mnemonic::Csrrwi
        | Mnemonic::Csrrsi
        | Mnemonic::Csrrci => {
            let is_write_only = matches!(d.op, Mnemonic::Csrrw | Mnemonic::Csrrwi);
            let is_immediate =
                matches!(d.op, Mnemonic::Csrrwi | Mnemonic::Csrrsi | Mnemonic::Csrrci);
            let operand = if is_immediate { d.imm as u32 } else { rgu(cpu, d.rs1) };
            let skip_write = !is_write_only && operand == 0;

            let old = if d.rd != 0 || !is_write_only {
                cpu.csrs.read(d.csr).ok_or(Trap::IllegalInstruction(d.pc))?
            } else {
                0
            };

            if !skip_write {
                let new = match d.op {
                    Mnemonic::Csrrw | Mnemonic::Csrrwi => operand,
                    Mnemonic::Csrrs | Mnemonic::Csrrsi => old | operand,
                    Mnemonic::Csrrc | Mnemonic::Csrrci => old & !operand,
                    _ => unreachable!(),
                };
                if !cpu.csrs.write(d.csr, new) {
                    return Err(Trap::IllegalInstruction(d.pc));
                }
            }
            wgu(cpu, d.rd, old);
            Ok(fallthrough)
        }

        // --- System / privileged ---
        Mnemonic::Fence | Mnemonic::Nop => Ok(fallthrough),
        Mnemonic::FenceI => {
            cpu.block_cache.free(|_, _| {});
            Ok(fallthrough)
        }
        Mnemonic::SfenceVma => {
            if d.rs1 == 0 {
                cpu.mmu.flush_all();
            } else {
                cpu.mmu.flush_vaddr(VirtAddr::new(rgu(cpu, d.rs1)));
            }
            Ok(fallthrough)
        }
        Mnemonic::Wfi => Ok(fallthrough),
        Mnemonic::Ecall => match cpu.mode {
            EmulatorMode::User => {
                if rgu(cpu, abi::REG_A7) == SYS_EXIT {
                    cpu.exit_code = Some(rgu(cpu, abi::REG_A0));
                    Ok(fallthrough)
                } else if let Some(mut shim) = cpu.shim.take() {
                    shim.handle(&mut cpu.regs);
                    cpu.shim = Some(shim);
                    Ok(fallthrough)
                } else {
                    Ok(fallthrough)
                }
            }
            EmulatorMode::System => Err(match cpu.privilege {
                crate::core::arch::mode::PrivilegeMode::User => Trap::EnvironmentCallFromUMode,
                crate::core::arch::mode::PrivilegeMode::Supervisor => {
                    Trap::EnvironmentCallFromSMode
                }
                crate::core::arch::mode::PrivilegeMode::Machine => Trap::EnvironmentCallFromMMode,
            }),
        },
        Mnemonic::Ebreak => Err(Trap::Breakpoint(d.pc)),
        Mnemonic::Mret => {
            use crate::core::arch::csr::{MSTATUS_MIE, MSTATUS_MPIE, MSTATUS_MPP, MSTATUS_MPP_SHIFT};
            use crate::core::arch::mode::PrivilegeMode;

            let mpp = (cpu.csrs.mstatus & MSTATUS_MPP) >> MSTATUS_MPP_SHIFT;
            cpu.privilege = PrivilegeMode::from_u8(mpp as u8);

            let mpie = cpu.csrs.mstatus & MSTATUS_MPIE != 0;
            cpu.csrs.mstatus = (cpu.csrs.mstatus & !MSTATUS_MIE) | if mpie { MSTATUS_MIE } else { 0 };
            cpu.csrs.mstatus |= MSTATUS_MPIE;
            cpu.csrs.mstatus &= !MSTATUS_MPP;

            cpu.mmu.flush_all();
            cpu.load_reservation = None;
            Ok(cpu.csrs.mepc)
        }
        Mnemonic::Sret => {
            use crate::core::arch::csr::{MSTATUS_SIE, MSTATUS_SPIE, MSTATUS_SPP};
            use crate::core::arch::mode::PrivilegeMode;

            let spp = cpu.csrs.mstatus & MSTATUS_SPP != 0;
            cpu.privilege = if spp {
                PrivilegeMode::Supervisor
            } else {
                PrivilegeMode::User
            };

            let spie = cpu.csrs.mstatus & MSTATUS_SPIE != 0;
            cpu.csrs.mstatus = (cpu.csrs.mstatus & !MSTATUS_SIE) | if spie { MSTATUS_SIE } else { 0 };
            cpu.csrs.mstatus |= MSTATUS_SPIE;
            cpu.csrs.mstatus &= !MSTATUS_SPP;

            cpu.mmu.flush_all();
            cpu.load_reservation = None;
            Ok(cpu.csrs.sepc)
        }

        Mnemonic::MaterializeConst => {
            wg(cpu, d.rd, d.imm);
            Ok(fallthrough)
        }

        // Deferred illegal-instruction fault from the builder (§4.2 Failure semantics): only
        // raised once control actually reaches this slot, never at build time.
        Mnemonic::Trap => Err(Trap::IllegalInstruction(d.imm as u32)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::cpu::Cpu;

    fn cpu() -> Cpu {
        Cpu::new(&Config::default())
    }

    fn d(op: Mnemonic) -> Decoded {
        Decoded::new(op, 0, 4)
    }

    #[test]
    fn addi_computes_sum() {
        let mut cpu = cpu();
        cpu.regs.write(1, 5);
        let mut inst = d(Mnemonic::Addi);
        inst.rd = 2;
        inst.rs1 = 1;
        inst.imm = 10;
        let next = execute(&mut cpu, &inst).unwrap();
        assert_eq!(cpu.regs.read(2), 15);
        assert_eq!(next, 4);
    }

    #[test]
    fn jal_writes_return_address_and_jumps() {
        let mut cpu = cpu();
        let mut inst = d(Mnemonic::Jal);
        inst.rd = 1;
        inst.imm = 0x100;
        let next = execute(&mut cpu, &inst).unwrap();
        assert_eq!(next, 0x100);
        assert_eq!(cpu.regs.read(1), 4);
    }

    #[test]
    fn branch_not_taken_falls_through() {
        let mut cpu = cpu();
        cpu.regs.write(1, 1);
        let mut inst = d(Mnemonic::Beq);
        inst.rs1 = 1;
        inst.rs2 = 0;
        inst.imm = 0x20;
        let next = execute(&mut cpu, &inst).unwrap();
        assert_eq!(next, 4);
    }

    #[test]
    fn div_by_zero_yields_all_ones() {
        let mut cpu = cpu();
        cpu.regs.write(1, 7);
        cpu.regs.write(2, 0);
        let mut inst = d(Mnemonic::Div);
        inst.rd = 3;
        inst.rs1 = 1;
        inst.rs2 = 2;
        execute(&mut cpu, &inst).unwrap();
        assert_eq!(cpu.regs.read(3), u32::MAX);
    }

    #[test]
    fn sc_without_reservation_fails() {
        let mut cpu = cpu();
        let mut inst = d(Mnemonic::ScW);
        inst.rd = 5;
        inst.rs1 = 0;
        inst.rs2 = 0;
        execute(&mut cpu, &inst).unwrap();
        assert_eq!(cpu.regs.read(5), 1);
    }

    #[test]
    fn lr_then_sc_succeeds_and_clears_reservation() {
        let mut cpu = cpu();
        cpu.regs.write(1, 0x100);
        let mut lr = d(Mnemonic::LrW);
        lr.rd = 2;
        lr.rs1 = 1;
        execute(&mut cpu, &lr).unwrap();
        assert!(cpu.load_reservation.is_some());

        let mut sc = d(Mnemonic::ScW);
        sc.rd = 3;
        sc.rs1 = 1;
        sc.rs2 = 0;
        execute(&mut cpu, &sc).unwrap();
        assert_eq!(cpu.regs.read(3), 0);
        assert!(cpu.load_reservation.is_none());
    }

    #[test]
    fn csrrs_with_x0_source_only_reads() {
        let mut cpu = cpu();
        cpu.csrs.write(crate::core::arch::csr::MSCRATCH, 0x42);
        let mut inst = d(Mnemonic::Csrrs);
        inst.rd = 1;
        inst.rs1 = 0;
        inst.csr = crate::core::arch::csr::MSCRATCH;
        execute(&mut cpu, &inst).unwrap();
        assert_eq!(cpu.regs.read(1), 0x42);
        assert_eq!(cpu.csrs.read(crate::core::arch::csr::MSCRATCH), Some(0x42));
    }

    #[test]
    fn unknown_csr_raises_illegal_instruction() {
        let mut cpu = cpu();
        let mut inst = d(Mnemonic::Csrrw);
        inst.rs1 = 0;
        inst.csr = 0x7FF;
        let err = execute(&mut cpu, &inst).unwrap_err();
        assert!(matches!(err, Trap::IllegalInstruction(_)));
    }

    #[test]
    fn fadd_computes_sum() {
        let mut cpu = cpu();
        cpu.regs.write_f(1, 1.5f32.to_bits());
        cpu.regs.write_f(2, 2.5f32.to_bits());
        let mut inst = d(Mnemonic::FaddS);
        inst.rd = 3;
        inst.rs1 = 1;
        inst.rs2 = 2;
        execute(&mut cpu, &inst).unwrap();
        assert_eq!(f32::from_bits(cpu.regs.read_f(3)), 4.0);
    }

    #[test]
    fn fclass_identifies_positive_zero() {
        assert_eq!(fclass(0.0), 1 << 4);
        assert_eq!(fclass(-0.0), 1 << 3);
    }

    #[test]
    fn clmul_matches_bitwise_definition() {
        // 0b11 * 0b10 (carry-less): each bit of b shifts a, XORed together.
        assert_eq!(clmul64(0b11, 0b10), 0b110);
    }

    #[test]
    fn ecall_host_exit_records_exit_code() {
        let mut cpu = cpu();
        cpu.mode = EmulatorMode::User;
        cpu.regs.write(abi::REG_A7, SYS_EXIT);
        cpu.regs.write(abi::REG_A0, 7);
        let inst = d(Mnemonic::Ecall);
        execute(&mut cpu, &inst).unwrap();
        assert_eq!(cpu.exit_code, Some(7));
    }

    #[test]
    fn ecall_in_system_mode_traps() {
        let mut cpu = cpu();
        cpu.mode = EmulatorMode::System;
        cpu.privilege = crate::core::arch::mode::PrivilegeMode::User;
        let inst = d(Mnemonic::Ecall);
        let err = execute(&mut cpu, &inst).unwrap_err();
        assert!(matches!(err, Trap::EnvironmentCallFromUMode));
    }

    #[test]
    fn mret_restores_privilege_from_mpp() {
        use crate::core::arch::csr::{MSTATUS, MSTATUS_MPP};
        let mut cpu = cpu();
        cpu.csrs.write(MSTATUS, MSTATUS_MPP); // MPP = 3 (Machine)... test User instead
        cpu.csrs.mstatus = 0; // MPP = 0 => User
        cpu.csrs.mepc = 0x2000;
        let inst = d(Mnemonic::Mret);
        let next = execute(&mut cpu, &inst).unwrap();
        assert_eq!(next, 0x2000);
        assert_eq!(cpu.privilege, crate::core::arch::mode::PrivilegeMode::User);
    }
}
