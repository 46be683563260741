//! Compressed-instruction expansion: 16-bit RV32FC encodings to their 32-bit equivalents.
//!
//! Every compressed form is rewritten into the same [`Decoded`] shape the 32-bit decoder
//! produces, with `len = 2` so the dispatcher advances the PC correctly and the builder's
//! `length_bytes` accounting stays exact. HINT encodings (`c.addi x0, 0`, `c.slli rd, 0`, per
//! the ratified 20191213 spec) decode as their `nop`-equivalent forms rather than as reserved.

use crate::isa::instruction::Decoded;
use crate::isa::mnemonic::Mnemonic;
use crate::isa::rvc::constants::{QUADRANT_0, QUADRANT_1, QUADRANT_2, q0, q1, q2};

#[inline]
fn sext(val: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((val << shift) as i32) >> shift
}

/// Maps a compressed 3-bit register field (`rd'`/`rs1'`/`rs2'`) to its full `x8..x15` index.
#[inline]
fn creg(bits: u16) -> usize {
    (bits as usize & 0x7) + 8
}

/// Expands a 16-bit encoding at guest `pc` into its 32-bit equivalent, or `None` if the
/// encoding is unrecognized or reserved.
pub fn expand(half: u16, pc: u32) -> Option<Decoded> {
    let quadrant = half & 0b11;
    let funct3 = (half >> 13) & 0b111;

    match quadrant {
        QUADRANT_0 => expand_q0(half, funct3, pc),
        QUADRANT_1 => expand_q1(half, funct3, pc),
        QUADRANT_2 => expand_q2(half, funct3, pc),
        _ => None,
    }
}

fn expand_q0(half: u16, funct3: u16, pc: u32) -> Option<Decoded> {
    let rd_p = creg(half >> 2);
    let rs1_p = creg(half >> 7);

    match funct3 {
        q0::C_ADDI4SPN => {
            let b = half;
            let nzuimm = (((b >> 7) & 0x30) as u32) // imm[5:4] <- inst[11:10]
                | (((b >> 1) & 0x3C0) as u32) // imm[9:6] <- inst[12:9]
                | (((b >> 4) & 0x4) as u32) // imm[2] <- inst[6]
                | (((b >> 2) & 0x8) as u32); // imm[3] <- inst[5]
            if nzuimm == 0 {
                return None; // reserved
            }
            let mut d = Decoded::new(Mnemonic::Addi, pc, 2);
            d.rd = rd_p;
            d.rs1 = 2; // sp
            d.imm = nzuimm as i32;
            Some(d)
        }
        q0::C_LW => {
            let imm = lw_sw_imm(half);
            let mut d = Decoded::new(Mnemonic::Lw, pc, 2);
            d.rd = rd_p;
            d.rs1 = rs1_p;
            d.imm = imm;
            Some(d)
        }
        q0::C_FLW => {
            let imm = lw_sw_imm(half);
            let mut d = Decoded::new(Mnemonic::Flw, pc, 2);
            d.rd = rd_p;
            d.rs1 = rs1_p;
            d.imm = imm;
            Some(d)
        }
        q0::C_SW => {
            let imm = lw_sw_imm(half);
            let mut d = Decoded::new(Mnemonic::Sw, pc, 2);
            d.rs1 = rs1_p;
            d.rs2 = rd_p; // field at bits [4:2] is rs2' here
            d.imm = imm;
            Some(d)
        }
        q0::C_FSW => {
            let imm = lw_sw_imm(half);
            let mut d = Decoded::new(Mnemonic::Fsw, pc, 2);
            d.rs1 = rs1_p;
            d.rs2 = rd_p;
            d.imm = imm;
            Some(d)
        }
        _ => None,
    }
}

/// Shared immediate layout for C.LW/C.FLW/C.SW/C.FSW: `imm[5:3] <- inst[12:10]`,
/// `imm[2] <- inst[6]`, `imm[6] <- inst[5]`.
fn lw_sw_imm(half: u16) -> i32 {
    let b = half as u32;
    (((b >> 7) & 0x38) | ((b >> 4) & 0x4) | ((b << 1) & 0x40)) as i32
}

fn expand_q1(half: u16, funct3: u16, pc: u32) -> Option<Decoded> {
    let rd = ((half >> 7) & 0x1F) as usize;

    match funct3 {
        q1::C_ADDI => {
            let imm = c_imm6(half);
            let mut d = Decoded::new(Mnemonic::Addi, pc, 2);
            d.rd = rd;
            d.rs1 = rd;
            d.imm = imm;
            if rd == 0 {
                d.op = Mnemonic::Nop; // HINT when imm != 0, true nop when imm == 0
            }
            Some(d)
        }
        q1::C_JAL => {
            let imm = cj_imm(half);
            let mut d = Decoded::new(Mnemonic::Jal, pc, 2);
            d.rd = 1; // ra
            d.imm = imm;
            Some(d)
        }
        q1::C_LI => {
            let imm = c_imm6(half);
            let mut d = Decoded::new(Mnemonic::Addi, pc, 2);
            d.rd = rd;
            d.rs1 = 0;
            d.imm = imm;
            Some(d)
        }
        q1::C_LUI_ADDI16SP => {
            if rd == 2 {
                // c.addi16sp
                let b = half as u32;
                let imm = ((b >> 3) & 0x200) // imm[9] <- inst[12]
                    | ((b >> 2) & 0x10) // imm[4] <- inst[6]
                    | ((b << 1) & 0x40) // imm[6] <- inst[5]
                    | ((b << 4) & 0x180) // imm[8:7] <- inst[4:3]
                    | ((b << 3) & 0x20); // imm[5] <- inst[2]
                let imm = sext(imm, 10);
                if imm == 0 {
                    return None; // reserved
                }
                let mut d = Decoded::new(Mnemonic::Addi, pc, 2);
                d.rd = 2;
                d.rs1 = 2;
                d.imm = imm;
                return Some(d);
            }
            // c.lui
            let b = half as u32;
            let raw = ((b >> 7) & 0x20) | ((b >> 2) & 0x1F); // imm[17]<-inst[12], imm[16:12]<-inst[6:2]
            if raw == 0 {
                return None; // reserved
            }
            let imm17 = sext(raw, 6); // sign-extend the 6-bit nzimm[17:12] field
            let mut d = Decoded::new(Mnemonic::Lui, pc, 2);
            d.rd = rd;
            d.imm = imm17 << 12;
            Some(d)
        }
        q1::C_MISC_ALU => {
            let rd_p = creg(half >> 7);
            let funct2 = (half >> 10) & 0b11;
            match funct2 {
                0b00 => {
                    // c.srli
                    let shamt = c_shamt(half);
                    let mut d = Decoded::new(Mnemonic::Srli, pc, 2);
                    d.rd = rd_p;
                    d.rs1 = rd_p;
                    d.shamt = shamt;
                    Some(d)
                }
                0b01 => {
                    let shamt = c_shamt(half);
                    let mut d = Decoded::new(Mnemonic::Srai, pc, 2);
                    d.rd = rd_p;
                    d.rs1 = rd_p;
                    d.shamt = shamt;
                    Some(d)
                }
                0b10 => {
                    let imm = c_imm6(half);
                    let mut d = Decoded::new(Mnemonic::Andi, pc, 2);
                    d.rd = rd_p;
                    d.rs1 = rd_p;
                    d.imm = imm;
                    Some(d)
                }
                0b11 => {
                    if (half >> 12) & 1 != 0 {
                        return None; // reserved on RV32 (RV64C c.subw/c.addw space)
                    }
                    let rs2_p = creg(half >> 2);
                    let op = match (half >> 5) & 0b11 {
                        0b00 => Mnemonic::Sub,
                        0b01 => Mnemonic::Xor,
                        0b10 => Mnemonic::Or,
                        _ => Mnemonic::And,
                    };
                    let mut d = Decoded::new(op, pc, 2);
                    d.rd = rd_p;
                    d.rs1 = rd_p;
                    d.rs2 = rs2_p;
                    Some(d)
                }
                _ => unreachable!(),
            }
        }
        q1::C_J => {
            let imm = cj_imm(half);
            let mut d = Decoded::new(Mnemonic::Jal, pc, 2);
            d.rd = 0;
            d.imm = imm;
            Some(d)
        }
        q1::C_BEQZ | q1::C_BNEZ => {
            let rs1_p = creg(half >> 7);
            let imm = cb_imm(half);
            let op = if funct3 == q1::C_BEQZ {
                Mnemonic::Beq
            } else {
                Mnemonic::Bne
            };
            let mut d = Decoded::new(op, pc, 2);
            d.rs1 = rs1_p;
            d.rs2 = 0;
            d.imm = imm;
            Some(d)
        }
        _ => None,
    }
}

/// `c.addi`/`c.li`/`c.andi` shared 6-bit sign-extended immediate: `imm[5] <- inst[12]`,
/// `imm[4:0] <- inst[6:2]`.
fn c_imm6(half: u16) -> i32 {
    let b = half as u32;
    let raw = ((b >> 7) & 0x20) | ((b >> 2) & 0x1F);
    sext(raw, 6)
}

/// `c.srli`/`c.srai`/`c.slli` shared 6-bit shift amount: `shamt[5] <- inst[12]`,
/// `shamt[4:0] <- inst[6:2]`.
fn c_shamt(half: u16) -> u32 {
    let b = half as u32;
    ((b >> 7) & 0x20) | ((b >> 2) & 0x1F)
}

/// `c.jal`/`c.j` shared 11-bit sign-extended, x2-scaled jump offset.
fn cj_imm(half: u16) -> i32 {
    let b = half as u32;
    let raw = ((b >> 1) & 0x800) // imm[11] <- inst[12]
        | ((b << 2) & 0x400) // imm[10] <- inst[8]
        | ((b >> 1) & 0x300) // imm[9:8] <- inst[10:9]
        | ((b << 1) & 0x80) // imm[7] <- inst[6]
        | ((b >> 1) & 0x40) // imm[6] <- inst[7]
        | ((b << 3) & 0x20) // imm[5] <- inst[2]
        | ((b >> 7) & 0x10) // imm[4] <- inst[11]
        | ((b >> 2) & 0xE); // imm[3:1] <- inst[5:3]
    sext(raw, 12)
}

/// `c.beqz`/`c.bnez` shared 9-bit sign-extended, x2-scaled branch offset.
fn cb_imm(half: u16) -> i32 {
    let b = half as u32;
    let raw = ((b >> 4) & 0x100) // imm[8] <- inst[12]
        | ((b << 1) & 0xC0) // imm[7:6] <- inst[6:5]
        | ((b << 3) & 0x20) // imm[5] <- inst[2]
        | ((b >> 7) & 0x18) // imm[4:3] <- inst[11:10]
        | ((b >> 2) & 0x6); // imm[2:1] <- inst[4:3]
    sext(raw, 9)
}

fn expand_q2(half: u16, funct3: u16, pc: u32) -> Option<Decoded> {
    let rd = ((half >> 7) & 0x1F) as usize;

    match funct3 {
        q2::C_SLLI => {
            let shamt = c_shamt(half);
            let mut d = Decoded::new(Mnemonic::Slli, pc, 2);
            d.rd = rd;
            d.rs1 = rd;
            d.shamt = shamt;
            if rd == 0 || shamt == 0 {
                // rd=0 is a HINT; shamt=0 is a HINT per the ratified 20191213 spec (resolving
                // the ambiguity between HINT and reserved in favor of HINT) — both are
                // nop-equivalent, not reserved.
                d.op = Mnemonic::Nop;
            }
            Some(d)
        }
        q2::C_LWSP => {
            if rd == 0 {
                return None; // reserved
            }
            let imm = lwsp_imm(half);
            let mut d = Decoded::new(Mnemonic::Lw, pc, 2);
            d.rd = rd;
            d.rs1 = 2;
            d.imm = imm;
            Some(d)
        }
        q2::C_FLWSP => {
            let imm = lwsp_imm(half);
            let mut d = Decoded::new(Mnemonic::Flw, pc, 2);
            d.rd = rd;
            d.rs1 = 2;
            d.imm = imm;
            Some(d)
        }
        q2::C_MISC_ALU => {
            let rs2 = ((half >> 2) & 0x1F) as usize;
            let bit12 = (half >> 12) & 1;
            match (bit12, rs2) {
                (0, 0) => {
                    if rd == 0 {
                        return None; // reserved
                    }
                    let mut d = Decoded::new(Mnemonic::Jalr, pc, 2);
                    d.rd = 0;
                    d.rs1 = rd;
                    d.imm = 0;
                    Some(d) // c.jr
                }
                (0, _) => {
                    let mut d = Decoded::new(Mnemonic::Add, pc, 2);
                    d.rd = rd;
                    d.rs1 = 0;
                    d.rs2 = rs2;
                    Some(d) // c.mv
                }
                (1, 0) if rd == 0 => Some(Decoded::new(Mnemonic::Ebreak, pc, 2)),
                (1, 0) => {
                    let mut d = Decoded::new(Mnemonic::Jalr, pc, 2);
                    d.rd = 1;
                    d.rs1 = rd;
                    d.imm = 0;
                    Some(d) // c.jalr
                }
                (1, _) => {
                    let mut d = Decoded::new(Mnemonic::Add, pc, 2);
                    d.rd = rd;
                    d.rs1 = rd;
                    d.rs2 = rs2;
                    Some(d) // c.add
                }
                _ => None,
            }
        }
        q2::C_SWSP => {
            let imm = swsp_imm(half);
            let rs2 = ((half >> 2) & 0x1F) as usize;
            let mut d = Decoded::new(Mnemonic::Sw, pc, 2);
            d.rs1 = 2;
            d.rs2 = rs2;
            d.imm = imm;
            Some(d)
        }
        q2::C_FSWSP => {
            let imm = swsp_imm(half);
            let rs2 = ((half >> 2) & 0x1F) as usize;
            let mut d = Decoded::new(Mnemonic::Fsw, pc, 2);
            d.rs1 = 2;
            d.rs2 = rs2;
            d.imm = imm;
            Some(d)
        }
        _ => None,
    }
}

/// `c.lwsp`/`c.flwsp`: `imm[5] <- inst[12]`, `imm[4:2] <- inst[6:4]`, `imm[7:6] <- inst[3:2]`.
fn lwsp_imm(half: u16) -> i32 {
    let b = half as u32;
    (((b >> 7) & 0x20) | ((b >> 2) & 0x1C) | ((b << 4) & 0xC0)) as i32
}

/// `c.swsp`/`c.fswsp`: `imm[5:2] <- inst[12:9]`, `imm[7:6] <- inst[8:7]`.
fn swsp_imm(half: u16) -> i32 {
    let b = half as u32;
    (((b >> 7) & 0x3C) | ((b >> 1) & 0xC0)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_li_expands_to_addi() {
        // c.li a0, 5 -> 0x4515
        let d = expand(0x4515, 0).expect("decodes");
        assert_eq!(d.op, Mnemonic::Addi);
        assert_eq!(d.rd, 10);
        assert_eq!(d.rs1, 0);
        assert_eq!(d.imm, 5);
        assert_eq!(d.len, 2);
    }

    #[test]
    fn c_nop_is_addi_x0_x0_0() {
        let d = expand(0x0001, 0).expect("decodes");
        assert_eq!(d.op, Mnemonic::Nop);
    }

    #[test]
    fn c_slli_shamt_zero_is_hint_nop() {
        // rd=x1 (nonzero), shamt=0 -> HINT per the ratified 20191213 spec
        let half: u16 = 0b000_0_00001_00000_10;
        let d = expand(half, 0).expect("decodes");
        assert_eq!(d.op, Mnemonic::Nop);
    }

    #[test]
    fn c_addi4spn_zero_immediate_is_reserved() {
        assert!(expand(0b000_00000000_000_00, 0).is_none());
    }
}
