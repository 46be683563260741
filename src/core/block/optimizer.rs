//! Per-block constant-propagation pass (§4.4).
//!
//! Tracks, for each integer register, whether it currently holds a compile-time-known value
//! within this block (propagation never crosses a block boundary — a block always starts with
//! every register unknown). When an instruction's result can be evaluated from known inputs, it
//! is rewritten in place to [`Mnemonic::MaterializeConst`], which the interpreter treats as an
//! unconditional `rd = imm`.

use tracing::trace;

use crate::isa::instruction::Decoded;
use crate::isa::mnemonic::Mnemonic;

fn materialize(d: &mut Decoded, value: i32) {
    d.op = Mnemonic::MaterializeConst;
    d.imm = value;
}

fn eval_alu_imm(op: Mnemonic, a: i32, imm: i32) -> Option<i32> {
    let (au, bu) = (a as u32, imm as u32);
    Some(match op {
        Mnemonic::Addi => a.wrapping_add(imm),
        Mnemonic::Slti => ((a < imm) as i32),
        Mnemonic::Sltiu => ((au < bu) as i32),
        Mnemonic::Xori => a ^ imm,
        Mnemonic::Ori => a | imm,
        Mnemonic::Andi => a & imm,
        Mnemonic::Slli => (au << (bu & 0x1F)) as i32,
        Mnemonic::Srli => (au >> (bu & 0x1F)) as i32,
        Mnemonic::Srai => a >> (bu & 0x1F),
        _ => return None,
    })
}

fn eval_alu_reg(op: Mnemonic, a: i32, b: i32) -> Option<i32> {
    let (au, bu) = (a as u32, b as u32);
    Some(match op {
        Mnemonic::Add => a.wrapping_add(b),
        Mnemonic::Sub => a.wrapping_sub(b),
        Mnemonic::Sll => (au << (bu & 0x1F)) as i32,
        Mnemonic::Slt => ((a < b) as i32),
        Mnemonic::Sltu => ((au < bu) as i32),
        Mnemonic::Xor => a ^ b,
        Mnemonic::Srl => (au >> (bu & 0x1F)) as i32,
        Mnemonic::Sra => a >> (bu & 0x1F),
        Mnemonic::Or => a | b,
        Mnemonic::And => a & b,
        Mnemonic::Mul => a.wrapping_mul(b),
        Mnemonic::Mulh => (((a as i64) * (b as i64)) >> 32) as i32,
        Mnemonic::Mulhsu => (((a as i64) * (bu as i64)) >> 32) as i32,
        Mnemonic::Mulhu => (((au as u64) * (bu as u64)) >> 32) as i32,
        Mnemonic::Div => {
            if b == 0 {
                -1
            } else if a == i32::MIN && b == -1 {
                i32::MIN
            } else {
                a.wrapping_div(b)
            }
        }
        Mnemonic::Divu => {
            if bu == 0 {
                -1
            } else {
                (au / bu) as i32
            }
        }
        Mnemonic::Rem => {
            if b == 0 {
                a
            } else if a == i32::MIN && b == -1 {
                0
            } else {
                a.wrapping_rem(b)
            }
        }
        Mnemonic::Remu => {
            if bu == 0 {
                a
            } else {
                (au % bu) as i32
            }
        }
        _ => return None,
    })
}

/// Runs the constant-propagation pass over a block's instructions in place.
pub fn optimize(instrs: &mut [Decoded]) {
    let mut is_const = [false; 32];
    let mut const_val = [0i32; 32];

    for d in instrs.iter_mut() {
        let rs1_const = d.rs1 == 0 || is_const[d.rs1];
        let rs1_val = if d.rs1 == 0 { 0 } else { const_val[d.rs1] };
        let rs2_const = d.rs2 == 0 || is_const[d.rs2];
        let rs2_val = if d.rs2 == 0 { 0 } else { const_val[d.rs2] };

        if d.op.is_branch() && rs1_const && rs2_const {
            let taken = match d.op {
                Mnemonic::Beq => rs1_val == rs2_val,
                Mnemonic::Bne => rs1_val != rs2_val,
                Mnemonic::Blt => rs1_val < rs2_val,
                Mnemonic::Bge => rs1_val >= rs2_val,
                Mnemonic::Bltu => (rs1_val as u32) < (rs2_val as u32),
                Mnemonic::Bgeu => (rs1_val as u32) >= (rs2_val as u32),
                _ => unreachable!(),
            };
            d.imm = if taken { d.imm } else { 4 };
            d.rd = 0;
            d.op = Mnemonic::Jal;
            continue;
        }

        let mut result: Option<i32> = None;

        match d.op {
            Mnemonic::Lui => result = Some(d.imm),
            Mnemonic::Auipc => {
                d.op = Mnemonic::Lui;
                d.imm = d.pc.wrapping_add(d.imm as u32) as i32;
                result = Some(d.imm);
            }
            Mnemonic::Jal => result = Some(d.pc.wrapping_add(d.len) as i32),
            Mnemonic::Addi | Mnemonic::Slti | Mnemonic::Sltiu | Mnemonic::Xori
            | Mnemonic::Ori | Mnemonic::Andi | Mnemonic::Slli | Mnemonic::Srli
            | Mnemonic::Srai => {
                if rs1_const {
                    result = eval_alu_imm(d.op, rs1_val, d.imm);
                }
            }
            Mnemonic::Add
            | Mnemonic::Sub
            | Mnemonic::Sll
            | Mnemonic::Slt
            | Mnemonic::Sltu
            | Mnemonic::Xor
            | Mnemonic::Srl
            | Mnemonic::Sra
            | Mnemonic::Or
            | Mnemonic::And
            | Mnemonic::Mul
            | Mnemonic::Mulh
            | Mnemonic::Mulhsu
            | Mnemonic::Mulhu
            | Mnemonic::Div
            | Mnemonic::Divu
            | Mnemonic::Rem
            | Mnemonic::Remu => {
                if rs1_const && rs2_const {
                    result = eval_alu_reg(d.op, rs1_val, rs2_val);
                }
            }
            _ => {}
        }

        if d.op != Mnemonic::Lui {
            if let Some(value) = result {
                if d.op != Mnemonic::Jal {
                    if d.fused {
                        // Builder already proved the predecessor constant; materialize in one
                        // step instead of waiting for this pass to re-derive it independently.
                        trace!(pc = d.pc, "fused macro-op pair materialized in one step");
                    }
                    materialize(d, value);
                } else {
                    // jal's side effect (the jump) still has to execute; only rd's value folds.
                }
            }
        }

        if d.rd != 0 {
            match result {
                Some(value) => {
                    is_const[d.rd] = true;
                    const_val[d.rd] = value;
                }
                None if writes_rd(d.op) => is_const[d.rd] = false,
                None => {}
            }
        }
    }
}

/// True for any opcode that writes a register whose value the pass cannot assume constant
/// (memory loads, CSR reads, FP-to-int moves, and anything not covered by `eval_alu_*`).
fn writes_rd(op: Mnemonic) -> bool {
    !matches!(
        op,
        Mnemonic::Fence
            | Mnemonic::FenceI
            | Mnemonic::Ecall
            | Mnemonic::Ebreak
            | Mnemonic::Nop
            | Mnemonic::Beq
            | Mnemonic::Bne
            | Mnemonic::Blt
            | Mnemonic::Bge
            | Mnemonic::Bltu
            | Mnemonic::Bgeu
            | Mnemonic::Sb
            | Mnemonic::Sh
            | Mnemonic::Sw
            | Mnemonic::MaterializeConst
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::instruction::Decoded;

    fn d(op: Mnemonic, rd: usize, rs1: usize, rs2: usize, imm: i32, pc: u32) -> Decoded {
        let mut dec = Decoded::new(op, pc, 4);
        dec.rd = rd;
        dec.rs1 = rs1;
        dec.rs2 = rs2;
        dec.imm = imm;
        dec
    }

    #[test]
    fn lui_then_addi_folds_to_materialize_const() {
        let mut instrs = vec![
            d(Mnemonic::Lui, 1, 0, 0, 0x1000, 0),
            d(Mnemonic::Addi, 1, 1, 0, 4, 4),
        ];
        optimize(&mut instrs);
        assert_eq!(instrs[1].op, Mnemonic::MaterializeConst);
        assert_eq!(instrs[1].imm, 0x1004);
    }

    #[test]
    fn load_result_is_not_propagated() {
        let mut instrs = vec![
            d(Mnemonic::Lw, 2, 1, 0, 0, 0),
            d(Mnemonic::Addi, 3, 2, 0, 1, 4),
        ];
        optimize(&mut instrs);
        assert_eq!(instrs[1].op, Mnemonic::Addi);
    }

    #[test]
    fn div_by_zero_folds_to_all_ones() {
        let mut instrs = vec![
            d(Mnemonic::Lui, 1, 0, 0, 0, 0),
            d(Mnemonic::Lui, 2, 0, 0, 0, 4),
            d(Mnemonic::Div, 3, 1, 2, 0, 8),
        ];
        optimize(&mut instrs);
        assert_eq!(instrs[2].op, Mnemonic::MaterializeConst);
        assert_eq!(instrs[2].imm, -1);
    }
}
