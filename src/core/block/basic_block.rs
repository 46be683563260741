//! The unit the cache stores: a straight-line run of decoded instructions.

use crate::isa::instruction::Decoded;

/// How control leaves a block once its last instruction executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Successor {
    /// Unconditional direct jump (`jal`/`c.j`/`c.jal`): the target is known at build time.
    Direct(u32),
    /// Conditional branch: both the taken and not-taken targets are known at build time, but
    /// which one is live at runtime depends on the comparison.
    Conditional { taken: u32, not_taken: u32 },
    /// Target only known at runtime (`jalr`), or control leaves the interpreter loop entirely
    /// (`ecall`/`ebreak`/`mret`/`sret`/`wfi`/a CSR write that may change translation state).
    Indirect,
}

/// A maximal straight-line run of instructions: decode starts at `start_pc` and continues until
/// a terminator (per [`Mnemonic::is_terminator`](crate::isa::mnemonic::Mnemonic::is_terminator)).
pub struct Block {
    pub start_pc: u32,
    pub instrs: Vec<Decoded>,
    pub length_bytes: u32,
    pub successor: Successor,
    /// Number of times this block has been dispatched; drives hot-block promotion (§4.3).
    pub hit_count: u32,
    /// Resolved chain slot for the taken/direct edge, if the chainer has linked it.
    pub chain_taken: Option<usize>,
    /// Resolved chain slot for the not-taken (fall-through) edge of a conditional branch.
    pub chain_not_taken: Option<usize>,
}

impl Block {
    pub fn new(start_pc: u32, instrs: Vec<Decoded>, successor: Successor) -> Self {
        let length_bytes = instrs.iter().map(|d| d.len).sum();
        Self {
            start_pc,
            instrs,
            length_bytes,
            successor,
            hit_count: 0,
            chain_taken: None,
            chain_not_taken: None,
        }
    }
}
