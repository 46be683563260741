//! Block chaining (§4.5): resolving a block's control-transfer successor(s) directly to another
//! block's slab slot so the interpreter can skip a cache lookup on the next dispatch.
//!
//! Only edges whose target is known at build time and whose source instruction is a plain
//! control transfer are eligible — `jal` and the six branches. Every other terminator (`jalr`,
//! `ecall`/`ebreak`, `mret`/`sret`/`wfi`, `fence.i`/`sfence.vma`, any CSR write) either has a
//! runtime-only target or can change what a PC maps to, and `is_direct_jump`/`is_branch` already
//! exclude all of them — so excluding anything but `Jal` and the six branches here is sufficient,
//! no separate check is needed.

use crate::core::block::basic_block::{Block, Successor};
use crate::core::block::cache::BlockCache;
use crate::isa::mnemonic::Mnemonic;

/// True when `op` is eligible to carry a chain slot at all — direct jumps and branches only.
fn chainable(op: Mnemonic) -> bool {
    op.is_direct_jump() || op.is_branch()
}

/// Resolves `block`'s chain slots against the current cache contents. Call *before* `block` is
/// inserted into `cache`: a target that's actually `block` itself (a single-block loop) can't
/// resolve yet either way, but resolving against a not-yet-resident `block` and a separately
/// owned, already-resident `cache` is what lets this take an immutable view of one and a mutable
/// view of the other at the same time.
///
/// Leaves slots as `None` when the target block isn't resident yet, or when chaining is disabled
/// (the caller simply skips invoking this).
pub fn link(block: &mut Block, cache: &BlockCache) {
    let Some(last) = block.instrs.last() else { return };
    if !chainable(last.op) {
        return;
    }

    match block.successor {
        Successor::Direct(target) => {
            block.chain_taken = cache.slot_of(target);
        }
        Successor::Conditional { taken, not_taken } => {
            block.chain_taken = cache.slot_of(taken);
            block.chain_not_taken = cache.slot_of(not_taken);
        }
        Successor::Indirect => {}
    }
}

/// Nulls every chain slot pointing at `evicted_slot`, called whenever the cache evicts a block so
/// no stale reference to its reused slab slot survives. `blocks` is every block still resident,
/// e.g. the cache's full slot iteration.
pub fn unlink_references_to<'a>(blocks: impl Iterator<Item = &'a mut Block>, evicted_slot: usize) {
    for block in blocks {
        if block.chain_taken == Some(evicted_slot) {
            block.chain_taken = None;
        }
        if block.chain_not_taken == Some(evicted_slot) {
            block.chain_not_taken = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::instruction::Decoded;

    fn block_with(op: Mnemonic, successor: Successor) -> Block {
        let mut d = Decoded::new(op, 0, 4);
        d.imm = 4;
        Block::new(0, vec![d], successor)
    }

    #[test]
    fn jalr_never_chains() {
        let mut block = block_with(Mnemonic::Jalr, Successor::Indirect);
        let cache = BlockCache::new(4, true, 1000);
        link(&mut block, &cache);
        assert_eq!(block.chain_taken, None);
    }

    #[test]
    fn csr_write_terminator_never_chains() {
        let mut block = block_with(Mnemonic::Csrrw, Successor::Indirect);
        let cache = BlockCache::new(4, true, 1000);
        link(&mut block, &cache);
        assert_eq!(block.chain_taken, None);
    }

    #[test]
    fn unlink_clears_only_matching_slot() {
        let mut a = block_with(Mnemonic::Jal, Successor::Direct(4));
        a.chain_taken = Some(2);
        let mut b = block_with(Mnemonic::Jal, Successor::Direct(8));
        b.chain_taken = Some(3);
        let mut blocks = vec![a, b];
        unlink_references_to(blocks.iter_mut(), 2);
        assert_eq!(blocks[0].chain_taken, None);
        assert_eq!(blocks[1].chain_taken, Some(3));
    }
}
