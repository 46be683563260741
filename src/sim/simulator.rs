//! The dispatch loop: resolve the current PC to a block (building and caching it on a miss), run
//! its instructions, and use the block chainer to skip the cache lookup on a known successor.

use tracing::trace;

use crate::common::error::Trap;
use crate::config::Config;
use crate::core::block::basic_block::Successor;
use crate::core::block::{builder, chainer, optimizer};
use crate::core::cpu::Cpu;
use crate::core::exec;

/// Owns a [`Cpu`] and drives it one basic block at a time.
pub struct Simulator {
    pub cpu: Cpu,
}

impl Simulator {
    pub fn new(config: &Config) -> Self {
        Self { cpu: Cpu::new(config) }
    }

    /// Runs until the guest sets an exit code, returning it.
    pub fn run(&mut self) -> u32 {
        let mut chained: Option<usize> = None;
        loop {
            if let Some(code) = self.cpu.exit_code {
                return code;
            }

            if let Some(trap) = self.cpu.pending_interrupt() {
                chained = None;
                self.take_trap(trap);
                continue;
            }

            let slot = match chained.take() {
                Some(slot) => {
                    self.cpu.stats.chained_dispatches += 1;
                    slot
                }
                None => match self.lookup_or_build(self.cpu.pc) {
                    Ok(slot) => slot,
                    Err(trap) => {
                        self.take_trap(trap);
                        continue;
                    }
                },
            };

            match self.dispatch_block(slot) {
                Ok(next_chain) => chained = next_chain,
                Err(trap) => self.take_trap(trap),
            }
        }
    }

    fn take_trap(&mut self, trap: Trap) {
        let faulting_pc = self.cpu.pc;
        let target = self.cpu.raise_trap(trap, faulting_pc);
        self.cpu.pc = target;
    }

    /// Resolves `pc` to a resident block's slab slot, building, folding, and (if enabled) chaining
    /// it on a miss.
    fn lookup_or_build(&mut self, pc: u32) -> Result<usize, Trap> {
        if let Some(slot) = self.cpu.block_cache.slot_of(pc) {
            self.cpu.stats.block_cache_hits += 1;
            return Ok(slot);
        }
        self.cpu.stats.block_cache_misses += 1;
        self.cpu.stats.blocks_built += 1;

        let mut block = builder::build(
            pc,
            &mut self.cpu.mmu,
            &mut self.cpu.bus,
            &self.cpu.csrs,
            self.cpu.privilege,
            self.cpu.mop_fusion,
        )?;
        optimizer::optimize(&mut block.instrs);
        if self.cpu.chaining {
            // Must run before `put` moves `block` into the cache: `link` needs an immutable view
            // of the cache's existing contents alongside a mutable view of the not-yet-resident
            // block, which only works while they're two distinct owned values.
            chainer::link(&mut block, &self.cpu.block_cache);
        }

        let evicted = self.cpu.block_cache.put(pc, block);
        if let Some((slot, _)) = evicted {
            self.cpu.stats.block_evictions += 1;
            chainer::unlink_references_to(self.cpu.block_cache.iter_blocks_mut(), slot);
        }
        Ok(self.cpu.block_cache.slot_of(pc).expect("just inserted"))
    }

    /// Runs every instruction in the block resident at `slot`, returning the chain slot to
    /// dispatch next if the runtime-taken edge was resolved at build time.
    fn dispatch_block(&mut self, slot: usize) -> Result<Option<usize>, Trap> {
        let block = self.cpu.block_cache.get_by_slot(slot).expect("caller resolved slot");
        let instrs = block.instrs.clone();
        let successor = block.successor;
        let chain_taken = block.chain_taken;
        let chain_not_taken = block.chain_not_taken;
        let start_pc = block.start_pc;
        let hit_count = block.hit_count;

        if hit_count == self.cpu.block_cache.jit_threshold() {
            self.cpu.stats.hot_block_promotions += 1;
        }

        let mut next_pc = start_pc;
        for d in &instrs {
            // `execute` may fault partway through the block; keep `cpu.pc` pointing at the
            // instruction actually being executed so a trap's `*epc` names the real faulting
            // address, not the block's start.
            self.cpu.pc = d.pc;
            next_pc = exec::execute(&mut self.cpu, d)?;
            self.cpu.stats.instructions_retired += 1;
        }
        self.cpu.pc = next_pc;

        if self.cpu.exit_code.is_some() {
            return Ok(None);
        }

        let chain_slot = match successor {
            Successor::Direct(target) if next_pc == target => chain_taken,
            Successor::Conditional { taken, not_taken } => {
                if next_pc == taken {
                    chain_taken
                } else if next_pc == not_taken {
                    chain_not_taken
                } else {
                    None
                }
            }
            _ => None,
        };
        trace!(pc = start_pc, next_pc, chained = chain_slot.is_some(), "block dispatched");
        Ok(chain_slot)
    }
}
