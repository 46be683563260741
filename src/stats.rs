//! Execution statistics collection and reporting.
//!
//! Tracks the metrics specific to a block-cache interpreter rather than a pipelined core:
//! instructions retired, how the block builder/cache/chainer are behaving (builds, hits, evictions,
//! hot-block promotions, chained dispatches), and how many traps were taken.

use std::time::Instant;

/// Execution statistics for one simulation run.
#[derive(Clone)]
pub struct SimStats {
    start_time: Instant,
    /// Number of instructions retired (summed across every block dispatched, including blocks
    /// reached via chaining).
    pub instructions_retired: u64,
    /// Number of times the dispatch loop needed a PC it had never built a block for.
    pub blocks_built: u64,
    /// Number of dispatches resolved by a block cache hit (built once, reused thereafter).
    pub block_cache_hits: u64,
    /// Number of dispatches that missed the block cache and had to rebuild.
    pub block_cache_misses: u64,
    /// Number of blocks evicted from the cache to make room for a new one.
    pub block_evictions: u64,
    /// Number of blocks promoted out of the LFU segment into the hot (ARC) segment after
    /// crossing the configured hit-count threshold.
    pub hot_block_promotions: u64,
    /// Number of dispatches resolved via a chain slot instead of a fresh cache lookup.
    pub chained_dispatches: u64,
    /// Number of traps (exceptions or interrupts) taken.
    pub traps_taken: u64,
}

impl Default for SimStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            instructions_retired: 0,
            blocks_built: 0,
            block_cache_hits: 0,
            block_cache_misses: 0,
            block_evictions: 0,
            hot_block_promotions: 0,
            chained_dispatches: 0,
            traps_taken: 0,
        }
    }
}

impl SimStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prints every statistics section to stdout.
    pub fn print(&self) {
        self.print_sections(&[]);
    }

    /// Prints only the requested sections: `"summary"`, `"blocks"`, `"traps"`. An empty slice
    /// prints all of them.
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let seconds = self.start_time.elapsed().as_secs_f64();

        if want("summary") {
            let mips = (self.instructions_retired as f64 / seconds.max(f64::EPSILON)) / 1_000_000.0;
            println!("\n==========================================================");
            println!("RV32 BLOCK-CACHE EXECUTION STATISTICS");
            println!("==========================================================");
            println!("host_seconds             {:.4} s", seconds);
            println!("sim_insts                {}", self.instructions_retired);
            println!("sim_mips                 {:.2}", mips);
            println!("----------------------------------------------------------");
        }
        if want("blocks") {
            let lookups = self.block_cache_hits + self.block_cache_misses;
            let hit_rate = if lookups > 0 {
                100.0 * self.block_cache_hits as f64 / lookups as f64
            } else {
                0.0
            };
            println!("BLOCK CACHE");
            println!("  blocks.built           {}", self.blocks_built);
            println!("  blocks.cache_hits      {} ({:.2}%)", self.block_cache_hits, hit_rate);
            println!("  blocks.cache_misses    {}", self.block_cache_misses);
            println!("  blocks.evictions       {}", self.block_evictions);
            println!("  blocks.hot_promotions  {}", self.hot_block_promotions);
            println!("  blocks.chained         {}", self.chained_dispatches);
            println!("----------------------------------------------------------");
        }
        if want("traps") {
            println!("TRAPS");
            println!("  traps.taken            {}", self.traps_taken);
        }
        println!("==========================================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zeroed() {
        let stats = SimStats::default();
        assert_eq!(stats.instructions_retired, 0);
        assert_eq!(stats.traps_taken, 0);
    }
}
