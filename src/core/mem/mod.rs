//! Guest physical memory.

/// Sparse, chunk-allocated guest physical memory.
pub mod arena;

pub use arena::MemoryArena;
