//! RV32 block-cache interpreter core.
//!
//! This crate implements a RISC-V RV32IMAFC hart built around a basic-block interpreter rather
//! than an instruction-at-a-time loop:
//! 1. **Decode:** 32-bit and 16-bit (C-extension) instructions into a uniform [`Decoded`] record.
//! 2. **Block pipeline:** the builder walks straight-line code into a [`Block`], a per-block
//!    constant-propagation pass folds what it can prove, and the chainer links a block's
//!    statically-known successors directly to their slab slots.
//! 3. **Block cache:** a content-addressable cache from start-PC to block under ARC or LFU
//!    replacement, with hot-block promotion past a configurable hit-count threshold.
//! 4. **MMU:** Sv32 two-level paging with split instruction/data TLBs and A/D bit maintenance.
//! 5. **Bus:** routes physical addresses to guest RAM or to a host-registered [`soc::bus::Device`]
//!    — this crate specifies the MMIO seam, not device models.
//!
//! [`Decoded`]: crate::isa::instruction::Decoded
//! [`Block`]: crate::core::block::Block
//!
//! Architectural state and trap entry live in [`core::cpu::Cpu`]; the dispatch loop that drives a
//! `Cpu` block by block lives in [`sim::simulator::Simulator`].

/// Common types and constants (addresses, registers, traps, access types).
pub mod common;
/// Emulator configuration (extension switches, block-cache and memory sizing).
pub mod config;
/// Hart state (arch, block pipeline, CPU, execution, MMU).
pub mod core;
/// Instruction set (decode, instruction record, ABI, RVC expansion, privileged encodings).
pub mod isa;
/// Top-level dispatch loop.
pub mod sim;
/// System-on-chip seam: the physical bus and the `Device` trait a host implements MMIO against.
pub mod soc;
/// Execution statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Hart architectural state; holds registers, CSRs, the MMU, the bus, and the block cache.
pub use crate::core::Cpu;
/// Host syscall shim seam; implement this to service non-`exit` `ecall`s in user mode.
pub use crate::core::cpu::HostShim;
/// Top-level dispatch loop; owns a `Cpu` and runs it to completion.
pub use crate::sim::simulator::Simulator;
/// Physical address bus; construct with `Bus::new_with_ram` and register `Device`s on it.
pub use crate::soc::Bus;
