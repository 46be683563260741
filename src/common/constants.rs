//! Global system constants.
//!
//! 1. **Memory constants:** page size, masks, and shifts for Sv32 memory management.
//! 2. **Instruction constants:** opcode masks and field shifts for decoding.
//! 3. **Delegation constants:** bit positions for interrupt delegation.
//! 4. **Cache/arena constants:** golden-ratio hash multiplier, arena chunk geometry.

/// Page size in bytes (4 KiB); also the Sv32 leaf page size.
pub const PAGE_SIZE: u32 = 4096;

/// Number of bits to shift to convert between bytes and pages.
pub const PAGE_SHIFT: u32 = 12;

/// Mask for extracting the combined virtual page number (both Sv32 levels) from an address.
pub const VPN_MASK: u32 = 0xF_FFFF;

/// Mask for extracting the page offset from an address.
pub const PAGE_OFFSET_MASK: u32 = PAGE_SIZE - 1;

/// Bit mask for extracting the opcode field from a RISC-V instruction.
pub const OPCODE_MASK: u32 = 0x7F;

/// Size of a compressed (16-bit) RISC-V instruction in bytes.
pub const INSTRUCTION_SIZE_16: u32 = 2;

/// Size of a standard (32-bit) RISC-V instruction in bytes.
pub const INSTRUCTION_SIZE_32: u32 = 4;

/// Bit mask for checking if an instruction is compressed.
pub const COMPRESSED_INSTRUCTION_MASK: u16 = 0x3;

/// Value indicating a compressed instruction when masked.
pub const COMPRESSED_INSTRUCTION_VALUE: u16 = 0x3;

/// Bit mask for extracting the destination register (rd) field.
pub const RD_MASK: u32 = 0x1F;

/// Bit position shift for the destination register (rd) field.
pub const RD_SHIFT: u32 = 7;

/// Bit mask for extracting the first source register (rs1) field.
pub const RS1_MASK: u32 = 0x1F;

/// Bit position shift for the first source register (rs1) field.
pub const RS1_SHIFT: u32 = 15;

/// Bit position for machine external interrupt delegation in `mideleg`.
pub const DELEG_MEIP_BIT: u32 = 11;

/// Bit position for machine software interrupt delegation in `mideleg`.
pub const DELEG_MSIP_BIT: u32 = 3;

/// Bit position for machine timer interrupt delegation in `mideleg`.
pub const DELEG_MTIP_BIT: u32 = 7;

/// Bit position for supervisor external interrupt delegation in `mideleg`.
pub const DELEG_SEIP_BIT: u32 = 9;

/// Bit position for supervisor software interrupt delegation in `mideleg`.
pub const DELEG_SSIP_BIT: u32 = 1;

/// Bit position for supervisor timer interrupt delegation in `mideleg`.
pub const DELEG_STIP_BIT: u32 = 5;

/// Bit mask indicating that a 32-bit trap cause represents an interrupt.
pub const CAUSE_INTERRUPT_BIT: u32 = 1 << 31;

/// Opcode for the Wait For Interrupt (WFI) instruction.
pub const WFI_INSTRUCTION: u32 = 0x1050_0073;

/// Multiplier for Fibonacci/golden-ratio hashing of a 32-bit key, used by the block cache
/// (`HASH(val) = (val * GOLDEN_RATIO_32) >> (32 - k)`, `k = log2(capacity)`).
pub const GOLDEN_RATIO_32: u32 = 0x9E37_79B9;

/// Size in bytes of one memory-arena chunk (64 KiB).
pub const ARENA_CHUNK_SIZE: u32 = 1 << 16;

/// Number of chunks spanning the full 32-bit guest physical address space.
pub const ARENA_CHUNK_COUNT: usize = 1 << 16;

/// Hot-block promotion threshold used when a [`crate::config::BlockConfig`] does not override it.
pub const DEFAULT_JIT_THRESHOLD: u32 = 1000;

/// Number of frequency buckets in the LFU block-cache variant.
pub const LFU_THRESHOLD: usize = 1000;
