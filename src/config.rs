//! Configuration for the emulator core.
//!
//! This module defines the configuration record that parameterizes a run. It provides:
//! 1. **Defaults:** Baseline constants (RAM size, cache capacity, TLB size, JIT threshold).
//! 2. **Structures:** Hierarchical config for extensions, block-cache behavior, and memory.
//! 3. **Validation:** `Config::validate` catches host-facing misconfiguration before a `Cpu`
//!    is built from it.
//!
//! Configuration is supplied as JSON (`serde_json`) or built directly with `Config::default()`.

use serde::Deserialize;

/// Default configuration constants.
///
/// Baseline values used when a field is not present in the supplied JSON.
mod defaults {
    /// Default guest RAM size (128 MiB), a multiple of the 64 KiB arena chunk size.
    pub const MEM_SIZE: u32 = 128 * 1024 * 1024;

    /// Default instruction TLB entry count (power of two).
    pub const ITLB_SIZE: usize = 256;

    /// Default data TLB entry count (power of two).
    pub const DTLB_SIZE: usize = 256;

    /// Default block-cache capacity (power of two).
    pub const BLOCK_CACHE_CAPACITY: usize = 8192;

    /// Default hot-block promotion threshold.
    pub const JIT_THRESHOLD: u32 = 1000;
}

/// Errors raised while validating a [`Config`] before it is used to build a `Cpu`.
///
/// Distinct from `common::error::Trap`: this is a host-facing configuration error, never a
/// guest-visible architectural fault.
#[derive(Debug)]
pub enum ConfigError {
    /// `memory.size` is not a positive multiple of the 64 KiB arena chunk size.
    MemSizeNotChunkAligned(u32),
    /// `block.capacity` (or a TLB size) is not a power of two.
    CapacityNotPowerOfTwo {
        /// Name of the offending field, for diagnostics.
        field: &'static str,
        /// The invalid value supplied.
        value: usize,
    },
    /// `zicsr` was disabled while the base ISA requires CSR access for trap handling in
    /// system mode.
    ZicsrRequiredInSystemMode,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MemSizeNotChunkAligned(size) => {
                write!(f, "memory.size {:#x} is not a multiple of the 64 KiB arena chunk size", size)
            }
            ConfigError::CapacityNotPowerOfTwo { field, value } => {
                write!(f, "{} = {} must be a power of two", field, value)
            }
            ConfigError::ZicsrRequiredInSystemMode => {
                write!(f, "extensions.zicsr cannot be disabled in system mode")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Selects which mode the emulator starts in: user-mode (ELF-style, no MMU) or system-mode
/// (privileged, bus-routed MMIO, Sv32 paging reachable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmulatorMode {
    /// No privileged state reachable; `ecall` goes to the host syscall shim.
    User,
    /// Full privileged subset (S-mode, M-mode); `ecall` raises an environment-call trap.
    System,
}

impl Default for EmulatorMode {
    fn default() -> Self {
        EmulatorMode::System
    }
}

/// ISA extension enable/disable switches.
///
/// A disabled extension's opcodes decode successfully (the encoding space is still
/// recognized) but raise `Trap::IllegalInstruction` at dispatch, matching the base I/M/A/F/C
/// always-on posture with bit-manipulation opt-in.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExtensionsConfig {
    /// M: integer multiply/divide.
    #[serde(default = "ExtensionsConfig::default_on")]
    pub m: bool,
    /// A: atomics (LR/SC, AMO).
    #[serde(default = "ExtensionsConfig::default_on")]
    pub a: bool,
    /// F: single-precision floating point.
    #[serde(default = "ExtensionsConfig::default_on")]
    pub f: bool,
    /// C: compressed 16-bit instructions.
    #[serde(default = "ExtensionsConfig::default_on")]
    pub c: bool,
    /// Zicsr: CSR instructions.
    #[serde(default = "ExtensionsConfig::default_on")]
    pub zicsr: bool,
    /// Zifencei: `fence.i`.
    #[serde(default = "ExtensionsConfig::default_on")]
    pub zifencei: bool,
    /// Zba: address-generation bit-manipulation.
    #[serde(default)]
    pub zba: bool,
    /// Zbb: basic bit-manipulation.
    #[serde(default)]
    pub zbb: bool,
    /// Zbc: carry-less multiply.
    #[serde(default)]
    pub zbc: bool,
    /// Zbs: single-bit bit-manipulation.
    #[serde(default)]
    pub zbs: bool,
}

impl ExtensionsConfig {
    fn default_on() -> bool {
        true
    }
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            m: true,
            a: true,
            f: true,
            c: true,
            zicsr: true,
            zifencei: true,
            zba: false,
            zbb: false,
            zbc: false,
            zbs: false,
        }
    }
}

/// Basic-block cache and optimizer behavior.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BlockConfig {
    /// Enable the block chainer (§4.5): direct-link statically known successors.
    #[serde(default = "BlockConfig::default_chaining")]
    pub chaining: bool,

    /// Enable macro-op fusion recognition in the builder (auipc+addi, lui+addi pairs).
    #[serde(default)]
    pub mop_fusion: bool,

    /// Select ARC (`true`) or LFU (`false`) block-cache replacement.
    #[serde(default = "BlockConfig::default_arc")]
    pub arc: bool,

    /// Block-cache slot capacity; must be a power of two.
    #[serde(default = "BlockConfig::default_capacity")]
    pub capacity: usize,

    /// Hot-block promotion threshold.
    #[serde(default = "BlockConfig::default_jit_threshold")]
    pub jit_threshold: u32,
}

impl BlockConfig {
    fn default_chaining() -> bool {
        true
    }

    fn default_arc() -> bool {
        true
    }

    fn default_capacity() -> usize {
        defaults::BLOCK_CACHE_CAPACITY
    }

    fn default_jit_threshold() -> u32 {
        defaults::JIT_THRESHOLD
    }
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            chaining: true,
            mop_fusion: false,
            arc: true,
            capacity: defaults::BLOCK_CACHE_CAPACITY,
            jit_threshold: defaults::JIT_THRESHOLD,
        }
    }
}

/// Guest memory and TLB sizing.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MemoryConfig {
    /// Guest RAM size in bytes; must be a multiple of the 64 KiB arena chunk size.
    #[serde(default = "MemoryConfig::default_size")]
    pub size: u32,

    /// Instruction TLB entry count; must be a power of two.
    #[serde(default = "MemoryConfig::default_itlb_size")]
    pub itlb_size: usize,

    /// Data TLB entry count; must be a power of two.
    #[serde(default = "MemoryConfig::default_dtlb_size")]
    pub dtlb_size: usize,
}

impl MemoryConfig {
    fn default_size() -> u32 {
        defaults::MEM_SIZE
    }

    fn default_itlb_size() -> usize {
        defaults::ITLB_SIZE
    }

    fn default_dtlb_size() -> usize {
        defaults::DTLB_SIZE
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            size: defaults::MEM_SIZE,
            itlb_size: defaults::ITLB_SIZE,
            dtlb_size: defaults::DTLB_SIZE,
        }
    }
}

/// Root configuration structure for the emulator core.
///
/// # Examples
///
/// ```
/// use rv32block_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.memory.size, 128 * 1024 * 1024);
/// assert!(config.extensions.m);
/// assert!(!config.extensions.zba);
/// ```
///
/// Deserializing from JSON:
///
/// ```
/// use rv32block_core::config::{Config, EmulatorMode};
///
/// let json = r#"{
///     "mode": "user",
///     "extensions": { "zba": true, "zbb": true },
///     "block": { "arc": false, "jit_threshold": 500 },
///     "memory": { "size": 67108864 }
/// }"#;
///
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.mode, EmulatorMode::User);
/// assert!(config.extensions.zba);
/// assert!(!config.block.arc);
/// assert_eq!(config.memory.size, 64 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// User-mode vs system-mode.
    #[serde(default)]
    pub mode: EmulatorMode,
    /// Extension enable switches.
    #[serde(default)]
    pub extensions: ExtensionsConfig,
    /// Block-cache and optimizer behavior.
    #[serde(default)]
    pub block: BlockConfig,
    /// Guest memory and TLB sizing.
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: EmulatorMode::default(),
            extensions: ExtensionsConfig::default(),
            block: BlockConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

/// 64 KiB, matching the memory arena's chunk size (`common::constants::ARENA_CHUNK_SIZE`).
const ARENA_CHUNK_SIZE: u32 = 65_536;

impl Config {
    /// Validates cross-field invariants that `serde` alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.size == 0 || self.memory.size % ARENA_CHUNK_SIZE != 0 {
            return Err(ConfigError::MemSizeNotChunkAligned(self.memory.size));
        }
        if !self.block.capacity.is_power_of_two() {
            return Err(ConfigError::CapacityNotPowerOfTwo {
                field: "block.capacity",
                value: self.block.capacity,
            });
        }
        if !self.memory.itlb_size.is_power_of_two() {
            return Err(ConfigError::CapacityNotPowerOfTwo {
                field: "memory.itlb_size",
                value: self.memory.itlb_size,
            });
        }
        if !self.memory.dtlb_size.is_power_of_two() {
            return Err(ConfigError::CapacityNotPowerOfTwo {
                field: "memory.dtlb_size",
                value: self.memory.dtlb_size,
            });
        }
        if self.mode == EmulatorMode::System && !self.extensions.zicsr {
            return Err(ConfigError::ZicsrRequiredInSystemMode);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn misaligned_mem_size_rejected() {
        let mut config = Config::default();
        config.memory.size = 100;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MemSizeNotChunkAligned(100))
        ));
    }

    #[test]
    fn non_power_of_two_capacity_rejected() {
        let mut config = Config::default();
        config.block.capacity = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn system_mode_requires_zicsr() {
        let mut config = Config::default();
        config.mode = EmulatorMode::System;
        config.extensions.zicsr = false;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZicsrRequiredInSystemMode)
        ));
    }
}
