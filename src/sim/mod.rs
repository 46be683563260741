//! Top-level simulation loop: owns a [`Cpu`](crate::core::cpu::Cpu) and drives it block by block.

pub mod simulator;
