//! Trap definitions.
//!
//! The architectural fault taxonomy of the emulator (§7 of the design). A `Trap` is
//! guest-visible state, never a host panic: every fallible operation in decode, block build,
//! translation, and execution returns `Result<_, Trap>`, and the dispatch loop converts a
//! `Trap` into a privilege-mode-appropriate CSR update and PC redirect.

use std::fmt;

/// RISC-V trap types: synchronous exceptions and asynchronous interrupts.
///
/// Address-carrying variants hold a 32-bit guest virtual (or, for `AccessFault`, physical)
/// address — RV32 has no wider address form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trap {
    /// Instruction address misaligned; PC is not aligned to the required instruction size.
    InstructionAddressMisaligned(u32),
    /// Instruction fetch violated memory protection or targeted invalid memory.
    InstructionAccessFault(u32),
    /// Instruction encoding not recognized, or recognized but its extension is disabled.
    IllegalInstruction(u32),
    /// `ebreak` or a hardware breakpoint; value is the triggering PC.
    Breakpoint(u32),
    /// Load address not naturally aligned.
    LoadAddressMisaligned(u32),
    /// Load violated memory protection or targeted invalid memory.
    LoadAccessFault(u32),
    /// Store/AMO address not naturally aligned.
    StoreAddressMisaligned(u32),
    /// Store/AMO violated memory protection or targeted invalid memory.
    StoreAccessFault(u32),
    /// `ecall` from user mode.
    EnvironmentCallFromUMode,
    /// `ecall` from supervisor mode.
    EnvironmentCallFromSMode,
    /// `ecall` from machine mode.
    EnvironmentCallFromMMode,
    /// Instruction fetch caused an Sv32 page fault; value is the faulting virtual address.
    InstructionPageFault(u32),
    /// Load caused an Sv32 page fault; value is the faulting virtual address.
    LoadPageFault(u32),
    /// Store/AMO caused an Sv32 page fault; value is the faulting virtual address.
    StorePageFault(u32),
    /// A physical address was neither backed by RAM nor claimed by any MMIO device.
    AccessFault(u32),
    /// User software interrupt.
    UserSoftwareInterrupt,
    /// Supervisor software interrupt.
    SupervisorSoftwareInterrupt,
    /// Machine software interrupt.
    MachineSoftwareInterrupt,
    /// Machine timer interrupt.
    MachineTimerInterrupt,
    /// Supervisor timer interrupt.
    SupervisorTimerInterrupt,
    /// Machine external interrupt.
    MachineExternalInterrupt,
    /// Supervisor external interrupt.
    SupervisorExternalInterrupt,
    /// User external interrupt.
    UserExternalInterrupt,
}

impl Trap {
    /// Returns the standard RISC-V `mcause`/`scause` exception or interrupt code.
    ///
    /// For interrupts this is the code without the interrupt bit set; callers OR in
    /// [`crate::common::constants::CAUSE_INTERRUPT_BIT`] themselves, since that bit's placement
    /// depends on which CSR (`mcause` vs `scause`) receives the value.
    pub fn cause(&self) -> u32 {
        use crate::isa::privileged::cause::{exception, interrupt};
        match self {
            Trap::InstructionAddressMisaligned(_) => exception::INSTRUCTION_ADDRESS_MISALIGNED,
            Trap::InstructionAccessFault(_) => exception::INSTRUCTION_ACCESS_FAULT,
            Trap::IllegalInstruction(_) => exception::ILLEGAL_INSTRUCTION,
            Trap::Breakpoint(_) => exception::BREAKPOINT,
            Trap::LoadAddressMisaligned(_) => exception::LOAD_ADDRESS_MISALIGNED,
            Trap::LoadAccessFault(_) => exception::LOAD_ACCESS_FAULT,
            Trap::StoreAddressMisaligned(_) => exception::STORE_ADDRESS_MISALIGNED,
            Trap::StoreAccessFault(_) => exception::STORE_ACCESS_FAULT,
            Trap::EnvironmentCallFromUMode => exception::ENVIRONMENT_CALL_FROM_U_MODE,
            Trap::EnvironmentCallFromSMode => exception::ENVIRONMENT_CALL_FROM_S_MODE,
            Trap::EnvironmentCallFromMMode => exception::ENVIRONMENT_CALL_FROM_M_MODE,
            Trap::InstructionPageFault(_) => exception::INSTRUCTION_PAGE_FAULT,
            Trap::LoadPageFault(_) => exception::LOAD_PAGE_FAULT,
            Trap::StorePageFault(_) => exception::STORE_PAGE_FAULT,
            Trap::AccessFault(_) => exception::HARDWARE_ERROR,
            Trap::UserSoftwareInterrupt => interrupt::USER_SOFTWARE,
            Trap::SupervisorSoftwareInterrupt => interrupt::SUPERVISOR_SOFTWARE,
            Trap::MachineSoftwareInterrupt => interrupt::MACHINE_SOFTWARE,
            Trap::MachineTimerInterrupt => interrupt::MACHINE_TIMER,
            Trap::SupervisorTimerInterrupt => interrupt::SUPERVISOR_TIMER,
            Trap::MachineExternalInterrupt => interrupt::MACHINE_EXTERNAL,
            Trap::SupervisorExternalInterrupt => interrupt::SUPERVISOR_EXTERNAL,
            Trap::UserExternalInterrupt => interrupt::USER_EXTERNAL,
        }
    }

    /// True for asynchronous interrupts, false for synchronous exceptions.
    pub fn is_interrupt(&self) -> bool {
        matches!(
            self,
            Trap::UserSoftwareInterrupt
                | Trap::SupervisorSoftwareInterrupt
                | Trap::MachineSoftwareInterrupt
                | Trap::MachineTimerInterrupt
                | Trap::SupervisorTimerInterrupt
                | Trap::MachineExternalInterrupt
                | Trap::SupervisorExternalInterrupt
                | Trap::UserExternalInterrupt
        )
    }

    /// The faulting address carried by this trap, if any (`*tval`'s value for address-bearing
    /// traps; `0` for traps with no natural address, matching the RISC-V privileged spec's
    /// "0 if unimplemented/not applicable" convention).
    pub fn tval(&self) -> u32 {
        match self {
            Trap::InstructionAddressMisaligned(a)
            | Trap::InstructionAccessFault(a)
            | Trap::Breakpoint(a)
            | Trap::LoadAddressMisaligned(a)
            | Trap::LoadAccessFault(a)
            | Trap::StoreAddressMisaligned(a)
            | Trap::StoreAccessFault(a)
            | Trap::InstructionPageFault(a)
            | Trap::LoadPageFault(a)
            | Trap::StorePageFault(a)
            | Trap::AccessFault(a) => *a,
            Trap::IllegalInstruction(insn) => *insn,
            _ => 0,
        }
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trap::InstructionAddressMisaligned(addr) => {
                write!(f, "InstructionAddressMisaligned({:#x})", addr)
            }
            Trap::InstructionAccessFault(addr) => write!(f, "InstructionAccessFault({:#x})", addr),
            Trap::IllegalInstruction(inst) => write!(f, "IllegalInstruction({:#x})", inst),
            Trap::Breakpoint(pc) => write!(f, "Breakpoint({:#x})", pc),
            Trap::LoadAddressMisaligned(addr) => write!(f, "LoadAddressMisaligned({:#x})", addr),
            Trap::LoadAccessFault(addr) => write!(f, "LoadAccessFault({:#x})", addr),
            Trap::StoreAddressMisaligned(addr) => {
                write!(f, "StoreAddressMisaligned({:#x})", addr)
            }
            Trap::StoreAccessFault(addr) => write!(f, "StoreAccessFault({:#x})", addr),
            Trap::EnvironmentCallFromUMode => write!(f, "EnvironmentCallFromUMode"),
            Trap::EnvironmentCallFromSMode => write!(f, "EnvironmentCallFromSMode"),
            Trap::EnvironmentCallFromMMode => write!(f, "EnvironmentCallFromMMode"),
            Trap::InstructionPageFault(addr) => write!(f, "InstructionPageFault({:#x})", addr),
            Trap::LoadPageFault(addr) => write!(f, "LoadPageFault({:#x})", addr),
            Trap::StorePageFault(addr) => write!(f, "StorePageFault({:#x})", addr),
            Trap::AccessFault(addr) => write!(f, "AccessFault({:#x})", addr),
            Trap::UserSoftwareInterrupt => write!(f, "UserSoftwareInterrupt"),
            Trap::SupervisorSoftwareInterrupt => write!(f, "SupervisorSoftwareInterrupt"),
            Trap::MachineSoftwareInterrupt => write!(f, "MachineSoftwareInterrupt"),
            Trap::MachineTimerInterrupt => write!(f, "MachineTimerInterrupt"),
            Trap::SupervisorTimerInterrupt => write!(f, "SupervisorTimerInterrupt"),
            Trap::MachineExternalInterrupt => write!(f, "MachineExternalInterrupt"),
            Trap::SupervisorExternalInterrupt => write!(f, "SupervisorExternalInterrupt"),
            Trap::UserExternalInterrupt => write!(f, "UserExternalInterrupt"),
        }
    }
}

impl std::error::Error for Trap {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_classification() {
        assert!(Trap::MachineTimerInterrupt.is_interrupt());
        assert!(!Trap::IllegalInstruction(0).is_interrupt());
    }

    #[test]
    fn tval_carries_faulting_address() {
        assert_eq!(Trap::LoadPageFault(0x1000).tval(), 0x1000);
        assert_eq!(Trap::EnvironmentCallFromUMode.tval(), 0);
    }
}
