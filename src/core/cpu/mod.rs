//! CPU architectural state.
//!
//! `Cpu` is everything the opcode handlers in [`super::exec`] and the dispatch loop in
//! [`crate::sim::simulator`] touch: register files, CSRs, the Sv32 MMU, the physical bus, the
//! block cache, and the handful of scalar fields (privilege, LR/SC reservation, exit code) that
//! don't belong to any of those subsystems individually.

use crate::common::reg::RegisterFile;
use crate::config::{Config, EmulatorMode, ExtensionsConfig};
use crate::core::arch::csr::Csrs;
use crate::core::arch::mode::PrivilegeMode;
use crate::core::block::cache::BlockCache;
use crate::core::mmu::Mmu;
use crate::soc::bus::Bus;
use crate::stats::SimStats;

/// The host syscall shim seam: in user mode, an `ecall` other than the built-in `exit` is
/// forwarded here instead of trapping. The host implements a concrete shim (Linux syscall
/// emulation, a test harness, ...) against this trait; this crate ships none beyond what its own
/// tests need.
pub trait HostShim: Send {
    /// Services one `ecall`: inspect/mutate `a0..a7` (and any other register) through `regs`,
    /// leaving the return value wherever the host's calling convention expects it.
    fn handle(&mut self, regs: &mut RegisterFile);
}

/// A hart's full architectural and microarchitectural state.
pub struct Cpu {
    /// Integer and floating-point register files.
    pub regs: RegisterFile,
    /// Control and status registers.
    pub csrs: Csrs,
    /// Current privilege level (User/Supervisor/Machine).
    pub privilege: PrivilegeMode,
    /// Architectural program counter of the next instruction to dispatch.
    pub pc: u32,
    /// Sv32 translation unit (instruction/data TLBs plus the page-table walker).
    pub mmu: Mmu,
    /// Physical address bus: guest RAM plus any registered MMIO devices.
    pub bus: Bus,
    /// Basic-block cache (build/fold/chain pipeline).
    pub block_cache: BlockCache,
    /// Physical address of an outstanding `lr.w` reservation, if any. Single-hart model: only
    /// this hart's own stores can invalidate it.
    pub load_reservation: Option<u32>,
    /// ISA extension enable switches, checked at dispatch (decode itself is extension-unaware).
    pub extensions: ExtensionsConfig,
    /// User-mode vs system-mode; governs `ecall` dispatch and whether privileged state is
    /// reachable at all.
    pub mode: EmulatorMode,
    /// Enables the block chainer; read by the dispatch loop, not by `exec`.
    pub chaining: bool,
    /// Enables the builder's macro-op fusion peephole.
    pub mop_fusion: bool,
    /// User-mode host syscall shim, taken and restored around each non-`exit` `ecall`.
    pub shim: Option<Box<dyn HostShim>>,
    /// Set by the user-mode `exit` syscall; once `Some`, the dispatch loop stops.
    pub exit_code: Option<u32>,
    /// Execution statistics (block cache, TLB, trap counters).
    pub stats: SimStats,
}

impl Cpu {
    /// Builds a hart in its architectural reset state: Machine-mode privilege, bare (no Sv32)
    /// translation, every register zeroed.
    pub fn new(config: &Config) -> Self {
        Self {
            regs: RegisterFile::new(),
            csrs: Csrs::new(),
            privilege: PrivilegeMode::Machine,
            pc: 0,
            mmu: Mmu::with_sizes(config.memory.itlb_size, config.memory.dtlb_size),
            bus: Bus::new_with_ram(config.memory.size),
            block_cache: BlockCache::new(config.block.capacity, config.block.arc, config.block.jit_threshold),
            load_reservation: None,
            extensions: config.extensions,
            mode: config.mode,
            chaining: config.block.chaining,
            mop_fusion: config.block.mop_fusion,
            shim: None,
            exit_code: None,
            stats: SimStats::default(),
        }
    }

    /// Redirects control flow into the trap handler at `faulting_pc`'s privilege level: records
    /// cause/tval/epc, delegates to Supervisor mode when `medeleg`/`mideleg` names this cause and
    /// the hart isn't already above Supervisor, and returns the vectored handler PC from
    /// `mtvec`/`stvec`. `faulting_pc` is the architectural PC of the instruction that trapped —
    /// this implementation never auto-advances past a fault.
    pub fn raise_trap(&mut self, trap: crate::common::error::Trap, faulting_pc: u32) -> u32 {
        use crate::core::arch::csr::{
            MSTATUS_MIE, MSTATUS_MPIE, MSTATUS_MPP, MSTATUS_MPP_SHIFT, MSTATUS_SIE, MSTATUS_SPIE,
            MSTATUS_SPP,
        };

        self.stats.traps_taken += 1;

        let cause = trap.cause();
        let is_interrupt = trap.is_interrupt();
        let code = cause & !crate::common::constants::CAUSE_INTERRUPT_BIT;
        let deleg = if is_interrupt { self.csrs.mideleg } else { self.csrs.medeleg };
        let delegate_to_s = self.privilege <= PrivilegeMode::Supervisor && (deleg >> code) & 1 == 1;

        self.load_reservation = None;

        if delegate_to_s {
            self.csrs.scause = cause;
            self.csrs.sepc = faulting_pc;
            self.csrs.stval = trap.tval();

            let sie = self.csrs.mstatus & MSTATUS_SIE != 0;
            self.csrs.mstatus = (self.csrs.mstatus & !MSTATUS_SPIE) | if sie { MSTATUS_SPIE } else { 0 };
            self.csrs.mstatus &= !MSTATUS_SIE;
            self.csrs.mstatus = (self.csrs.mstatus & !MSTATUS_SPP)
                | if self.privilege == PrivilegeMode::Supervisor { MSTATUS_SPP } else { 0 };

            self.privilege = PrivilegeMode::Supervisor;
            vector(self.csrs.stvec, is_interrupt, code)
        } else {
            self.csrs.mcause = cause;
            self.csrs.mepc = faulting_pc;
            self.csrs.mtval = trap.tval();

            let mie = self.csrs.mstatus & MSTATUS_MIE != 0;
            self.csrs.mstatus = (self.csrs.mstatus & !MSTATUS_MPIE) | if mie { MSTATUS_MPIE } else { 0 };
            self.csrs.mstatus &= !MSTATUS_MIE;
            self.csrs.mstatus =
                (self.csrs.mstatus & !MSTATUS_MPP) | ((self.privilege.to_u8() as u32) << MSTATUS_MPP_SHIFT);

            self.privilege = PrivilegeMode::Machine;
            vector(self.csrs.mtvec, is_interrupt, code)
        }
    }

    /// Returns the highest-priority pending-and-enabled interrupt, if any, in the standard
    /// MEI/MSI/MTI/SEI/SSI/STI/UEI/USI priority order. Checked once per dispatched block rather
    /// than per instruction, matching this interpreter's basic-block granularity.
    pub fn pending_interrupt(&self) -> Option<crate::common::error::Trap> {
        use crate::core::arch::csr::{
            MIE_MEIP, MIE_MSIP, MIE_MTIE, MIE_SEIP, MIE_SSIP, MIE_STIE, MIE_UEIP, MIE_USIP,
            MSTATUS_MIE, MSTATUS_SIE,
        };
        use crate::core::arch::trap::TrapHandler;

        let pending = self.csrs.mip & self.csrs.mie;
        if pending == 0 {
            return None;
        }

        const PRIORITY: [u32; 8] =
            [MIE_MEIP, MIE_MSIP, MIE_MTIE, MIE_SEIP, MIE_SSIP, MIE_STIE, MIE_UEIP, MIE_USIP];

        for bit in PRIORITY {
            if pending & bit == 0 {
                continue;
            }
            let delegated = self.csrs.mideleg & bit != 0;
            let globally_enabled = if delegated {
                match self.privilege {
                    PrivilegeMode::Machine => false,
                    PrivilegeMode::Supervisor => self.csrs.mstatus & MSTATUS_SIE != 0,
                    PrivilegeMode::User => true,
                }
            } else {
                self.privilege != PrivilegeMode::Machine || self.csrs.mstatus & MSTATUS_MIE != 0
            };
            if globally_enabled {
                return TrapHandler::irq_to_trap(bit);
            }
        }
        None
    }
}

/// Resolves a `{m,s}tvec` value to the concrete handler PC for one trap: direct mode (`mode ==
/// 0`) always targets `base`; vectored mode (`mode == 1`) targets `base + 4 * code` for
/// interrupts and `base` for synchronous exceptions.
fn vector(tvec: u32, is_interrupt: bool, code: u32) -> u32 {
    let base = tvec & !0b11;
    let vectored = tvec & 0b11 == 1;
    if vectored && is_interrupt {
        base.wrapping_add(4 * code)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::Trap;
    use crate::core::arch::csr::{MCAUSE, MEDELEG, MEPC, MTVEC, SCAUSE, SEPC, STVEC};

    #[test]
    fn new_cpu_resets_to_machine_mode() {
        let cpu = Cpu::new(&Config::default());
        assert_eq!(cpu.privilege, PrivilegeMode::Machine);
        assert_eq!(cpu.pc, 0);
        assert!(cpu.exit_code.is_none());
    }

    #[test]
    fn undelegated_trap_stays_in_machine_mode() {
        let mut cpu = Cpu::new(&Config::default());
        cpu.csrs.write(MTVEC, 0x8000_0000);
        let target = cpu.raise_trap(Trap::IllegalInstruction(0x100), 0x100);
        assert_eq!(target, 0x8000_0000);
        assert_eq!(cpu.privilege, PrivilegeMode::Machine);
        assert_eq!(cpu.csrs.read(MCAUSE), Some(2));
        assert_eq!(cpu.csrs.read(MEPC), Some(0x100));
    }

    #[test]
    fn delegated_trap_switches_to_supervisor_mode() {
        let mut cpu = Cpu::new(&Config::default());
        cpu.privilege = PrivilegeMode::User;
        cpu.csrs.write(STVEC, 0x8000_1000);
        cpu.csrs.write(MEDELEG, 1 << 2); // delegate illegal-instruction
        let target = cpu.raise_trap(Trap::IllegalInstruction(0x200), 0x200);
        assert_eq!(target, 0x8000_1000);
        assert_eq!(cpu.privilege, PrivilegeMode::Supervisor);
        assert_eq!(cpu.csrs.read(SCAUSE), Some(2));
        assert_eq!(cpu.csrs.read(SEPC), Some(0x200));
    }

    #[test]
    fn vectored_interrupt_targets_base_plus_four_times_code() {
        let mut cpu = Cpu::new(&Config::default());
        cpu.csrs.write(MTVEC, 0x8000_0000 | 1);
        let target = cpu.raise_trap(Trap::MachineTimerInterrupt, 0);
        assert_eq!(target, 0x8000_0000 + 4 * 7);
    }

    #[test]
    fn trap_clears_outstanding_reservation() {
        let mut cpu = Cpu::new(&Config::default());
        cpu.load_reservation = Some(0x1000);
        cpu.raise_trap(Trap::Breakpoint(0), 0);
        assert!(cpu.load_reservation.is_none());
    }

    #[test]
    fn pending_interrupt_is_none_when_mie_disabled() {
        use crate::core::arch::csr::{MIE, MIP, MIE_MTIE};
        let mut cpu = Cpu::new(&Config::default());
        cpu.csrs.write(MIE, MIE_MTIE);
        cpu.csrs.write(MIP, MIE_MTIE);
        assert!(cpu.pending_interrupt().is_none());
    }

    #[test]
    fn pending_interrupt_fires_once_machine_globally_enabled() {
        use crate::core::arch::csr::{MIE, MIP, MSTATUS, MIE_MTIE, MSTATUS_MIE};
        let mut cpu = Cpu::new(&Config::default());
        cpu.csrs.write(MIE, MIE_MTIE);
        cpu.csrs.write(MIP, MIE_MTIE);
        cpu.csrs.write(MSTATUS, MSTATUS_MIE);
        assert_eq!(cpu.pending_interrupt(), Some(Trap::MachineTimerInterrupt));
    }

    #[test]
    fn delegated_interrupt_is_visible_from_user_mode_regardless_of_sie() {
        use crate::core::arch::csr::{MIDELEG, MIE, MIP, MIE_STIE};
        let mut cpu = Cpu::new(&Config::default());
        cpu.privilege = PrivilegeMode::User;
        cpu.csrs.write(MIDELEG, MIE_STIE);
        cpu.csrs.write(MIE, MIE_STIE);
        cpu.csrs.write(MIP, MIE_STIE);
        assert_eq!(cpu.pending_interrupt(), Some(Trap::SupervisorTimerInterrupt));
    }
}
