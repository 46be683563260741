//! Sv32 memory management unit.
//!
//! Pairs a two-level page-table walker ([`ptw`]) with direct-mapped instruction and data TLBs
//! ([`tlb`]). Translation is a pure function of guest virtual address, access kind, and privilege
//! mode; A/D bit maintenance is written back to guest memory through the bus on a walk, and
//! mirrored into the TLB entry so a later write hit need not re-walk to set D.

use tracing::trace;

use crate::common::error::Trap;
use crate::common::{AccessType, VirtAddr};
use crate::core::arch::csr::Csrs;
use crate::core::arch::mode::PrivilegeMode;
use crate::soc::bus::Bus;

pub mod ptw;
pub mod tlb;

use tlb::Tlb;

const TLB_ENTRIES: usize = 256;

/// Sv32 translation unit: instruction and data TLBs plus the page-table walker.
pub struct Mmu {
    itlb: Tlb,
    dtlb: Tlb,
}

impl Mmu {
    pub fn new() -> Self {
        Self::with_sizes(TLB_ENTRIES, TLB_ENTRIES)
    }

    /// Builds an MMU with explicitly sized instruction and data TLBs, as configured by
    /// [`crate::config::MemoryConfig`]. Each size is rounded up to a power of two by [`Tlb::new`].
    pub fn with_sizes(itlb_size: usize, dtlb_size: usize) -> Self {
        Self {
            itlb: Tlb::new(itlb_size),
            dtlb: Tlb::new(dtlb_size),
        }
    }

    fn tlb_for(&mut self, access: AccessType) -> &mut Tlb {
        if access == AccessType::Fetch {
            &mut self.itlb
        } else {
            &mut self.dtlb
        }
    }

    /// Translates `vaddr` to a guest-physical address, walking the page table on a TLB miss and
    /// bypassing translation entirely when `satp` selects bare mode.
    pub fn translate(
        &mut self,
        bus: &mut Bus,
        csrs: &Csrs,
        vaddr: VirtAddr,
        access: AccessType,
        privilege: PrivilegeMode,
    ) -> Result<u32, Trap> {
        if !csrs.paging_enabled() || privilege == PrivilegeMode::Machine {
            return Ok(vaddr.val());
        }

        let vpn = vaddr.vpn();
        if let Some((ppn, r, w, x, u, level, dirty, pte_addr)) =
            self.tlb_for(access).lookup(vpn)
        {
            if !permitted(access, privilege, r, w, x, u, csrs) {
                return Err(page_fault(access, vaddr.val()));
            }
            if access == AccessType::Write && !dirty {
                bus.write_u32(pte_addr, bus.read_u32(pte_addr) | (1 << 7));
                self.tlb_for(access).mark_dirty(vpn);
            }
            let page_shift = 12 + (level as u32) * 10;
            let offset = vaddr.val() & ((1 << page_shift) - 1);
            return Ok((ppn << 12) | offset);
        }

        let t = ptw::walk(bus, csrs, vaddr, access, privilege)?;
        trace!(vpn, phys = t.phys, level = t.level, "sv32 page walk");
        let ppn = t.phys >> (12 + (t.level as u32) * 10);
        self.tlb_for(access)
            .insert(vpn, ppn, t.r, t.w, t.x, t.u, t.level, t.dirty, t.pte_addr);
        Ok(t.phys)
    }

    /// Flushes both TLBs entirely: `satp` write, or `sfence.vma` with `rs1 == x0`.
    pub fn flush_all(&mut self) {
        self.itlb.flush_all();
        self.dtlb.flush_all();
    }

    /// Flushes the entry for one virtual address: `sfence.vma` with a nonzero `rs1`.
    pub fn flush_vaddr(&mut self, vaddr: VirtAddr) {
        let vpn = vaddr.vpn();
        self.itlb.flush_vpn(vpn);
        self.dtlb.flush_vpn(vpn);
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::too_many_arguments)]
fn permitted(
    access: AccessType,
    privilege: PrivilegeMode,
    r: bool,
    w: bool,
    x: bool,
    u: bool,
    csrs: &Csrs,
) -> bool {
    let kind_ok = match access {
        AccessType::Write => w,
        AccessType::Fetch => x,
        AccessType::Read => r || (x && csrs.mxr()),
    };
    if !kind_ok {
        return false;
    }
    if privilege == PrivilegeMode::User && !u {
        return false;
    }
    if privilege == PrivilegeMode::Supervisor && u {
        if !csrs.sum() {
            return false;
        }
        if access == AccessType::Fetch {
            return false;
        }
    }
    true
}

fn page_fault(access: AccessType, vaddr: u32) -> Trap {
    match access {
        AccessType::Fetch => Trap::InstructionPageFault(vaddr),
        AccessType::Read => Trap::LoadPageFault(vaddr),
        AccessType::Write => Trap::StorePageFault(vaddr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_mode_is_identity() {
        let mut mmu = Mmu::new();
        let mut bus = Bus::new_with_ram(64 * 1024);
        let csrs = Csrs::new();
        let pa = mmu
            .translate(
                &mut bus,
                &csrs,
                VirtAddr::new(0x2000),
                AccessType::Read,
                PrivilegeMode::Machine,
            )
            .unwrap();
        assert_eq!(pa, 0x2000);
    }

    #[test]
    fn tlb_caches_successful_walk() {
        let mut mmu = Mmu::new();
        let mut bus = Bus::new_with_ram(64 * 1024);
        let mut csrs = Csrs::new();
        // Identity-map VA 0 -> PA 0x2000 via a single level-0 leaf.
        bus.write_u32(0, (1u32 << 10) | 1); // root PTE -> table at ppn=1
        bus.write_u32(4096, (2u32 << 10) | 0b1111_1); // leaf: V|R|W|X|U, ppn=2
        csrs.write(crate::core::arch::csr::SATP, 1 << 31);

        let pa1 = mmu
            .translate(&mut bus, &csrs, VirtAddr::new(0), AccessType::Read, PrivilegeMode::User)
            .unwrap();
        assert_eq!(pa1, 2 << 12);
        assert!(mmu.dtlb.lookup(0).is_some());
        let pa2 = mmu
            .translate(&mut bus, &csrs, VirtAddr::new(0), AccessType::Read, PrivilegeMode::User)
            .unwrap();
        assert_eq!(pa2, pa1);
    }

    #[test]
    fn flush_all_clears_tlb_state() {
        let mut mmu = Mmu::new();
        mmu.itlb.insert(1, 1, true, true, true, true, 0, false, 0);
        mmu.flush_all();
        assert!(mmu.itlb.lookup(1).is_none());
    }
}
