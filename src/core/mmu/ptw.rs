//! Sv32 hardware page table walker.
//!
//! Sv32 is a two-level scheme: a virtual address splits into VPN\[1\] (bits 31:22), VPN\[0\]
//! (bits 21:12), and a 12-bit page offset. Each level's page table is one 4 KiB page of 1024
//! four-byte PTEs.

use crate::common::error::Trap;
use crate::common::{AccessType, VirtAddr};
use crate::core::arch::csr::Csrs;
use crate::core::arch::mode::PrivilegeMode;
use crate::soc::bus::Bus;

const PTE_V: u32 = 1;
const PTE_R: u32 = 1 << 1;
const PTE_W: u32 = 1 << 2;
const PTE_X: u32 = 1 << 3;
const PTE_U: u32 = 1 << 4;
const PTE_A: u32 = 1 << 6;
const PTE_D: u32 = 1 << 7;
const PTE_PPN_SHIFT: u32 = 10;
const PPN_MASK: u32 = 0x3FFFFF;

const VPN_BITS: u32 = 10;
const VPN_MASK: u32 = (1 << VPN_BITS) - 1;
const PAGE_SHIFT: u32 = 12;
const PTE_SIZE: u32 = 4;

/// A resolved Sv32 translation, the data a TLB entry is built from.
pub struct Translation {
    pub phys: u32,
    /// 1 for a level-1 (4 MiB) superpage leaf, 0 for a level-0 (4 KiB) page.
    pub level: u8,
    pub r: bool,
    pub w: bool,
    pub x: bool,
    pub u: bool,
    pub dirty: bool,
    pub pte_addr: u32,
}

fn page_fault(access: AccessType, vaddr: u32) -> Trap {
    match access {
        AccessType::Fetch => Trap::InstructionPageFault(vaddr),
        AccessType::Read => Trap::LoadPageFault(vaddr),
        AccessType::Write => Trap::StorePageFault(vaddr),
    }
}

fn check_permissions(
    pte: u32,
    access: AccessType,
    privilege: PrivilegeMode,
    csrs: &Csrs,
) -> bool {
    let can_read = pte & PTE_R != 0;
    let can_write = pte & PTE_W != 0;
    let can_exec = pte & PTE_X != 0;
    let is_user = pte & PTE_U != 0;

    match access {
        AccessType::Write if !can_write => return false,
        AccessType::Fetch if !can_exec => return false,
        AccessType::Read if !(can_read || (can_exec && csrs.mxr())) => return false,
        _ => {}
    }

    if privilege == PrivilegeMode::User && !is_user {
        return false;
    }
    if privilege == PrivilegeMode::Supervisor && is_user {
        if !csrs.sum() {
            return false;
        }
        if access == AccessType::Fetch {
            return false;
        }
    }
    true
}

/// Walks the two-level Sv32 page table for `vaddr`, applying permission checks for `access`
/// under `privilege`, and writing back A/D bit updates to guest memory via `bus`.
pub fn walk(
    bus: &mut Bus,
    csrs: &Csrs,
    vaddr: VirtAddr,
    access: AccessType,
    privilege: PrivilegeMode,
) -> Result<Translation, Trap> {
    let va = vaddr.val();
    let mut ppn = csrs.satp_ppn();

    let vpn = [(va >> 12) & VPN_MASK, (va >> 22) & VPN_MASK];

    for level in (0..2).rev() {
        let pte_addr = (ppn << PAGE_SHIFT) + vpn[level] * PTE_SIZE;
        let pte = bus.read_u32(pte_addr);

        if pte & PTE_V == 0 || (pte & PTE_W != 0 && pte & PTE_R == 0) {
            return Err(page_fault(access, va));
        }

        let is_leaf = pte & (PTE_R | PTE_X) != 0;
        if !is_leaf {
            if level == 0 {
                return Err(page_fault(access, va));
            }
            ppn = (pte >> PTE_PPN_SHIFT) & PPN_MASK;
            continue;
        }

        let pte_ppn = (pte >> PTE_PPN_SHIFT) & PPN_MASK;
        if level == 1 && (pte_ppn & VPN_MASK) != 0 {
            return Err(page_fault(access, va));
        }

        if !check_permissions(pte, access, privilege, csrs) {
            return Err(page_fault(access, va));
        }

        let mut new_pte = pte | PTE_A;
        if access == AccessType::Write {
            new_pte |= PTE_D;
        }
        if new_pte != pte {
            bus.write_u32(pte_addr, new_pte);
        }

        let offset = va & ((1 << (PAGE_SHIFT + level as u32 * VPN_BITS)) - 1);
        let phys = (pte_ppn << PAGE_SHIFT) | offset;

        return Ok(Translation {
            phys,
            level: level as u8,
            r: pte & PTE_R != 0,
            w: pte & PTE_W != 0,
            x: pte & PTE_X != 0,
            u: pte & PTE_U != 0,
            dirty: new_pte & PTE_D != 0,
            pte_addr,
        });
    }

    Err(page_fault(access, va))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::bus::Bus;

    fn identity_map(bus: &mut Bus) {
        // Root table at physical page 0; a single level-0 leaf at VPN[1]=0 pointing at
        // physical page 1, itself identity-mapped through VPN[0]=0.
        let leaf_table_ppn = 1u32;
        bus.write_u32(0, (leaf_table_ppn << PTE_PPN_SHIFT) | PTE_V);
        let data_ppn = 2u32;
        let leaf_pte = (data_ppn << PTE_PPN_SHIFT) | PTE_V | PTE_R | PTE_W | PTE_X | PTE_U;
        bus.write_u32(leaf_table_ppn * 4096, leaf_pte);
    }

    #[test]
    fn two_level_walk_resolves_leaf() {
        let mut bus = Bus::new_with_ram(64 * 1024);
        identity_map(&mut bus);
        let csrs = Csrs::new();
        let t = walk(
            &mut bus,
            &csrs,
            VirtAddr::new(0),
            AccessType::Read,
            PrivilegeMode::User,
        )
        .unwrap();
        assert_eq!(t.phys, 2 << PAGE_SHIFT);
        assert_eq!(t.level, 0);
    }

    #[test]
    fn invalid_root_pte_faults() {
        let mut bus = Bus::new_with_ram(64 * 1024);
        let csrs = Csrs::new();
        let err = walk(
            &mut bus,
            &csrs,
            VirtAddr::new(0),
            AccessType::Read,
            PrivilegeMode::User,
        )
        .unwrap_err();
        assert!(matches!(err, Trap::LoadPageFault(_)));
    }

    #[test]
    fn user_mode_denied_non_user_page_faults() {
        let mut bus = Bus::new_with_ram(64 * 1024);
        let leaf_table_ppn = 1u32;
        bus.write_u32(0, (leaf_table_ppn << PTE_PPN_SHIFT) | PTE_V);
        let data_ppn = 2u32;
        let leaf_pte = (data_ppn << PTE_PPN_SHIFT) | PTE_V | PTE_R;
        bus.write_u32(leaf_table_ppn * 4096, leaf_pte);
        let csrs = Csrs::new();
        let err = walk(
            &mut bus,
            &csrs,
            VirtAddr::new(0),
            AccessType::Read,
            PrivilegeMode::User,
        )
        .unwrap_err();
        assert!(matches!(err, Trap::LoadPageFault(_)));
    }
}
