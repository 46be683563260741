//! Direct-mapped translation lookaside buffer.
//!
//! Unlike a fully-associative cache, a direct-mapped TLB indexes by the low bits of the virtual
//! page number and tags the full VPN, trading a lower hit rate for O(1) worst-case lookup with no
//! scan.

/// A single cached translation.
#[derive(Clone, Copy, Default)]
struct TlbEntry {
    valid: bool,
    vpn: u32,
    ppn: u32,
    r: bool,
    w: bool,
    x: bool,
    u: bool,
    /// 1 for a 4 MiB superpage (level-1 leaf), 0 for a 4 KiB page.
    level: u8,
    dirty: bool,
    /// Guest-physical address of the backing PTE, so a write hit can set D in memory too.
    pte_addr: u32,
}

/// Direct-mapped TLB of `size` entries (rounded up to a power of two).
pub struct Tlb {
    entries: Vec<TlbEntry>,
    mask: usize,
}

impl Tlb {
    /// Creates a TLB with the given entry count, rounded up to the next power of two.
    pub fn new(size: usize) -> Self {
        let size = size.max(1).next_power_of_two();
        Self {
            entries: vec![TlbEntry::default(); size],
            mask: size - 1,
        }
    }

    fn index(&self, vpn: u32) -> usize {
        (vpn as usize) & self.mask
    }

    /// Looks up `vpn`, returning `(ppn, r, w, x, u, level, dirty, pte_addr)` on a tag hit.
    #[allow(clippy::type_complexity)]
    pub fn lookup(&self, vpn: u32) -> Option<(u32, bool, bool, bool, bool, u8, bool, u32)> {
        let e = &self.entries[self.index(vpn)];
        if e.valid && e.vpn == vpn {
            Some((e.ppn, e.r, e.w, e.x, e.u, e.level, e.dirty, e.pte_addr))
        } else {
            None
        }
    }

    /// Installs a translation, evicting whatever direct-mapped slot previously held that index.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        vpn: u32,
        ppn: u32,
        r: bool,
        w: bool,
        x: bool,
        u: bool,
        level: u8,
        dirty: bool,
        pte_addr: u32,
    ) {
        let idx = self.index(vpn);
        self.entries[idx] = TlbEntry {
            valid: true,
            vpn,
            ppn,
            r,
            w,
            x,
            u,
            level,
            dirty,
            pte_addr,
        };
    }

    /// Marks the entry for `vpn` dirty, if still resident and tag-matching. Returns the backing
    /// PTE address to write back to, if any.
    pub fn mark_dirty(&mut self, vpn: u32) -> Option<u32> {
        let idx = self.index(vpn);
        let e = &mut self.entries[idx];
        if e.valid && e.vpn == vpn {
            e.dirty = true;
            Some(e.pte_addr)
        } else {
            None
        }
    }

    /// Invalidates every entry.
    pub fn flush_all(&mut self) {
        for e in &mut self.entries {
            e.valid = false;
        }
    }

    /// Invalidates the entry mapping `vpn`, if any (used by `sfence.vma rs1=VA`).
    pub fn flush_vpn(&mut self, vpn: u32) {
        let idx = self.index(vpn);
        if self.entries[idx].vpn == vpn {
            self.entries[idx].valid = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_on_empty_tlb() {
        let tlb = Tlb::new(16);
        assert!(tlb.lookup(5).is_none());
    }

    #[test]
    fn insert_then_lookup_hits() {
        let mut tlb = Tlb::new(16);
        tlb.insert(5, 0x1234, true, true, false, false, 0, false, 0x9000);
        let hit = tlb.lookup(5).unwrap();
        assert_eq!(hit.0, 0x1234);
        assert!(hit.1 && hit.2 && !hit.3);
    }

    #[test]
    fn colliding_index_evicts_previous_tag() {
        let mut tlb = Tlb::new(16);
        tlb.insert(5, 0x1, true, false, false, false, 0, false, 0);
        tlb.insert(21, 0x2, true, false, false, false, 0, false, 0);
        assert!(tlb.lookup(5).is_none());
        assert!(tlb.lookup(21).is_some());
    }

    #[test]
    fn flush_all_invalidates_every_entry() {
        let mut tlb = Tlb::new(4);
        tlb.insert(1, 0x1, true, true, true, true, 0, false, 0);
        tlb.flush_all();
        assert!(tlb.lookup(1).is_none());
    }
}
