//! Physical address bus.
//!
//! In system mode, every physical memory access — guest load/store, page-table walk, DMA from a
//! host-modeled device — passes through this router. Non-MMIO addresses go straight to the
//! memory arena; MMIO addresses are dispatched to whichever registered [`Device`] claims the
//! range. Device *internals* (PLIC, UART, virtio-blk...) are a host concern; this crate owns only
//! the seam.

use crate::common::error::Trap;
use crate::core::mem::MemoryArena;

/// A memory-mapped device reachable through the bus.
///
/// Implemented by the host for concrete peripherals (PLIC, UART, RTC, virtio-blk...); this crate
/// ships no device beyond the in-tree test double used by the bus's own test suite.
pub trait Device {
    /// Human-readable name, used in diagnostics.
    fn name(&self) -> &str;

    /// `(base, size)` of the physical address range this device claims.
    fn address_range(&self) -> (u32, u32);

    fn read_u8(&mut self, offset: u32) -> u8;
    fn read_u16(&mut self, offset: u32) -> u16;
    fn read_u32(&mut self, offset: u32) -> u32;

    fn write_u8(&mut self, offset: u32, val: u8);
    fn write_u16(&mut self, offset: u32, val: u16);
    fn write_u32(&mut self, offset: u32, val: u32);

    /// Advances the device by one dispatch-loop step. Returns whether it now has an interrupt
    /// pending.
    fn tick(&mut self) -> bool {
        false
    }
}

/// Routes physical addresses to guest RAM or to a registered [`Device`].
pub struct Bus {
    ram: MemoryArena,
    ram_base: u32,
    ram_size: u32,
    devices: Vec<Box<dyn Device + Send + Sync>>,
    last_hit: Option<usize>,
}

impl Bus {
    /// Creates a bus whose entire address space (`[0, size)`) is plain RAM, with no MMIO devices
    /// registered yet.
    pub fn new_with_ram(size: u32) -> Self {
        Self {
            ram: MemoryArena::new(),
            ram_base: 0,
            ram_size: size,
            devices: Vec::new(),
            last_hit: None,
        }
    }

    /// Registers a device, keeping the device list sorted by base address for lookup.
    pub fn add_device(&mut self, dev: Box<dyn Device + Send + Sync>) {
        self.devices.push(dev);
        self.devices
            .sort_by_key(|d| d.address_range().0);
        self.last_hit = None;
    }

    fn find_device(&mut self, addr: u32) -> Option<(usize, u32)> {
        if let Some(idx) = self.last_hit {
            let (base, size) = self.devices[idx].address_range();
            if addr >= base && addr < base.wrapping_add(size) {
                return Some((idx, addr - base));
            }
        }
        for (idx, dev) in self.devices.iter().enumerate() {
            let (base, size) = dev.address_range();
            if addr >= base && addr < base.wrapping_add(size) {
                self.last_hit = Some(idx);
                return Some((idx, addr - base));
            }
        }
        None
    }

    fn in_ram(&self, addr: u32) -> bool {
        addr >= self.ram_base && (addr - self.ram_base) < self.ram_size
    }

    /// Copies a host buffer into RAM at `addr`, e.g. for loading an ELF segment or flat binary.
    pub fn load_binary_at(&mut self, data: &[u8], addr: u32) {
        self.ram.write_bytes(addr - self.ram_base, data);
    }

    pub fn read_u8(&mut self, addr: u32) -> u8 {
        if self.in_ram(addr) {
            return self.ram.read_u8(addr - self.ram_base);
        }
        match self.find_device(addr) {
            Some((idx, off)) => self.devices[idx].read_u8(off),
            None => 0,
        }
    }

    pub fn write_u8(&mut self, addr: u32, val: u8) {
        if self.in_ram(addr) {
            self.ram.write_u8(addr - self.ram_base, val);
            return;
        }
        if let Some((idx, off)) = self.find_device(addr) {
            self.devices[idx].write_u8(off, val);
        }
    }

    pub fn read_u16(&mut self, addr: u32) -> u16 {
        if self.in_ram(addr) {
            return self.ram.read_u16(addr - self.ram_base);
        }
        match self.find_device(addr) {
            Some((idx, off)) => self.devices[idx].read_u16(off),
            None => 0,
        }
    }

    pub fn write_u16(&mut self, addr: u32, val: u16) {
        if self.in_ram(addr) {
            self.ram.write_u16(addr - self.ram_base, val);
            return;
        }
        if let Some((idx, off)) = self.find_device(addr) {
            self.devices[idx].write_u16(off, val);
        }
    }

    pub fn read_u32(&mut self, addr: u32) -> u32 {
        if self.in_ram(addr) {
            return self.ram.read_u32(addr - self.ram_base);
        }
        match self.find_device(addr) {
            Some((idx, off)) => self.devices[idx].read_u32(off),
            None => 0,
        }
    }

    pub fn write_u32(&mut self, addr: u32, val: u32) {
        if self.in_ram(addr) {
            self.ram.write_u32(addr - self.ram_base, val);
            return;
        }
        if let Some((idx, off)) = self.find_device(addr) {
            self.devices[idx].write_u32(off, val);
        }
    }

    /// Ticks every registered device, returning `true` if any now has an interrupt pending.
    pub fn tick_devices(&mut self) -> bool {
        let mut pending = false;
        for dev in &mut self.devices {
            pending |= dev.tick();
        }
        pending
    }

    fn mapped(&mut self, addr: u32) -> bool {
        self.in_ram(addr) || self.find_device(addr).is_some()
    }

    /// Checked read, reporting a fault for an address claimed neither by RAM nor a device.
    pub fn try_read_u32(&mut self, addr: u32) -> Result<u32, Trap> {
        if self.mapped(addr) {
            Ok(self.read_u32(addr))
        } else {
            Err(Trap::LoadAccessFault(addr))
        }
    }

    pub fn try_read_u16(&mut self, addr: u32) -> Result<u16, Trap> {
        if self.mapped(addr) {
            Ok(self.read_u16(addr))
        } else {
            Err(Trap::LoadAccessFault(addr))
        }
    }

    pub fn try_read_u8(&mut self, addr: u32) -> Result<u8, Trap> {
        if self.mapped(addr) {
            Ok(self.read_u8(addr))
        } else {
            Err(Trap::LoadAccessFault(addr))
        }
    }

    pub fn try_write_u32(&mut self, addr: u32, val: u32) -> Result<(), Trap> {
        if self.mapped(addr) {
            self.write_u32(addr, val);
            Ok(())
        } else {
            Err(Trap::StoreAccessFault(addr))
        }
    }

    pub fn try_write_u16(&mut self, addr: u32, val: u16) -> Result<(), Trap> {
        if self.mapped(addr) {
            self.write_u16(addr, val);
            Ok(())
        } else {
            Err(Trap::StoreAccessFault(addr))
        }
    }

    pub fn try_write_u8(&mut self, addr: u32, val: u8) -> Result<(), Trap> {
        if self.mapped(addr) {
            self.write_u8(addr, val);
            Ok(())
        } else {
            Err(Trap::StoreAccessFault(addr))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestDevice {
        reg: u32,
    }

    impl Device for TestDevice {
        fn name(&self) -> &str {
            "test-device"
        }
        fn address_range(&self) -> (u32, u32) {
            (0xF000_0000, 0x1000)
        }
        fn read_u8(&mut self, offset: u32) -> u8 {
            (self.reg >> ((offset % 4) * 8)) as u8
        }
        fn read_u16(&mut self, _offset: u32) -> u16 {
            self.reg as u16
        }
        fn read_u32(&mut self, _offset: u32) -> u32 {
            self.reg
        }
        fn write_u8(&mut self, _offset: u32, val: u8) {
            self.reg = val as u32;
        }
        fn write_u16(&mut self, _offset: u32, val: u16) {
            self.reg = val as u32;
        }
        fn write_u32(&mut self, _offset: u32, val: u32) {
            self.reg = val;
        }
    }

    #[test]
    fn ram_round_trips() {
        let mut bus = Bus::new_with_ram(64 * 1024);
        bus.write_u32(0x100, 0x1234_5678);
        assert_eq!(bus.read_u32(0x100), 0x1234_5678);
    }

    #[test]
    fn mmio_device_routes_by_address_range() {
        let mut bus = Bus::new_with_ram(64 * 1024);
        bus.add_device(Box::new(TestDevice { reg: 0 }));
        bus.write_u32(0xF000_0004, 0xCAFE_BABE);
        assert_eq!(bus.read_u32(0xF000_0004), 0xCAFE_BABE);
    }

    #[test]
    fn unmapped_address_faults_on_checked_read() {
        let mut bus = Bus::new_with_ram(0x1000);
        assert!(bus.try_read_u32(0xF0FF_0000).is_err());
    }

    #[test]
    fn unmapped_address_faults_on_checked_write() {
        let mut bus = Bus::new_with_ram(0x1000);
        assert!(bus.try_write_u32(0xF0FF_0000, 1).is_err());
    }

    #[test]
    fn checked_write_reaches_ram() {
        let mut bus = Bus::new_with_ram(0x1000);
        bus.try_write_u16(0x10, 0xBEEF).unwrap();
        assert_eq!(bus.try_read_u16(0x10).unwrap(), 0xBEEF);
    }
}
