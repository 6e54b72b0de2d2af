//! I/O port access through the special function register file.

/// File register address of PORTB (bank 0).
pub const PORTB: u16 = 0x06;
/// File register address of TRISB (bank 1).
pub const TRISB: u16 = 0x86;

/// Byte access to the register file.
///
/// Writes cannot fail on the target; implementations that can fault
/// (the simulator) must latch the error themselves.
pub trait RegisterBus {
    fn read(&self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
}

/// Volatile access to the real register file.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    ///
    /// Must only be used on the target, where every file register address
    /// is a valid data-memory location. Only one instance should exist.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl RegisterBus for Mmio {
    fn read(&self, addr: u16) -> u8 {
        // SAFETY: see `Mmio::new`.
        unsafe { core::ptr::read_volatile(addr as usize as *const u8) }
    }

    fn write(&mut self, addr: u16, value: u8) {
        // SAFETY: see `Mmio::new`.
        unsafe { core::ptr::write_volatile(addr as usize as *mut u8, value) }
    }
}

/// Register pair for one 8-bit I/O bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAddresses {
    pub data: u16,
    pub tris: u16,
}

impl PortAddresses {
    pub const PORTB: Self = Self {
        data: PORTB,
        tris: TRISB,
    };
}

/// One I/O bank.
#[derive(Debug)]
pub struct PortBank<B: RegisterBus> {
    bus: B,
    addrs: PortAddresses,
}

impl<B: RegisterBus> PortBank<B> {
    pub fn new(bus: B, addrs: PortAddresses) -> Self {
        Self { bus, addrs }
    }

    /// Configure pin directions. A set bit in `output_mask` makes the pin an
    /// output; TRIS is active low, so the complement is written.
    pub fn set_direction(&mut self, output_mask: u8) {
        self.bus.write(self.addrs.tris, !output_mask);
    }

    /// Drive the output latch.
    pub fn write_output(&mut self, mask: u8) {
        self.bus.write(self.addrs.data, mask);
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_inner(self) -> B {
        self.bus
    }
}
