use crate::clock::SimClock;
use crate::memory::LinearMemory;
use crate::peripherals::gpio::{self, GpioPort};
use crate::{Peripheral, SimResult, SimulationError, SimulationObserver};
use firmware::port::{PortAddresses, RegisterBus};
use std::sync::Arc;

/// Four banks of 128 file registers.
pub const FILE_REGISTER_SIZE: usize = 0x200;

/// Instruction cycles charged per register write (movlw + movwf).
pub const WRITE_CYCLES: u64 = 2;

/// File register address range routed to a peripheral offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub base: u16,
    pub size: u16,
    pub offset: u16,
}

impl Window {
    pub fn single(base: u16, offset: u16) -> Self {
        Self {
            base,
            size: 1,
            offset,
        }
    }

    fn translate(&self, addr: u16) -> Option<u16> {
        if addr >= self.base && addr - self.base < self.size {
            Some(self.offset + (addr - self.base))
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct PeripheralEntry {
    pub name: String,
    pub windows: Vec<Window>,
    pub dev: Box<dyn Peripheral>,
}

impl PeripheralEntry {
    fn translate(&self, addr: u16) -> Option<u16> {
        self.windows.iter().find_map(|w| w.translate(addr))
    }
}

/// Data memory of the PIC: special function registers routed to
/// peripherals, general purpose RAM everywhere else.
pub struct FileRegisterBus {
    pub ram: LinearMemory,
    pub peripherals: Vec<PeripheralEntry>,
    clock: SimClock,
    observers: Vec<Arc<dyn SimulationObserver>>,
    fault: Option<SimulationError>,
}

impl std::fmt::Debug for FileRegisterBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRegisterBus")
            .field("peripherals", &self.peripherals)
            .field("cycle", &self.clock.now())
            .field("fault", &self.fault)
            .finish()
    }
}

impl FileRegisterBus {
    /// Bus with a single GPIO port mapped at `port`.
    pub fn new(clock: SimClock, port: PortAddresses) -> Self {
        let mut bus = Self {
            ram: LinearMemory::new(FILE_REGISTER_SIZE, 0x000),
            peripherals: Vec::new(),
            clock: clock.clone(),
            observers: Vec::new(),
            fault: None,
        };
        bus.map(
            "gpio",
            vec![
                Window::single(port.data, gpio::DATA_OFFSET),
                Window::single(port.tris, gpio::TRIS_OFFSET),
            ],
            Box::new(GpioPort::new(clock)),
        );
        bus
    }

    pub fn map(&mut self, name: &str, windows: Vec<Window>, dev: Box<dyn Peripheral>) {
        tracing::debug!("Mapping peripheral '{}' at {:x?}", name, windows);
        self.peripherals.push(PeripheralEntry {
            name: name.to_string(),
            windows,
            dev,
        });
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn read_u8(&self, addr: u16) -> SimResult<u8> {
        if addr as usize >= FILE_REGISTER_SIZE {
            return Err(SimulationError::MemoryViolation(addr));
        }
        for p in &self.peripherals {
            if let Some(offset) = p.translate(addr) {
                return p.dev.read(offset);
            }
        }
        self.ram
            .read_u8(addr)
            .ok_or(SimulationError::MemoryViolation(addr))
    }

    pub fn write_u8(&mut self, addr: u16, value: u8) -> SimResult<()> {
        let cycle = self.clock.advance(WRITE_CYCLES);
        for observer in &self.observers {
            observer.on_register_write(addr, value, cycle);
        }
        if addr as usize >= FILE_REGISTER_SIZE {
            return Err(SimulationError::MemoryViolation(addr));
        }

        for p in &mut self.peripherals {
            if let Some(offset) = p.translate(addr) {
                return p.dev.write(offset, value);
            }
        }
        if self.ram.write_u8(addr, value) {
            return Ok(());
        }
        Err(SimulationError::MemoryViolation(addr))
    }

    pub fn peripheral<T: 'static>(&self, name: &str) -> Option<&T> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<T>())
    }

    pub fn peripheral_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.peripherals
            .iter_mut()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<T>())
    }

    pub fn gpio(&self) -> Option<&GpioPort> {
        self.peripheral("gpio")
    }

    pub fn gpio_mut(&mut self) -> Option<&mut GpioPort> {
        self.peripheral_mut("gpio")
    }

    /// First fault raised through the infallible `RegisterBus` interface.
    pub fn take_fault(&mut self) -> Option<SimulationError> {
        self.fault.take()
    }

    pub fn reset(&mut self) {
        self.ram.clear();
        for p in &mut self.peripherals {
            p.dev.reset();
        }
        self.fault = None;
    }

    fn latch(&mut self, err: SimulationError) {
        tracing::error!("Bus fault: {}", err);
        if self.fault.is_none() {
            self.fault = Some(err);
        }
    }
}

impl RegisterBus for FileRegisterBus {
    fn read(&self, addr: u16) -> u8 {
        // Unimplemented locations read as zero on the target.
        self.read_u8(addr).unwrap_or(0)
    }

    fn write(&mut self, addr: u16, value: u8) {
        if let Err(e) = self.write_u8(addr, value) {
            self.latch(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_registers_route_to_gpio() {
        let mut bus = FileRegisterBus::new(SimClock::new(), PortAddresses::PORTB);
        bus.write_u8(0x86, 0x00).unwrap();
        bus.write_u8(0x06, 0x01).unwrap();

        let gpio = bus.gpio().unwrap();
        assert_eq!(gpio.tris(), 0x00);
        assert_eq!(gpio.latch(), 0x01);
        assert_eq!(bus.read_u8(0x06).unwrap(), 0x01);
        assert_eq!(bus.clock().now(), 2 * WRITE_CYCLES);
    }

    #[test]
    fn test_ram_and_violation() {
        let mut bus = FileRegisterBus::new(SimClock::new(), PortAddresses::PORTB);
        bus.write_u8(0x20, 0xAB).unwrap();
        assert_eq!(bus.read_u8(0x20).unwrap(), 0xAB);

        let err = bus.write_u8(0x200, 1).unwrap_err();
        assert!(matches!(err, SimulationError::MemoryViolation(0x200)));
    }

    #[test]
    fn test_register_bus_latches_first_fault() {
        let mut bus = FileRegisterBus::new(SimClock::new(), PortAddresses::PORTB);
        RegisterBus::write(&mut bus, 0x300, 1);
        RegisterBus::write(&mut bus, 0x400, 1);
        assert_eq!(RegisterBus::read(&bus, 0x300), 0);

        let fault = bus.take_fault();
        assert!(matches!(fault, Some(SimulationError::MemoryViolation(0x300))));
        assert!(bus.take_fault().is_none());
    }

    #[test]
    fn test_reset_restores_port() {
        let mut bus = FileRegisterBus::new(SimClock::new(), PortAddresses::PORTB);
        bus.write_u8(0x86, 0x00).unwrap();
        bus.write_u8(0x21, 0x55).unwrap();
        bus.reset();
        assert_eq!(bus.gpio().unwrap().tris(), 0xFF);
        assert_eq!(bus.read_u8(0x21).unwrap(), 0);
    }
}
