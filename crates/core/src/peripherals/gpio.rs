use crate::clock::SimClock;
use crate::SimResult;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Peripheral offsets. The bus maps them onto the PORTx/TRISx addresses.
pub const DATA_OFFSET: u16 = 0;
pub const TRIS_OFFSET: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRegister {
    Data,
    Tris,
}

/// One register write, stamped with the instruction cycle it completed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEvent {
    pub cycle: u64,
    pub register: PortRegister,
    pub value: u8,
}

/// 8-bit PIC I/O port: output latch plus active-low TRIS.
#[derive(Debug)]
pub struct GpioPort {
    latch: u8,
    tris: u8,
    input: u8,
    clock: SimClock,
    events: Vec<PortEvent>,
}

impl GpioPort {
    pub fn new(clock: SimClock) -> Self {
        Self {
            latch: 0,
            tris: 0xFF, // Reset value: all inputs
            input: 0,
            clock,
            events: Vec::new(),
        }
    }

    pub fn latch(&self) -> u8 {
        self.latch
    }

    pub fn tris(&self) -> u8 {
        self.tris
    }

    /// Pins configured as outputs (1 = output).
    pub fn output_mask(&self) -> u8 {
        !self.tris
    }

    /// Electrical level of every pin. Inputs follow the external drive.
    pub fn pins(&self) -> u8 {
        (self.latch & !self.tris) | (self.input & self.tris)
    }

    /// Drive the pins configured as inputs from outside.
    pub fn set_input(&mut self, value: u8) {
        self.input = value;
    }

    pub fn events(&self) -> &[PortEvent] {
        &self.events
    }

    pub fn tris_writes(&self) -> u64 {
        self.count_writes(PortRegister::Tris)
    }

    pub fn data_writes(&self) -> u64 {
        self.count_writes(PortRegister::Data)
    }

    fn count_writes(&self, register: PortRegister) -> u64 {
        self.events.iter().filter(|e| e.register == register).count() as u64
    }

    fn record(&mut self, register: PortRegister, value: u8) {
        self.events.push(PortEvent {
            cycle: self.clock.now(),
            register,
            value,
        });
    }
}

impl crate::Peripheral for GpioPort {
    fn read(&self, offset: u16) -> SimResult<u8> {
        match offset {
            DATA_OFFSET => Ok(self.pins()),
            TRIS_OFFSET => Ok(self.tris),
            _ => Ok(0),
        }
    }

    fn write(&mut self, offset: u16, value: u8) -> SimResult<()> {
        match offset {
            DATA_OFFSET => {
                self.latch = value;
                self.record(PortRegister::Data, value);
            }
            TRIS_OFFSET => {
                self.tris = value;
                self.record(PortRegister::Tris, value);
                tracing::debug!("GPIO: TRIS <- {:#04x}", value);
            }
            _ => {}
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.latch = 0;
        self.tris = 0xFF;
        self.input = 0;
        self.events.clear();
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}
