pub mod bus;
pub mod clock;
pub mod memory;
pub mod metrics;
pub mod peripherals;
pub mod snapshot;
pub mod waveform;

use std::any::Any;
use std::sync::Arc;

use firmware::fuses::FuseConfig;
use firmware::{BlinkSettings, Blinker, PortAddresses, PortBank};
use picblink_config::{BlinkManifest, DeviceDescriptor};

use bus::FileRegisterBus;
use clock::{SimClock, SimDelay};
use peripherals::gpio::GpioPort;

mod tests;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u16),
    #[error("GPIO port is not mapped on the bus")]
    MissingPort,
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait for observing simulation events in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self) {}
    fn on_simulation_stop(&self) {}
    fn on_register_write(&self, _addr: u16, _value: u8, _cycle: u64) {}
    fn on_iteration_end(&self, _iteration: u64, _cycle: u64) {}
}

/// Trait representing a peripheral in the register file
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u16) -> SimResult<u8>;
    fn write(&mut self, offset: u16, value: u8) -> SimResult<()>;
    fn reset(&mut self) {}
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}

/// Cycles of the `goto` closing each loop iteration.
pub const LOOP_BRANCH_CYCLES: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    pub clock_hz: u32,
    pub settings: BlinkSettings,
    pub port: PortAddresses,
    pub fuses: FuseConfig,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            clock_hz: firmware::XTAL_FREQ,
            settings: firmware::SETTINGS,
            port: PortAddresses::PORTB,
            fuses: firmware::fuses::FUSES,
        }
    }
}

impl MachineConfig {
    pub fn from_manifest(
        manifest: &BlinkManifest,
        device: &DeviceDescriptor,
    ) -> anyhow::Result<Self> {
        manifest.validate()?;
        Ok(Self {
            clock_hz: manifest.clock_hz,
            settings: BlinkSettings {
                pin_mask: manifest.pin_mask(),
                hold_cycles: manifest.delay_cycles,
            },
            port: PortAddresses {
                data: device.port.data_address,
                tris: device.port.tris_address,
            },
            fuses: manifest.fuses,
        })
    }

    /// Index of the toggled pin.
    pub fn pin(&self) -> u8 {
        self.settings.pin_mask.trailing_zeros() as u8
    }
}

pub type SimBlinker = Blinker<FileRegisterBus, SimDelay>;

/// The blink firmware running against a simulated register file.
pub struct Machine {
    pub config: MachineConfig,
    pub clock: SimClock,
    blinker: SimBlinker,
    observers: Vec<Arc<dyn SimulationObserver>>,
    iterations: u64,
}

impl Machine {
    pub fn new(config: MachineConfig) -> SimResult<Self> {
        Self::with_observers(config, Vec::new())
    }

    /// Power on and run the firmware up to the top of its loop, which
    /// includes the one-time direction write.
    pub fn with_observers(
        config: MachineConfig,
        observers: Vec<Arc<dyn SimulationObserver>>,
    ) -> SimResult<Self> {
        let clock = SimClock::new();
        let mut bus = FileRegisterBus::new(clock.clone(), config.port);
        for observer in &observers {
            bus.add_observer(observer.clone());
            observer.on_simulation_start();
        }

        tracing::debug!(
            "Booting: clock={} Hz, pin mask={:#04x}, hold={} cycles, CONFIG={:#06x}",
            config.clock_hz,
            config.settings.pin_mask,
            config.settings.hold_cycles,
            config.fuses.encode().bits()
        );

        let port = PortBank::new(bus, config.port);
        let mut blinker = Blinker::new(port, SimDelay::new(clock.clone()), config.settings);
        if let Some(fault) = blinker.port_mut().bus_mut().take_fault() {
            return Err(fault);
        }

        Ok(Self {
            config,
            clock,
            blinker,
            observers,
            iterations: 0,
        })
    }

    /// One pass through the firmware loop body plus its closing branch.
    pub fn step(&mut self) -> SimResult<()> {
        self.blinker.cycle();
        if let Some(fault) = self.bus_mut().take_fault() {
            return Err(fault);
        }

        let cycle = self.clock.advance(LOOP_BRANCH_CYCLES);
        self.iterations += 1;
        for observer in &self.observers {
            observer.on_iteration_end(self.iterations, cycle);
        }
        Ok(())
    }

    pub fn run_iterations(&mut self, count: u64) -> SimResult<()> {
        for _ in 0..count {
            self.step()?;
        }
        Ok(())
    }

    /// Step until the clock reaches `limit`. Returns the iterations run.
    pub fn run_until_cycles(&mut self, limit: u64) -> SimResult<u64> {
        let start = self.iterations;
        while self.clock.now() < limit {
            self.step()?;
        }
        Ok(self.iterations - start)
    }

    pub fn stop(&self) {
        for observer in &self.observers {
            observer.on_simulation_stop();
        }
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn cycles(&self) -> u64 {
        self.clock.now()
    }

    pub fn bus(&self) -> &FileRegisterBus {
        self.blinker.port().bus()
    }

    fn bus_mut(&mut self) -> &mut FileRegisterBus {
        self.blinker.port_mut().bus_mut()
    }

    pub fn gpio(&self) -> SimResult<&GpioPort> {
        self.bus().gpio().ok_or(SimulationError::MissingPort)
    }

    pub fn pin_trace(&self) -> SimResult<waveform::PinTrace> {
        Ok(waveform::PinTrace::from_events(
            self.gpio()?.events(),
            self.config.pin(),
        ))
    }

    pub fn snapshot(&self) -> SimResult<snapshot::MachineSnapshot> {
        let gpio = self.gpio()?;
        Ok(snapshot::MachineSnapshot {
            clock_hz: self.config.clock_hz,
            cycles: self.cycles(),
            iterations: self.iterations,
            config_word: self.config.fuses.encode().bits(),
            fuses: self.config.fuses,
            port: snapshot::PortSnapshot {
                data_address: self.config.port.data,
                tris_address: self.config.port.tris,
                latch: gpio.latch(),
                tris: gpio.tris(),
                pins: gpio.pins(),
                tris_writes: gpio.tris_writes(),
                data_writes: gpio.data_writes(),
            },
        })
    }
}
