use anyhow::Context;
use firmware::delay::cycles_to_ns;
use firmware::PortAddresses;
use picblink_core::{MachineConfig, SimulationObserver};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Mutex;
use vcd::{IdCode, TimescaleUnit, Value, Writer};

/// Dumps the port registers and the LED pin as a VCD waveform.
pub struct VcdObserver {
    state: Mutex<VcdState>,
    ids: VcdIds,
    port: PortAddresses,
    pin_mask: u8,
    clock_hz: u32,
}

struct VcdIds {
    pin: IdCode,
    latch: IdCode,
    tris: IdCode,
}

struct VcdState {
    writer: Writer<BufWriter<File>>,
    latch: u8,
    tris: u8,
    last_time: u64,
}

impl VcdObserver {
    pub fn new(path: &Path, config: &MachineConfig) -> anyhow::Result<Self> {
        let file =
            File::create(path).with_context(|| format!("Failed to create VCD file {:?}", path))?;
        let mut writer = Writer::new(BufWriter::new(file));

        writer.timescale(1, TimescaleUnit::NS)?;
        writer.add_module("picblink")?;
        let pin = writer.add_wire(1, &format!("rb{}", config.pin()))?;

        writer.add_module("port")?;
        let latch = writer.add_wire(8, "latch")?;
        let tris = writer.add_wire(8, "tris")?;
        writer.upscope()?; // port

        writer.upscope()?; // picblink
        writer.enddefinitions()?;

        // Power-on: latch cleared, every pin an input
        writer.timestamp(0)?;
        writer.change_scalar(pin, Value::Z)?;
        writer.change_vector(latch, u8_to_vec(0x00))?;
        writer.change_vector(tris, u8_to_vec(0xFF))?;

        Ok(Self {
            state: Mutex::new(VcdState {
                writer,
                latch: 0x00,
                tris: 0xFF,
                last_time: 0,
            }),
            ids: VcdIds { pin, latch, tris },
            port: config.port,
            pin_mask: config.settings.pin_mask,
            clock_hz: config.clock_hz,
        })
    }

    fn pin_value(&self, state: &VcdState) -> Value {
        if state.tris & self.pin_mask != 0 {
            Value::Z
        } else if state.latch & self.pin_mask != 0 {
            Value::V1
        } else {
            Value::V0
        }
    }
}

// MSB first
fn u8_to_vec(val: u8) -> Vec<Value> {
    (0..8)
        .rev()
        .map(|i| if (val >> i) & 1 == 1 { Value::V1 } else { Value::V0 })
        .collect()
}

impl core::fmt::Debug for VcdObserver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "VcdObserver")
    }
}

impl SimulationObserver for VcdObserver {
    fn on_register_write(&self, addr: u16, value: u8, cycle: u64) {
        if addr != self.port.data && addr != self.port.tris {
            return;
        }
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        let time = cycles_to_ns(cycle, self.clock_hz);
        if time > state.last_time {
            let _ = state.writer.timestamp(time);
            state.last_time = time;
        }

        if addr == self.port.data {
            state.latch = value;
            let _ = state.writer.change_vector(self.ids.latch, u8_to_vec(value));
        } else {
            state.tris = value;
            let _ = state.writer.change_vector(self.ids.tris, u8_to_vec(value));
        }

        let level = self.pin_value(&state);
        let _ = state.writer.change_scalar(self.ids.pin, level);
    }
}
