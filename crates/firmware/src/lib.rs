//! Blink firmware for a mid-range PIC.
//!
//! Makes all of PORTB an output, then toggles RB0 forever with a busy-wait
//! between edges. Hardware options are fixed by [`fuses::FUSES`].
#![cfg_attr(not(test), no_std)]

pub mod blink;
pub mod delay;
pub mod fuses;
pub mod port;

pub use blink::{BlinkSettings, Blinker};
pub use delay::{DelayCycles, SpinDelay};
pub use port::{PortAddresses, PortBank, RegisterBus};

/// Oscillator frequency in Hz.
pub const XTAL_FREQ: u32 = 8_000_000;

/// Busy-wait per half period, in instruction cycles.
pub const DELAY_CYCLES: u32 = 100_000;

/// RB0.
pub const LED_MASK: u8 = 0x01;

pub const SETTINGS: BlinkSettings = BlinkSettings {
    pin_mask: LED_MASK,
    hold_cycles: DELAY_CYCLES,
};

/// Firmware entry point.
pub fn main() -> ! {
    // SAFETY: this is the only register file handle in the image.
    let bus = unsafe { port::Mmio::new() };
    let port = PortBank::new(bus, PortAddresses::PORTB);
    Blinker::new(port, SpinDelay, SETTINGS).run()
}
