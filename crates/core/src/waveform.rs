// PicBlink - PIC Blink Firmware and Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Level history of a single pin, rebuilt from recorded port writes.

use crate::peripherals::gpio::{PortEvent, PortRegister};
use firmware::delay::CLOCKS_PER_INSTRUCTION;
use picblink_config::PinLevel;
use serde::Serialize;

/// Level the pin was driven to by one PORT write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub cycle: u64,
    pub level: PinLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinTrace {
    pub pin: u8,
    pub samples: Vec<Sample>,
}

impl PinTrace {
    /// One sample per PORT write issued while `pin` is an output.
    pub fn from_events(events: &[PortEvent], pin: u8) -> Self {
        let bit = 1u8 << pin;
        let mut tris = 0xFFu8;
        let mut samples = Vec::new();

        for event in events {
            match event.register {
                PortRegister::Tris => tris = event.value,
                PortRegister::Data if tris & bit == 0 => {
                    let level = if event.value & bit != 0 {
                        PinLevel::High
                    } else {
                        PinLevel::Low
                    };
                    samples.push(Sample {
                        cycle: event.cycle,
                        level,
                    });
                }
                PortRegister::Data => {}
            }
        }

        Self { pin, samples }
    }

    pub fn levels(&self) -> Vec<PinLevel> {
        self.samples.iter().map(|s| s.level).collect()
    }

    /// No two consecutive writes leave the pin at the same level.
    pub fn is_strictly_alternating(&self) -> bool {
        self.samples.windows(2).all(|w| w[0].level != w[1].level)
    }

    fn holds(&self, level: PinLevel) -> Vec<u64> {
        self.samples
            .windows(2)
            .filter(|w| w[0].level == level)
            .map(|w| w[1].cycle - w[0].cycle)
            .collect()
    }

    /// Cycles spent high, one entry per completed high interval.
    pub fn high_holds(&self) -> Vec<u64> {
        self.holds(PinLevel::High)
    }

    pub fn low_holds(&self) -> Vec<u64> {
        self.holds(PinLevel::Low)
    }

    /// Mean rising-edge to rising-edge distance, in cycles.
    pub fn period_cycles(&self) -> Option<f64> {
        let rises: Vec<u64> = self
            .samples
            .iter()
            .filter(|s| s.level == PinLevel::High)
            .map(|s| s.cycle)
            .collect();
        if rises.len() < 2 {
            return None;
        }
        let span = rises[rises.len() - 1] - rises[0];
        Some(span as f64 / (rises.len() - 1) as f64)
    }

    pub fn period_us(&self, clock_hz: u32) -> Option<f64> {
        let cycles = self.period_cycles()?;
        Some(cycles * CLOCKS_PER_INSTRUCTION as f64 * 1_000_000.0 / clock_hz as f64)
    }

    /// High time over total time, counted over complete rise-to-rise periods.
    pub fn duty_cycle(&self) -> Option<f64> {
        let mut high = 0u64;
        let mut total = 0u64;
        let mut rise: Option<u64> = None;
        let mut fall: Option<u64> = None;

        for sample in &self.samples {
            match sample.level {
                PinLevel::High => {
                    if let (Some(r), Some(f)) = (rise, fall) {
                        high += f - r;
                        total += sample.cycle - r;
                    }
                    rise = Some(sample.cycle);
                    fall = None;
                }
                PinLevel::Low => {
                    if rise.is_some() && fall.is_none() {
                        fall = Some(sample.cycle);
                    }
                }
            }
        }

        if total == 0 {
            return None;
        }
        Some(high as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(cycle: u64, value: u8) -> PortEvent {
        PortEvent {
            cycle,
            register: PortRegister::Data,
            value,
        }
    }

    fn tris(cycle: u64, value: u8) -> PortEvent {
        PortEvent {
            cycle,
            register: PortRegister::Tris,
            value,
        }
    }

    #[test]
    fn test_writes_before_output_are_ignored() {
        let events = [data(1, 0x01), tris(2, 0x00), data(3, 0x01), data(5, 0x00)];
        let trace = PinTrace::from_events(&events, 0);
        assert_eq!(trace.levels(), vec![PinLevel::High, PinLevel::Low]);
    }

    #[test]
    fn test_symmetric_square_wave() {
        let events = [
            tris(0, 0x00),
            data(10, 0x01),
            data(20, 0x00),
            data(30, 0x01),
            data(40, 0x00),
            data(50, 0x01),
        ];
        let trace = PinTrace::from_events(&events, 0);
        assert!(trace.is_strictly_alternating());
        assert_eq!(trace.high_holds(), vec![10, 10]);
        assert_eq!(trace.low_holds(), vec![10, 10]);
        assert_eq!(trace.period_cycles(), Some(20.0));
        assert_eq!(trace.duty_cycle(), Some(0.5));
        // 20 cycles at 8 MHz = 20 * 0.5 us
        assert_eq!(trace.period_us(8_000_000), Some(10.0));
    }

    #[test]
    fn test_repeated_level_breaks_alternation() {
        let events = [tris(0, 0x00), data(1, 0x01), data(2, 0x01), data(3, 0x00)];
        let trace = PinTrace::from_events(&events, 0);
        assert!(!trace.is_strictly_alternating());
    }

    #[test]
    fn test_other_pins_do_not_matter() {
        let events = [tris(0, 0x00), data(1, 0x03), data(2, 0x02)];
        let trace = PinTrace::from_events(&events, 0);
        assert_eq!(trace.levels(), vec![PinLevel::High, PinLevel::Low]);
        let trace = PinTrace::from_events(&events, 1);
        assert_eq!(trace.levels(), vec![PinLevel::High, PinLevel::High]);
    }

    #[test]
    fn test_too_short_for_period() {
        let events = [tris(0, 0x00), data(1, 0x01), data(2, 0x00)];
        let trace = PinTrace::from_events(&events, 0);
        assert_eq!(trace.period_cycles(), None);
        assert_eq!(trace.duty_cycle(), None);
    }
}
