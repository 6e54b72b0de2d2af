//! Software-timed busy-wait delays.
//!
//! Counts are in instruction cycles. One instruction cycle takes
//! [`CLOCKS_PER_INSTRUCTION`] oscillator clocks.

/// Oscillator clocks per instruction cycle (Fosc/4).
pub const CLOCKS_PER_INSTRUCTION: u32 = 4;

/// Instruction cycles consumed by one iteration of [`SpinDelay`]
/// (decrement, test, branch). Recalibrate when changing toolchain or target.
pub const SPIN_CYCLES_PER_ITERATION: u32 = 4;

/// Busy-wait for a number of instruction cycles.
pub trait DelayCycles {
    fn delay_cycles(&mut self, cycles: u32);
}

/// Spins the CPU. No timer peripheral involved.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinDelay;

impl DelayCycles for SpinDelay {
    #[inline(never)]
    fn delay_cycles(&mut self, cycles: u32) {
        let mut remaining = cycles / SPIN_CYCLES_PER_ITERATION;
        while remaining != 0 {
            core::hint::spin_loop();
            remaining = core::hint::black_box(remaining) - 1;
        }
    }
}

/// Instruction cycles in `us` microseconds at `clock_hz`.
pub const fn cycles_for_us(us: u32, clock_hz: u32) -> u32 {
    ((us as u64 * clock_hz as u64) / (CLOCKS_PER_INSTRUCTION as u64 * 1_000_000)) as u32
}

/// Instruction cycles in `ms` milliseconds at `clock_hz`.
pub const fn cycles_for_ms(ms: u32, clock_hz: u32) -> u32 {
    ((ms as u64 * clock_hz as u64) / (CLOCKS_PER_INSTRUCTION as u64 * 1_000)) as u32
}

/// Wall-clock duration of `cycles` instruction cycles, in nanoseconds.
pub const fn cycles_to_ns(cycles: u64, clock_hz: u32) -> u64 {
    (cycles as u128 * CLOCKS_PER_INSTRUCTION as u128 * 1_000_000_000 / clock_hz as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_conversions() {
        // 8 MHz -> 2 MHz instruction clock
        assert_eq!(cycles_for_us(1, 8_000_000), 2);
        assert_eq!(cycles_for_ms(50, 8_000_000), 100_000);
        assert_eq!(cycles_for_ms(50, 4_000_000), 50_000);
    }

    #[test]
    fn test_cycles_to_ns_scales_with_count_and_clock() {
        assert_eq!(cycles_to_ns(100_000, 8_000_000), 50_000_000);
        assert_eq!(cycles_to_ns(200_000, 8_000_000), 100_000_000);
        assert_eq!(cycles_to_ns(100_000, 16_000_000), 25_000_000);
    }

    #[test]
    fn test_cycles_to_ns_long_runs() {
        // About 5 million blink iterations at 8 MHz
        assert_eq!(cycles_to_ns(1_000_000_000_000, 8_000_000), 500_000_000_000_000);
        // 4 GHz makes one instruction cycle exactly 1 ns
        assert_eq!(cycles_to_ns(u64::MAX / 4, 4_000_000_000), u64::MAX / 4);
    }

    #[test]
    fn test_spin_delay_returns() {
        let mut d = SpinDelay;
        d.delay_cycles(0);
        d.delay_cycles(3);
        d.delay_cycles(1_000);
    }
}
