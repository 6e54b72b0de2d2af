use firmware::delay::{cycles_to_ns, DelayCycles};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Instruction-cycle counter shared between the bus and the delay.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    cycles: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn advance(&self, cycles: u64) -> u64 {
        self.cycles.fetch_add(cycles, Ordering::SeqCst) + cycles
    }

    pub fn reset(&self) {
        self.cycles.store(0, Ordering::SeqCst);
    }

    pub fn elapsed_ns(&self, clock_hz: u32) -> u64 {
        cycles_to_ns(self.now(), clock_hz)
    }
}

/// Busy-wait that costs simulated cycles instead of host time.
#[derive(Debug, Clone)]
pub struct SimDelay {
    clock: SimClock,
}

impl SimDelay {
    pub fn new(clock: SimClock) -> Self {
        Self { clock }
    }
}

impl DelayCycles for SimDelay {
    fn delay_cycles(&mut self, cycles: u32) {
        let now = self.clock.advance(cycles as u64);
        tracing::trace!("delay {} cycles, now at cycle {}", cycles, now);
    }
}
