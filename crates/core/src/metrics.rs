use crate::SimulationObserver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct PerformanceMetrics {
    register_writes: AtomicU64,
    iterations: AtomicU64,
    cycle_count: AtomicU64,
    start_time: Instant,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            register_writes: AtomicU64::new(0),
            iterations: AtomicU64::new(0),
            cycle_count: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn get_register_writes(&self) -> u64 {
        self.register_writes.load(Ordering::SeqCst)
    }

    pub fn get_iterations(&self) -> u64 {
        self.iterations.load(Ordering::SeqCst)
    }

    pub fn get_cycles(&self) -> u64 {
        self.cycle_count.load(Ordering::SeqCst)
    }

    /// Simulated instruction cycles per host second.
    pub fn get_cycles_per_sec(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.get_cycles() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl SimulationObserver for PerformanceMetrics {
    fn on_register_write(&self, _addr: u16, _value: u8, cycle: u64) {
        self.register_writes.fetch_add(1, Ordering::SeqCst);
        self.cycle_count.fetch_max(cycle, Ordering::SeqCst);
    }

    fn on_iteration_end(&self, _iteration: u64, cycle: u64) {
        self.iterations.fetch_add(1, Ordering::SeqCst);
        self.cycle_count.fetch_max(cycle, Ordering::SeqCst);
    }
}
