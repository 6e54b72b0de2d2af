use crate::delay::DelayCycles;
use crate::port::{PortBank, RegisterBus};

/// Every pin of the bank is an output.
pub const ALL_OUTPUTS: u8 = 0xFF;

/// Compile-time parameters of the blink loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkSettings {
    /// Bit driven high in the HIGH state.
    pub pin_mask: u8,
    /// Busy-wait between writes, in instruction cycles.
    pub hold_cycles: u32,
}

/// Toggles one pin forever.
#[derive(Debug)]
pub struct Blinker<B: RegisterBus, D: DelayCycles> {
    port: PortBank<B>,
    delay: D,
    settings: BlinkSettings,
}

impl<B: RegisterBus, D: DelayCycles> Blinker<B, D> {
    /// Takes the port and makes every pin an output. This is the only
    /// direction write the blinker ever performs.
    pub fn new(mut port: PortBank<B>, delay: D, settings: BlinkSettings) -> Self {
        port.set_direction(ALL_OUTPUTS);
        Self {
            port,
            delay,
            settings,
        }
    }

    /// One HIGH hold followed by one LOW hold.
    pub fn cycle(&mut self) {
        self.port.write_output(self.settings.pin_mask);
        self.delay.delay_cycles(self.settings.hold_cycles);
        self.port.write_output(0x00);
        self.delay.delay_cycles(self.settings.hold_cycles);
    }

    pub fn run(mut self) -> ! {
        loop {
            self.cycle();
        }
    }

    pub fn port(&self) -> &PortBank<B> {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut PortBank<B> {
        &mut self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortAddresses;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Op {
        Write(u16, u8),
        Delay(u32),
    }

    #[derive(Default)]
    struct Log {
        ops: [Option<Op>; 16],
        len: usize,
    }

    impl Log {
        fn push(&mut self, op: Op) {
            self.ops[self.len] = Some(op);
            self.len += 1;
        }
    }

    struct LogBus<'a>(&'a core::cell::RefCell<Log>);
    struct LogDelay<'a>(&'a core::cell::RefCell<Log>);

    impl RegisterBus for LogBus<'_> {
        fn read(&self, _addr: u16) -> u8 {
            0
        }
        fn write(&mut self, addr: u16, value: u8) {
            self.0.borrow_mut().push(Op::Write(addr, value));
        }
    }

    impl DelayCycles for LogDelay<'_> {
        fn delay_cycles(&mut self, cycles: u32) {
            self.0.borrow_mut().push(Op::Delay(cycles));
        }
    }

    #[test]
    fn test_cycle_order() {
        let log = core::cell::RefCell::new(Log::default());
        let port = PortBank::new(LogBus(&log), PortAddresses::PORTB);
        let settings = BlinkSettings {
            pin_mask: 0x01,
            hold_cycles: 10,
        };
        let mut blinker = Blinker::new(port, LogDelay(&log), settings);
        blinker.cycle();
        blinker.cycle();

        let log = log.borrow();
        assert_eq!(log.len, 9);
        assert_eq!(log.ops[0], Some(Op::Write(0x86, 0x00)));
        let expected = [
            Op::Write(0x06, 0x01),
            Op::Delay(10),
            Op::Write(0x06, 0x00),
            Op::Delay(10),
        ];
        for (i, op) in expected.iter().chain(expected.iter()).enumerate() {
            assert_eq!(log.ops[i + 1], Some(*op));
        }
    }
}
