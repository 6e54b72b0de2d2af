#[cfg(test)]
mod tests {
    use crate::bus::WRITE_CYCLES;
    use crate::metrics::PerformanceMetrics;
    use crate::peripherals::gpio::PortRegister;
    use crate::{Machine, MachineConfig, SimulationError, SimulationObserver, LOOP_BRANCH_CYCLES};
    use firmware::{BlinkSettings, PortAddresses};
    use picblink_config::{BlinkManifest, DeviceDescriptor, PinLevel};
    use std::sync::Arc;

    use PinLevel::{High, Low};

    fn config_with_hold(hold_cycles: u32) -> MachineConfig {
        MachineConfig {
            settings: BlinkSettings {
                pin_mask: 0x01,
                hold_cycles,
            },
            ..MachineConfig::default()
        }
    }

    #[test]
    fn test_four_state_changes_are_high_low_high_low() {
        let mut machine = Machine::new(MachineConfig::default()).unwrap();
        machine.run_iterations(2).unwrap();

        let trace = machine.pin_trace().unwrap();
        assert_eq!(trace.levels(), vec![High, Low, High, Low]);
    }

    #[test]
    fn test_four_iterations_alternate_strictly() {
        let mut machine = Machine::new(MachineConfig::default()).unwrap();
        machine.run_iterations(4).unwrap();

        let trace = machine.pin_trace().unwrap();
        assert_eq!(trace.levels()[..4], [High, Low, High, Low]);
        assert_eq!(trace.samples.len(), 8);
        assert!(trace.is_strictly_alternating());
        assert_eq!(machine.iterations(), 4);
    }

    #[test]
    fn test_direction_written_once_before_loop() {
        let mut machine = Machine::new(MachineConfig::default()).unwrap();
        {
            let gpio = machine.gpio().unwrap();
            assert_eq!(gpio.tris_writes(), 1);
            assert_eq!(gpio.data_writes(), 0);
            assert_eq!(gpio.tris(), 0x00);
            assert_eq!(gpio.output_mask(), 0xFF);
        }

        machine.run_iterations(10).unwrap();
        let gpio = machine.gpio().unwrap();
        assert_eq!(gpio.tris_writes(), 1);
        assert_eq!(gpio.events()[0].register, PortRegister::Tris);
        assert!(gpio.events()[1..]
            .iter()
            .all(|e| e.register == PortRegister::Data));
    }

    #[test]
    fn test_only_the_led_bit_is_ever_driven() {
        let mut machine = Machine::new(MachineConfig::default()).unwrap();
        machine.run_iterations(3).unwrap();
        let values: Vec<u8> = machine
            .gpio()
            .unwrap()
            .events()
            .iter()
            .filter(|e| e.register == PortRegister::Data)
            .map(|e| e.value)
            .collect();
        assert_eq!(values, vec![0x01, 0x00, 0x01, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_hold_intervals_follow_timing_model() {
        let hold = 100_000u64;
        let mut machine = Machine::new(MachineConfig::default()).unwrap();
        machine.run_iterations(5).unwrap();

        let trace = machine.pin_trace().unwrap();
        // High: delay + the write that ends it. Low adds the loop branch.
        assert!(trace.high_holds().iter().all(|&h| h == hold + WRITE_CYCLES));
        assert!(trace
            .low_holds()
            .iter()
            .all(|&l| l == hold + WRITE_CYCLES + LOOP_BRANCH_CYCLES));
    }

    #[test]
    fn test_duty_cycle_is_half() {
        let mut machine = Machine::new(MachineConfig::default()).unwrap();
        machine.run_iterations(8).unwrap();
        let duty = machine.pin_trace().unwrap().duty_cycle().unwrap();
        assert!((duty - 0.5).abs() < 1e-4, "duty cycle {}", duty);
    }

    #[test]
    fn test_end_to_end_period_at_8mhz() {
        let mut machine = Machine::new(MachineConfig::default()).unwrap();
        machine.run_iterations(4).unwrap();

        let trace = machine.pin_trace().unwrap();
        // 2 * 100_000 delay cycles + 6 overhead cycles, 0.5 us each
        assert_eq!(trace.period_cycles(), Some(200_006.0));
        let period_us = trace.period_us(8_000_000).unwrap();
        assert!((period_us - 100_003.0).abs() < 1e-6);
    }

    #[test]
    fn test_delay_scales_linearly_with_count() {
        let holds: Vec<u64> = [1_000u32, 2_000, 4_000]
            .iter()
            .map(|&c| {
                let mut m = Machine::new(config_with_hold(c)).unwrap();
                m.run_iterations(2).unwrap();
                m.pin_trace().unwrap().high_holds()[0]
            })
            .collect();
        assert_eq!(holds[1] - holds[0], 1_000);
        assert_eq!(holds[2] - holds[1], 2_000);
    }

    #[test]
    fn test_period_scales_inversely_with_clock() {
        let period_at = |clock_hz: u32| {
            let mut m = Machine::new(MachineConfig {
                clock_hz,
                ..MachineConfig::default()
            })
            .unwrap();
            m.run_iterations(3).unwrap();
            m.pin_trace().unwrap().period_us(clock_hz).unwrap()
        };
        let slow = period_at(4_000_000);
        let fast = period_at(16_000_000);
        assert!((slow / fast - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_run_until_cycles() {
        let mut machine = Machine::new(config_with_hold(100)).unwrap();
        // Boot write, then 2 * (100 + 2) + 2 cycles per iteration
        let ran = machine.run_until_cycles(1_000).unwrap();
        assert_eq!(ran, 5);
        assert_eq!(machine.cycles(), 2 + 5 * 206);
    }

    #[test]
    fn test_unmapped_port_faults_at_boot() {
        let config = MachineConfig {
            port: PortAddresses {
                data: 0x06,
                tris: 0x300,
            },
            ..MachineConfig::default()
        };
        let err = Machine::new(config).err().unwrap();
        assert!(matches!(err, SimulationError::MemoryViolation(0x300)));
    }

    #[test]
    fn test_from_manifest_uses_device_port() {
        let manifest = BlinkManifest {
            pin: 2,
            delay_cycles: 50,
            ..BlinkManifest::default()
        };
        let mut device = DeviceDescriptor::default();
        device.port.data_address = 0x05;
        device.port.tris_address = 0x85;

        let config = MachineConfig::from_manifest(&manifest, &device).unwrap();
        assert_eq!(config.pin(), 2);

        let mut machine = Machine::new(config).unwrap();
        machine.run_iterations(1).unwrap();
        assert_eq!(machine.bus().read_u8(0x85).unwrap(), 0x00);
        assert_eq!(machine.gpio().unwrap().latch(), 0x00);
        assert_eq!(machine.pin_trace().unwrap().levels(), vec![High, Low]);
    }

    #[test]
    fn test_metrics_observer() {
        let metrics = Arc::new(PerformanceMetrics::new());
        let observers: Vec<Arc<dyn SimulationObserver>> = vec![metrics.clone()];
        let mut machine = Machine::with_observers(config_with_hold(10), observers).unwrap();
        machine.run_iterations(3).unwrap();
        machine.stop();

        assert_eq!(metrics.get_register_writes(), 7);
        assert_eq!(metrics.get_iterations(), 3);
        assert_eq!(metrics.get_cycles(), machine.cycles());
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut machine = Machine::new(MachineConfig::default()).unwrap();
        machine.run_iterations(1).unwrap();
        let snapshot = machine.snapshot().unwrap();
        assert_eq!(snapshot.config_word, 0x3CE4);
        assert_eq!(snapshot.port.tris_writes, 1);
        assert_eq!(snapshot.port.data_writes, 2);
        assert_eq!(snapshot.port.pins, 0x00);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["iterations"], 1);
        assert_eq!(json["fuses"]["oscillator"], "int_rc_no_clk_out");
        assert_eq!(json["port"]["tris_address"], 0x86);
    }
}
