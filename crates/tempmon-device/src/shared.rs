//! One physical I2C adapter shared by the display and the sampling thread.
//!
//! Each user gets its own `embedded_hal_bus::i2c::MutexDevice` over the same
//! `std::sync::Mutex`, so a transaction holds only the bus lock and never
//! the critical section the snapshot cell uses.

use std::sync::Mutex;

use embedded_hal_bus::i2c::MutexDevice;

/// Move `bus` into a process-lifetime mutex that devices can borrow from
/// any thread.
pub fn share<T: Send>(bus: T) -> &'static Mutex<T> {
    Box::leak(Box::new(Mutex::new(bus)))
}

/// A new handle onto a shared bus.
pub fn device<T>(bus: &'static Mutex<T>) -> MutexDevice<'static, T> {
    MutexDevice::new(bus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation};
    use tempmon_core::bus::RegisterBus;
    use tempmon_core::simulated::SimulatedBus;
    use tempmon_core::snapshot::{Snapshot, SnapshotCell};

    /// Bus whose every transaction takes `latency`.
    struct SlowBus {
        latency: Duration,
    }

    impl ErrorType for SlowBus {
        type Error = ErrorKind;
    }

    impl I2c for SlowBus {
        fn transaction(
            &mut self,
            _address: u8,
            _operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            thread::sleep(self.latency);
            Ok(())
        }
    }

    #[test]
    fn test_handles_share_one_bus() {
        let sim = SimulatedBus::new();
        let bus = share(sim.clone());
        let mut display = device(bus);
        let mut sensors = device(bus);

        display.write_byte(0x3C, 0x00, 0xAF).unwrap();
        sensors.write_byte(0x60, 0x26, 0x39).unwrap();

        let writes = sim.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].address, 0x3C);
        assert_eq!(writes[1].address, 0x60);
    }

    #[test]
    fn test_snapshot_reads_do_not_wait_for_bus_io() {
        let bus = share(SlowBus {
            latency: Duration::from_millis(300),
        });
        let cell = SnapshotCell::new(Snapshot::default());

        let sampler = thread::spawn(move || device(bus).write(0x60, &[0x26, 0x39]));
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        let _ = cell.load();
        let waited = started.elapsed();

        assert!(waited < Duration::from_millis(50), "load waited {:?}", waited);
        sampler.join().unwrap().unwrap();
    }
}
