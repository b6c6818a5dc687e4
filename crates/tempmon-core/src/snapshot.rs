//! The latest reading of every quantity, published as one unit.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::calibration::CalibrationResult;
use crate::sensors::{Quantity, Reading};

/// Latest valid reading per quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Snapshot {
    readings: [Option<Reading>; Quantity::COUNT],
}

impl Snapshot {
    /// Seed the first snapshot from the startup calibration.
    pub fn from_calibration(calibration: &CalibrationResult) -> Self {
        let mut snapshot = Self::default();
        snapshot.set(Reading::valid(
            Quantity::Pressure,
            calibration.mean_pressure_pa,
        ));
        if let Some(temperature) = calibration.temperature {
            snapshot.set(Reading::valid(Quantity::Temperature, temperature));
        }
        if let Some(altitude) = calibration.altitude {
            snapshot.set(Reading::valid(Quantity::Altitude, altitude));
        }
        snapshot
    }

    fn set(&mut self, reading: Reading) {
        self.readings[reading.quantity().index()] = Some(reading);
    }

    pub fn get(&self, quantity: Quantity) -> Option<Reading> {
        self.readings[quantity.index()]
    }

    pub fn value(&self, quantity: Quantity) -> Option<f32> {
        self.get(quantity).map(|r| r.value())
    }

    /// Build the next snapshot from a cycle's readings.
    ///
    /// Only valid readings replace an entry; a quantity whose read failed
    /// keeps its previous value.
    pub fn merged(&self, readings: &[Reading]) -> Self {
        let mut next = *self;
        for reading in readings.iter().filter(|r| r.is_valid()) {
            next.set(*reading);
        }
        next
    }
}

/// Shared slot holding the published [`Snapshot`].
///
/// Readers copy the whole snapshot out under the lock and writers replace it
/// under the same lock, so nobody ever observes a mix of two cycles.
pub struct SnapshotCell {
    inner: Mutex<CriticalSectionRawMutex, Cell<Snapshot>>,
}

impl SnapshotCell {
    pub const fn new(initial: Snapshot) -> Self {
        Self {
            inner: Mutex::new(Cell::new(initial)),
        }
    }

    pub fn load(&self) -> Snapshot {
        self.inner.lock(|cell| cell.get())
    }

    pub fn store(&self, snapshot: Snapshot) {
        self.inner.lock(|cell| cell.set(snapshot));
    }

    /// Atomically derive the next snapshot from the current one.
    pub fn update<F>(&self, f: F) -> Snapshot
    where
        F: FnOnce(&Snapshot) -> Snapshot,
    {
        self.inner.lock(|cell| {
            let next = f(&cell.get());
            cell.set(next);
            next
        })
    }
}
