//! Background acquisition of sensor readings.
//!
//! A [`SensorSet`] owns the conversion engine and every active driver. The
//! [`SamplingCoordinator`] moves the set onto a short-lived background thread
//! for one acquisition cycle and takes it back when the thread is joined, so
//! at most one cycle is ever in flight and the render loop never touches the
//! bus directly.

use core::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use log::{debug, error, info};

use crate::bus::RegisterBus;
use crate::error::SensorError;
use crate::sensors::{ConversionEngine, Quantity, QuantitySensor, Reading};
use crate::snapshot::{Snapshot, SnapshotCell};

/// Quantities read by one acquisition cycle, in order.
pub const ACQUISITION_ORDER: [Quantity; 4] = [
    Quantity::Temperature,
    Quantity::Pressure,
    Quantity::Luminosity,
    Quantity::Humidity,
];

/// Default pause at the end of every cycle.
pub const DEFAULT_CYCLE_DELAY: Duration = Duration::from_millis(3000);

pub type DynSensor<B, D> = Box<dyn QuantitySensor<B, D> + Send>;

/// The engine plus every initialized sensor.
pub struct SensorSet<B, D> {
    engine: ConversionEngine<B, D>,
    sensors: Vec<DynSensor<B, D>>,
}

impl<B: RegisterBus, D: DelayNs> SensorSet<B, D> {
    pub fn new(engine: ConversionEngine<B, D>) -> Self {
        Self {
            engine,
            sensors: Vec::new(),
        }
    }

    /// Initialize `sensor` and add it to the set.
    pub fn attach(&mut self, mut sensor: DynSensor<B, D>) -> Result<(), SensorError> {
        sensor.init(&mut self.engine)?;
        info!("Attached {}", sensor.descriptor().name);
        self.sensors.push(sensor);
        Ok(())
    }

    /// Add a sensor that has already been initialized, e.g. the barometer
    /// after calibration.
    pub fn push_initialized(&mut self, sensor: DynSensor<B, D>) {
        info!("Attached {}", sensor.descriptor().name);
        self.sensors.push(sensor);
    }

    pub fn engine_mut(&mut self) -> &mut ConversionEngine<B, D> {
        &mut self.engine
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Index of the sensor serving `quantity`: the first attached one that
    /// provides it.
    fn provider(&self, quantity: Quantity) -> Option<usize> {
        self.sensors
            .iter()
            .position(|s| s.descriptor().provides(quantity))
    }

    /// Run one conversion per quantity in [`ACQUISITION_ORDER`].
    ///
    /// Quantities nobody provides are skipped. Timeouts and checksum
    /// failures come back as invalid readings; transport errors end the
    /// cycle.
    pub fn acquire(&mut self) -> Result<Vec<Reading>, SensorError> {
        let mut readings = Vec::with_capacity(ACQUISITION_ORDER.len());
        for quantity in ACQUISITION_ORDER {
            let Some(index) = self.provider(quantity) else {
                continue;
            };
            let reading = self.sensors[index].measure(&mut self.engine, quantity)?;
            readings.push(reading);
        }
        Ok(readings)
    }

    /// Acquire, publish into `cell`, then sleep `cycle_delay`.
    pub fn run_cycle(
        &mut self,
        cell: &SnapshotCell,
        cycle_delay: Duration,
    ) -> Result<(), SensorError> {
        let readings = self.acquire()?;
        let snapshot = cell.update(|previous| previous.merged(&readings));
        debug!(
            "Published snapshot: {} readings, {} valid, {:?}",
            readings.len(),
            readings.iter().filter(|r| r.is_valid()).count(),
            snapshot
        );

        let delay_ms = u32::try_from(cycle_delay.as_millis()).unwrap_or(u32::MAX);
        self.engine.delay_ms(delay_ms);
        Ok(())
    }
}

type CycleOutcome<B, D> = (SensorSet<B, D>, Result<(), SensorError>);

enum Slot<B, D> {
    Idle(SensorSet<B, D>),
    Running(JoinHandle<CycleOutcome<B, D>>),
    /// The set was lost to a failed spawn or a panicked cycle.
    Empty,
}

/// Owns the single in-flight acquisition task.
pub struct SamplingCoordinator<B, D> {
    slot: Slot<B, D>,
    cell: Arc<SnapshotCell>,
    cycle_delay: Duration,
    cycles_started: u32,
}

impl<B, D> SamplingCoordinator<B, D>
where
    B: RegisterBus + Send + 'static,
    D: DelayNs + Send + 'static,
{
    /// `initial` is published before the first cycle runs, so readers never
    /// see an empty display.
    pub fn new(sensors: SensorSet<B, D>, initial: Snapshot, cycle_delay: Duration) -> Self {
        Self {
            slot: Slot::Idle(sensors),
            cell: Arc::new(SnapshotCell::new(initial)),
            cycle_delay,
            cycles_started: 0,
        }
    }

    /// Whether a background cycle is still running.
    pub fn is_active(&self) -> bool {
        matches!(&self.slot, Slot::Running(handle) if !handle.is_finished())
    }

    pub fn cycles_started(&self) -> u32 {
        self.cycles_started
    }

    /// Copy of the last published snapshot.
    pub fn latest(&self) -> Snapshot {
        self.cell.load()
    }

    /// Non-blocking step for the render loop.
    ///
    /// Collects a finished cycle, starts the next one if nothing is in
    /// flight and returns the latest snapshot. The error of a failed cycle
    /// is reported here, on the poll that collects it.
    pub fn poll(&mut self) -> Result<Snapshot, SensorError> {
        if matches!(&self.slot, Slot::Running(handle) if handle.is_finished()) {
            self.join()?;
        }
        if matches!(self.slot, Slot::Idle(_)) {
            self.spawn()?;
        }
        Ok(self.latest())
    }

    /// Block until the in-flight cycle, if any, has finished.
    pub fn wait(&mut self) -> Result<(), SensorError> {
        self.join()
    }

    fn join(&mut self) -> Result<(), SensorError> {
        match mem::replace(&mut self.slot, Slot::Empty) {
            Slot::Running(handle) => {
                let (sensors, result) = handle.join().map_err(|_| {
                    error!("Sampling thread panicked");
                    SensorError::WorkerLost
                })?;
                self.slot = Slot::Idle(sensors);
                result
            }
            other => {
                self.slot = other;
                Ok(())
            }
        }
    }

    fn spawn(&mut self) -> Result<(), SensorError> {
        let Slot::Idle(mut sensors) = mem::replace(&mut self.slot, Slot::Empty) else {
            return Ok(());
        };

        let cell = self.cell.clone();
        let cycle_delay = self.cycle_delay;
        self.cycles_started += 1;
        debug!("Starting acquisition cycle {}", self.cycles_started);

        let handle = thread::Builder::new()
            .name("sampler".into())
            .spawn(move || {
                let result = sensors.run_cycle(&cell, cycle_delay);
                (sensors, result)
            })
            .map_err(|e| {
                error!("Failed to spawn sampling thread: {}", e);
                SensorError::WorkerLost
            })?;

        self.slot = Slot::Running(handle);
        Ok(())
    }
}
