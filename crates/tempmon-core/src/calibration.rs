//! Startup calibration of the barometric reference.
//!
//! Runs a fixed number of pressure/temperature/altitude rounds, averages the
//! valid samples and writes the resulting reference into the barometer's
//! BAR_IN registers before the serving loop starts.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::bus::RegisterBus;
use crate::error::SensorError;
use crate::sensors::{ConversionEngine, Mpl3115a2, Quantity, QuantitySensor, Reading};

pub const DEFAULT_CALIBRATION_ROUNDS: usize = 5;

/// Divisor applied to the averaged pressure before it is written to BAR_IN.
///
/// Device-specific constant carried over from the deployed hardware; it is
/// not derived from the datasheet.
pub const REFERENCE_PRESSURE_DIVISOR: f64 = 2.0;

/// Quantities sampled in every calibration round, in order.
const ROUND: [Quantity; 3] = [Quantity::Pressure, Quantity::Temperature, Quantity::Altitude];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    /// Value written to the BAR_IN register pair.
    pub reference_pressure: i32,
    /// Mean of the valid pressure samples, in Pascals.
    pub mean_pressure_pa: f32,
    pub temperature: Option<f32>,
    pub altitude: Option<f32>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Sum {
    total: f64,
    count: u32,
}

impl Sum {
    fn add(&mut self, value: f32) {
        self.total += f64::from(value);
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total / f64::from(self.count))
    }
}

/// Running sums of the calibration samples.
///
/// Invalid readings are left out of both the sum and the count, so a timed
/// out conversion cannot drag the average towards zero.
#[derive(Debug, Default, Clone)]
pub struct CalibrationAccumulator {
    pressure: Sum,
    temperature: Sum,
    altitude: Sum,
    skipped: u32,
}

impl CalibrationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, reading: &Reading) {
        if !reading.is_valid() {
            self.skipped += 1;
            return;
        }

        match reading.quantity() {
            Quantity::Pressure => self.pressure.add(reading.value()),
            Quantity::Temperature => self.temperature.add(reading.value()),
            Quantity::Altitude => self.altitude.add(reading.value()),
            _ => {}
        }
    }

    /// Number of invalid readings left out so far.
    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    pub fn finish(&self) -> Result<CalibrationResult, SensorError> {
        let mean_pressure = self
            .pressure
            .mean()
            .ok_or(SensorError::NoValidSamples(Quantity::Pressure))?;

        Ok(CalibrationResult {
            reference_pressure: (mean_pressure / REFERENCE_PRESSURE_DIVISOR) as i32,
            mean_pressure_pa: mean_pressure as f32,
            temperature: self.temperature.mean().map(|t| t as f32),
            altitude: self.altitude.mean().map(|a| a as f32),
        })
    }
}

/// Sample `rounds` times, then write the averaged reference pressure.
///
/// Blocks until done. Transport errors abort immediately. `stop` is checked
/// before every conversion; once it is raised the procedure returns
/// `Ok(None)` without writing BAR_IN.
pub fn calibrate<B: RegisterBus, D: DelayNs>(
    barometer: &mut Mpl3115a2,
    engine: &mut ConversionEngine<B, D>,
    rounds: usize,
    stop: &AtomicBool,
) -> Result<Option<CalibrationResult>, SensorError> {
    let mut accumulator = CalibrationAccumulator::new();

    for round in 0..rounds {
        for quantity in ROUND {
            if stop.load(Ordering::Acquire) {
                info!("Calibration interrupted in round {} of {}", round + 1, rounds);
                return Ok(None);
            }
            let reading = barometer.measure(engine, quantity)?;
            accumulator.add(&reading);
        }
        info!("Calibration round {} of {}", round + 1, rounds);
    }

    if accumulator.skipped() > 0 {
        warn!(
            "Calibration skipped {} invalid samples",
            accumulator.skipped()
        );
    }

    let result = accumulator.finish()?;
    barometer.write_reference_pressure(engine, result.reference_pressure)?;

    info!(
        "Calibrated: reference {} ({:.2} Pa mean), {:?} °C, altitude {:?}",
        result.reference_pressure, result.mean_pressure_pa, result.temperature, result.altitude
    );
    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Oversampling;
    use crate::sensors::mpl3115a2::ADDRESS;
    use crate::simulated::SimulatedBus;
    use embassy_time::{Delay, Duration};

    #[test]
    fn test_average_of_five_rounds() {
        let mut acc = CalibrationAccumulator::new();
        for p in [100.0, 102.0, 98.0, 101.0, 99.0] {
            acc.add(&Reading::valid(Quantity::Pressure, p));
            acc.add(&Reading::valid(Quantity::Temperature, 20.0));
            acc.add(&Reading::valid(Quantity::Altitude, 10.0));
        }

        let result = acc.finish().unwrap();
        assert_eq!(result.reference_pressure, 50);
        assert_eq!(result.mean_pressure_pa, 100.0);
        assert_eq!(result.temperature, Some(20.0));
        assert_eq!(result.altitude, Some(10.0));
    }

    #[test]
    fn test_invalid_samples_are_skipped() {
        let mut acc = CalibrationAccumulator::new();
        acc.add(&Reading::valid(Quantity::Pressure, 100.0));
        acc.add(&Reading::invalid(Quantity::Pressure));
        acc.add(&Reading::valid(Quantity::Pressure, 104.0));

        let result = acc.finish().unwrap();
        assert_eq!(acc.skipped(), 1);
        assert_eq!(result.reference_pressure, 51);
        assert_eq!(result.temperature, None);
    }

    #[test]
    fn test_no_valid_pressure_is_an_error() {
        let mut acc = CalibrationAccumulator::new();
        acc.add(&Reading::invalid(Quantity::Pressure));
        acc.add(&Reading::valid(Quantity::Temperature, 20.0));
        assert_eq!(
            acc.finish(),
            Err(SensorError::NoValidSamples(Quantity::Pressure))
        );
    }

    #[test]
    fn test_calibrate_writes_reference_to_bar_in() {
        let bus = SimulatedBus::new();
        bus.set_registers(ADDRESS, 0x00, &[0x06, 0x62, 0xE0, 0x80, 0x15, 0x80]);
        let mut engine = ConversionEngine::new(bus.clone(), Delay)
            .with_timeout(Duration::from_millis(20));
        let mut baro = Mpl3115a2::new(Oversampling::X128);

        let stop = AtomicBool::new(false);
        let result = calibrate(&mut baro, &mut engine, DEFAULT_CALIBRATION_ROUNDS, &stop)
            .unwrap()
            .unwrap();
        assert_eq!(result.mean_pressure_pa, 101_250.0);
        assert_eq!(result.reference_pressure, 50_625);
        assert_eq!(result.temperature, Some(21.5));

        let writes = bus.writes();
        let bar_in = writes.last().unwrap();
        assert_eq!(bar_in.register, 0x14);
        assert_eq!(bar_in.data.as_slice(), &50_625_u16.to_be_bytes());
        // Three mode selects per round, then the reference.
        assert_eq!(writes.len(), DEFAULT_CALIBRATION_ROUNDS * 3 + 1);
    }

    #[test]
    fn test_calibrate_fails_when_barometer_never_ready() {
        let bus = SimulatedBus::new();
        let mut engine = ConversionEngine::new(bus.clone(), Delay)
            .with_timeout(Duration::from_millis(5));
        let mut baro = Mpl3115a2::new(Oversampling::X128);

        assert_eq!(
            calibrate(&mut baro, &mut engine, 2, &AtomicBool::new(false)),
            Err(SensorError::NoValidSamples(Quantity::Pressure))
        );
        assert!(bus.writes().iter().all(|w| w.register != 0x14));
    }

    #[test]
    fn test_raised_stop_ends_calibration_without_reference() {
        let bus = SimulatedBus::new();
        bus.set_registers(ADDRESS, 0x00, &[0x06, 0x62, 0xE0, 0x80, 0x15, 0x80]);
        let mut engine = ConversionEngine::new(bus.clone(), Delay);
        let mut baro = Mpl3115a2::new(Oversampling::X128);

        let stop = AtomicBool::new(true);
        assert_eq!(
            calibrate(&mut baro, &mut engine, DEFAULT_CALIBRATION_ROUNDS, &stop),
            Ok(None)
        );
        assert!(bus.writes().is_empty());
    }
}
