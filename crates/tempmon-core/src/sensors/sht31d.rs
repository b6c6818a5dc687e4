//! SHT31-D relative humidity and temperature sensor.
//!
//! The SHT31-D has no register map: 16-bit commands are written as a
//! "register" byte plus one data byte, and results come back on the next
//! plain read, each 16-bit word followed by a CRC-8.

use embedded_hal::delay::DelayNs;
use log::{debug, error, info};

use super::conversion::{
    ConversionEngine, ConversionRequest, ModeSelect, ReadyCheck, ResultRead, crc8,
};
use super::{Oversampling, Quantity, QuantitySensor, Reading, SensorDescriptor};
use crate::bus::RegisterBus;
use crate::error::SensorError;

pub const ADDRESS: u8 = 0x44;

const SENSOR_NAME: &str = "SHT31-D";

// Single shot, no clock stretching
const CMD_MEAS_HIGHREP: u16 = 0x2400;
const CMD_MEAS_MEDREP: u16 = 0x240B;
const CMD_MEAS_LOWREP: u16 = 0x2416;
const CMD_READ_STATUS: u16 = 0xF32D;
const CMD_CLEAR_STATUS: u16 = 0x3041;
const CMD_SOFT_RESET: u16 = 0x30A2;
const CMD_HEATER_ON: u16 = 0x306D;
const CMD_HEATER_OFF: u16 = 0x3066;

pub const STATUS_DATA_CRC_ERROR: u16 = 0x0001;
pub const STATUS_COMMAND_ERROR: u16 = 0x0002;
pub const STATUS_RESET_DETECTED: u16 = 0x0010;
pub const STATUS_HEATER_ACTIVE: u16 = 0x2000;

const SOFT_RESET_MS: u32 = 2;

const QUANTITIES: &[Quantity] = &[Quantity::Humidity, Quantity::Temperature];

/// Measurement repeatability, the SHT31-D's noise/latency trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeatability {
    Low,
    Medium,
    High,
}

impl Repeatability {
    pub const fn from_oversampling(oversampling: Oversampling) -> Self {
        match oversampling.exponent() {
            0..=1 => Self::Low,
            2..=4 => Self::Medium,
            _ => Self::High,
        }
    }

    const fn command(self) -> u16 {
        match self {
            Self::Low => CMD_MEAS_LOWREP,
            Self::Medium => CMD_MEAS_MEDREP,
            Self::High => CMD_MEAS_HIGHREP,
        }
    }

    /// Maximum conversion time from the datasheet, rounded up.
    const fn conversion_us(self) -> u32 {
        match self {
            Self::Low => 4_500,
            Self::Medium => 6_500,
            Self::High => 15_500,
        }
    }
}

/// Temperature and humidity decoded from one measurement frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temperature_celsius: f32,
    pub humidity_percent: f32,
}

fn checked_word(bytes: &[u8]) -> Result<u16, SensorError> {
    let computed = crc8(&bytes[..2]);
    if computed != bytes[2] {
        error!(
            "{}: CRC mismatch on {:02x}{:02x}: got {:#04x}, computed {:#04x}",
            SENSOR_NAME, bytes[0], bytes[1], bytes[2], computed
        );
        return Err(SensorError::ChecksumMismatch {
            sensor: SENSOR_NAME,
            received: bytes[2],
            computed,
        });
    }
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Decode `[T_hi, T_lo, T_crc, H_hi, H_lo, H_crc]`.
pub fn decode_measurement(frame: &[u8; 6]) -> Result<Measurement, SensorError> {
    let raw_temperature = checked_word(&frame[0..3])?;
    let raw_humidity = checked_word(&frame[3..6])?;

    Ok(Measurement {
        temperature_celsius: 175.0 * f32::from(raw_temperature) / 65535.0 - 45.0,
        humidity_percent: 100.0 * f32::from(raw_humidity) / 65535.0,
    })
}

pub struct Sht31d {
    descriptor: SensorDescriptor,
    repeatability: Repeatability,
}

impl Sht31d {
    pub const fn new(oversampling: Oversampling) -> Self {
        Self {
            descriptor: SensorDescriptor {
                name: SENSOR_NAME,
                address: ADDRESS,
                identity: None,
                quantities: QUANTITIES,
                oversampling,
            },
            repeatability: Repeatability::from_oversampling(oversampling),
        }
    }

    pub const fn repeatability(&self) -> Repeatability {
        self.repeatability
    }

    fn write_command<B: RegisterBus, D: DelayNs>(
        &self,
        engine: &mut ConversionEngine<B, D>,
        command: u16,
    ) -> Result<(), SensorError> {
        let [high, low] = command.to_be_bytes();
        engine.select_mode(self.descriptor.address, high, low)
    }

    /// Read the status word.
    pub fn read_status<B: RegisterBus, D: DelayNs>(
        &self,
        engine: &mut ConversionEngine<B, D>,
    ) -> Result<u16, SensorError> {
        self.write_command(engine, CMD_READ_STATUS)?;
        let mut buf = [0u8; 3];
        engine.read_result(self.descriptor.address, ResultRead::Plain, &mut buf)?;
        checked_word(&buf)
    }

    pub fn clear_status<B: RegisterBus, D: DelayNs>(
        &self,
        engine: &mut ConversionEngine<B, D>,
    ) -> Result<(), SensorError> {
        self.write_command(engine, CMD_CLEAR_STATUS)
    }

    pub fn set_heater<B: RegisterBus, D: DelayNs>(
        &self,
        engine: &mut ConversionEngine<B, D>,
        enable: bool,
    ) -> Result<(), SensorError> {
        self.write_command(engine, if enable { CMD_HEATER_ON } else { CMD_HEATER_OFF })
    }

    pub fn is_heater_active<B: RegisterBus, D: DelayNs>(
        &self,
        engine: &mut ConversionEngine<B, D>,
    ) -> Result<bool, SensorError> {
        Ok(self.read_status(engine)? & STATUS_HEATER_ACTIVE != 0)
    }

    pub fn soft_reset<B: RegisterBus, D: DelayNs>(
        &self,
        engine: &mut ConversionEngine<B, D>,
    ) -> Result<(), SensorError> {
        self.write_command(engine, CMD_SOFT_RESET)?;
        engine.delay_ms(SOFT_RESET_MS);
        Ok(())
    }

    /// Run one single-shot measurement.
    pub fn read_measurement<B: RegisterBus, D: DelayNs>(
        &self,
        engine: &mut ConversionEngine<B, D>,
        quantity: Quantity,
    ) -> Result<Measurement, SensorError> {
        let [high, low] = self.repeatability.command().to_be_bytes();
        let request = ConversionRequest {
            mode: ModeSelect::Register {
                register: high,
                control: low,
            },
            ready: ReadyCheck::Fixed {
                micros: self.repeatability.conversion_us(),
            },
            result: ResultRead::Plain,
        };

        let mut frame = [0u8; 6];
        engine.convert(&self.descriptor, quantity, &request, &mut frame)?;
        let measurement = decode_measurement(&frame)?;
        debug!(
            "{}: {:.2} °C, {:.2} %RH",
            SENSOR_NAME, measurement.temperature_celsius, measurement.humidity_percent
        );
        Ok(measurement)
    }
}

impl<B: RegisterBus, D: DelayNs> QuantitySensor<B, D> for Sht31d {
    fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    fn init(&mut self, engine: &mut ConversionEngine<B, D>) -> Result<(), SensorError> {
        self.soft_reset(engine)?;
        // No id register; a status word with a valid CRC proves the device is there.
        let status = self.read_status(engine).map_err(|e| {
            error!("{}: status readout failed: {}", SENSOR_NAME, e);
            e
        })?;
        info!(
            "{}: status {:#06x}, repeatability {:?}",
            SENSOR_NAME, status, self.repeatability
        );
        // Drop the reset-detected flag so a later readout shows unexpected resets.
        self.clear_status(engine)
    }

    fn measure(
        &mut self,
        engine: &mut ConversionEngine<B, D>,
        quantity: Quantity,
    ) -> Result<Reading, SensorError> {
        let measurement = self.read_measurement(engine, quantity);
        let value = match quantity {
            Quantity::Humidity => measurement.map(|m| m.humidity_percent),
            Quantity::Temperature => measurement.map(|m| m.temperature_celsius),
            _ => {
                return Err(SensorError::Unsupported {
                    sensor: SENSOR_NAME,
                    quantity,
                });
            }
        };
        Reading::from_measurement(quantity, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedBus;
    use embassy_time::Delay;

    const FRAME: [u8; 6] = [0x66, 0x66, 0x93, 0x80, 0x00, 0xA2];

    #[test]
    fn test_decode_measurement() {
        let m = decode_measurement(&FRAME).unwrap();
        assert!((m.temperature_celsius - 25.0).abs() < 0.01);
        assert!((m.humidity_percent - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_corrupted_humidity_word_is_rejected() {
        let mut frame = FRAME;
        frame[4] ^= 0x01;
        assert_eq!(
            decode_measurement(&frame),
            Err(SensorError::ChecksumMismatch {
                sensor: SENSOR_NAME,
                received: 0xA2,
                computed: crc8(&[0x80, 0x01]),
            })
        );
    }

    #[test]
    fn test_repeatability_follows_oversampling() {
        assert_eq!(Sht31d::new(Oversampling::X1).repeatability(), Repeatability::Low);
        assert_eq!(Sht31d::new(Oversampling::X8).repeatability(), Repeatability::Medium);
        assert_eq!(Sht31d::new(Oversampling::X128).repeatability(), Repeatability::High);
    }

    #[test]
    fn test_measure_humidity_sends_command_and_validates_crc() {
        let bus = SimulatedBus::new();
        bus.set_registers(ADDRESS, 0x24, &FRAME);
        let mut engine = ConversionEngine::new(bus.clone(), Delay);
        let mut sht = Sht31d::new(Oversampling::X128);

        let reading = sht.measure(&mut engine, Quantity::Humidity).unwrap();
        assert!(reading.is_valid());
        assert!((reading.value() - 50.0).abs() < 0.01);

        let writes = bus.writes();
        assert_eq!(writes[0].register, 0x24);
        assert_eq!(writes[0].data.as_slice(), &[0x00]);
    }

    #[test]
    fn test_measure_with_bad_crc_is_invalid() {
        let bus = SimulatedBus::new();
        let mut frame = FRAME;
        frame[5] = 0x00;
        bus.set_registers(ADDRESS, 0x24, &frame);
        let mut engine = ConversionEngine::new(bus.clone(), Delay);
        let mut sht = Sht31d::new(Oversampling::X128);

        let reading = sht.measure(&mut engine, Quantity::Humidity).unwrap();
        assert!(!reading.is_valid());
    }

    #[test]
    fn test_init_resets_reads_and_clears_status() {
        let bus = SimulatedBus::new();
        let status = STATUS_RESET_DETECTED.to_be_bytes();
        bus.set_registers(ADDRESS, 0xF3, &[status[0], status[1], crc8(&status)]);
        let mut engine = ConversionEngine::new(bus.clone(), Delay);
        let mut sht = Sht31d::new(Oversampling::X128);

        QuantitySensor::init(&mut sht, &mut engine).unwrap();
        let commands: Vec<_> = bus
            .writes()
            .iter()
            .map(|w| u16::from_be_bytes([w.register, w.data[0]]))
            .collect();
        assert_eq!(commands, vec![CMD_SOFT_RESET, CMD_READ_STATUS, CMD_CLEAR_STATUS]);
    }

    #[test]
    fn test_init_fails_on_corrupted_status() {
        let bus = SimulatedBus::new();
        bus.set_registers(ADDRESS, 0xF3, &[0x00, 0x10, 0x00]);
        let mut engine = ConversionEngine::new(bus.clone(), Delay);
        let mut sht = Sht31d::new(Oversampling::X128);

        assert!(matches!(
            QuantitySensor::init(&mut sht, &mut engine),
            Err(SensorError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_status_and_heater() {
        let bus = SimulatedBus::new();
        let status = STATUS_HEATER_ACTIVE.to_be_bytes();
        bus.set_registers(ADDRESS, 0xF3, &[status[0], status[1], crc8(&status)]);
        let mut engine = ConversionEngine::new(bus.clone(), Delay);
        let sht = Sht31d::new(Oversampling::X128);

        assert!(sht.is_heater_active(&mut engine).unwrap());
        sht.set_heater(&mut engine, false).unwrap();
        let last = bus.writes().pop().unwrap();
        assert_eq!(last.register, 0x30);
        assert_eq!(last.data.as_slice(), &[0x66]);
    }
}
