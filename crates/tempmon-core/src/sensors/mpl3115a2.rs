//! MPL3115A2 barometric pressure / altitude / temperature sensor.
//!
//! The device runs in active (continuous) mode; each request rewrites
//! CTRL_REG1 to choose barometer or altimeter output and then polls the
//! data-ready flags in STATUS.

use embedded_hal::delay::DelayNs;
use log::info;

use super::conversion::{ConversionEngine, ConversionRequest, ModeSelect, ReadyCheck, ResultRead};
use super::{IdentityRegister, Oversampling, Quantity, QuantitySensor, Reading, SensorDescriptor};
use crate::bus::RegisterBus;
use crate::error::SensorError;

pub const ADDRESS: u8 = 0x60;

// Registers
const REG_STATUS: u8 = 0x00;
const REG_OUT_P_MSB: u8 = 0x01;
const REG_OUT_T_MSB: u8 = 0x04;
const REG_WHO_AM_I: u8 = 0x0C;
const REG_PT_DATA_CFG: u8 = 0x13;
const REG_BAR_IN_MSB: u8 = 0x14;
const REG_CTRL_REG1: u8 = 0x26;

const WHO_AM_I_VALUE: u8 = 0xC4;

// STATUS bits
const STATUS_TDR: u8 = 0x02;
const STATUS_PDR: u8 = 0x04;

// PT_DATA_CFG bits
const PT_DATA_CFG_TDEFE: u8 = 0x01;
const PT_DATA_CFG_PDEFE: u8 = 0x02;
const PT_DATA_CFG_DREM: u8 = 0x04;

// CTRL_REG1 bits
const CTRL_REG1_SBYB: u8 = 0x01;
const CTRL_REG1_BAR: u8 = 0x00;
const CTRL_REG1_ALT: u8 = 0x80;

const QUANTITIES: &[Quantity] = &[Quantity::Temperature, Quantity::Pressure, Quantity::Altitude];

/// Decode OUT_P in barometer mode: unsigned Q18.2 Pascals, left-aligned in
/// 24 bits, so the raw word divided by 64 is exact.
pub fn decode_pressure(raw: [u8; 3]) -> f32 {
    let word = (u32::from(raw[0]) << 16) | (u32::from(raw[1]) << 8) | u32::from(raw[2]);
    word as f32 / 64.0
}

/// Decode OUT_P in altimeter mode.
///
/// Keeps the device-compatible weighting `((msb<<24)|(csb<<16)|lsb) * 10 /
/// 65536` but reads the 32-bit word as two's complement, so an integer part
/// of 0x8000 or more is below sea level.
pub fn decode_altitude(raw: [u8; 3]) -> f32 {
    let word = i32::from_be_bytes([raw[0], raw[1], 0, raw[2]]);
    (f64::from(word) * 10.0 / 65536.0) as f32
}

/// Decode OUT_T: signed integer degrees plus a 4-bit fraction in the high
/// nibble of the second byte.
pub fn decode_temperature(raw: [u8; 2]) -> f32 {
    f32::from(raw[0] as i8) + f32::from(raw[1] >> 4) / 16.0
}

pub struct Mpl3115a2 {
    descriptor: SensorDescriptor,
}

impl Mpl3115a2 {
    pub const fn new(oversampling: Oversampling) -> Self {
        Self {
            descriptor: SensorDescriptor {
                name: "MPL3115A2",
                address: ADDRESS,
                identity: Some(IdentityRegister {
                    register: REG_WHO_AM_I,
                    expected: WHO_AM_I_VALUE,
                }),
                quantities: QUANTITIES,
                oversampling,
            },
        }
    }

    /// CTRL_REG1 value: active mode, oversampling ratio and output mode.
    pub const fn control_word(&self, altimeter: bool) -> u8 {
        let mode = if altimeter { CTRL_REG1_ALT } else { CTRL_REG1_BAR };
        CTRL_REG1_SBYB | (self.descriptor.oversampling.exponent() << 3) | mode
    }

    fn request(&self, quantity: Quantity) -> ConversionRequest {
        let altimeter = quantity == Quantity::Altitude;
        let (ready_mask, result) = match quantity {
            Quantity::Temperature => (STATUS_TDR, REG_OUT_T_MSB),
            _ => (STATUS_PDR, REG_OUT_P_MSB),
        };
        ConversionRequest {
            mode: ModeSelect::Register {
                register: REG_CTRL_REG1,
                control: self.control_word(altimeter),
            },
            ready: ReadyCheck::StatusBit {
                register: REG_STATUS,
                mask: ready_mask,
            },
            result: ResultRead::Register(result),
        }
    }

    /// Write the barometric reference (BAR_IN, big-endian) used by the
    /// altimeter computation.
    pub fn write_reference_pressure<B: RegisterBus, D: DelayNs>(
        &mut self,
        engine: &mut ConversionEngine<B, D>,
        reference: i32,
    ) -> Result<(), SensorError> {
        let bytes = (reference as u16).to_be_bytes();
        info!(
            "MPL3115A2: writing reference pressure {} ({:#04x} {:#04x})",
            reference, bytes[0], bytes[1]
        );
        engine
            .bus_mut()
            .write_block(self.descriptor.address, REG_BAR_IN_MSB, &bytes)
    }

    fn convert<B: RegisterBus, D: DelayNs, const N: usize>(
        &self,
        engine: &mut ConversionEngine<B, D>,
        quantity: Quantity,
    ) -> Result<[u8; N], SensorError> {
        let mut raw = [0u8; N];
        engine.convert(&self.descriptor, quantity, &self.request(quantity), &mut raw)?;
        Ok(raw)
    }
}

impl<B: RegisterBus, D: DelayNs> QuantitySensor<B, D> for Mpl3115a2 {
    fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    fn init(&mut self, engine: &mut ConversionEngine<B, D>) -> Result<(), SensorError> {
        engine.verify_identity(&self.descriptor)?;

        let address = self.descriptor.address;
        engine.select_mode(address, REG_CTRL_REG1, self.control_word(false))?;
        engine.bus_mut().write_byte(
            address,
            REG_PT_DATA_CFG,
            PT_DATA_CFG_TDEFE | PT_DATA_CFG_PDEFE | PT_DATA_CFG_DREM,
        )?;

        info!(
            "MPL3115A2: barometer mode, oversampling {:?}",
            self.descriptor.oversampling
        );
        Ok(())
    }

    fn measure(
        &mut self,
        engine: &mut ConversionEngine<B, D>,
        quantity: Quantity,
    ) -> Result<Reading, SensorError> {
        let value = match quantity {
            Quantity::Pressure => self.convert::<B, D, 3>(engine, quantity).map(decode_pressure),
            Quantity::Altitude => self.convert::<B, D, 3>(engine, quantity).map(decode_altitude),
            Quantity::Temperature => {
                self.convert::<B, D, 2>(engine, quantity).map(decode_temperature)
            }
            _ => {
                return Err(SensorError::Unsupported {
                    sensor: self.descriptor.name,
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
    use embassy_time::{Delay, Duration};

    fn engine(bus: &SimulatedBus) -> ConversionEngine<SimulatedBus, Delay> {
        ConversionEngine::new(bus.clone(), Delay)
            .with_timeout(Duration::from_millis(20))
            .with_poll_interval_us(100)
    }

    #[test]
    fn test_pressure_decode_is_exact() {
        for raw in [[0x62, 0xE0, 0x80], [0x00, 0x00, 0x01], [0xFF, 0xFF, 0xFF], [0x12, 0x34, 0x56]] {
            let word = (u32::from(raw[0]) << 16) | (u32::from(raw[1]) << 8) | u32::from(raw[2]);
            assert_eq!(decode_pressure(raw), word as f32 / 64.0);
        }
        assert_eq!(decode_pressure([0x62, 0xE0, 0x80]), 101_250.0);
    }

    #[test]
    fn test_altitude_with_high_integer_part_is_negative() {
        for msb in 0x80..=0xFF_u8 {
            for csb in [0x00, 0x7F, 0xFF] {
                assert!(decode_altitude([msb, csb, 0x00]) < 0.0, "{:#04x}{:02x}", msb, csb);
            }
        }
        assert_eq!(decode_altitude([0x80, 0x00, 0x00]), -327_680.0);
    }

    #[test]
    fn test_altitude_positive_values_keep_reference_weighting() {
        // integer part 16 → 16 * 65536 * 10 / 65536
        assert_eq!(decode_altitude([0x00, 0x10, 0x00]), 160.0);
    }

    #[test]
    fn test_temperature_decode() {
        assert_eq!(decode_temperature([0x15, 0x80]), 21.5);
        assert_eq!(decode_temperature([0x00, 0x10]), 0.0625);
        assert_eq!(decode_temperature([0xFF, 0x80]), -0.5);
    }

    #[test]
    fn test_control_word_composes_mode_bits() {
        let baro = Mpl3115a2::new(Oversampling::X128);
        assert_eq!(baro.control_word(false), 0x39);
        assert_eq!(baro.control_word(true), 0xB9);
        assert_eq!(Mpl3115a2::new(Oversampling::X1).control_word(false), 0x01);
    }

    #[test]
    fn test_init_checks_identity_and_configures() {
        let bus = SimulatedBus::new();
        let mut engine = engine(&bus);
        let mut baro = Mpl3115a2::new(Oversampling::X128);

        bus.set_registers(ADDRESS, REG_WHO_AM_I, &[0x00]);
        assert!(matches!(
            QuantitySensor::init(&mut baro, &mut engine),
            Err(SensorError::IdentityMismatch { found: 0x00, .. })
        ));

        bus.set_registers(ADDRESS, REG_WHO_AM_I, &[WHO_AM_I_VALUE]);
        QuantitySensor::init(&mut baro, &mut engine).unwrap();
        let writes = bus.writes();
        assert_eq!(writes[0].register, REG_CTRL_REG1);
        assert_eq!(writes[0].data.as_slice(), &[0x39]);
        assert_eq!(writes[1].register, REG_PT_DATA_CFG);
        assert_eq!(writes[1].data.as_slice(), &[0x07]);
    }

    #[test]
    fn test_measure_pressure_and_temperature() {
        let bus = SimulatedBus::new();
        bus.set_registers(ADDRESS, REG_STATUS, &[STATUS_PDR | STATUS_TDR]);
        bus.set_registers(ADDRESS, REG_OUT_P_MSB, &[0x62, 0xE0, 0x80, 0x15, 0x80]);
        let mut engine = engine(&bus);
        let mut baro = Mpl3115a2::new(Oversampling::X128);

        let pressure = baro.measure(&mut engine, Quantity::Pressure).unwrap();
        assert!(pressure.is_valid());
        assert_eq!(pressure.value(), 101_250.0);

        let temperature = baro.measure(&mut engine, Quantity::Temperature).unwrap();
        assert_eq!(temperature.value(), 21.5);
    }

    #[test]
    fn test_measure_timeout_yields_invalid_reading() {
        let bus = SimulatedBus::new();
        bus.set_registers(ADDRESS, REG_STATUS, &[STATUS_TDR]);
        let mut engine = engine(&bus);
        let mut baro = Mpl3115a2::new(Oversampling::X128);

        let reading = baro.measure(&mut engine, Quantity::Pressure).unwrap();
        assert!(!reading.is_valid());
    }

    #[test]
    fn test_humidity_is_unsupported() {
        let bus = SimulatedBus::new();
        let mut engine = engine(&bus);
        let mut baro = Mpl3115a2::new(Oversampling::X128);
        assert!(matches!(
            baro.measure(&mut engine, Quantity::Humidity),
            Err(SensorError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_reference_pressure_written_big_endian() {
        let bus = SimulatedBus::new();
        let mut engine = engine(&bus);
        let mut baro = Mpl3115a2::new(Oversampling::X128);

        baro.write_reference_pressure(&mut engine, 50_662).unwrap();
        let writes = bus.writes();
        assert_eq!(writes[0].register, REG_BAR_IN_MSB);
        assert_eq!(writes[0].data.as_slice(), &[0xC5, 0xE6]);
    }
}
