//! TSL2591 ambient light sensor.
//!
//! Every register access goes through the command bit (0xA0, normal
//! transaction). A conversion powers the ALS engine up, waits for AVALID,
//! reads both ADC channels and powers back down.

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use super::conversion::{ConversionEngine, ConversionRequest, ModeSelect, ReadyCheck, ResultRead};
use super::{IdentityRegister, Oversampling, Quantity, QuantitySensor, Reading, SensorDescriptor};
use crate::bus::RegisterBus;
use crate::error::SensorError;

pub const ADDRESS: u8 = 0x29;

const SENSOR_NAME: &str = "TSL2591";

const COMMAND_BIT: u8 = 0xA0;

// Registers (without the command bit)
const REG_ENABLE: u8 = 0x00;
const REG_CONTROL: u8 = 0x01;
const REG_ID: u8 = 0x12;
const REG_STATUS: u8 = 0x13;
const REG_C0DATAL: u8 = 0x14;

const ID_VALUE: u8 = 0x50;

const ENABLE_POWEROFF: u8 = 0x00;
const ENABLE_POWERON: u8 = 0x01;
const ENABLE_AEN: u8 = 0x02;

const STATUS_AVALID: u8 = 0x01;

const LUX_DF: f32 = 408.0;
const LUX_COEFB: f32 = 1.64;
const LUX_COEFC: f32 = 0.59;
const LUX_COEFD: f32 = 0.86;

const QUANTITIES: &[Quantity] = &[Quantity::Luminosity];

/// ALS analog gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    #[default]
    Low,
    Medium,
    High,
    Max,
}

impl Gain {
    const fn bits(self) -> u8 {
        match self {
            Self::Low => 0x00,
            Self::Medium => 0x10,
            Self::High => 0x20,
            Self::Max => 0x30,
        }
    }

    pub const fn multiplier(self) -> f32 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 25.0,
            Self::High => 428.0,
            Self::Max => 9876.0,
        }
    }
}

/// ALS integration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationTime {
    #[default]
    Ms100,
    Ms200,
    Ms300,
    Ms400,
    Ms500,
    Ms600,
}

impl IntegrationTime {
    const fn bits(self) -> u8 {
        match self {
            Self::Ms100 => 0x00,
            Self::Ms200 => 0x01,
            Self::Ms300 => 0x02,
            Self::Ms400 => 0x03,
            Self::Ms500 => 0x04,
            Self::Ms600 => 0x05,
        }
    }

    pub const fn millis(self) -> u32 {
        100 * (self.bits() as u32 + 1)
    }
}

/// Raw ADC counts of both channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightChannels {
    /// Channel 0, visible + infrared.
    pub full: u16,
    /// Channel 1, infrared only.
    pub infrared: u16,
}

impl LightChannels {
    pub const fn from_bytes(raw: [u8; 4]) -> Self {
        Self {
            full: u16::from_le_bytes([raw[0], raw[1]]),
            infrared: u16::from_le_bytes([raw[2], raw[3]]),
        }
    }

    pub const fn is_saturated(&self) -> bool {
        self.full == u16::MAX || self.infrared == u16::MAX
    }

    /// Visible-only counts.
    pub const fn visible(&self) -> u16 {
        self.full.saturating_sub(self.infrared)
    }
}

/// Convert channel counts to lux for the given gain and integration time.
pub fn calculate_lux(
    channels: LightChannels,
    gain: Gain,
    integration: IntegrationTime,
) -> Result<f32, SensorError> {
    if channels.is_saturated() {
        return Err(SensorError::Saturated {
            sensor: SENSOR_NAME,
        });
    }

    let full = f32::from(channels.full);
    let ir = f32::from(channels.infrared);
    let cpl = integration.millis() as f32 * gain.multiplier() / LUX_DF;

    let lux1 = (full - LUX_COEFB * ir) / cpl;
    let lux2 = (LUX_COEFC * full - LUX_COEFD * ir) / cpl;
    Ok(lux1.max(lux2).max(0.0))
}

pub struct Tsl2591 {
    descriptor: SensorDescriptor,
    gain: Gain,
    integration: IntegrationTime,
}

impl Tsl2591 {
    pub const fn new(gain: Gain, integration: IntegrationTime) -> Self {
        Self {
            descriptor: SensorDescriptor {
                name: SENSOR_NAME,
                address: ADDRESS,
                identity: Some(IdentityRegister {
                    register: COMMAND_BIT | REG_ID,
                    expected: ID_VALUE,
                }),
                quantities: QUANTITIES,
                oversampling: Oversampling::X1,
            },
            gain,
            integration,
        }
    }

    fn set_enable<B: RegisterBus, D: DelayNs>(
        &self,
        engine: &mut ConversionEngine<B, D>,
        value: u8,
    ) -> Result<(), SensorError> {
        engine.select_mode(self.descriptor.address, COMMAND_BIT | REG_ENABLE, value)
    }

    /// Run one conversion and return the raw channel counts.
    pub fn read_channels<B: RegisterBus, D: DelayNs>(
        &self,
        engine: &mut ConversionEngine<B, D>,
    ) -> Result<LightChannels, SensorError> {
        let request = ConversionRequest {
            mode: ModeSelect::Register {
                register: COMMAND_BIT | REG_ENABLE,
                control: ENABLE_POWERON | ENABLE_AEN,
            },
            ready: ReadyCheck::StatusBit {
                register: COMMAND_BIT | REG_STATUS,
                mask: STATUS_AVALID,
            },
            result: ResultRead::Register(COMMAND_BIT | REG_C0DATAL),
        };

        let mut raw = [0u8; 4];
        let converted = engine.convert(&self.descriptor, Quantity::Luminosity, &request, &mut raw);
        // Power down even when the conversion failed.
        self.set_enable(engine, ENABLE_POWEROFF)?;
        converted?;

        let channels = LightChannels::from_bytes(raw);
        debug!(
            "{}: full {} ir {}",
            SENSOR_NAME, channels.full, channels.infrared
        );
        Ok(channels)
    }
}

impl<B: RegisterBus, D: DelayNs> QuantitySensor<B, D> for Tsl2591 {
    fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    fn init(&mut self, engine: &mut ConversionEngine<B, D>) -> Result<(), SensorError> {
        engine.verify_identity(&self.descriptor)?;
        engine.bus_mut().write_byte(
            self.descriptor.address,
            COMMAND_BIT | REG_CONTROL,
            self.gain.bits() | self.integration.bits(),
        )?;
        self.set_enable(engine, ENABLE_POWEROFF)
    }

    fn measure(
        &mut self,
        engine: &mut ConversionEngine<B, D>,
        quantity: Quantity,
    ) -> Result<Reading, SensorError> {
        if quantity != Quantity::Luminosity {
            return Err(SensorError::Unsupported {
                sensor: SENSOR_NAME,
                quantity,
            });
        }

        let lux = self
            .read_channels(engine)
            .and_then(|channels| calculate_lux(channels, self.gain, self.integration));
        if let Err(SensorError::Saturated { .. }) = lux {
            warn!("{}: saturated at gain {:?}", SENSOR_NAME, self.gain);
        }
        Reading::from_measurement(quantity, lux)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedBus;
    use embassy_time::{Delay, Duration};

    #[test]
    fn test_lux_with_no_infrared() {
        let channels = LightChannels {
            full: 100,
            infrared: 0,
        };
        let lux = calculate_lux(channels, Gain::Low, IntegrationTime::Ms100).unwrap();
        assert!((lux - 408.0).abs() < 0.01);
    }

    #[test]
    fn test_lux_scales_with_gain_and_integration() {
        let channels = LightChannels {
            full: 1000,
            infrared: 200,
        };
        let low = calculate_lux(channels, Gain::Low, IntegrationTime::Ms100).unwrap();
        let medium = calculate_lux(channels, Gain::Medium, IntegrationTime::Ms200).unwrap();
        assert!((low / medium - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_lux_never_negative() {
        let channels = LightChannels {
            full: 10,
            infrared: 50,
        };
        assert_eq!(
            calculate_lux(channels, Gain::Low, IntegrationTime::Ms100),
            Ok(0.0)
        );
    }

    #[test]
    fn test_saturated_channel_is_rejected() {
        let channels = LightChannels {
            full: u16::MAX,
            infrared: 10,
        };
        assert!(calculate_lux(channels, Gain::Low, IntegrationTime::Ms100).is_err());
    }

    #[test]
    fn test_channels_are_little_endian() {
        let channels = LightChannels::from_bytes([0x34, 0x12, 0x78, 0x56]);
        assert_eq!(channels.full, 0x1234);
        assert_eq!(channels.infrared, 0x5678);
        assert_eq!(channels.visible(), 0);
    }

    #[test]
    fn test_measure_powers_up_and_down() {
        let bus = SimulatedBus::new();
        bus.set_registers(ADDRESS, COMMAND_BIT | REG_STATUS, &[STATUS_AVALID, 100, 0, 0, 0]);
        let mut engine = ConversionEngine::new(bus.clone(), Delay);
        let mut tsl = Tsl2591::new(Gain::Low, IntegrationTime::Ms100);

        let reading = tsl.measure(&mut engine, Quantity::Luminosity).unwrap();
        assert!(reading.is_valid());
        assert!((reading.value() - 408.0).abs() < 0.01);

        let writes = bus.writes();
        assert_eq!(writes[0].data.as_slice(), &[ENABLE_POWERON | ENABLE_AEN]);
        assert_eq!(writes[1].data.as_slice(), &[ENABLE_POWEROFF]);

        assert_eq!(
            tsl.read_channels(&mut engine).unwrap(),
            LightChannels {
                full: 100,
                infrared: 0
            }
        );
    }

    #[test]
    fn test_timeout_still_powers_down() {
        let bus = SimulatedBus::new();
        let mut engine = ConversionEngine::new(bus.clone(), Delay)
            .with_timeout(Duration::from_millis(10))
            .with_poll_interval_us(100);
        let mut tsl = Tsl2591::new(Gain::Low, IntegrationTime::Ms100);

        let reading = tsl.measure(&mut engine, Quantity::Luminosity).unwrap();
        assert!(!reading.is_valid());
        assert_eq!(bus.writes().last().unwrap().data.as_slice(), &[ENABLE_POWEROFF]);
    }
}
