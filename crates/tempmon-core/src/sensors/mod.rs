//! Sensor descriptors, readings and the quantity-producing capability shared
//! by every driver.

pub mod conversion;
pub mod mpl3115a2;
#[cfg(feature = "sensor-sht31d")]
pub mod sht31d;
#[cfg(feature = "sensor-tsl2591")]
pub mod tsl2591;

use embassy_time::Instant;
use embedded_hal::delay::DelayNs;
use log::warn;

use crate::bus::RegisterBus;
use crate::error::SensorError;

pub use conversion::ConversionEngine;
pub use mpl3115a2::Mpl3115a2;
#[cfg(feature = "sensor-sht31d")]
pub use sht31d::Sht31d;
#[cfg(feature = "sensor-tsl2591")]
pub use tsl2591::Tsl2591;

/// Physical quantities the monitor can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Temperature,
    Pressure,
    Altitude,
    Humidity,
    Luminosity,
}

impl Quantity {
    pub const COUNT: usize = 5;

    pub const ALL: [Quantity; Self::COUNT] = [
        Self::Temperature,
        Self::Pressure,
        Self::Altitude,
        Self::Humidity,
        Self::Luminosity,
    ];

    /// Slot of this quantity inside a [`crate::snapshot::Snapshot`].
    pub const fn index(self) -> usize {
        match self {
            Self::Temperature => 0,
            Self::Pressure => 1,
            Self::Altitude => 2,
            Self::Humidity => 3,
            Self::Luminosity => 4,
        }
    }

    /// Unit of the value carried by a [`Reading`] of this quantity.
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Pressure => "Pa",
            Self::Altitude => "dm",
            Self::Humidity => "%",
            Self::Luminosity => "lx",
        }
    }
}

/// A single measurement produced by the conversion engine.
///
/// Invalid readings carry `NaN` and are never merged into a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    quantity: Quantity,
    value: f32,
    timestamp: Instant,
    valid: bool,
}

impl Reading {
    pub fn valid(quantity: Quantity, value: f32) -> Self {
        Self {
            quantity,
            value,
            timestamp: Instant::now(),
            valid: true,
        }
    }

    pub fn invalid(quantity: Quantity) -> Self {
        Self {
            quantity,
            value: f32::NAN,
            timestamp: Instant::now(),
            valid: false,
        }
    }

    /// Turn the outcome of a conversion into a reading.
    ///
    /// Recoverable failures (timeout, CRC, saturation) become an invalid
    /// reading; anything else is returned as an error.
    pub fn from_measurement(
        quantity: Quantity,
        result: Result<f32, SensorError>,
    ) -> Result<Self, SensorError> {
        match result {
            Ok(value) => Ok(Self::valid(quantity, value)),
            Err(e) if e.is_recoverable() => {
                warn!("Discarding {:?} reading: {}", quantity, e);
                Ok(Self::invalid(quantity))
            }
            Err(e) => Err(e),
        }
    }

    pub const fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub const fn value(&self) -> f32 {
        self.value
    }

    pub const fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub const fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Oversampling ratio requested from a sensor.
///
/// Each driver maps the ratio onto its own knob: the barometer's OS bits,
/// the hygrometer's repeatability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oversampling {
    X1,
    X2,
    X4,
    X8,
    X16,
    X32,
    X64,
    #[default]
    X128,
}

impl Oversampling {
    /// log2 of the ratio, 0 for x1 up to 7 for x128.
    pub const fn exponent(self) -> u8 {
        match self {
            Self::X1 => 0,
            Self::X2 => 1,
            Self::X4 => 2,
            Self::X8 => 3,
            Self::X16 => 4,
            Self::X32 => 5,
            Self::X64 => 6,
            Self::X128 => 7,
        }
    }

    pub const fn from_ratio(ratio: u32) -> Option<Self> {
        match ratio {
            1 => Some(Self::X1),
            2 => Some(Self::X2),
            4 => Some(Self::X4),
            8 => Some(Self::X8),
            16 => Some(Self::X16),
            32 => Some(Self::X32),
            64 => Some(Self::X64),
            128 => Some(Self::X128),
            _ => None,
        }
    }
}

/// Register holding a fixed device id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityRegister {
    pub register: u8,
    pub expected: u8,
}

/// Static description of one physical sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDescriptor {
    pub name: &'static str,
    pub address: u8,
    pub identity: Option<IdentityRegister>,
    /// Quantities this sensor can produce, in order of preference.
    pub quantities: &'static [Quantity],
    pub oversampling: Oversampling,
}

impl SensorDescriptor {
    pub fn provides(&self, quantity: Quantity) -> bool {
        self.quantities.contains(&quantity)
    }
}

/// A sensor that turns conversion cycles into [`Reading`]s.
///
/// The sampling coordinator only ever sees sensors through this trait, so a
/// new sensor kind is added by implementing it and attaching the driver to a
/// [`crate::sampling::SensorSet`].
pub trait QuantitySensor<B: RegisterBus, D: DelayNs> {
    fn descriptor(&self) -> &SensorDescriptor;

    /// Check the device identity and load the default configuration.
    fn init(&mut self, engine: &mut ConversionEngine<B, D>) -> Result<(), SensorError> {
        engine.verify_identity(self.descriptor())
    }

    /// Run one conversion cycle for `quantity`.
    ///
    /// Returns an invalid reading for timeouts and checksum failures; only
    /// transport errors and unsupported quantities are errors.
    fn measure(
        &mut self,
        engine: &mut ConversionEngine<B, D>,
        quantity: Quantity,
    ) -> Result<Reading, SensorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors_become_invalid_readings() {
        let timeout = SensorError::Timeout {
            sensor: "MPL3115A2",
            quantity: Quantity::Pressure,
        };
        let reading = Reading::from_measurement(Quantity::Pressure, Err(timeout)).unwrap();
        assert!(!reading.is_valid());
        assert!(reading.value().is_nan());
        assert_eq!(reading.quantity(), Quantity::Pressure);
    }

    #[test]
    fn test_transport_errors_propagate() {
        let err = SensorError::Transport(embedded_hal::i2c::ErrorKind::Bus);
        assert_eq!(
            Reading::from_measurement(Quantity::Humidity, Err(err)),
            Err(err)
        );
    }

    #[test]
    fn test_quantity_indices_are_unique() {
        for (i, q) in Quantity::ALL.iter().enumerate() {
            assert_eq!(q.index(), i);
        }
    }

    #[test]
    fn test_oversampling_ratio_round_trip() {
        assert_eq!(Oversampling::from_ratio(128), Some(Oversampling::X128));
        assert_eq!(Oversampling::from_ratio(3), None);
        assert_eq!(Oversampling::X8.exponent(), 3);
    }
}
