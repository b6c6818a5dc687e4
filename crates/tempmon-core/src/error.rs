//! Error types shared by the sensor drivers, the sampling pipeline and the
//! binaries.

use embedded_hal::i2c::ErrorKind;
use thiserror_no_std::Error;

use crate::sensors::Quantity;

/// Failures raised while talking to a sensor.
///
/// `Timeout` and `ChecksumMismatch` are local to a single quantity: the
/// conversion engine turns them into invalid readings and the acquisition
/// cycle moves on. Everything else reaches the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: identity register returned {found:#04x}, expected {expected:#04x}")]
    IdentityMismatch {
        sensor: &'static str,
        expected: u8,
        found: u8,
    },
    #[error("{sensor}: {quantity:?} conversion not ready before deadline")]
    Timeout {
        sensor: &'static str,
        quantity: Quantity,
    },
    #[error("{sensor}: CRC mismatch (received {received:#04x}, computed {computed:#04x})")]
    ChecksumMismatch {
        sensor: &'static str,
        received: u8,
        computed: u8,
    },
    #[error("{sensor}: channel saturated")]
    Saturated { sensor: &'static str },
    #[error("bus transport failed: {0}")]
    Transport(ErrorKind),
    #[error("{sensor} does not measure {quantity:?}")]
    Unsupported {
        sensor: &'static str,
        quantity: Quantity,
    },
    #[error("calibration collected no valid {0:?} samples")]
    NoValidSamples(Quantity),
    #[error("sampling thread terminated abnormally")]
    WorkerLost,
}

impl SensorError {
    /// Whether this error only invalidates the current reading.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ChecksumMismatch { .. } | Self::Saturated { .. }
        )
    }
}

/// Errors that end the process.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppError {
    #[error("Sensor error: {0}")]
    Sensor(SensorError),
    #[error("Display error: {0}")]
    Display(ErrorKind),
}

impl AppError {
    /// Process exit status reported for this error.
    pub const fn exit_code(&self) -> i32 {
        1
    }
}

impl From<SensorError> for AppError {
    fn from(value: SensorError) -> Self {
        Self::Sensor(value)
    }
}
