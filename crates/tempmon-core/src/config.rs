//! Runtime tunables.
//!
//! Defaults cover the deployed hardware. The device binary overrides them
//! from `TEMPMON_*` values baked in at build time from a `.env` file.

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use log::warn;

use crate::bus::RegisterBus;
use crate::calibration::DEFAULT_CALIBRATION_ROUNDS;
use crate::render::DEFAULT_TEXT_Y;
use crate::sampling::DEFAULT_CYCLE_DELAY;
use crate::sensors::conversion::{DEFAULT_POLL_INTERVAL_US, DEFAULT_POLL_TIMEOUT};
use crate::sensors::{ConversionEngine, Oversampling};

/// Default I2C character device on a Raspberry Pi.
pub const DEFAULT_I2C_DEVICE: &str = "/dev/i2c-1";

/// Default pause between rendered frames.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// I2C bus device path.
    pub i2c_device: &'static str,
    /// Deadline for one poll-until-ready wait (1000 ms).
    pub poll_timeout: Duration,
    /// Pause between status register reads (1 ms).
    pub poll_interval_us: u32,
    /// Sleep at the end of each acquisition cycle (3 s).
    pub cycle_delay: Duration,
    /// Startup calibration rounds (5).
    pub calibration_rounds: usize,
    /// Barometer oversampling (x128).
    pub oversampling: Oversampling,
    /// Top row of the scrolling line (12 px).
    pub text_y: i32,
    /// Pause between rendered frames.
    pub frame_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            i2c_device: DEFAULT_I2C_DEVICE,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
            cycle_delay: DEFAULT_CYCLE_DELAY,
            calibration_rounds: DEFAULT_CALIBRATION_ROUNDS,
            oversampling: Oversampling::default(),
            text_y: DEFAULT_TEXT_Y,
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

impl MonitorConfig {
    /// Apply one `TEMPMON_*` override.
    ///
    /// Returns `false` (and keeps the current value) for unknown keys and
    /// unparsable values.
    pub fn apply_override(&mut self, key: &str, value: &'static str) -> bool {
        let applied = match key {
            "TEMPMON_I2C_DEVICE" => {
                self.i2c_device = value;
                true
            }
            "TEMPMON_POLL_TIMEOUT_MS" => parse_millis(value)
                .map(|d| self.poll_timeout = d)
                .is_some(),
            "TEMPMON_POLL_INTERVAL_US" => value
                .parse()
                .map(|us| self.poll_interval_us = us)
                .is_ok(),
            "TEMPMON_CYCLE_DELAY_MS" => parse_millis(value)
                .map(|d| self.cycle_delay = d)
                .is_some(),
            "TEMPMON_CALIBRATION_ROUNDS" => value
                .parse::<usize>()
                .ok()
                .filter(|&n| n > 0)
                .map(|n| self.calibration_rounds = n)
                .is_some(),
            "TEMPMON_OVERSAMPLING" => value
                .parse()
                .ok()
                .and_then(Oversampling::from_ratio)
                .map(|os| self.oversampling = os)
                .is_some(),
            "TEMPMON_TEXT_Y" => value.parse().map(|y| self.text_y = y).is_ok(),
            "TEMPMON_FRAME_INTERVAL_MS" => parse_millis(value)
                .map(|d| self.frame_interval = d)
                .is_some(),
            _ => false,
        };

        if !applied {
            warn!("Ignoring config override {}={:?}", key, value);
        }
        applied
    }

    /// Apply every `(key, Some(value))` pair; `None` values are skipped.
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, Option<&'static str>)>,
    {
        for (key, value) in overrides {
            if let Some(value) = value {
                self.apply_override(key, value);
            }
        }
        self
    }

    /// Build a conversion engine using the configured poll timing.
    pub fn engine<B: RegisterBus, D: DelayNs>(&self, bus: B, delay: D) -> ConversionEngine<B, D> {
        ConversionEngine::new(bus, delay)
            .with_timeout(self.poll_timeout)
            .with_poll_interval_us(self.poll_interval_us)
    }
}

fn parse_millis(value: &str) -> Option<Duration> {
    value.parse().ok().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.i2c_device, "/dev/i2c-1");
        assert_eq!(config.poll_timeout, Duration::from_millis(1000));
        assert_eq!(config.cycle_delay, Duration::from_secs(3));
        assert_eq!(config.calibration_rounds, 5);
        assert_eq!(config.oversampling, Oversampling::X128);
        assert_eq!(config.text_y, 12);
    }

    #[test]
    fn test_overrides_apply_and_bad_values_are_ignored() {
        let config = MonitorConfig::default().with_overrides([
            ("TEMPMON_I2C_DEVICE", Some("/dev/i2c-0")),
            ("TEMPMON_CYCLE_DELAY_MS", Some("500")),
            ("TEMPMON_OVERSAMPLING", Some("3")),
            ("TEMPMON_CALIBRATION_ROUNDS", Some("0")),
            ("TEMPMON_TEXT_Y", None),
        ]);

        assert_eq!(config.i2c_device, "/dev/i2c-0");
        assert_eq!(config.cycle_delay, Duration::from_millis(500));
        assert_eq!(config.oversampling, Oversampling::X128);
        assert_eq!(config.calibration_rounds, 5);
        assert_eq!(config.text_y, 12);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut config = MonitorConfig::default();
        assert!(!config.apply_override("TEMPMON_COLOR", "blue"));
        assert!(config.apply_override("TEMPMON_POLL_INTERVAL_US", "250"));
        assert_eq!(config.poll_interval_us, 250);
    }
}
