use tempmon_core::config::MonitorConfig;

/// Library defaults with the build-time `.env` overrides applied.
pub fn monitor_config() -> MonitorConfig {
    MonitorConfig::default().with_overrides([
        ("TEMPMON_I2C_DEVICE", option_env!("TEMPMON_I2C_DEVICE")),
        ("TEMPMON_POLL_TIMEOUT_MS", option_env!("TEMPMON_POLL_TIMEOUT_MS")),
        ("TEMPMON_POLL_INTERVAL_US", option_env!("TEMPMON_POLL_INTERVAL_US")),
        ("TEMPMON_CYCLE_DELAY_MS", option_env!("TEMPMON_CYCLE_DELAY_MS")),
        (
            "TEMPMON_CALIBRATION_ROUNDS",
            option_env!("TEMPMON_CALIBRATION_ROUNDS"),
        ),
        ("TEMPMON_OVERSAMPLING", option_env!("TEMPMON_OVERSAMPLING")),
        ("TEMPMON_TEXT_Y", option_env!("TEMPMON_TEXT_Y")),
        (
            "TEMPMON_FRAME_INTERVAL_MS",
            option_env!("TEMPMON_FRAME_INTERVAL_MS"),
        ),
    ])
}
