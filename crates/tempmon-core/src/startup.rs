//! Bring-up shared by the device and simulator binaries.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;
use log::info;

use crate::bus::RegisterBus;
use crate::calibration::calibrate;
use crate::config::MonitorConfig;
use crate::error::AppError;
use crate::render::{DisplaySink, RenderLoop, Shutdown};
use crate::sampling::{SamplingCoordinator, SensorSet};
use crate::sensors::{ConversionEngine, Mpl3115a2, QuantitySensor};
use crate::snapshot::Snapshot;

pub const CALIBRATING_MESSAGE: &str = "Calibrating...";

/// Identify and calibrate the barometer, attach the enabled sensors and
/// return a coordinator seeded with the calibration snapshot.
///
/// Shows [`CALIBRATING_MESSAGE`] until calibration is done. Any failure
/// here is fatal to startup. Raising `stop` ends startup with
/// [`Shutdown::Interrupted`], and a failure seen after `stop` was raised is
/// reported as an interrupt too.
pub fn start_monitor<B, D, S>(
    config: &MonitorConfig,
    engine: ConversionEngine<B, D>,
    render: &mut RenderLoop<S>,
    stop: &AtomicBool,
) -> Result<SamplingCoordinator<B, D>, Shutdown>
where
    B: RegisterBus + Send + 'static,
    D: DelayNs + Send + 'static,
    S: DisplaySink,
{
    match bring_up(config, engine, render, stop) {
        Ok(Some(coordinator)) => Ok(coordinator),
        Ok(None) => Err(Shutdown::Interrupted),
        Err(e) if stop.load(Ordering::Acquire) => {
            info!("Startup failed after interrupt: {}", e);
            Err(Shutdown::Interrupted)
        }
        Err(e) => Err(Shutdown::Failed(e)),
    }
}

fn bring_up<B, D, S>(
    config: &MonitorConfig,
    mut engine: ConversionEngine<B, D>,
    render: &mut RenderLoop<S>,
    stop: &AtomicBool,
) -> Result<Option<SamplingCoordinator<B, D>>, AppError>
where
    B: RegisterBus + Send + 'static,
    D: DelayNs + Send + 'static,
    S: DisplaySink,
{
    render.show_status(CALIBRATING_MESSAGE)?;

    let mut barometer = Mpl3115a2::new(config.oversampling);
    barometer.init(&mut engine)?;
    let Some(calibration) =
        calibrate(&mut barometer, &mut engine, config.calibration_rounds, stop)?
    else {
        return Ok(None);
    };

    let mut sensors = SensorSet::new(engine);
    sensors.push_initialized(Box::new(barometer));

    #[cfg(feature = "sensor-sht31d")]
    sensors.attach(Box::new(crate::sensors::Sht31d::new(config.oversampling)))?;

    #[cfg(feature = "sensor-tsl2591")]
    sensors.attach(Box::new(crate::sensors::Tsl2591::new(
        crate::sensors::tsl2591::Gain::default(),
        crate::sensors::tsl2591::IntegrationTime::default(),
    )))?;

    info!("Monitoring with {} sensors", sensors.len());
    Ok(Some(SamplingCoordinator::new(
        sensors,
        Snapshot::from_calibration(&calibration),
        config.cycle_delay,
    )))
}
