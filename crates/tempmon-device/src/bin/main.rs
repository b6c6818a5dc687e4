//! tempmon on a Linux board: MPL3115A2, SHT31-D and TSL2591 sensors plus an
//! SSD1306 128x32 OLED, all on one I2C bus.
//!
//! Exits with status 0 on Ctrl-C and 1 on any startup or bus failure, after
//! blanking the display.

use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use linux_embedded_hal::{Delay, I2cdev};
use log::{error, info, warn};

use tempmon_core::display::TextDisplay;
use tempmon_core::render::RenderLoop;
use tempmon_core::startup::start_monitor;
use tempmon_device::settings::monitor_config;
use tempmon_device::shared;
use tempmon_device::ssd1306::Ssd1306;

fn main() {
    env_logger::init();
    let config = monitor_config();
    info!("Starting tempmon on {}", config.i2c_device);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_stop.store(true, Ordering::Release)) {
        warn!("Ctrl-C handler not installed: {}", e);
    }

    let i2c = match I2cdev::new(config.i2c_device) {
        Ok(i2c) => i2c,
        Err(e) => {
            error!("Failed to open {}: {}", config.i2c_device, e);
            process::exit(1);
        }
    };
    let bus = shared::share(i2c);

    let mut panel = Ssd1306::new(shared::device(bus));
    if let Err(e) = panel.init() {
        error!("Display init failed: {}", e);
        process::exit(e.exit_code());
    }
    let mut render = RenderLoop::new(TextDisplay::new(panel), config.text_y);

    let engine = config.engine(shared::device(bus), Delay);
    let code = match start_monitor(&config, engine, &mut render, &stop) {
        Ok(mut coordinator) => render.run(&mut coordinator, &stop, config.frame_interval),
        Err(reason) => render.shutdown(reason),
    };

    info!("Exiting with status {}", code);
    process::exit(code);
}
