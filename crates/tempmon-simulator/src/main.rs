//! Desktop simulator for the tempmon scrolling sensor display.
//!
//! Runs the full tempmon-core pipeline (calibration, background sampling,
//! scrolling render loop) against a simulated I2C bus and shows the 128x32
//! monochrome panel in an SDL2 window via `embedded-graphics-simulator`.
//! A generator thread keeps the simulated sensor registers moving along
//! slow sinusoids so the display has something to show.
//!
//! # Key bindings
//!
//! | Key       | Action |
//! |-----------|--------|
//! | Q / Esc   | Quit   |

use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration as StdDuration;

use embassy_time::Duration;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::{
    BinaryColorTheme, OutputSettingsBuilder, SimulatorDisplay, SimulatorEvent, Window,
    sdl2::Keycode,
};
use embedded_hal::delay::DelayNs;
use log::{info, warn};

use tempmon_core::config::MonitorConfig;
use tempmon_core::display::{Panel, TextDisplay};
use tempmon_core::error::AppError;
use tempmon_core::framebuffer::{DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX, FrameBuffer};
use tempmon_core::render::RenderLoop;
use tempmon_core::sensors::mpl3115a2;
use tempmon_core::simulated::SimulatedBus;
use tempmon_core::startup::start_monitor;

// ---------------------------------------------------------------------------
// Display constants
// ---------------------------------------------------------------------------

/// Pixel scale factor for the simulator window.
const WINDOW_SCALE: u32 = 4;

/// Target frame duration (~30 FPS).
const FRAME_DURATION: Duration = Duration::from_millis(33);

/// Interval between synthetic register updates.
const MOCK_SAMPLE_INTERVAL: StdDuration = StdDuration::from_secs(1);

// ---------------------------------------------------------------------------
// Mock register generation
// ---------------------------------------------------------------------------

/// Writes synthetic, slowly varying sensor values into the simulated
/// registers, encoded exactly as the real devices would report them.
struct MockSensorGenerator {
    bus: SimulatedBus,
    /// Seconds of simulated time.
    elapsed_secs: f64,
}

impl MockSensorGenerator {
    fn new(bus: SimulatedBus) -> Self {
        let generator = Self {
            bus,
            elapsed_secs: 0.0,
        };
        generator.load_identities();
        generator.write_sample();
        generator
    }

    fn load_identities(&self) {
        self.bus.set_registers(mpl3115a2::ADDRESS, 0x0C, &[0xC4]);

        #[cfg(feature = "sensor-sht31d")]
        {
            use tempmon_core::sensors::conversion::crc8;

            let status = [0x00, 0x00];
            self.bus.set_registers(
                tempmon_core::sensors::sht31d::ADDRESS,
                0xF3,
                &[status[0], status[1], crc8(&status)],
            );
        }

        #[cfg(feature = "sensor-tsl2591")]
        self.bus
            .set_registers(tempmon_core::sensors::tsl2591::ADDRESS, 0xB2, &[0x50]);
    }

    /// Advance the internal clock and rewrite every result register.
    fn advance(&mut self, dt_secs: f64) {
        self.elapsed_secs += dt_secs;
        self.write_sample();
    }

    fn write_sample(&self) {
        let t = self.elapsed_secs;

        // Temperature: 20–26 °C sinusoidal with slow drift
        let temperature = 23.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos();

        // Pressure: 100.8–101.8 kPa
        let pressure = 101_300.0 + 400.0 * (t / 240.0).sin() + 50.0 * (t / 19.0).cos();

        self.write_barometer(pressure, temperature);

        // Humidity: 40–60 % with different period
        #[cfg(feature = "sensor-sht31d")]
        self.write_hygrometer(
            temperature,
            50.0 + 10.0 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos(),
        );

        // Luminosity: 100–500 lux
        #[cfg(feature = "sensor-tsl2591")]
        self.write_light(300.0 + 180.0 * (t / 90.0).sin() + 20.0 * (t / 11.0).cos());
    }

    fn write_barometer(&self, pressure_pa: f64, temperature: f64) {
        let [_, p_msb, p_csb, p_lsb] = ((pressure_pa * 64.0) as u32).to_be_bytes();
        let whole = temperature.floor();
        let fraction = (((temperature - whole) * 16.0) as u8) << 4;

        self.bus.set_registers(
            mpl3115a2::ADDRESS,
            0x00,
            &[0x06, p_msb, p_csb, p_lsb, whole as i8 as u8, fraction],
        );
    }

    #[cfg(feature = "sensor-sht31d")]
    fn write_hygrometer(&self, temperature: f64, humidity: f64) {
        use tempmon_core::sensors::conversion::crc8;

        let raw_t = (((temperature + 45.0) * 65535.0 / 175.0) as u16).to_be_bytes();
        let raw_h = ((humidity * 65535.0 / 100.0) as u16).to_be_bytes();

        // Every repeatability command starts with 0x24.
        self.bus.set_registers(
            tempmon_core::sensors::sht31d::ADDRESS,
            0x24,
            &[
                raw_t[0],
                raw_t[1],
                crc8(&raw_t),
                raw_h[0],
                raw_h[1],
                crc8(&raw_h),
            ],
        );
    }

    #[cfg(feature = "sensor-tsl2591")]
    fn write_light(&self, lux: f64) {
        use tempmon_core::sensors::tsl2591::{Gain, IntegrationTime};

        // Infrared fixed at 20 % of the full channel, so lux = 0.672 * full / cpl.
        let cpl = f64::from(IntegrationTime::default().millis())
            * f64::from(Gain::default().multiplier())
            / 408.0;
        let full = (lux * cpl / 0.672).clamp(0.0, f64::from(u16::MAX - 1));
        let [f_lo, f_hi] = (full as u16).to_le_bytes();
        let [i_lo, i_hi] = ((full * 0.2) as u16).to_le_bytes();

        self.bus.set_registers(
            tempmon_core::sensors::tsl2591::ADDRESS,
            0xB3,
            &[0x01, f_lo, f_hi, i_lo, i_hi],
        );
    }
}

// ---------------------------------------------------------------------------
// Panel and delay
// ---------------------------------------------------------------------------

/// Shows finished frames in an SDL2 window and turns window close or Q
/// into an interrupt.
struct SimulatorPanel {
    display: SimulatorDisplay<BinaryColor>,
    window: Window,
    stop: Arc<AtomicBool>,
}

impl SimulatorPanel {
    fn new(stop: Arc<AtomicBool>) -> Self {
        let output_settings = OutputSettingsBuilder::new()
            .scale(WINDOW_SCALE)
            .theme(BinaryColorTheme::OledBlue)
            .build();

        Self {
            display: SimulatorDisplay::new(Size::new(
                DISPLAY_WIDTH_PX as u32,
                DISPLAY_HEIGHT_PX as u32,
            )),
            window: Window::new("tempmon Simulator", &output_settings),
            stop,
        }
    }

    /// Show the display and handle SDL events.
    ///
    /// The SDL window is lazily initialized on the first `update()` call, so
    /// it must run before `events()`.
    fn pump(&mut self) {
        self.window.update(&self.display);
        for event in self.window.events() {
            match event {
                SimulatorEvent::Quit => self.stop.store(true, Ordering::Release),
                SimulatorEvent::KeyDown { keycode, .. }
                    if keycode == Keycode::Q || keycode == Keycode::Escape =>
                {
                    self.stop.store(true, Ordering::Release)
                }
                _ => {}
            }
        }
    }
}

impl Panel for SimulatorPanel {
    fn flush(&mut self, frame: &FrameBuffer) -> Result<(), AppError> {
        let pixels = (0..DISPLAY_HEIGHT_PX).flat_map(|y| {
            (0..DISPLAY_WIDTH_PX).filter_map(move |x| {
                frame
                    .get_pixel(x, y)
                    .map(|color| Pixel(Point::new(x as i32, y as i32), color))
            })
        });
        // Infallible
        let _ = self.display.draw_iter(pixels);
        self.pump();
        Ok(())
    }

    fn idle(&mut self) -> Result<(), AppError> {
        self.pump();
        Ok(())
    }
}

/// Sleeping delay; the sampling thread spends most of its time here.
struct SleepDelay;

impl DelayNs for SleepDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(StdDuration::from_nanos(u64::from(ns)));
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting tempmon simulator");
    info!(
        "Display: {}×{} (scale {}×)",
        DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX, WINDOW_SCALE
    );
    info!("Keys: Q=Quit");

    let config = MonitorConfig {
        frame_interval: FRAME_DURATION,
        ..MonitorConfig::default()
    };
    let stop = Arc::new(AtomicBool::new(false));

    let bus = SimulatedBus::new();
    let mut generator = MockSensorGenerator::new(bus.clone());
    let generator_stop = stop.clone();
    let spawned = thread::Builder::new()
        .name("mock-sensors".into())
        .spawn(move || {
            while !generator_stop.load(Ordering::Acquire) {
                thread::sleep(MOCK_SAMPLE_INTERVAL);
                generator.advance(MOCK_SAMPLE_INTERVAL.as_secs_f64());
            }
        });
    if let Err(e) = spawned {
        warn!("Mock sensor thread not started, readings stay constant: {}", e);
    }

    let panel = SimulatorPanel::new(stop.clone());
    let mut render = RenderLoop::new(TextDisplay::new(panel), config.text_y);

    let engine = config.engine(bus, SleepDelay);
    let code = match start_monitor(&config, engine, &mut render, &stop) {
        Ok(mut coordinator) => render.run(&mut coordinator, &stop, config.frame_interval),
        Err(reason) => render.shutdown(reason),
    };

    stop.store(true, Ordering::Release);
    info!("Simulator exiting with status {}", code);
    process::exit(code);
}
