//! Foreground loop: turn the latest snapshot into one scrolling line.

use core::fmt::Write as _;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::bus::RegisterBus;
use crate::error::AppError;
use crate::sampling::SamplingCoordinator;
use crate::sensors::Quantity;
use crate::snapshot::Snapshot;

/// Capacity of the composed display line in bytes.
pub const LINE_CAPACITY: usize = 192;

pub type DisplayLine = heapless::String<LINE_CAPACITY>;

/// Row (top of the glyph cell) the scrolling line is drawn at.
pub const DEFAULT_TEXT_Y: i32 = 12;

/// Text output consumed by the render loop.
pub trait DisplaySink {
    fn clear(&mut self);

    fn draw_text(&mut self, text: &str, x: i32, y: i32);

    /// Push the drawn frame to the panel.
    fn present(&mut self) -> Result<(), AppError>;

    fn width_px(&self) -> u32;

    fn height_px(&self) -> u32;

    fn measure_text_width_px(&self, text: &str) -> u32;
}

/// Horizontal position of the scrolling line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollState {
    x: i32,
    screen_width: i32,
}

impl ScrollState {
    /// Start just past the right edge.
    pub fn new(screen_width: u32) -> Self {
        let screen_width = i32::try_from(screen_width).unwrap_or(i32::MAX);
        Self {
            x: screen_width,
            screen_width,
        }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    /// Move one pixel left, wrapping back to the right edge once the whole
    /// line has left the screen.
    pub fn advance(&mut self, text_width: u32) -> i32 {
        let text_width = i32::try_from(text_width).unwrap_or(i32::MAX);
        self.x -= 1;
        if self.x <= -(text_width.saturating_add(self.screen_width)) {
            self.x = self.screen_width;
        }
        self.x
    }
}

/// Format the snapshot as the single line shown on the display.
///
/// Missing quantities print as `0.00`.
pub fn compose_line(snapshot: &Snapshot) -> DisplayLine {
    let value = |q: Quantity| snapshot.value(q).unwrap_or(0.0);
    let celsius = value(Quantity::Temperature);
    let fahrenheit = celsius * 1.8 + 32.0;

    let mut line = DisplayLine::new();
    if write!(
        line,
        "TempC: {:.2}°C TempF: {:.2}°F Pressure: {:.2} kPa Humidity: {:.2}% Luminosity: {:.2} Lux",
        celsius,
        fahrenheit,
        value(Quantity::Pressure) / 1000.0,
        value(Quantity::Humidity),
        value(Quantity::Luminosity),
    )
    .is_err()
    {
        warn!("Display line truncated at {} bytes", LINE_CAPACITY);
    }
    line
}

/// Why the render loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Interrupted,
    Failed(AppError),
}

impl Shutdown {
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 0,
            Self::Failed(e) => e.exit_code(),
        }
    }
}

pub struct RenderLoop<S> {
    display: S,
    scroll: ScrollState,
    text_y: i32,
}

impl<S: DisplaySink> RenderLoop<S> {
    pub fn new(display: S, text_y: i32) -> Self {
        let scroll = ScrollState::new(display.width_px());
        Self {
            display,
            scroll,
            text_y,
        }
    }

    pub fn scroll(&self) -> ScrollState {
        self.scroll
    }

    pub fn display(&self) -> &S {
        &self.display
    }

    /// Show a static message, e.g. while calibrating.
    pub fn show_status(&mut self, text: &str) -> Result<(), AppError> {
        self.display.clear();
        self.display.draw_text(text, 0, self.text_y);
        self.display.present()
    }

    /// Draw one frame of the scrolling line.
    pub fn tick(&mut self, snapshot: &Snapshot) -> Result<(), AppError> {
        let line = compose_line(snapshot);
        let width = self.display.measure_text_width_px(&line);
        let x = self.scroll.advance(width);

        self.display.clear();
        self.display.draw_text(&line, x, self.text_y);
        self.display.present()
    }

    /// Blank the panel and return the process exit status.
    pub fn shutdown(&mut self, reason: Shutdown) -> i32 {
        match reason {
            Shutdown::Interrupted => info!("Interrupted, clearing display"),
            Shutdown::Failed(e) => error!("{}, clearing display", e),
        }

        self.display.clear();
        if let Err(e) = self.display.present() {
            error!("Failed to clear display on shutdown: {}", e);
        }
        reason.exit_code()
    }

    /// Serve frames until `stop` is raised or a cycle fails.
    pub fn run<B, D>(
        &mut self,
        coordinator: &mut SamplingCoordinator<B, D>,
        stop: &AtomicBool,
        frame_interval: Duration,
    ) -> i32
    where
        B: RegisterBus + Send + 'static,
        D: DelayNs + Send + 'static,
    {
        info!("Serving display");
        loop {
            if stop.load(Ordering::Acquire) {
                return self.shutdown(Shutdown::Interrupted);
            }

            let outcome = coordinator
                .poll()
                .map_err(AppError::from)
                .and_then(|snapshot| self.tick(&snapshot));
            if let Err(e) = outcome {
                return self.shutdown(Shutdown::Failed(e));
            }

            if frame_interval.as_micros() > 0 {
                std::thread::sleep(core::time::Duration::from_micros(
                    frame_interval.as_micros(),
                ));
            }
        }
    }
}
