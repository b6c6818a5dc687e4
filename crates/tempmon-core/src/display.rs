//! Text rendering onto the framebuffer and the panel seam.
//!
//! [`TextDisplay`] draws with a 6x10 ISO 8859-1 font (needed for `°`) and
//! hands the finished frame to a [`Panel`]: the SSD1306 on the device, an
//! SDL window in the simulator.

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::iso_8859_1::FONT_6X10;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::renderer::TextRenderer;
use embedded_graphics::text::{Baseline, Text};

use crate::error::AppError;
use crate::framebuffer::{DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX, FrameBuffer};
use crate::render::DisplaySink;

/// Destination of finished frames.
pub trait Panel {
    fn flush(&mut self, frame: &FrameBuffer) -> Result<(), AppError>;

    /// Called instead of `flush` when the frame did not change.
    fn idle(&mut self) -> Result<(), AppError> {
        Ok(())
    }
}

pub struct TextDisplay<P> {
    frame: FrameBuffer,
    panel: P,
    style: MonoTextStyle<'static, BinaryColor>,
}

impl<P: Panel> TextDisplay<P> {
    pub fn new(panel: P) -> Self {
        Self {
            frame: FrameBuffer::new(),
            panel,
            style: MonoTextStyle::new(&FONT_6X10, BinaryColor::On),
        }
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut P {
        &mut self.panel
    }
}

impl<P: Panel> DisplaySink for TextDisplay<P> {
    fn clear(&mut self) {
        // Infallible
        let _ = self.frame.clear(BinaryColor::Off);
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32) {
        let _ = Text::with_baseline(text, Point::new(x, y), self.style, Baseline::Top)
            .draw(&mut self.frame);
    }

    fn present(&mut self) -> Result<(), AppError> {
        if !self.frame.is_dirty() {
            return self.panel.idle();
        }
        self.panel.flush(&self.frame)?;
        self.frame.mark_clean();
        Ok(())
    }

    fn width_px(&self) -> u32 {
        DISPLAY_WIDTH_PX as u32
    }

    fn height_px(&self) -> u32 {
        DISPLAY_HEIGHT_PX as u32
    }

    fn measure_text_width_px(&self, text: &str) -> u32 {
        self.style
            .measure_string(text, Point::zero(), Baseline::Top)
            .bounding_box
            .size
            .width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingPanel {
        flushes: u32,
        last_lit: u32,
    }

    impl Panel for CountingPanel {
        fn flush(&mut self, frame: &FrameBuffer) -> Result<(), AppError> {
            self.flushes += 1;
            self.last_lit = frame.lit_pixels();
            Ok(())
        }
    }

    #[test]
    fn test_text_width_is_six_pixels_per_glyph() {
        let display = TextDisplay::new(CountingPanel::default());
        assert_eq!(display.measure_text_width_px("TempC"), 30);
        assert_eq!(display.measure_text_width_px("21.50°C"), 42);
    }

    #[test]
    fn test_present_flushes_only_changed_frames() {
        let mut display = TextDisplay::new(CountingPanel::default());
        display.clear();
        display.draw_text("Calibrating...", 0, 12);
        display.present().unwrap();
        assert_eq!(display.panel().flushes, 1);
        assert!(display.panel().last_lit > 0);

        display.present().unwrap();
        assert_eq!(display.panel().flushes, 1);

        display.clear();
        display.present().unwrap();
        assert_eq!(display.panel().flushes, 2);
        assert_eq!(display.panel().last_lit, 0);
    }

    #[test]
    fn test_text_off_screen_draws_nothing() {
        let mut display = TextDisplay::new(CountingPanel::default());
        display.draw_text("TempC", 200, 12);
        assert_eq!(display.frame().lit_pixels(), 0);
    }
}
