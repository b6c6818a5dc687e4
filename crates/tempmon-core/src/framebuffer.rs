//! Monochrome framebuffer in SSD1306 page layout.
//!
//! All text drawing targets this RAM buffer instead of the panel. Each byte
//! holds a vertical strip of eight pixels (bit 0 on top) and bytes run
//! left to right across one 8-pixel page, so the buffer can be streamed to
//! the controller's GDDRAM unchanged. A dirty flag lets the panel skip
//! flushes when nothing changed.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

/// Panel width in pixels.
pub const DISPLAY_WIDTH_PX: usize = 128;
/// Panel height in pixels.
pub const DISPLAY_HEIGHT_PX: usize = 32;

/// Rows per GDDRAM page.
const PAGE_HEIGHT: usize = 8;

pub const BUFFER_LEN: usize = DISPLAY_WIDTH_PX * DISPLAY_HEIGHT_PX / PAGE_HEIGHT;

/// 1 bit per pixel framebuffer implementing `DrawTarget<Color = BinaryColor>`.
pub struct FrameBuffer {
    pixels: [u8; BUFFER_LEN],
    dirty: bool,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// A blank buffer; dirty so the first flush blanks the panel too.
    pub const fn new() -> Self {
        Self {
            pixels: [0; BUFFER_LEN],
            dirty: true,
        }
    }

    #[inline]
    fn locate(x: usize, y: usize) -> (usize, u8) {
        ((y / PAGE_HEIGHT) * DISPLAY_WIDTH_PX + x, 1 << (y % PAGE_HEIGHT))
    }

    /// Write a single pixel, marking the buffer dirty only if it changed.
    #[inline]
    fn set_pixel(&mut self, x: usize, y: usize, color: BinaryColor) {
        let (idx, mask) = Self::locate(x, y);
        let before = self.pixels[idx];
        let after = match color {
            BinaryColor::On => before | mask,
            BinaryColor::Off => before & !mask,
        };
        if after != before {
            self.pixels[idx] = after;
            self.dirty = true;
        }
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> Option<BinaryColor> {
        if x >= DISPLAY_WIDTH_PX || y >= DISPLAY_HEIGHT_PX {
            return None;
        }
        let (idx, mask) = Self::locate(x, y);
        Some(BinaryColor::from(self.pixels[idx] & mask != 0))
    }

    /// Raw GDDRAM image, page by page.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Number of lit pixels.
    pub fn lit_pixels(&self) -> u32 {
        self.pixels.iter().map(|b| b.count_ones()).sum()
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(DISPLAY_WIDTH_PX as u32, DISPLAY_HEIGHT_PX as u32)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            let x = coord.x;
            let y = coord.y;
            if x >= 0
                && y >= 0
                && (x as usize) < DISPLAY_WIDTH_PX
                && (y as usize) < DISPLAY_HEIGHT_PX
            {
                self.set_pixel(x as usize, y as usize, color);
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };

        for y in area.top_left.y..=bottom_right.y {
            for x in area.top_left.x..=bottom_right.x {
                self.set_pixel(x as usize, y as usize, color);
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let fill = match color {
            BinaryColor::On => 0xFF,
            BinaryColor::Off => 0x00,
        };
        if self.pixels.iter().any(|&b| b != fill) {
            self.pixels = [fill; BUFFER_LEN];
            self.dirty = true;
        }
        Ok(())
    }
}
