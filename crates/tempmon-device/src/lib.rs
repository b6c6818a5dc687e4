//! Linux-specific modules for tempmon
//!
//! This crate contains the hardware-specific pieces that only make sense on
//! the deployed board: the SSD1306 panel driver, the shared I2C adapter and
//! the settings baked in from `.env` at build time.

pub mod settings;
pub mod shared;
pub mod ssd1306;
