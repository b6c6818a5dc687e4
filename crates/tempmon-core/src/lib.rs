//! Hardware-independent core library for tempmon
//!
//! This crate contains all platform-agnostic logic for the tempmon scrolling
//! sensor display: the register-level conversion engine and sensor drivers,
//! startup calibration, the background sampling coordinator, the published
//! snapshot and the text render loop.
//!
//! Everything talks to hardware through `embedded-hal` traits, so the same
//! code runs against a Linux I2C device, the desktop simulator and the
//! in-memory [`simulated::SimulatedBus`] used by the tests.

pub mod bus;
pub mod calibration;
pub mod config;
pub mod display;
pub mod error;
pub mod framebuffer;
pub mod render;
pub mod sampling;
pub mod sensors;
pub mod simulated;
pub mod snapshot;
pub mod startup;
