//! Register-oriented view of an I2C bus.
//!
//! Every sensor in this crate speaks in terms of "write N bytes to register R"
//! and "read N bytes starting at register R". [`RegisterBus`] captures exactly
//! that and is implemented for any `embedded_hal::i2c::I2c`, so drivers work
//! unchanged against real hardware, the shared-bus wrapper and
//! [`crate::simulated::SimulatedBus`].

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use log::error;

use crate::error::SensorError;

/// Largest register write frame (register byte + payload).
pub const MAX_WRITE_FRAME: usize = 33;

/// Synchronous register access to devices on a bus.
pub trait RegisterBus {
    /// Read a single register.
    fn read_byte(&mut self, address: u8, register: u8) -> Result<u8, SensorError> {
        let mut byte = [0u8; 1];
        self.read_block(address, register, &mut byte)?;
        Ok(byte[0])
    }

    /// Read `buf.len()` bytes starting at `register`.
    fn read_block(&mut self, address: u8, register: u8, buf: &mut [u8])
    -> Result<(), SensorError>;

    /// Write a single register.
    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> Result<(), SensorError> {
        self.write_block(address, register, &[value])
    }

    /// Write `data` starting at `register`.
    fn write_block(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), SensorError>;

    /// Plain read with no register pointer write.
    ///
    /// Command-oriented devices return their result on the read that follows
    /// a command write.
    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), SensorError>;
}

fn transport_error<E: embedded_hal::i2c::Error>(address: u8, err: E) -> SensorError {
    let kind = err.kind();
    error!("I2C transaction with {:#04x} failed: {:?}", address, kind);
    SensorError::Transport(kind)
}

impl<I: I2c> RegisterBus for I {
    fn read_block(
        &mut self,
        address: u8,
        register: u8,
        buf: &mut [u8],
    ) -> Result<(), SensorError> {
        self.write_read(address, &[register], buf)
            .map_err(|e| transport_error(address, e))
    }

    fn write_block(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), SensorError> {
        let mut frame = heapless::Vec::<u8, MAX_WRITE_FRAME>::new();
        if frame.push(register).is_err() || frame.extend_from_slice(data).is_err() {
            error!(
                "Write of {} bytes to {:#04x}/{:#04x} exceeds frame size",
                data.len(),
                address,
                register
            );
            return Err(SensorError::Transport(ErrorKind::Overrun));
        }

        self.write(address, &frame)
            .map_err(|e| transport_error(address, e))
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        I2c::read(self, address, buf).map_err(|e| transport_error(address, e))
    }
}
