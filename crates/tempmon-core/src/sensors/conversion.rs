//! The start → poll → read state machine shared by every sensor.
//!
//! A conversion is described by a [`ConversionRequest`]: which control word
//! starts it, how the engine learns that the result is ready, and where the
//! result bytes live. Drivers build requests and decode the bytes; the engine
//! owns the bus, the delay source and the poll deadline.

use embassy_time::{Duration, Instant};
use embedded_hal::delay::DelayNs;
use log::{debug, error, trace};

use super::{Quantity, SensorDescriptor};
use crate::bus::RegisterBus;
use crate::error::SensorError;

/// How long a status register may stay "not ready" before giving up.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Pause between two status register reads.
pub const DEFAULT_POLL_INTERVAL_US: u32 = 1000;

/// Step 1: the write that selects the mode and starts the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSelect {
    /// Conversions run continuously; nothing to write.
    None,
    /// Write `control` (OR'd mode bits) to `register`.
    Register { register: u8, control: u8 },
}

/// Step 2: how the engine waits for the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyCheck {
    /// Poll `register` until any bit of `mask` is set.
    StatusBit { register: u8, mask: u8 },
    /// The device has no status register; wait a fixed conversion time.
    Fixed { micros: u32 },
}

/// Step 3: where the result bytes are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultRead {
    Register(u8),
    /// Plain read following a command write.
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionRequest {
    pub mode: ModeSelect,
    pub ready: ReadyCheck,
    pub result: ResultRead,
}

/// Executes conversion requests against a register bus.
pub struct ConversionEngine<B, D> {
    bus: B,
    delay: D,
    timeout: Duration,
    poll_interval_us: u32,
}

impl<B: RegisterBus, D: DelayNs> ConversionEngine<B, D> {
    pub fn new(bus: B, delay: D) -> Self {
        Self {
            bus,
            delay,
            timeout: DEFAULT_POLL_TIMEOUT,
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
        }
    }

    /// Set the poll-until-ready deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval_us(mut self, poll_interval_us: u32) -> Self {
        self.poll_interval_us = poll_interval_us;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// Read the identity register (if any) and compare it against the
    /// expected device id.
    pub fn verify_identity(&mut self, descriptor: &SensorDescriptor) -> Result<(), SensorError> {
        let Some(identity) = descriptor.identity else {
            return Ok(());
        };

        let found = self
            .bus
            .read_byte(descriptor.address, identity.register)?;
        if found != identity.expected {
            error!(
                "{} not found at {:#04x}: id register {:#04x} = {:#04x}",
                descriptor.name, descriptor.address, identity.register, found
            );
            return Err(SensorError::IdentityMismatch {
                sensor: descriptor.name,
                expected: identity.expected,
                found,
            });
        }

        debug!("{} identified at {:#04x}", descriptor.name, descriptor.address);
        Ok(())
    }

    /// Write a control word to a mode register.
    pub fn select_mode(&mut self, address: u8, register: u8, control: u8) -> Result<(), SensorError> {
        trace!("{:#04x}: mode {:#04x} <- {:#010b}", address, register, control);
        self.bus.write_byte(address, register, control)
    }

    /// Block until the result is ready or the deadline passes.
    ///
    /// A status register that never reports ready yields
    /// [`SensorError::Timeout`] instead of hanging the sampling thread.
    pub fn wait_ready(
        &mut self,
        descriptor: &SensorDescriptor,
        quantity: Quantity,
        check: ReadyCheck,
    ) -> Result<(), SensorError> {
        match check {
            ReadyCheck::Fixed { micros } => {
                self.delay.delay_us(micros);
                Ok(())
            }
            ReadyCheck::StatusBit { register, mask } => {
                let deadline = Instant::now() + self.timeout;
                let mut polls: u32 = 0;
                loop {
                    let status = self.bus.read_byte(descriptor.address, register)?;
                    polls += 1;
                    if status & mask != 0 {
                        trace!(
                            "{} {:?} ready after {} polls",
                            descriptor.name, quantity, polls
                        );
                        return Ok(());
                    }
                    if Instant::now() >= deadline {
                        error!(
                            "{} {:?} not ready after {} polls ({} ms)",
                            descriptor.name,
                            quantity,
                            polls,
                            self.timeout.as_millis()
                        );
                        return Err(SensorError::Timeout {
                            sensor: descriptor.name,
                            quantity,
                        });
                    }
                    self.delay.delay_us(self.poll_interval_us);
                }
            }
        }
    }

    /// Read the raw result block.
    pub fn read_result(
        &mut self,
        address: u8,
        source: ResultRead,
        buf: &mut [u8],
    ) -> Result<(), SensorError> {
        match source {
            ResultRead::Register(register) => self.bus.read_block(address, register, buf),
            ResultRead::Plain => self.bus.read(address, buf),
        }
    }

    /// Run a full conversion cycle, leaving the raw result in `buf`.
    pub fn convert(
        &mut self,
        descriptor: &SensorDescriptor,
        quantity: Quantity,
        request: &ConversionRequest,
        buf: &mut [u8],
    ) -> Result<(), SensorError> {
        if let ModeSelect::Register { register, control } = request.mode {
            self.select_mode(descriptor.address, register, control)?;
        }
        self.wait_ready(descriptor, quantity, request.ready)?;
        self.read_result(descriptor.address, request.result, buf)
    }
}

/// CRC-8 with polynomial 0x31, init 0xFF, MSB first, no reflection and no
/// final xor (Sensirion).
pub fn crc8(data: &[u8]) -> u8 {
    const POLYNOMIAL: u8 = 0x31;

    let mut crc: u8 = 0xFF;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
        }
    }
    crc
}
