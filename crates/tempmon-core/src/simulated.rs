//! In-memory I2C bus used by the desktop simulator and the test suite.
//!
//! Each device address owns a sparse register map. A write sets the
//! device's register pointer from its first byte; any further bytes are
//! recorded as a [`RegisterWrite`] but never change what reads return, so a
//! command write cannot clobber preloaded result data. Reads return bytes
//! starting at the current pointer, with unset registers reading as zero.
//! Only the most recent [`MAX_RECORDED_WRITES`] writes are kept.

use core::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use heapless::HistoryBuf;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use log::trace;

/// Largest payload recorded per write.
pub const MAX_RECORDED_PAYLOAD: usize = 32;

/// Number of writes retained; older ones are dropped.
pub const MAX_RECORDED_WRITES: usize = 64;

/// A register write observed on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterWrite {
    pub address: u8,
    pub register: u8,
    pub data: heapless::Vec<u8, MAX_RECORDED_PAYLOAD>,
}

#[derive(Default)]
struct SimState {
    registers: BTreeMap<(u8, u8), u8>,
    pointers: BTreeMap<u8, u8>,
    failing: BTreeSet<u8>,
    writes: HistoryBuf<RegisterWrite, MAX_RECORDED_WRITES>,
}

impl SimState {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), ErrorKind> {
        let Some((&register, payload)) = bytes.split_first() else {
            return Ok(());
        };
        self.pointers.insert(address, register);

        if !payload.is_empty() {
            let data = heapless::Vec::from_slice(payload).map_err(|_| ErrorKind::Overrun)?;
            trace!("sim {:#04x}: {:#04x} <- {:02x?}", address, register, payload);
            self.writes.write(RegisterWrite {
                address,
                register,
                data,
            });
        }
        Ok(())
    }

    fn read(&self, address: u8, buf: &mut [u8]) {
        let mut register = self.pointers.get(&address).copied().unwrap_or(0);
        for byte in buf.iter_mut() {
            *byte = self
                .registers
                .get(&(address, register))
                .copied()
                .unwrap_or(0);
            register = register.wrapping_add(1);
        }
    }
}

/// Cloneable handle to a shared simulated bus.
///
/// Clones see the same devices, so a test can keep one handle to preload
/// registers and inspect writes while a driver owns another.
#[derive(Clone)]
pub struct SimulatedBus {
    state: Arc<Mutex<CriticalSectionRawMutex, RefCell<SimState>>>,
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RefCell::new(SimState::default()))),
        }
    }

    /// Set consecutive registers of `address` starting at `register`.
    pub fn set_registers(&self, address: u8, register: u8, values: &[u8]) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            let mut register = register;
            for &value in values {
                state.registers.insert((address, register), value);
                register = register.wrapping_add(1);
            }
        });
    }

    /// The retained register writes, oldest first.
    pub fn writes(&self) -> Vec<RegisterWrite> {
        self.state
            .lock(|state| state.borrow().writes.oldest_ordered().cloned().collect())
    }

    pub fn clear_writes(&self) {
        self.state.lock(|state| state.borrow_mut().writes.clear());
    }

    /// Make every transaction with `address` fail with a NACK.
    pub fn set_failing(&self, address: u8, failing: bool) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if failing {
                state.failing.insert(address);
            } else {
                state.failing.remove(&address);
            }
        });
    }
}

impl ErrorType for SimulatedBus {
    type Error = ErrorKind;
}

impl I2c for SimulatedBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.failing.contains(&address) {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }

            for operation in operations.iter_mut() {
                match operation {
                    Operation::Write(bytes) => state.write(address, bytes)?,
                    Operation::Read(buf) => state.read(address, buf),
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RegisterBus;

    #[test]
    fn test_reads_follow_pointer_and_default_to_zero() {
        let mut bus = SimulatedBus::new();
        bus.set_registers(0x60, 0x01, &[0xAA, 0xBB]);

        let mut buf = [0xFF; 3];
        bus.read_block(0x60, 0x01, &mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xBB, 0x00]);
    }

    #[test]
    fn test_writes_are_recorded_but_do_not_change_readback() {
        let mut bus = SimulatedBus::new();
        bus.set_registers(0x44, 0x24, &[0x66, 0x66]);

        bus.write_byte(0x44, 0x24, 0x00).unwrap();
        let mut buf = [0u8; 2];
        RegisterBus::read(&mut bus, 0x44, &mut buf).unwrap();

        assert_eq!(buf, [0x66, 0x66]);
        assert_eq!(bus.writes().len(), 1);
        bus.clear_writes();
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn test_write_log_keeps_only_recent_writes() {
        let mut bus = SimulatedBus::new();
        for i in 0..1000u32 {
            bus.write_byte(0x60, 0x26, i as u8).unwrap();
        }

        let writes = bus.writes();
        assert_eq!(writes.len(), MAX_RECORDED_WRITES);
        assert_eq!(writes.last().unwrap().data.as_slice(), &[999u32 as u8]);
        assert_eq!(writes[0].data.as_slice(), &[(1000 - MAX_RECORDED_WRITES) as u8]);
    }

    #[test]
    fn test_failing_address_nacks() {
        let mut bus = SimulatedBus::new();
        bus.set_failing(0x29, true);
        assert_eq!(
            bus.read_byte(0x29, 0x00),
            Err(crate::error::SensorError::Transport(ErrorKind::NoAcknowledge(
                NoAcknowledgeSource::Address
            )))
        );
        bus.set_failing(0x29, false);
        assert_eq!(bus.read_byte(0x29, 0x00), Ok(0));
    }
}
