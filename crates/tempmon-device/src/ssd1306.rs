//! SSD1306 128x32 OLED panel over I2C.
//!
//! Every I2C write starts with a control byte: `0x00` for a command stream,
//! `0x40` for GDDRAM data. The framebuffer is already in the controller's
//! page layout, so a flush is just an address window reset followed by the
//! raw buffer in 32-byte chunks.

use log::{debug, error, info};
use tempmon_core::bus::RegisterBus;
use tempmon_core::display::Panel;
use tempmon_core::error::{AppError, SensorError};
use tempmon_core::framebuffer::{BUFFER_LEN, DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX, FrameBuffer};

pub const ADDRESS: u8 = 0x3C;

const CONTROL_COMMAND: u8 = 0x00;
const CONTROL_DATA: u8 = 0x40;

/// Bytes of GDDRAM sent per I2C write.
const DATA_CHUNK: usize = 32;

const CMD_DISPLAY_OFF: u8 = 0xAE;
const CMD_DISPLAY_ON: u8 = 0xAF;
const CMD_SET_COLUMN_ADDR: u8 = 0x21;
const CMD_SET_PAGE_ADDR: u8 = 0x22;

/// Power-up sequence for a 128x32 panel with the internal charge pump.
#[rustfmt::skip]
const INIT_SEQUENCE: &[u8] = &[
    CMD_DISPLAY_OFF,
    0xD5, 0x80, // clock divide ratio / oscillator
    0xA8, 0x1F, // multiplex ratio: 32 rows
    0xD3, 0x00, // display offset
    0x40,       // start line 0
    0x8D, 0x14, // charge pump on
    0x20, 0x00, // horizontal addressing
    0xA1,       // segment remap
    0xC8,       // COM scan descending
    0xDA, 0x02, // COM pins: sequential
    0x81, 0x8F, // contrast
    0xD9, 0xF1, // pre-charge period
    0xDB, 0x40, // VCOMH deselect level
    0xA4,       // resume from RAM
    0xA6,       // normal (not inverted)
    0x2E,       // scrolling off
    CMD_DISPLAY_ON,
];

pub struct Ssd1306<B> {
    bus: B,
    address: u8,
}

fn display_error(err: SensorError) -> AppError {
    match err {
        SensorError::Transport(kind) => AppError::Display(kind),
        other => AppError::Sensor(other),
    }
}

impl<B: RegisterBus> Ssd1306<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            address: ADDRESS,
        }
    }

    fn commands(&mut self, commands: &[u8]) -> Result<(), AppError> {
        self.bus
            .write_block(self.address, CONTROL_COMMAND, commands)
            .map_err(display_error)
    }

    /// Run the power-up sequence and blank the panel.
    pub fn init(&mut self) -> Result<(), AppError> {
        self.commands(INIT_SEQUENCE).map_err(|e| {
            error!("SSD1306 at {:#04x} did not accept init: {}", self.address, e);
            e
        })?;
        self.flush(&FrameBuffer::new())?;
        info!(
            "SSD1306 {}x{} ready at {:#04x}",
            DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX, self.address
        );
        Ok(())
    }
}

impl<B: RegisterBus> Panel for Ssd1306<B> {
    fn flush(&mut self, frame: &FrameBuffer) -> Result<(), AppError> {
        let last_page = (DISPLAY_HEIGHT_PX / 8 - 1) as u8;
        let last_column = (DISPLAY_WIDTH_PX - 1) as u8;
        self.commands(&[
            CMD_SET_COLUMN_ADDR,
            0,
            last_column,
            CMD_SET_PAGE_ADDR,
            0,
            last_page,
        ])?;

        for chunk in frame.as_bytes().chunks(DATA_CHUNK) {
            self.bus
                .write_block(self.address, CONTROL_DATA, chunk)
                .map_err(display_error)?;
        }
        debug!("SSD1306: flushed {} bytes", BUFFER_LEN);
        Ok(())
    }
}
