//! Bootdata download through the register space window.
//!
//! The firmware file starts with a [`Header`] followed by the bootdata. The
//! bootdata is written sequentially to a window starting at
//! [`WINDOW_BASE`], wrapping around every [`WINDOW_SIZE`] bytes. Writing
//! 0xFFFF to the bootdata stage register tells the chip that the download is
//! complete; the checksum register then reads 0xFFFF if the bootdata was
//! received intact.

use crate::bus;
use crate::registers;

pub const WINDOW_BASE: u16 = 0x8000;
pub const WINDOW_SIZE: usize = 0x2000;
pub const BLOCK_LENGTH: usize = 0x800;
pub const HEADER_LENGTH: usize = 4;
pub const BOOTDATA_STAGE_COMPLETE: u32 = 0xffff;
pub const CHECKSUM_VALID: u32 = 0xffff;
pub const SETTLE: std::time::Duration = std::time::Duration::from_millis(40);

const _: () = assert!(WINDOW_SIZE % BLOCK_LENGTH == 0);

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Register(#[from] registers::Error),

    #[error("firmware \"{name}\" could not be loaded ({message})")]
    Request { name: String, message: String },

    #[error("firmware is {0} bytes long, shorter than its header")]
    Header(usize),

    #[error("PLL init size ({pll_init_size} bytes) exceeds the bootdata size ({bootdata_size} bytes)")]
    PllInitSize {
        pll_init_size: u16,
        bootdata_size: usize,
    },

    #[error("checksum mismatch (expected {expected:#06X}, read {read:#06X})")]
    Checksum { expected: u32, read: u32 },
}

impl Error {
    /// Checksum mismatches are recovered by power cycling the chip and
    /// downloading again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Checksum { .. })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    pub pll_init_size: u16,
    pub crc: u16,
}

#[derive(Debug, Clone)]
pub struct Firmware {
    pub header: Header,
    bytes: Vec<u8>,
}

impl Firmware {
    pub fn parse(bytes: Vec<u8>) -> Result<Self, Error> {
        if bytes.len() < HEADER_LENGTH {
            return Err(Error::Header(bytes.len()));
        }
        let header = Header {
            pll_init_size: u16::from_le_bytes([bytes[0], bytes[1]]),
            crc: u16::from_le_bytes([bytes[2], bytes[3]]),
        };
        let bootdata_size = bytes.len() - HEADER_LENGTH;
        if header.pll_init_size as usize > bootdata_size {
            return Err(Error::PllInitSize {
                pll_init_size: header.pll_init_size,
                bootdata_size,
            });
        }
        Ok(Self { header, bytes })
    }

    pub fn bootdata(&self) -> &[u8] {
        &self.bytes[HEADER_LENGTH..]
    }
}

/// File name of the firmware matching a sensor model and count.
pub fn name(sensor: &str, sensors: u8) -> String {
    let suffix = match sensors {
        0 => "",
        1 => "_single",
        _ => "_dual",
    };
    format!("ap1302_{}{}_fw.bin", sensor, suffix)
}

pub trait Source: Send {
    fn request(&self, name: &str) -> Result<Vec<u8>, Error>;
}

impl<Function> Source for Function
where
    Function: Fn(&str) -> Result<Vec<u8>, Error> + Send,
{
    fn request(&self, name: &str) -> Result<Vec<u8>, Error> {
        self(name)
    }
}

/// Firmware files stored in a directory, `/lib/firmware` by default.
#[derive(Debug, Clone)]
pub struct Directory {
    path: std::path::PathBuf,
}

impl Directory {
    pub fn new<P: Into<std::path::PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new("/lib/firmware")
    }
}

impl Source for Directory {
    fn request(&self, name: &str) -> Result<Vec<u8>, Error> {
        std::fs::read(self.path.join(name)).map_err(|error| Error::Request {
            name: name.to_owned(),
            message: error.to_string(),
        })
    }
}

/// Write cursor of one download attempt.
#[derive(Debug, Default)]
pub struct Window {
    cursor: usize,
}

impl Window {
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn address(&self) -> u16 {
        (self.cursor % WINDOW_SIZE) as u16 + WINDOW_BASE
    }

    pub fn write<Bus: bus::Transport>(
        &mut self,
        registers: &mut registers::Registers<Bus>,
        data: &[u8],
    ) -> Result<(), Error> {
        registers.write_raw(self.address(), data)?;
        self.cursor += data.len();
        Ok(())
    }
}

/// Downloads the bootdata and checks the chip checksum.
///
/// A [`Error::Checksum`] leaves the chip untouched, the caller must power
/// cycle it before trying again.
pub fn load<Bus: bus::Transport>(
    registers: &mut registers::Registers<Bus>,
    firmware: &Firmware,
) -> Result<(), Error> {
    let mut window = Window::default();
    for block in firmware.bootdata().chunks(BLOCK_LENGTH) {
        window.write(registers, block)?;
    }
    tracing::debug!("wrote {} bytes of bootdata", window.cursor());

    registers.write(registers::BOOTDATA_STAGE, BOOTDATA_STAGE_COMPLETE)?;
    std::thread::sleep(SETTLE);
    let checksum = registers.read(registers::SIP_CHECKSUM)?;
    if checksum != CHECKSUM_VALID {
        tracing::warn!(
            "CRC mismatch: expected {:#06x}, got {:#06x}",
            CHECKSUM_VALID,
            checksum
        );
        return Err(Error::Checksum {
            expected: CHECKSUM_VALID,
            read: checksum,
        });
    }

    adjust_mipi_clock_timings(registers)
}

fn adjust_mipi_clock_timings<Bus: bus::Transport>(
    registers: &mut registers::Registers<Bus>,
) -> Result<(), Error> {
    let mut t3 = registers.read_fields::<registers::AdvHinfMipiT3>()?;
    t3.tclk_post += 0x5;
    t3.tclk_pre += 0x1;
    registers.write_fields(t3)?;
    Ok(())
}
