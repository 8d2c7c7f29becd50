#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("bus I/O error ({message})")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },

    #[error("opening \"{path}\" failed ({message})")]
    Open { path: String, message: String },

    #[error("transfer of {0} bytes exceeds the maximum message length")]
    Length(usize),

    #[error("no acknowledge from register {0:#06X}")]
    Nack(u16),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Byte-level access to the device, typically an I2C adapter.
///
/// A transaction addresses a single target; register framing is the
/// responsibility of [`Channel`].
pub trait Transport: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Writes `bytes` then reads `buffer.len()` bytes without releasing the bus.
    fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Error>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        (**self).write(bytes)
    }

    fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Error> {
        (**self).write_read(bytes, buffer)
    }
}

/// Register framing over a transport: 16-bit big-endian addresses and
/// big-endian values of a fixed length.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Channel {
    value_length: usize,
}

impl Channel {
    pub const VALUE_16: Self = Self { value_length: 2 };

    pub const VALUE_32: Self = Self { value_length: 4 };

    pub fn value_length(&self) -> usize {
        self.value_length
    }

    pub fn write<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        address: u16,
        value: u32,
    ) -> Result<(), Error> {
        let value_bytes = value.to_be_bytes();
        let mut buffer = [0u8; 6];
        buffer[0..2].copy_from_slice(&address.to_be_bytes());
        buffer[2..2 + self.value_length].copy_from_slice(&value_bytes[4 - self.value_length..]);
        transport.write(&buffer[0..2 + self.value_length])
    }

    pub fn read<T: Transport + ?Sized>(&self, transport: &mut T, address: u16) -> Result<u32, Error> {
        let mut buffer = [0u8; 4];
        transport.write_read(
            &address.to_be_bytes(),
            &mut buffer[4 - self.value_length..],
        )?;
        Ok(u32::from_be_bytes(buffer))
    }

    /// Writes `data` verbatim starting at `address`, the device auto-increments.
    pub fn write_raw<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        address: u16,
        data: &[u8],
    ) -> Result<(), Error> {
        let mut buffer = Vec::with_capacity(2 + data.len());
        buffer.extend_from_slice(&address.to_be_bytes());
        buffer.extend_from_slice(data);
        transport.write(&buffer)
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::Error;

    const I2C_SLAVE: u32 = 0x0703;
    const I2C_RDWR: u32 = 0x0707;
    const I2C_M_RD: u16 = 0x0001;

    #[repr(C)]
    struct Message {
        address: u16,
        flags: u16,
        length: u16,
        buffer: *mut u8,
    }

    #[repr(C)]
    struct RdwrData {
        messages: *mut Message,
        count: u32,
    }

    /// I2C adapter exposed by the Linux i2c-dev interface (`/dev/i2c-N`).
    pub struct I2c {
        file: std::fs::File,
        address: u16,
    }

    impl I2c {
        pub fn open<P: AsRef<std::path::Path>>(path: P, address: u16) -> Result<Self, Error> {
            let path = path.as_ref();
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|error| Error::Open {
                    path: path.display().to_string(),
                    message: error.to_string(),
                })?;
            // SAFETY: the descriptor is owned by `file` and I2C_SLAVE takes an integer argument
            let result = unsafe {
                libc::ioctl(
                    std::os::unix::io::AsRawFd::as_raw_fd(&file),
                    I2C_SLAVE as _,
                    address as libc::c_ulong,
                )
            };
            if result < 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            Ok(Self { file, address })
        }

        fn transfer(&mut self, messages: &mut [Message]) -> Result<(), Error> {
            let mut data = RdwrData {
                messages: messages.as_mut_ptr(),
                count: messages.len() as u32,
            };
            // SAFETY: every message buffer outlives the call and its length matches the allocation
            let result = unsafe {
                libc::ioctl(
                    std::os::unix::io::AsRawFd::as_raw_fd(&self.file),
                    I2C_RDWR as _,
                    &mut data as *mut RdwrData,
                )
            };
            if result < 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            Ok(())
        }
    }

    fn message_length(length: usize) -> Result<u16, Error> {
        u16::try_from(length).map_err(|_| Error::Length(length))
    }

    impl super::Transport for I2c {
        fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
            let mut buffer = bytes.to_vec();
            let mut messages = [Message {
                address: self.address,
                flags: 0,
                length: message_length(buffer.len())?,
                buffer: buffer.as_mut_ptr(),
            }];
            self.transfer(&mut messages)
        }

        fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Error> {
            let mut request = bytes.to_vec();
            let mut messages = [
                Message {
                    address: self.address,
                    flags: 0,
                    length: message_length(request.len())?,
                    buffer: request.as_mut_ptr(),
                },
                Message {
                    address: self.address,
                    flags: I2C_M_RD,
                    length: message_length(buffer.len())?,
                    buffer: buffer.as_mut_ptr(),
                },
            ];
            self.transfer(&mut messages)
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux::I2c;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        writes: Vec<Vec<u8>>,
        response: Vec<u8>,
    }

    impl Transport for Recorder {
        fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
            self.writes.push(bytes.to_vec());
            Ok(())
        }

        fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Error> {
            self.writes.push(bytes.to_vec());
            buffer.copy_from_slice(&self.response[..buffer.len()]);
            Ok(())
        }
    }

    #[test]
    fn big_endian_framing() -> Result<(), Error> {
        let mut recorder = Recorder::default();
        Channel::VALUE_16.write(&mut recorder, 0x2000, 0x1234)?;
        Channel::VALUE_32.write(&mut recorder, 0xf038, 0x00840000)?;
        assert_eq!(recorder.writes[0], vec![0x20, 0x00, 0x12, 0x34]);
        assert_eq!(recorder.writes[1], vec![0xf0, 0x38, 0x00, 0x84, 0x00, 0x00]);
        Ok(())
    }

    #[test]
    fn read_widths() -> Result<(), Error> {
        let mut recorder = Recorder {
            writes: Vec::new(),
            response: vec![0x02, 0x65, 0xab, 0xcd],
        };
        assert_eq!(Channel::VALUE_16.read(&mut recorder, 0x0000)?, 0x0265);
        assert_eq!(Channel::VALUE_32.read(&mut recorder, 0x0008)?, 0x0265abcd);
        assert_eq!(recorder.writes, vec![vec![0x00, 0x00], vec![0x00, 0x08]]);
        Ok(())
    }

    #[test]
    fn raw_write_prefixes_address() -> Result<(), Error> {
        let mut recorder = Recorder::default();
        Channel::VALUE_16.write_raw(&mut recorder, 0x8800, &[1, 2, 3])?;
        assert_eq!(recorder.writes[0], vec![0x88, 0x00, 1, 2, 3]);
        Ok(())
    }
}
