use crate::bus;
use crate::configuration;
use crate::controls;
use crate::firmware;
use crate::modes;
use crate::platform;
use crate::registers;

/// Coarse classification shared by every error of the crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    InvalidArgument,
    Bus,
    FirmwareInvalid,
    FirmwareCorrupted,
    Busy,
    Unsupported,
    Timeout,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Kind::InvalidArgument => "invalid argument",
                Kind::Bus => "bus error",
                Kind::FirmwareInvalid => "invalid firmware",
                Kind::FirmwareCorrupted => "corrupted firmware",
                Kind::Busy => "busy",
                Kind::Unsupported => "unsupported",
                Kind::Timeout => "timeout",
            }
        )
    }
}

impl bus::Error {
    pub fn kind(&self) -> Kind {
        Kind::Bus
    }
}

impl registers::Error {
    pub fn kind(&self) -> Kind {
        match self {
            registers::Error::Bus(_) => Kind::Bus,
            registers::Error::Width(_) => Kind::InvalidArgument,
        }
    }
}

impl firmware::Error {
    pub fn kind(&self) -> Kind {
        match self {
            firmware::Error::Register(error) => error.kind(),
            firmware::Error::Request { .. }
            | firmware::Error::Header(_)
            | firmware::Error::PllInitSize { .. } => Kind::FirmwareInvalid,
            firmware::Error::Checksum { .. } => Kind::FirmwareCorrupted,
        }
    }
}

impl modes::Error {
    pub fn kind(&self) -> Kind {
        Kind::Unsupported
    }
}

impl controls::Error {
    pub fn kind(&self) -> Kind {
        Kind::InvalidArgument
    }
}

impl configuration::Error {
    pub fn kind(&self) -> Kind {
        Kind::InvalidArgument
    }
}

impl platform::Error {
    pub fn kind(&self) -> Kind {
        Kind::Bus
    }
}
