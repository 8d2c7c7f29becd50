pub mod bus;
pub mod configuration;
pub mod controls;
pub mod device;
pub mod error;
pub mod firmware;
pub mod modes;
pub mod platform;
pub mod properties;
pub mod registers;

pub use crate::configuration::Configuration;
pub use crate::device::Device;
pub use crate::device::Error;
pub use crate::device::State;
pub use crate::error::Kind;

pub use bincode;
pub use isp_types as types;
pub use libc;
