#![allow(dead_code)]

use isp_drivers::configuration;

pub const FIRMWARE_NAME: &str = "ap1302_ar0821_single_fw.bin";

/// Two full window rotations plus a partial block.
pub const BOOTDATA_LENGTH: usize = 0x2000 * 2 + 0x800 + 0x123;

pub type Device = isp_drivers::Device<isp_emulator::Bus, isp_emulator::Board>;

pub fn emulator() -> isp_emulator::Emulator {
    isp_emulator::Emulator::new()
        .with_firmware(FIRMWARE_NAME, isp_emulator::firmware_blob(BOOTDATA_LENGTH))
}

pub fn open_with(
    emulator: &isp_emulator::Emulator,
    configuration: configuration::Configuration,
) -> Result<Device, isp_drivers::Error> {
    Device::open(
        emulator.bus(),
        emulator.board(),
        emulator.source(),
        configuration,
    )
}

pub fn open(emulator: &isp_emulator::Emulator) -> Result<Device, isp_drivers::Error> {
    open_with(emulator, configuration::DEFAULT_CONFIGURATION)
}
