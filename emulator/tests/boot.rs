mod common;

use isp_drivers::configuration;
use isp_drivers::device::ChipRevision;
use isp_drivers::firmware;
use isp_drivers::registers;
use isp_drivers::registers::Fields;
use isp_drivers::{Kind, State};
use isp_emulator::Checksum;

#[test]
fn boot_loads_firmware_and_restores_mode() -> Result<(), isp_drivers::Error> {
    let emulator = common::emulator();
    let device = common::open(&emulator)?;
    assert!(matches!(device.state(), State::Off));
    device.power(true)?;
    assert!(matches!(device.state(), State::Idle));
    assert_eq!(device.power_count(), 1);
    assert_eq!(
        device.chip_revision(),
        Some(ChipRevision {
            major: 1,
            minor: 2,
            patch: 3
        })
    );

    let chip = emulator.chip();
    assert!(chip.is_powered());
    assert_eq!(chip.power_ons, 1);
    assert_eq!(chip.downloads, 1);
    assert_eq!(chip.firmware_requests, vec![common::FIRMWARE_NAME.to_owned()]);
    let blob = isp_emulator::firmware_blob(common::BOOTDATA_LENGTH);
    assert_eq!(chip.bootdata, blob[firmware::HEADER_LENGTH..].to_vec());

    assert_eq!(chip.register(registers::PREVIEW_WIDTH), 3840);
    assert_eq!(chip.register(registers::PREVIEW_HEIGHT), 2160);
    assert_eq!(
        chip.register(registers::PreviewHinfCtrl::REGISTER),
        registers::PreviewHinfCtrl {
            spoof: 1,
            mipi_lanes: 4,
            ..Default::default()
        }
        .value()
    );
    assert_eq!(chip.register(registers::PreviewOutFmt::REGISTER), 0x0050);
    assert_eq!(chip.register(registers::AdvHinfMipiT3::REGISTER), 0x0b15);
    assert_eq!(
        chip.register(registers::AWB_CTRL),
        registers::AWB_CTRL_MODE_AUTO
    );
    assert_eq!(
        chip.register(registers::AE_CTRL),
        registers::AE_CTRL_FULL_AUTO
    );
    assert_eq!(chip.register(registers::SATURATION), 64);
    assert_eq!(chip.register(registers::FlickCtrl::REGISTER), 0x3201);
    Ok(())
}

#[test]
fn firmware_window_addresses_wrap() -> Result<(), isp_drivers::Error> {
    let emulator = common::emulator();
    let device = common::open(&emulator)?;
    device.power(true)?;
    let chip = emulator.chip();
    let window = chip
        .writes
        .iter()
        .filter(|(address, _)| (0x8000..0xa000).contains(address))
        .collect::<Vec<_>>();
    let blocks = (common::BOOTDATA_LENGTH + firmware::BLOCK_LENGTH - 1) / firmware::BLOCK_LENGTH;
    assert_eq!(window.len(), blocks);
    for (k, (address, data)) in window.iter().enumerate() {
        assert_eq!(
            *address as usize,
            (k * firmware::BLOCK_LENGTH) % firmware::WINDOW_SIZE + firmware::WINDOW_BASE as usize
        );
        if k + 1 < blocks {
            assert_eq!(data.len(), firmware::BLOCK_LENGTH);
        } else {
            assert_eq!(data.len(), common::BOOTDATA_LENGTH % firmware::BLOCK_LENGTH);
        }
    }
    Ok(())
}

#[test]
fn corrupted_downloads_are_retried() -> Result<(), isp_drivers::Error> {
    let emulator = common::emulator();
    emulator
        .chip()
        .checksums
        .extend([Checksum::Corrupted(0x1234), Checksum::Corrupted(0x0000)]);
    let device = common::open(&emulator)?;
    device.power(true)?;
    assert!(matches!(device.state(), State::Idle));
    let chip = emulator.chip();
    assert_eq!(chip.downloads, 3);
    // one power on and two power cycles
    assert_eq!(chip.power_ons, 3);
    assert_eq!(chip.power_offs, 2);
    assert!(chip.is_powered());
    assert_eq!(chip.register(registers::AdvHinfMipiT3::REGISTER), 0x0b15);
    Ok(())
}

#[test]
fn persistent_corruption_times_out() -> Result<(), isp_drivers::Error> {
    let emulator = common::emulator();
    emulator.chip().checksums.extend([
        Checksum::Corrupted(0x0001),
        Checksum::Corrupted(0x0002),
        Checksum::Corrupted(0x0003),
    ]);
    let device = common::open(&emulator)?;
    let error = device.power(true).expect_err("every download is corrupted");
    assert_eq!(error.kind(), Kind::Timeout);
    assert_eq!(device.power_count(), 0);
    assert!(matches!(device.state(), State::Failed(_)));
    {
        let chip = emulator.chip();
        assert_eq!(chip.downloads, 3);
        assert!(!chip.is_powered());
        assert!(!chip.clock);
        assert!(!chip.regulators);
    }

    // the failure sticks until an explicit shutdown
    let error = device.power(true).expect_err("failed state");
    assert_eq!(error.kind(), Kind::Timeout);
    assert_eq!(emulator.chip().downloads, 3);

    device.shutdown();
    assert!(matches!(device.state(), State::Off));
    device.power(true)?;
    assert!(matches!(device.state(), State::Idle));
    Ok(())
}

#[test]
fn wrong_chip_is_unsupported() -> Result<(), isp_drivers::Error> {
    let emulator = common::emulator();
    emulator.chip().chip_version = 0x0266;
    let device = common::open(&emulator)?;
    let error = device.power(true).expect_err("chip version mismatch");
    assert_eq!(error.kind(), Kind::Unsupported);
    assert!(matches!(device.state(), State::Failed(_)));
    assert_eq!(emulator.chip().downloads, 0);
    assert!(!emulator.chip().is_powered());
    Ok(())
}

#[test]
fn missing_firmware_is_invalid() -> Result<(), isp_drivers::Error> {
    let emulator = isp_emulator::Emulator::new();
    let device = common::open_with(
        &emulator,
        configuration::Configuration {
            sensor: configuration::Sensor::Ar1335,
            sensors: 2,
            ..configuration::DEFAULT_CONFIGURATION
        },
    )?;
    let error = device.power(true).expect_err("no firmware file");
    assert_eq!(error.kind(), Kind::FirmwareInvalid);
    assert_eq!(
        emulator.chip().firmware_requests,
        vec!["ap1302_ar1335_dual_fw.bin".to_owned()]
    );
    assert!(!emulator.chip().is_powered());
    Ok(())
}

#[test]
fn truncated_firmware_is_invalid() -> Result<(), isp_drivers::Error> {
    let emulator =
        isp_emulator::Emulator::new().with_firmware(common::FIRMWARE_NAME, vec![0x00, 0x01]);
    let device = common::open(&emulator)?;
    let error = device.power(true).expect_err("header is truncated");
    assert_eq!(error.kind(), Kind::FirmwareInvalid);
    Ok(())
}

#[test]
fn bus_failure_during_boot_powers_off() -> Result<(), isp_drivers::Error> {
    let emulator = common::emulator();
    emulator.chip().fail_address = Some(registers::PREVIEW_WIDTH.offset());
    let device = common::open(&emulator)?;
    let error = device.power(true).expect_err("preview width write fails");
    assert_eq!(error.kind(), Kind::Bus);
    assert!(matches!(device.state(), State::Off));
    assert!(!emulator.chip().is_powered());

    emulator.chip().fail_address = None;
    device.power(true)?;
    assert!(matches!(device.state(), State::Idle));
    Ok(())
}

#[test]
fn regulator_failure_releases_clock() -> Result<(), isp_drivers::Error> {
    let emulator = common::emulator();
    emulator.chip().fail_regulators = true;
    let device = common::open(&emulator)?;
    let error = device.power(true).expect_err("regulators fail");
    assert_eq!(error.kind(), Kind::Bus);
    assert!(matches!(device.state(), State::Off));
    let chip = emulator.chip();
    assert!(!chip.clock);
    assert_eq!(chip.power_ons, 0);
    Ok(())
}

#[test]
fn power_is_reference_counted() -> Result<(), isp_drivers::Error> {
    let emulator = common::emulator();
    let device = common::open(&emulator)?;
    device.power(true)?;
    device.power(true)?;
    assert_eq!(emulator.chip().downloads, 1);
    device.power(false)?;
    assert_eq!(device.power_count(), 1);
    assert!(emulator.chip().is_powered());
    assert!(matches!(device.state(), State::Idle));
    device.power(false)?;
    assert_eq!(device.power_count(), 0);
    assert!(!emulator.chip().is_powered());
    assert!(matches!(device.state(), State::Off));

    let error = device.power(false).expect_err("count is already zero");
    assert_eq!(error.kind(), Kind::InvalidArgument);
    assert_eq!(device.power_count(), 0);
    Ok(())
}

#[test]
fn invalid_configuration_is_rejected() {
    let emulator = common::emulator();
    for configuration in [
        configuration::Configuration {
            virtual_channel: 4,
            ..configuration::DEFAULT_CONFIGURATION
        },
        configuration::Configuration {
            xclk_frequency: 60_000_000,
            ..configuration::DEFAULT_CONFIGURATION
        },
    ] {
        match common::open_with(&emulator, configuration) {
            Ok(_) => panic!("configuration must be rejected"),
            Err(error) => assert_eq!(error.kind(), Kind::InvalidArgument),
        }
    }
}

#[test]
fn dropping_a_powered_device_powers_off() -> Result<(), isp_drivers::Error> {
    let emulator = common::emulator();
    {
        let device = common::open(&emulator)?;
        device.power(true)?;
        assert!(emulator.chip().is_powered());
    }
    assert!(!emulator.chip().is_powered());
    Ok(())
}
