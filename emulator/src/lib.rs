pub mod chip;

pub use chip::Checksum;
pub use chip::Chip;

use isp_drivers::bus;
use isp_drivers::firmware;
use isp_drivers::platform;

/// Shared handle on a simulated chip. [`Emulator::bus`], [`Emulator::board`]
/// and [`Emulator::source`] hand out the pieces a driver session needs while
/// the test keeps this handle to inspect and script the chip.
#[derive(Debug, Clone, Default)]
pub struct Emulator {
    chip: std::sync::Arc<std::sync::Mutex<Chip>>,
}

impl Emulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `firmware` under `name` to [`Emulator::source`].
    pub fn with_firmware(self, name: &str, firmware: Vec<u8>) -> Self {
        self.chip()
            .firmware_files
            .insert(name.to_owned(), firmware);
        self
    }

    pub fn chip(&self) -> std::sync::MutexGuard<'_, Chip> {
        // unwrap: mutex is not poisoned
        self.chip.lock().unwrap()
    }

    pub fn bus(&self) -> Bus {
        Bus {
            chip: self.chip.clone(),
        }
    }

    pub fn board(&self) -> Board {
        Board {
            chip: self.chip.clone(),
        }
    }

    pub fn source(&self) -> Source {
        Source {
            chip: self.chip.clone(),
        }
    }
}

/// Firmware blob with a valid header around `bootdata_length` bytes.
pub fn firmware_blob(bootdata_length: usize) -> Vec<u8> {
    let mut blob = Vec::with_capacity(firmware::HEADER_LENGTH + bootdata_length);
    blob.extend_from_slice(&0x0100u16.to_le_bytes());
    blob.extend_from_slice(&0x5a5au16.to_le_bytes());
    blob.extend((0..bootdata_length).map(|index| (index * 7 % 256) as u8));
    blob
}

pub struct Bus {
    chip: std::sync::Arc<std::sync::Mutex<Chip>>,
}

impl bus::Transport for Bus {
    fn write(&mut self, bytes: &[u8]) -> Result<(), bus::Error> {
        // unwrap: mutex is not poisoned
        self.chip.lock().unwrap().write(bytes)
    }

    fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<(), bus::Error> {
        // unwrap: mutex is not poisoned
        self.chip.lock().unwrap().write_read(bytes, buffer)
    }
}

pub struct Board {
    chip: std::sync::Arc<std::sync::Mutex<Chip>>,
}

impl Board {
    fn update<Update: FnOnce(&mut Chip) -> Result<(), platform::Error>>(
        &mut self,
        update: Update,
    ) -> Result<(), platform::Error> {
        // unwrap: mutex is not poisoned
        let mut chip = self.chip.lock().unwrap();
        let was_powered = chip.is_powered();
        let result = update(&mut *chip);
        chip.update_power(was_powered);
        result
    }
}

impl platform::Platform for Board {
    fn set_reset(&mut self, asserted: bool) -> Result<(), platform::Error> {
        self.update(|chip| {
            chip.reset = asserted;
            Ok(())
        })
    }

    fn set_standby(&mut self, asserted: bool) -> Result<(), platform::Error> {
        self.update(|chip| {
            chip.standby = asserted;
            Ok(())
        })
    }

    fn enable_clock(&mut self) -> Result<(), platform::Error> {
        self.update(|chip| {
            if chip.fail_clock {
                return Err(platform::Error::Resource {
                    resource: "clock",
                    message: "emulated failure".to_owned(),
                });
            }
            chip.clock = true;
            Ok(())
        })
    }

    fn disable_clock(&mut self) {
        let _ = self.update(|chip| {
            chip.clock = false;
            Ok(())
        });
    }

    fn enable_regulators(&mut self) -> Result<(), platform::Error> {
        self.update(|chip| {
            if chip.fail_regulators {
                return Err(platform::Error::Resource {
                    resource: "regulators",
                    message: "emulated failure".to_owned(),
                });
            }
            chip.regulators = true;
            Ok(())
        })
    }

    fn disable_regulators(&mut self) {
        let _ = self.update(|chip| {
            chip.regulators = false;
            Ok(())
        });
    }
}

pub struct Source {
    chip: std::sync::Arc<std::sync::Mutex<Chip>>,
}

impl firmware::Source for Source {
    fn request(&self, name: &str) -> Result<Vec<u8>, firmware::Error> {
        // unwrap: mutex is not poisoned
        let mut chip = self.chip.lock().unwrap();
        chip.firmware_requests.push(name.to_owned());
        chip.firmware_files
            .get(name)
            .cloned()
            .ok_or_else(|| firmware::Error::Request {
                name: name.to_owned(),
                message: "no such file".to_owned(),
            })
    }
}
