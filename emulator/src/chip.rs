use isp_drivers::firmware;
use isp_drivers::registers;
use isp_drivers::registers::Fields;

pub const REGISTER_SPACE: usize = 0x10000;
pub const DEFAULT_CHIP_REVISION: u16 = 0x1203;
pub const DEFAULT_MIPI_T3: u32 = 0x0000_0a10;

const ADVANCED_BASE: u16 = registers::ADVANCED_BASE.offset();
const ADVANCED_WINDOW_START: u16 = registers::ADVANCED_WINDOW_START;
const WINDOW_END: usize = firmware::WINDOW_BASE as usize + firmware::WINDOW_SIZE;

/// Outcome of the checksum verification that follows a bootdata download.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Checksum {
    Valid,
    Corrupted(u16),
}

/// Simulated AP1302 register file and board resources.
#[derive(Debug)]
pub struct Chip {
    memory: Vec<u8>,
    advanced: std::collections::HashMap<u32, u8>,
    pub chip_version: u16,
    pub chip_revision: u16,
    pub checksums: std::collections::VecDeque<Checksum>,
    pub bootdata: Vec<u8>,
    pub downloads: usize,
    pub writes: Vec<(u16, Vec<u8>)>,
    pub reset: bool,
    pub standby: bool,
    pub clock: bool,
    pub regulators: bool,
    pub power_ons: usize,
    pub power_offs: usize,
    pub fail_address: Option<u16>,
    pub fail_clock: bool,
    pub fail_regulators: bool,
    pub firmware_files: std::collections::HashMap<String, Vec<u8>>,
    pub firmware_requests: Vec<String>,
}

impl Default for Chip {
    fn default() -> Self {
        let mut chip = Self {
            memory: vec![0; REGISTER_SPACE],
            advanced: std::collections::HashMap::new(),
            chip_version: registers::CHIP_ID as u16,
            chip_revision: DEFAULT_CHIP_REVISION,
            checksums: std::collections::VecDeque::new(),
            bootdata: Vec::new(),
            downloads: 0,
            writes: Vec::new(),
            reset: true,
            standby: false,
            clock: false,
            regulators: false,
            power_ons: 0,
            power_offs: 0,
            fail_address: None,
            fail_clock: false,
            fail_regulators: false,
            firmware_files: std::collections::HashMap::new(),
            firmware_requests: Vec::new(),
        };
        chip.reset_registers();
        chip
    }
}

impl Chip {
    pub fn is_powered(&self) -> bool {
        !self.reset && self.clock && self.regulators
    }

    /// Page currently selected by the page select register.
    pub fn page(&self) -> u32 {
        self.read_memory(ADVANCED_BASE, 4) & registers::PAGE_MASK
    }

    fn reset_registers(&mut self) {
        self.memory.iter_mut().for_each(|byte| *byte = 0);
        self.advanced.clear();
        self.bootdata.clear();
        let version = self.chip_version as u32;
        let revision = self.chip_revision as u32;
        self.write_memory(registers::CHIP_VERSION.offset(), version, 2);
        self.write_memory(registers::CHIP_REV.offset(), revision, 2);
        let t3 = registers::AdvHinfMipiT3::REGISTER.0 & 0x00ffffff;
        self.write_advanced(t3, DEFAULT_MIPI_T3, 4);
    }

    pub(crate) fn update_power(&mut self, was_powered: bool) {
        match (was_powered, self.is_powered()) {
            (false, true) => {
                self.power_ons += 1;
                self.reset_registers();
            }
            (true, false) => self.power_offs += 1,
            _ => (),
        }
    }

    fn read_memory(&self, address: u16, length: usize) -> u32 {
        let start = address as usize;
        self.memory[start..start + length]
            .iter()
            .fold(0u32, |value, byte| (value << 8) | *byte as u32)
    }

    fn write_memory(&mut self, address: u16, value: u32, length: usize) {
        let start = address as usize;
        let bytes = value.to_be_bytes();
        self.memory[start..start + length].copy_from_slice(&bytes[4 - length..]);
    }

    fn write_advanced(&mut self, key: u32, value: u32, length: usize) {
        let bytes = value.to_be_bytes();
        for (index, byte) in bytes[4 - length..].iter().enumerate() {
            self.advanced.insert(key + index as u32, *byte);
        }
    }

    /// Reads a register the way the driver addresses it, `page | offset`
    /// for paged registers.
    pub fn register(&self, register: registers::Register) -> u32 {
        let length = register.width() as usize;
        if register.page() == 0 {
            self.read_memory(register.offset(), length)
        } else {
            let key = register.0 & 0x00ffffff;
            (0..length as u32).fold(0u32, |value, index| {
                (value << 8) | *self.advanced.get(&(key + index)).unwrap_or(&0) as u32
            })
        }
    }

    /// Overwrites a register before the driver reads it.
    pub fn set_register(&mut self, register: registers::Register, value: u32) {
        let length = register.width() as usize;
        if register.page() == 0 {
            self.write_memory(register.offset(), value, length);
        } else {
            self.write_advanced(register.0 & 0x00ffffff, value, length);
        }
    }

    /// Addresses written since power on, in order.
    pub fn write_addresses(&self) -> Vec<u16> {
        self.writes.iter().map(|(address, _)| *address).collect()
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    fn check(&self, address: u16) -> Result<(), isp_drivers::bus::Error> {
        if !self.is_powered() || self.fail_address == Some(address) {
            Err(isp_drivers::bus::Error::Nack(address))
        } else {
            Ok(())
        }
    }

    fn store(&mut self, address: u16, data: &[u8]) {
        let start = address as usize;
        if start >= ADVANCED_WINDOW_START as usize
            && !(ADVANCED_BASE..ADVANCED_BASE + 4).contains(&address)
        {
            let key = self.page() | (address - ADVANCED_WINDOW_START) as u32;
            for (index, byte) in data.iter().enumerate() {
                self.advanced.insert(key + index as u32, *byte);
            }
            return;
        }
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    fn verify_bootdata(&mut self) {
        self.downloads += 1;
        let checksum = match self.checksums.pop_front().unwrap_or(Checksum::Valid) {
            Checksum::Valid => firmware::CHECKSUM_VALID,
            Checksum::Corrupted(value) => value as u32,
        };
        self.write_memory(registers::SIP_CHECKSUM.offset(), checksum, 2);
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<(), isp_drivers::bus::Error> {
        let address = u16::from_be_bytes([bytes[0], bytes[1]]);
        self.check(address)?;
        let data = &bytes[2..];
        self.writes.push((address, data.to_vec()));
        let start = address as usize;
        if (firmware::WINDOW_BASE as usize..WINDOW_END).contains(&start) {
            self.bootdata.extend_from_slice(data);
        }
        self.store(address, data);
        if address == registers::BOOTDATA_STAGE.offset()
            && self.read_memory(address, 2) == firmware::BOOTDATA_STAGE_COMPLETE
        {
            self.verify_bootdata();
        }
        Ok(())
    }

    pub(crate) fn write_read(
        &mut self,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), isp_drivers::bus::Error> {
        let address = u16::from_be_bytes([bytes[0], bytes[1]]);
        self.check(address)?;
        if address >= ADVANCED_WINDOW_START && !(ADVANCED_BASE..ADVANCED_BASE + 4).contains(&address)
        {
            let key = self.page() | (address - ADVANCED_WINDOW_START) as u32;
            for (index, byte) in buffer.iter_mut().enumerate() {
                *byte = *self.advanced.get(&(key + index as u32)).unwrap_or(&0);
            }
        } else {
            let start = address as usize;
            buffer.copy_from_slice(&self.memory[start..start + buffer.len()]);
        }
        Ok(())
    }
}
