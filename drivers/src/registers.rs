use crate::bus;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Bus(#[from] bus::Error),

    #[error("register {0:#010X} does not encode a 2 or 4 bytes width")]
    Width(u32),
}

pub const PAGE_MASK: u32 = 0x00ff0000;

/// Paged registers are accessed through this window once their page is selected.
pub const ADVANCED_WINDOW_START: u16 = 0xe000;

/// Logical register reference, `width << 24 | page << 16 | offset`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Register(pub u32);

impl Register {
    pub const fn u16(address: u32) -> Self {
        Self((2 << 24) | address)
    }

    pub const fn u32(address: u32) -> Self {
        Self((4 << 24) | address)
    }

    pub const fn width(self) -> u32 {
        self.0 >> 24
    }

    pub const fn page(self) -> u32 {
        self.0 & PAGE_MASK
    }

    pub const fn offset(self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    fn channel(self) -> Result<bus::Channel, Error> {
        match self.width() {
            2 => Ok(bus::Channel::VALUE_16),
            4 => Ok(bus::Channel::VALUE_32),
            _ => Err(Error::Width(self.0)),
        }
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{:#010X}", self.0)
    }
}

// Info
pub const CHIP_VERSION: Register = Register::u16(0x0000);
pub const CHIP_ID: u32 = 0x0265;
pub const CHIP_REV: Register = Register::u16(0x0050);

// Preview context
pub const PREVIEW_WIDTH: Register = Register::u16(0x2000);
pub const PREVIEW_HEIGHT: Register = Register::u16(0x2002);

// IQ
pub const AE_CTRL: Register = Register::u16(0x5002);
pub const AE_CTRL_MANUAL_EXP_TIME_GAIN: u32 = 0;
pub const AE_CTRL_FULL_AUTO: u32 = 12;
pub const AE_MANUAL_GAIN: Register = Register::u16(0x5006);
pub const AWB_CTRL: Register = Register::u16(0x5100);
pub const AWB_CTRL_MODE_MANUAL: u32 = 7;
pub const AWB_CTRL_MODE_AUTO: u32 = 15;
pub const CONTRAST: Register = Register::u16(0x7002);
pub const SATURATION: Register = Register::u16(0x7006);

// System
pub const BOOTDATA_STAGE: Register = Register::u16(0x6002);

// Misc
pub const ADVANCED_BASE: Register = Register::u32(0xf038);
pub const SIP_CHECKSUM: Register = Register::u16(0x6134);

/// Bit-field register layout, fields are `start..end` bit ranges.
pub trait Fields: Sized {
    const REGISTER: Register;

    fn value(&self) -> u32;

    fn from_value(value: u32) -> Self;
}

macro_rules! register {
    ($name:ident, $register:expr, {$($field:ident: $start:literal..$end:literal),+ $(,)?}) => {
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            $(
                pub $field: u32,
            )+
        }

        $(
            const _: () = assert!($start < $end);
        )+

        impl Fields for $name {
            const REGISTER: Register = $register;

            fn value(&self) -> u32 {
                0u32
                $(
                    | ((self.$field & (((1u64 << ($end - $start)) - 1) as u32)) << $start)
                )+
            }

            fn from_value(value: u32) -> Self {
                Self {
                    $(
                        $field: (value >> $start) & (((1u64 << ($end - $start)) - 1) as u32),
                    )+
                }
            }
        }
    };
}

register! { PreviewOutFmt, Register::u16(0x2012), {
    fst: 0..4,
    ft: 4..8,
    iis: 8..10,
    st_en: 10..11,
    fake_en: 11..12,
    ss: 12..13,
    ipipe_bypass: 13..14,
    reserved_14_16: 14..16,
}}

pub const PREVIEW_OUT_FMT_FT_YUV_JFIF: u32 = 5;
pub const PREVIEW_OUT_FMT_FST_YUV_422: u32 = 0;

register! { PreviewHinfCtrl, Register::u16(0x2030), {
    mipi_lanes: 0..3,
    mipi_mode: 3..4,
    spoof: 4..5,
    mipi_cont_clk: 5..6,
    fv_pol: 6..7,
    lv_pol: 7..8,
    mux_delay: 8..14,
    bt656_16bit: 14..15,
    bt656_le: 15..16,
}}

register! { FlickCtrl, Register::u16(0x5440), {
    mode: 0..2,
    frc_en: 2..3,
    frc_override_upper_et: 3..4,
    frc_override_max_et: 4..5,
    etc_dis: 5..6,
    etc_ihdr_up: 6..7,
    reserved_7_8: 7..8,
    frequency: 8..16,
}}

pub const FLICK_CTRL_MODE_DISABLED: u32 = 0;
pub const FLICK_CTRL_MODE_MANUAL: u32 = 1;
pub const FLICK_CTRL_MODE_AUTO: u32 = 2;

register! { SysStart, Register::u16(0x601a), {
    pll_init: 0..1,
    patch_fun: 1..2,
    reserved_2_4: 2..4,
    go: 4..5,
    reserved_5_6: 5..6,
    stall_mode: 6..8,
    stall_en: 8..9,
    stall_status: 9..10,
    reserved_10_11: 10..11,
    restart_error: 11..12,
    load_otp: 12..13,
    reserved_13_15: 13..15,
    pll_lock: 15..16,
}}

pub const SYS_START_STALL_MODE_DISABLED: u32 = 1;

register! { AdvIrqSysInte, Register::u32(0x00230000), {
    gpio_pin: 0..1,
    gpio_cnt: 1..2,
    spi: 2..3,
    sips_fifo_write: 3..4,
    sips_direct_write: 4..5,
    sips_adr_range: 5..6,
    sipm: 6..8,
    ip: 8..9,
    ipipe_a: 9..10,
    ipipe_b: 10..11,
    ipipe_s: 11..12,
    sinf: 12..13,
    reserved_13_32: 13..32,
}}

register! { AdvHinfMipiT3, Register::u32(0x00840014), {
    tclk_post: 0..8,
    tclk_pre: 8..16,
    reserved_16_32: 16..32,
}}

/// Register access layer: selects the page of paged registers and routes
/// each access to the channel matching the register width.
pub struct Registers<Bus> {
    bus: Bus,
    page: Option<u32>,
}

impl<Bus: bus::Transport> Registers<Bus> {
    pub fn new(bus: Bus) -> Self {
        Self { bus, page: None }
    }

    pub fn page(&self) -> Option<u32> {
        self.page
    }

    /// The page register resets with the chip, call after every power cycle.
    pub fn invalidate_page(&mut self) {
        self.page = None;
    }

    pub fn bus(&mut self) -> &mut Bus {
        &mut self.bus
    }

    fn resolve(&mut self, register: Register) -> Result<u16, Error> {
        let page = register.page();
        if page == 0 {
            return Ok(register.offset());
        }
        if self.page != Some(page) {
            self.transfer_write(ADVANCED_BASE, ADVANCED_BASE.offset(), page)?;
            self.page = Some(page);
        }
        Ok(register.offset().wrapping_add(ADVANCED_WINDOW_START))
    }

    fn transfer_write(&mut self, register: Register, address: u16, value: u32) -> Result<(), Error> {
        let channel = register.channel()?;
        channel
            .write(&mut self.bus, address, value)
            .map_err(|error| {
                tracing::error!("register {:#06x} write failed: {}", address, error);
                Error::from(error)
            })
    }

    pub fn read(&mut self, register: Register) -> Result<u32, Error> {
        let channel = register.channel()?;
        let address = self.resolve(register)?;
        let value = channel.read(&mut self.bus, address).map_err(|error| {
            tracing::error!("register {:#06x} read failed: {}", address, error);
            Error::from(error)
        })?;
        tracing::trace!("R{:#06x} = {:#x}", address, value);
        Ok(value)
    }

    pub fn write(&mut self, register: Register, value: u32) -> Result<(), Error> {
        register.channel()?;
        let address = self.resolve(register)?;
        tracing::trace!("W{:#06x} = {:#x}", address, value);
        self.transfer_write(register, address, value)
    }

    pub fn read_fields<F: Fields>(&mut self) -> Result<F, Error> {
        Ok(F::from_value(self.read(F::REGISTER)?))
    }

    pub fn write_fields<F: Fields>(&mut self, fields: F) -> Result<(), Error> {
        self.write(F::REGISTER, fields.value())
    }

    /// Writes a block through the 16-bit channel, bypassing page selection.
    pub fn write_raw(&mut self, address: u16, data: &[u8]) -> Result<(), Error> {
        bus::Channel::VALUE_16
            .write_raw(&mut self.bus, address, data)
            .map_err(|error| {
                tracing::error!(
                    "raw write of {} bytes at {:#06x} failed: {}",
                    data.len(),
                    address,
                    error
                );
                Error::from(error)
            })
    }
}

/// Deferred register writes, applied in order until the first failure.
#[derive(Debug, Default, Clone)]
pub struct Batch {
    writes: Vec<(Register, u32)>,
}

impl Batch {
    pub fn new() -> Self {
        Self { writes: Vec::new() }
    }

    pub fn write(mut self, register: Register, value: u32) -> Self {
        self.writes.push((register, value));
        self
    }

    pub fn fields<F: Fields>(self, fields: F) -> Self {
        self.write(F::REGISTER, fields.value())
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn apply<Bus: bus::Transport>(&self, registers: &mut Registers<Bus>) -> Result<(), Error> {
        self.writes
            .iter()
            .try_for_each(|(register, value)| registers.write(*register, *value))
    }
}
