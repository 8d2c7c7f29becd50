use crate::bus;
use crate::configuration;
use crate::controls;
use crate::error;
use crate::firmware;
use crate::modes;
use crate::platform;
use crate::properties;
use crate::registers;

use isp_types::{Colorspace, Field, Format, Fraction, PixelCode, Quantization, Resolution};

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Registers(#[from] registers::Error),

    #[error(transparent)]
    Firmware(#[from] firmware::Error),

    #[error(transparent)]
    Modes(#[from] modes::Error),

    #[error(transparent)]
    Controls(#[from] controls::Error),

    #[error(transparent)]
    Configuration(#[from] configuration::Error),

    #[error(transparent)]
    Platform(#[from] platform::Error),

    #[error("invalid chip version (expected {expected:#06X}, read {read:#06X})")]
    ChipId { expected: u32, read: u32 },

    #[error("the device is not powered")]
    NotPowered,

    #[error("the device is streaming")]
    Streaming,

    #[error("the power count is already zero")]
    PowerCount,

    #[error("firmware checksum still invalid after {0} attempts")]
    Timeout(u8),

    #[error("streaming requires a MIPI CSI-2 bus (configured bus is {0:?})")]
    BusType(configuration::BusType),

    #[error("{0} must not be zero")]
    Zero(&'static str),

    #[error("index {0} is out of range")]
    Index(usize),
}

impl Error {
    pub fn kind(&self) -> error::Kind {
        match self {
            Error::Registers(error) => error.kind(),
            Error::Firmware(error) => error.kind(),
            Error::Modes(error) => error.kind(),
            Error::Controls(error) => error.kind(),
            Error::Configuration(error) => error.kind(),
            Error::Platform(error) => error.kind(),
            Error::ChipId { .. } | Error::BusType(_) => error::Kind::Unsupported,
            Error::NotPowered | Error::Streaming => error::Kind::Busy,
            Error::PowerCount | Error::Zero(_) | Error::Index(_) => error::Kind::InvalidArgument,
            Error::Timeout(_) => error::Kind::Timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub enum State {
    Off,
    PoweringOn,
    FirmwareLoading,
    Idle,
    Streaming,

    /// The boot sequence failed, only [`Device::shutdown`] leaves this state.
    Failed(Error),
}

impl State {
    pub fn is_streaming(&self) -> bool {
        matches!(self, State::Streaming)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChipRevision {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl ChipRevision {
    pub fn from_register(value: u32) -> Self {
        Self {
            major: ((value & 0xf000) >> 12) as u8,
            minor: ((value & 0x0f00) >> 8) as u8,
            patch: (value & 0x00ff) as u8,
        }
    }
}

impl std::fmt::Display for ChipRevision {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

pub const STREAM_STOP_DELAY: std::time::Duration = std::time::Duration::from_millis(200);

pub const DEFAULT_FORMAT: Format = Format {
    width: 3840,
    height: 2160,
    code: PixelCode::Uyvy8_1x16,
    colorspace: Colorspace::Srgb,
    quantization: Quantization::FullRange,
    field: Field::None,
};

pub const DEFAULT_FRAME_RATE: modes::FrameRate = modes::FrameRate::Fps30;

struct Session<Bus, Board> {
    registers: registers::Registers<Bus>,
    platform: Board,
    source: Box<dyn firmware::Source>,
    configuration: configuration::Configuration,
    state: State,
    power_count: u32,
    mode: &'static modes::Mode,
    previous_mode: Option<&'static modes::Mode>,
    frame_rate: modes::FrameRate,
    frame_interval: Fraction,
    format: Format,
    pending_mode_change: bool,
    pending_format_change: bool,
    controls: controls::Controls,
    pixel_rate: u64,
    chip_revision: Option<ChipRevision>,
}

impl<Bus: bus::Transport, Board: platform::Platform> Session<Bus, Board> {
    fn is_streaming(&self) -> bool {
        self.state.is_streaming()
    }

    fn update_pixel_rate(&mut self) {
        self.pixel_rate = modes::pixel_rate(self.mode, self.frame_rate);
    }

    fn power_on(&mut self) -> Result<(), Error> {
        platform::power_on(&mut self.platform)?;
        self.registers.invalidate_page();
        Ok(())
    }

    fn power_off(&mut self) {
        platform::power_off(&mut self.platform);
        self.registers.invalidate_page();
    }

    fn detect_chip(&mut self) -> Result<(), Error> {
        let version = self.registers.read(registers::CHIP_VERSION)?;
        let revision = ChipRevision::from_register(self.registers.read(registers::CHIP_REV)?);
        if version != properties::PROPERTIES.chip_id {
            tracing::error!(
                "invalid chip version, expected {:#06x}, got {:#06x}",
                properties::PROPERTIES.chip_id,
                version
            );
            return Err(Error::ChipId {
                expected: properties::PROPERTIES.chip_id,
                read: version,
            });
        }
        tracing::info!("AP1302 revision {} detected", revision);
        self.chip_revision = Some(revision);
        Ok(())
    }

    /// Detects the chip and downloads the firmware, power cycling the chip
    /// after every corrupted download.
    fn load_firmware(&mut self) -> Result<(), Error> {
        let name = firmware::name(
            self.configuration.sensor.name(),
            self.configuration.sensors,
        );
        let firmware = firmware::Firmware::parse(self.source.request(&name)?)?;
        tracing::debug!(
            "firmware \"{}\" ({} bytes of bootdata, PLL init size {}, CRC {:#06x})",
            name,
            firmware.bootdata().len(),
            firmware.header.pll_init_size,
            firmware.header.crc
        );
        let retries = self.configuration.firmware_retries;
        for attempt in 1..=retries {
            self.detect_chip()?;
            match firmware::load(&mut self.registers, &firmware) {
                Ok(()) => {
                    tracing::info!("firmware \"{}\" loaded", name);
                    return Ok(());
                }
                Err(error) if error.is_retryable() => {
                    tracing::warn!("attempt {}/{}: {}", attempt, retries, error);
                    if attempt < retries {
                        self.power_off();
                        self.power_on()?;
                    }
                }
                Err(error) => return Err(error.into()),
            }
        }
        Err(Error::Timeout(retries))
    }

    /// Programs the committed mode, both downscale strategies share this path.
    fn apply_mode(&mut self) -> Result<(), Error> {
        let mode = self.mode;
        if let Some(previous_mode) = self.previous_mode {
            tracing::debug!(
                "mode {}x{} ({:?}) -> {}x{} ({:?})",
                previous_mode.width,
                previous_mode.height,
                previous_mode.downscale,
                mode.width,
                mode.height,
                mode.downscale
            );
        }
        registers::Batch::new()
            .fields(registers::PreviewHinfCtrl {
                spoof: 1,
                mipi_lanes: self.configuration.data_lanes as u32,
                ..Default::default()
            })
            .write(registers::PREVIEW_WIDTH, mode.width)
            .write(registers::PREVIEW_HEIGHT, mode.height)
            .apply(&mut self.registers)?;
        self.pending_mode_change = false;
        self.previous_mode = Some(mode);
        Ok(())
    }

    fn apply_format(&mut self) -> Result<(), Error> {
        self.registers.write_fields(registers::PreviewOutFmt {
            ft: registers::PREVIEW_OUT_FMT_FT_YUV_JFIF,
            fst: registers::PREVIEW_OUT_FMT_FST_YUV_422,
            ..Default::default()
        })?;
        self.pending_format_change = false;
        Ok(())
    }

    fn restore(&mut self) -> Result<(), Error> {
        modes::POWER_ON_MODE.program(&mut self.registers)?;
        self.previous_mode = Some(&modes::POWER_ON_MODE);
        self.apply_mode()?;
        self.apply_format()?;
        controls::update(None, &self.controls).apply(&mut self.registers)?;
        Ok(())
    }

    fn boot(&mut self) -> Result<(), Error> {
        self.state = State::PoweringOn;
        if let Err(error) = self.power_on() {
            tracing::error!("power on failed: {}", error);
            self.state = State::Off;
            return Err(error);
        }
        self.state = State::FirmwareLoading;
        let result = self.load_firmware().and_then(|()| self.restore());
        match result {
            Ok(()) => {
                self.state = State::Idle;
                Ok(())
            }
            Err(boot_error) => {
                tracing::error!("boot failed: {}", boot_error);
                // a failed power on unwinds the supplies itself
                if !matches!(boot_error, Error::Platform(_)) {
                    self.power_off();
                }
                self.state = if boot_error.kind() == error::Kind::Bus {
                    State::Off
                } else {
                    State::Failed(boot_error.clone())
                };
                Err(boot_error)
            }
        }
    }

    fn stream_enable(&mut self) -> Result<(), Error> {
        self.registers.write_fields(registers::SysStart {
            pll_lock: 1,
            stall_status: 1,
            stall_en: 1,
            stall_mode: registers::SYS_START_STALL_MODE_DISABLED,
            ..Default::default()
        })?;
        Ok(())
    }

    fn stream_disable(&mut self) -> Result<(), Error> {
        registers::Batch::new()
            .fields(registers::SysStart {
                pll_lock: 1,
                stall_mode: registers::SYS_START_STALL_MODE_DISABLED,
                ..Default::default()
            })
            .fields(registers::SysStart {
                pll_lock: 1,
                stall_en: 1,
                stall_mode: registers::SYS_START_STALL_MODE_DISABLED,
                ..Default::default()
            })
            .apply(&mut self.registers)?;
        std::thread::sleep(STREAM_STOP_DELAY);
        self.registers.write_fields(registers::AdvIrqSysInte {
            sipm: 3,
            sips_fifo_write: 1,
            ..Default::default()
        })?;
        Ok(())
    }

    fn set_controls(&mut self, controls: controls::Controls) -> Result<(), Error> {
        controls.validate()?;
        if self.power_count > 0 {
            controls::update(Some(&self.controls), &controls).apply(&mut self.registers)?;
        }
        self.controls = controls;
        Ok(())
    }

    fn negotiate_format(
        &self,
        width: u32,
        height: u32,
        code: u32,
    ) -> Result<(&'static modes::Mode, Format), Error> {
        if self.is_streaming() {
            return Err(Error::Streaming);
        }
        let mode = modes::find_mode(width, height, true)?;
        Ok((mode, modes::format(mode, code)))
    }
}

/// AP1302 session: power reference count, mode and format negotiation,
/// streaming and buffered controls.
///
/// Every operation holds the session lock for its full duration.
pub struct Device<Bus: bus::Transport, Board: platform::Platform> {
    session: std::sync::Mutex<Session<Bus, Board>>,
}

macro_rules! control_setters {
    ($($name:ident: $type:ty),+ $(,)?) => {
        paste::paste! {
            $(
                pub fn [<set_ $name>](&self, $name: $type) -> Result<(), Error> {
                    self.update_controls(|controls| controls.$name = $name)
                }
            )+
        }
    };
}

impl<Bus: bus::Transport, Board: platform::Platform> Device<Bus, Board> {
    pub const PROPERTIES: properties::Isp = properties::PROPERTIES;

    pub fn open<Source: firmware::Source + 'static>(
        bus: Bus,
        platform: Board,
        source: Source,
        configuration: configuration::Configuration,
    ) -> Result<Self, Error> {
        configuration.validate()?;
        let mode = modes::find_mode(DEFAULT_FORMAT.width, DEFAULT_FORMAT.height, false)?;
        let mut session = Session {
            registers: registers::Registers::new(bus),
            platform,
            source: Box::new(source),
            configuration,
            state: State::Off,
            power_count: 0,
            mode,
            previous_mode: None,
            frame_rate: DEFAULT_FRAME_RATE,
            frame_interval: DEFAULT_FRAME_RATE.interval(),
            format: DEFAULT_FORMAT,
            pending_mode_change: false,
            pending_format_change: false,
            controls: controls::DEFAULT_CONTROLS,
            pixel_rate: 0,
            chip_revision: None,
        };
        session.update_pixel_rate();
        Ok(Self {
            session: std::sync::Mutex::new(session),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Session<Bus, Board>> {
        // unwrap: mutex is not poisoned
        self.session.lock().unwrap()
    }

    pub fn power(&self, on: bool) -> Result<(), Error> {
        let mut session = self.lock();
        if on {
            if let State::Failed(error) = &session.state {
                return Err(error.clone());
            }
            if session.power_count == 0 {
                session.boot()?;
            }
            session.power_count += 1;
        } else {
            if session.power_count == 0 {
                return Err(Error::PowerCount);
            }
            if session.power_count == 1 {
                session.state = State::Off;
                session.power_off();
            }
            session.power_count -= 1;
        }
        Ok(())
    }

    /// Powers everything off regardless of the reference count.
    pub fn shutdown(&self) {
        let mut session = self.lock();
        let powered = session.power_count > 0;
        session.state = State::Off;
        session.power_count = 0;
        if powered {
            session.power_off();
        }
        session.registers.invalidate_page();
    }

    pub fn set_streaming(&self, on: bool) -> Result<(), Error> {
        let mut session = self.lock();
        if session.is_streaming() == on {
            return Ok(());
        }
        if on {
            if session.power_count == 0 || !matches!(session.state, State::Idle) {
                return Err(Error::NotPowered);
            }
            modes::validate(
                session.mode,
                session.frame_rate,
                session.configuration.bus_type,
            )
            .map_err(|error| {
                tracing::error!("{}", error);
                error
            })?;
            if session.configuration.bus_type != configuration::BusType::Csi2Dphy {
                return Err(Error::BusType(session.configuration.bus_type));
            }
            if session.pending_mode_change {
                session.apply_mode()?;
            }
            if session.pending_format_change {
                session.apply_format()?;
            }
            session.stream_enable()?;
            session.state = State::Streaming;
        } else {
            session.stream_disable()?;
            session.state = State::Idle;
        }
        Ok(())
    }

    /// Commits the format nearest to the request, the change reaches the
    /// chip on the next stream start.
    pub fn negotiate_format(&self, width: u32, height: u32, code: u32) -> Result<Format, Error> {
        let mut session = self.lock();
        let (mode, format) = session.negotiate_format(width, height, code)?;
        if mode.id != session.mode.id {
            session.mode = mode;
            session.pending_mode_change = true;
        }
        if format.code != session.format.code {
            session.pending_format_change = true;
        }
        session.update_pixel_rate();
        if session.pending_mode_change || session.pending_format_change {
            session.format = format;
        }
        Ok(format)
    }

    /// Computes the format [`Device::negotiate_format`] would commit.
    pub fn try_format(&self, width: u32, height: u32, code: u32) -> Result<Format, Error> {
        let session = self.lock();
        session
            .negotiate_format(width, height, code)
            .map(|(_, format)| format)
    }

    /// Returns the interval actually selected, the current one if the
    /// request cannot be honoured.
    pub fn negotiate_frame_interval(&self, interval: Fraction) -> Result<Fraction, Error> {
        let mut session = self.lock();
        if session.is_streaming() {
            return Err(Error::Streaming);
        }
        let (frame_rate, interval) =
            match modes::nearest_frame_rate(interval, session.mode.width, session.mode.height) {
                Ok(result) => result,
                Err(_) => return Ok(session.frame_interval),
            };
        if frame_rate != session.frame_rate {
            session.frame_rate = frame_rate;
            session.frame_interval = interval;
            session.pending_mode_change = true;
            session.update_pixel_rate();
        }
        Ok(session.frame_interval)
    }

    pub fn format(&self) -> Format {
        self.lock().format
    }

    pub fn frame_interval(&self) -> Fraction {
        self.lock().frame_interval
    }

    pub fn frame_rate(&self) -> modes::FrameRate {
        self.lock().frame_rate
    }

    pub fn pixel_rate(&self) -> u64 {
        self.lock().pixel_rate
    }

    pub fn state(&self) -> State {
        self.lock().state.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().is_streaming()
    }

    pub fn power_count(&self) -> u32 {
        self.lock().power_count
    }

    pub fn pending_mode_change(&self) -> bool {
        self.lock().pending_mode_change
    }

    pub fn pending_format_change(&self) -> bool {
        self.lock().pending_format_change
    }

    pub fn chip_revision(&self) -> Option<ChipRevision> {
        self.lock().chip_revision
    }

    pub fn configuration(&self) -> configuration::Configuration {
        self.lock().configuration.clone()
    }

    pub fn pixel_code(&self, index: usize) -> Result<PixelCode, Error> {
        modes::PIXEL_CODES
            .get(index)
            .copied()
            .ok_or(Error::Index(index))
    }

    pub fn frame_size(&self, index: usize) -> Result<Resolution, Error> {
        modes::frame_size(index).ok_or(Error::Index(index))
    }

    /// Enumerates the intervals legal at an exact catalog resolution.
    pub fn frame_interval_at(
        &self,
        index: usize,
        width: u32,
        height: u32,
        code: u32,
    ) -> Result<Fraction, Error> {
        if width == 0 {
            return Err(Error::Zero("width"));
        }
        if height == 0 {
            return Err(Error::Zero("height"));
        }
        if code == 0 {
            return Err(Error::Zero("code"));
        }
        let bus_type = self.lock().configuration.bus_type;
        modes::frame_intervals(width, height, bus_type)
            .get(index)
            .copied()
            .ok_or(Error::Index(index))
    }

    pub fn controls(&self) -> controls::Controls {
        self.lock().controls.clone()
    }

    /// Buffers the controls and writes the ones that changed if the chip is
    /// powered. Rejected values leave the buffered controls unchanged.
    pub fn set_controls(&self, controls: controls::Controls) -> Result<(), Error> {
        self.lock().set_controls(controls)
    }

    fn update_controls<Update: FnOnce(&mut controls::Controls)>(
        &self,
        update: Update,
    ) -> Result<(), Error> {
        let mut session = self.lock();
        let mut controls = session.controls.clone();
        update(&mut controls);
        session.set_controls(controls)
    }

    control_setters! {
        white_balance: controls::Cluster<controls::WhiteBalanceGains>,
        exposure: controls::Cluster<u16>,
        gain: controls::Cluster<u16>,
        saturation: u8,
        hue: u16,
        contrast: u8,
        test_pattern: controls::TestPattern,
        horizontal_flip: bool,
        vertical_flip: bool,
        power_line_frequency: controls::PowerLineFrequency,
    }
}

impl<Bus: bus::Transport, Board: platform::Platform> Drop for Device<Bus, Board> {
    fn drop(&mut self) {
        let session = match self.session.get_mut() {
            Ok(session) => session,
            Err(poisoned) => poisoned.into_inner(),
        };
        if session.power_count > 0 {
            session.power_count = 0;
            session.state = State::Off;
            session.power_off();
        }
    }
}
