use crate::bus;
use crate::configuration::BusType;
use crate::registers;

use isp_types::{Colorspace, Field, Format, Fraction, PixelCode, Quantization, Resolution};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("no mode matches {width}x{height}")]
    Resolution { width: u32, height: u32 },

    #[error("{width}x{height} does not support {fps} fps")]
    FrameRate { width: u32, height: u32, fps: u32 },
}

#[repr(u8)]
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum FrameRate {
    Fps8 = 0,
    Fps15 = 1,
    Fps30 = 2,
    Fps60 = 3,
}

impl FrameRate {
    pub const ALL: [Self; 4] = [Self::Fps8, Self::Fps15, Self::Fps30, Self::Fps60];

    pub const fn fps(self) -> u32 {
        match self {
            Self::Fps8 => 8,
            Self::Fps15 => 15,
            Self::Fps30 => 30,
            Self::Fps60 => 60,
        }
    }

    pub const fn interval(self) -> Fraction {
        Fraction::new(1, self.fps())
    }
}

/// Resolutions up to 1280x960 are subsampled, larger ones are scaled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Downscale {
    Subsampling,
    Scaling,
}

impl Downscale {
    pub const fn for_resolution(width: u32, height: u32) -> Self {
        if (width as u64) * (height as u64) <= 1280 * 960 {
            Self::Subsampling
        } else {
            Self::Scaling
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModeId {
    Qcif176x144,
    Qvga320x240,
    Vga640x480,
    Ntsc720x480,
    Pal720x576,
    Xga1024x768,
    Hd1280x720,
    FullHd1920x1080,
    Qsxga2592x1944,
    Uhd3840x2160,
}

/// One step of a mode register program.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Write {
    pub register: registers::Register,
    pub value: u32,
    pub delay_ms: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Mode {
    pub id: ModeId,
    pub downscale: Downscale,
    pub width: u32,
    pub total_width: u32,
    pub height: u32,
    pub total_height: u32,
    pub script: &'static [Write],
    pub maximum_frame_rate: FrameRate,
}

impl Mode {
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    /// Runs the mode register program, stopping at the first failed write.
    pub fn program<Bus: bus::Transport>(
        &self,
        registers: &mut registers::Registers<Bus>,
    ) -> Result<(), registers::Error> {
        for write in self.script {
            registers.write(write.register, write.value)?;
            if write.delay_ms > 0 {
                std::thread::sleep(std::time::Duration::from_millis(write.delay_ms as u64));
            }
        }
        Ok(())
    }
}

// Tuning tables are provided by the sensor vendor, the host interface
// registers written by the mode change path are enough to select a mode.
const SCRIPT_QCIF_176_144: [Write; 0] = [];
const SCRIPT_QVGA_320_240: [Write; 0] = [];
const SCRIPT_VGA_640_480: [Write; 0] = [];
const SCRIPT_NTSC_720_480: [Write; 0] = [];
const SCRIPT_PAL_720_576: [Write; 0] = [];
const SCRIPT_XGA_1024_768: [Write; 0] = [];
const SCRIPT_720P_1280_720: [Write; 0] = [];
const SCRIPT_1080P_1920_1080: [Write; 0] = [];
const SCRIPT_QSXGA_2592_1944: [Write; 0] = [];
const SCRIPT_4K_3840_2160: [Write; 0] = [];

/// Program loaded right after the firmware, before the committed mode.
pub static POWER_ON_MODE: Mode = Mode {
    id: ModeId::Uhd3840x2160,
    downscale: Downscale::Scaling,
    width: 3840,
    total_width: 3840,
    height: 2160,
    total_height: 2160,
    script: &SCRIPT_4K_3840_2160,
    maximum_frame_rate: FrameRate::Fps30,
};

pub static MODES: [Mode; 10] = [
    Mode {
        id: ModeId::Qcif176x144,
        downscale: Downscale::Subsampling,
        width: 176,
        total_width: 1896,
        height: 144,
        total_height: 984,
        script: &SCRIPT_QCIF_176_144,
        maximum_frame_rate: FrameRate::Fps30,
    },
    Mode {
        id: ModeId::Qvga320x240,
        downscale: Downscale::Subsampling,
        width: 320,
        total_width: 1896,
        height: 240,
        total_height: 984,
        script: &SCRIPT_QVGA_320_240,
        maximum_frame_rate: FrameRate::Fps30,
    },
    Mode {
        id: ModeId::Vga640x480,
        downscale: Downscale::Subsampling,
        width: 640,
        total_width: 1896,
        height: 480,
        total_height: 1080,
        script: &SCRIPT_VGA_640_480,
        maximum_frame_rate: FrameRate::Fps30,
    },
    Mode {
        id: ModeId::Ntsc720x480,
        downscale: Downscale::Subsampling,
        width: 720,
        total_width: 1896,
        height: 480,
        total_height: 984,
        script: &SCRIPT_NTSC_720_480,
        maximum_frame_rate: FrameRate::Fps30,
    },
    Mode {
        id: ModeId::Pal720x576,
        downscale: Downscale::Subsampling,
        width: 720,
        total_width: 1896,
        height: 576,
        total_height: 984,
        script: &SCRIPT_PAL_720_576,
        maximum_frame_rate: FrameRate::Fps30,
    },
    Mode {
        id: ModeId::Xga1024x768,
        downscale: Downscale::Subsampling,
        width: 1024,
        total_width: 1896,
        height: 768,
        total_height: 1080,
        script: &SCRIPT_XGA_1024_768,
        maximum_frame_rate: FrameRate::Fps30,
    },
    Mode {
        id: ModeId::Hd1280x720,
        downscale: Downscale::Subsampling,
        width: 1280,
        total_width: 1892,
        height: 720,
        total_height: 740,
        script: &SCRIPT_720P_1280_720,
        maximum_frame_rate: FrameRate::Fps30,
    },
    Mode {
        id: ModeId::FullHd1920x1080,
        downscale: Downscale::Scaling,
        width: 1920,
        total_width: 2500,
        height: 1080,
        total_height: 1120,
        script: &SCRIPT_1080P_1920_1080,
        maximum_frame_rate: FrameRate::Fps30,
    },
    Mode {
        id: ModeId::Qsxga2592x1944,
        downscale: Downscale::Scaling,
        width: 2592,
        total_width: 2844,
        height: 1944,
        total_height: 1968,
        script: &SCRIPT_QSXGA_2592_1944,
        maximum_frame_rate: FrameRate::Fps30,
    },
    Mode {
        id: ModeId::Uhd3840x2160,
        downscale: Downscale::Scaling,
        width: 3840,
        total_width: 3840,
        height: 2160,
        total_height: 2160,
        script: &SCRIPT_4K_3840_2160,
        maximum_frame_rate: FrameRate::Fps30,
    },
];

pub fn mode(id: ModeId) -> &'static Mode {
    &MODES[MODES
        .iter()
        .position(|mode| mode.id == id)
        .unwrap_or(MODES.len() - 1)]
}

/// Looks up the catalog entry minimising `|Δwidth| + |Δheight|`.
///
/// Ties go to the entry listed last. With `nearest` false, only an exact
/// match is accepted.
pub fn find_mode(width: u32, height: u32, nearest: bool) -> Result<&'static Mode, Error> {
    let mut best = None;
    let mut minimum_error = u64::MAX;
    for mode in MODES.iter() {
        let error = mode.width.abs_diff(width) as u64 + mode.height.abs_diff(height) as u64;
        if error > minimum_error {
            continue;
        }
        minimum_error = error;
        best = Some(mode);
        if error == 0 {
            break;
        }
    }
    match best {
        Some(mode) if nearest || (mode.width == width && mode.height == height) => Ok(mode),
        _ => Err(Error::Resolution { width, height }),
    }
}

/// Frame rates accepted by a mode, in increasing order.
pub fn frame_rates(mode: &Mode, bus_type: BusType) -> &'static [FrameRate] {
    match mode.id {
        ModeId::Qcif176x144
        | ModeId::Qvga320x240
        | ModeId::Vga640x480
        | ModeId::Ntsc720x480
        | ModeId::Pal720x576
        | ModeId::Xga1024x768
        | ModeId::Hd1280x720 => &[FrameRate::Fps15, FrameRate::Fps30],
        ModeId::FullHd1920x1080 => match bus_type {
            BusType::Csi2Dphy => &[FrameRate::Fps15, FrameRate::Fps30],
            BusType::Parallel | BusType::Bt656 => &[FrameRate::Fps15],
        },
        ModeId::Qsxga2592x1944 => &[FrameRate::Fps8],
        ModeId::Uhd3840x2160 => &[FrameRate::Fps30],
    }
}

pub fn validate(mode: &Mode, frame_rate: FrameRate, bus_type: BusType) -> Result<(), Error> {
    if frame_rates(mode, bus_type).contains(&frame_rate) {
        Ok(())
    } else {
        Err(Error::FrameRate {
            width: mode.width,
            height: mode.height,
            fps: frame_rate.fps(),
        })
    }
}

pub fn pixel_rate(mode: &Mode, frame_rate: FrameRate) -> u64 {
    mode.total_width as u64 * mode.total_height as u64 * frame_rate.fps() as u64
}

/// Rounds a frame interval to the closest frame rate class.
///
/// A zero numerator requests the fastest class. The returned interval is the
/// one the class actually runs at.
pub fn nearest_frame_rate(
    interval: Fraction,
    width: u32,
    height: u32,
) -> Result<(FrameRate, Fraction), Error> {
    let frame_rate = if interval.numerator == 0 {
        FrameRate::Fps60
    } else {
        let numerator = interval.numerator as u64;
        let fps = ((interval.denominator as u64 + numerator / 2) / numerator).clamp(
            FrameRate::Fps8.fps() as u64,
            FrameRate::Fps60.fps() as u64,
        );
        let mut best = FrameRate::Fps8;
        for frame_rate in FrameRate::ALL {
            if (frame_rate.fps() as u64).abs_diff(fps) < (best.fps() as u64).abs_diff(fps) {
                best = frame_rate;
            }
        }
        best
    };
    find_mode(width, height, false)?;
    Ok((frame_rate, frame_rate.interval()))
}

pub const PIXEL_CODES: [PixelCode; 4] = [
    PixelCode::Uyvy8_2x8,
    PixelCode::Uyvy8_1x16,
    PixelCode::Yuyv8_2x8,
    PixelCode::Yuyv8_1x16,
];

/// Format produced by `mode`, unknown codes fall back to the first supported one.
pub fn format(mode: &Mode, code: u32) -> Format {
    Format {
        width: mode.width,
        height: mode.height,
        code: PixelCode::from_u32(code)
            .filter(|code| PIXEL_CODES.contains(code))
            .unwrap_or(PIXEL_CODES[0]),
        colorspace: Colorspace::Srgb,
        quantization: Quantization::FullRange,
        field: Field::None,
    }
}

pub fn frame_size(index: usize) -> Option<Resolution> {
    MODES.get(index).map(Mode::resolution)
}

/// Intervals supported at an exact resolution, slowest first.
pub fn frame_intervals(width: u32, height: u32, bus_type: BusType) -> Vec<Fraction> {
    match find_mode(width, height, false) {
        Ok(mode) => frame_rates(mode, bus_type)
            .iter()
            .map(|frame_rate| frame_rate.interval())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_nearest_lookup() {
        let mode = find_mode(1920, 1080, false).expect("1080p is in the catalog");
        assert_eq!(mode.id, ModeId::FullHd1920x1080);
        assert_eq!(
            find_mode(1921, 1081, false),
            Err(Error::Resolution {
                width: 1921,
                height: 1081
            })
        );
        assert_eq!(
            find_mode(1921, 1081, true).map(|mode| mode.id),
            Ok(ModeId::FullHd1920x1080)
        );
        assert_eq!(
            find_mode(0, 0, true).map(|mode| mode.id),
            Ok(ModeId::Qcif176x144)
        );
        assert_eq!(
            find_mode(10000, 10000, true).map(|mode| mode.id),
            Ok(ModeId::Uhd3840x2160)
        );
    }

    #[test]
    fn ties_resolve_to_the_later_entry() {
        // 720x528 is 48 lines away from both 720x480 and 720x576
        assert_eq!(
            find_mode(720, 528, true).map(|mode| mode.id),
            Ok(ModeId::Pal720x576)
        );
    }

    #[test]
    fn catalog_is_consistent() {
        for (index, mode) in MODES.iter().enumerate() {
            assert_eq!(mode.downscale, Downscale::for_resolution(mode.width, mode.height));
            assert!(mode.total_width >= mode.width);
            assert!(mode.total_height >= mode.height);
            assert!(MODES[index + 1..]
                .iter()
                .all(|other| other.resolution() != mode.resolution()));
        }
        assert_eq!(POWER_ON_MODE, *mode(ModeId::Uhd3840x2160));
    }

    #[test]
    fn frame_rate_legality() {
        let uhd = mode(ModeId::Uhd3840x2160);
        for bus_type in [BusType::Csi2Dphy, BusType::Parallel, BusType::Bt656] {
            for frame_rate in FrameRate::ALL {
                assert_eq!(
                    validate(uhd, frame_rate, bus_type).is_ok(),
                    frame_rate == FrameRate::Fps30
                );
            }
        }
        let full_hd = mode(ModeId::FullHd1920x1080);
        assert!(validate(full_hd, FrameRate::Fps30, BusType::Csi2Dphy).is_ok());
        assert!(validate(full_hd, FrameRate::Fps30, BusType::Parallel).is_err());
        assert!(validate(full_hd, FrameRate::Fps15, BusType::Bt656).is_ok());
        assert!(validate(mode(ModeId::Qsxga2592x1944), FrameRate::Fps8, BusType::Csi2Dphy).is_ok());
        assert!(validate(mode(ModeId::Vga640x480), FrameRate::Fps60, BusType::Csi2Dphy).is_err());
    }

    #[test]
    fn pixel_rates() {
        assert_eq!(
            pixel_rate(mode(ModeId::FullHd1920x1080), FrameRate::Fps30),
            2500 * 1120 * 30
        );
        assert_eq!(
            pixel_rate(mode(ModeId::Uhd3840x2160), FrameRate::Fps30),
            3840 * 2160 * 30
        );
    }

    #[test]
    fn frame_rate_rounding() {
        assert_eq!(
            nearest_frame_rate(Fraction::new(0, 1), 1920, 1080),
            Ok((FrameRate::Fps60, Fraction::new(1, 60)))
        );
        assert_eq!(
            nearest_frame_rate(Fraction::new(1, 25), 1920, 1080),
            Ok((FrameRate::Fps30, Fraction::new(1, 30)))
        );
        assert_eq!(
            nearest_frame_rate(Fraction::new(1, 1), 640, 480),
            Ok((FrameRate::Fps8, Fraction::new(1, 8)))
        );
        assert_eq!(
            nearest_frame_rate(Fraction::new(1001, 30000), 640, 480),
            Ok((FrameRate::Fps30, Fraction::new(1, 30)))
        );
        assert_eq!(
            nearest_frame_rate(Fraction::new(1, 1000), 640, 480),
            Ok((FrameRate::Fps60, Fraction::new(1, 60)))
        );
        assert!(nearest_frame_rate(Fraction::new(1, 30), 641, 480).is_err());
    }

    #[test]
    fn unknown_codes_fall_back() {
        let mode = mode(ModeId::Hd1280x720);
        assert_eq!(format(mode, PixelCode::Yuyv8_2x8 as u32).code, PixelCode::Yuyv8_2x8);
        assert_eq!(format(mode, 0x3001).code, PixelCode::Uyvy8_2x8);
        assert_eq!(format(mode, 0).width, 1280);
    }

    #[test]
    fn enumeration() {
        assert_eq!(
            frame_size(7),
            Some(Resolution {
                width: 1920,
                height: 1080
            })
        );
        assert_eq!(frame_size(MODES.len()), None);
        assert_eq!(
            frame_intervals(1920, 1080, BusType::Parallel),
            vec![Fraction::new(1, 15)]
        );
        assert_eq!(
            frame_intervals(720, 576, BusType::Csi2Dphy),
            vec![Fraction::new(1, 15), Fraction::new(1, 30)]
        );
        assert!(frame_intervals(100, 100, BusType::Csi2Dphy).is_empty());
    }
}
