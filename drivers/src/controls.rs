use crate::registers;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{name} must be in the range [0, {maximum}] (got {value})")]
    Range {
        name: &'static str,
        value: u32,
        maximum: u32,
    },
}

/// Parameter driven either by the chip's automatic loop or by a manual value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Cluster<T> {
    Auto,
    Manual(T),
}

impl<T> Cluster<T> {
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }

    pub fn manual(&self) -> Option<&T> {
        match self {
            Self::Auto => None,
            Self::Manual(value) => Some(value),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WhiteBalanceGains {
    pub red: u16,
    pub blue: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TestPattern {
    Disabled,
    ColorBars,
    ColorBarsRolling,
    ColorSquares,
    ColorSquaresRolling,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PowerLineFrequency {
    Disabled,
    Hz50,
    Hz60,
    Auto,
}

pub const WHITE_BALANCE_GAIN_MAXIMUM: u16 = 4095;
pub const GAIN_MAXIMUM: u16 = 1023;
pub const HUE_MAXIMUM: u16 = 359;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Controls {
    pub white_balance: Cluster<WhiteBalanceGains>,
    pub exposure: Cluster<u16>,
    pub gain: Cluster<u16>,
    pub saturation: u8,
    pub hue: u16,
    pub contrast: u8,
    pub test_pattern: TestPattern,
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
    pub power_line_frequency: PowerLineFrequency,
}

pub const DEFAULT_CONTROLS: Controls = Controls {
    white_balance: Cluster::Auto,
    exposure: Cluster::Auto,
    gain: Cluster::Auto,
    saturation: 64,
    hue: 0,
    contrast: 0,
    test_pattern: TestPattern::Disabled,
    horizontal_flip: false,
    vertical_flip: false,
    power_line_frequency: PowerLineFrequency::Hz50,
};

impl Default for Controls {
    fn default() -> Self {
        DEFAULT_CONTROLS
    }
}

fn check(name: &'static str, value: u16, maximum: u16) -> Result<(), Error> {
    if value > maximum {
        Err(Error::Range {
            name,
            value: value as u32,
            maximum: maximum as u32,
        })
    } else {
        Ok(())
    }
}

impl Controls {
    pub fn validate(&self) -> Result<(), Error> {
        if let Cluster::Manual(gains) = self.white_balance {
            check("red balance", gains.red, WHITE_BALANCE_GAIN_MAXIMUM)?;
            check("blue balance", gains.blue, WHITE_BALANCE_GAIN_MAXIMUM)?;
        }
        if let Cluster::Manual(gain) = self.gain {
            check("gain", gain, GAIN_MAXIMUM)?;
        }
        check("hue", self.hue, HUE_MAXIMUM)
    }
}

macro_rules! update_control {
    ($batch:ident, $previous_controls:ident, $controls:ident, $name:ident, |$value:ident| $writes:expr) => {
        if match $previous_controls {
            Some(previous_controls) => previous_controls.$name != $controls.$name,
            None => true,
        } {
            let $value = &$controls.$name;
            $batch = $writes;
        }
    };
}

/// Register writes bringing the chip from `previous_controls` to `controls`.
///
/// Without previous controls (right after the firmware is loaded) every
/// control is written.
pub fn update(previous_controls: Option<&Controls>, controls: &Controls) -> registers::Batch {
    let mut batch = registers::Batch::new();
    update_control!(batch, previous_controls, controls, white_balance, |white_balance| {
        batch.write(
            registers::AWB_CTRL,
            if white_balance.is_auto() {
                registers::AWB_CTRL_MODE_AUTO
            } else {
                registers::AWB_CTRL_MODE_MANUAL
            },
        )
    });
    update_control!(batch, previous_controls, controls, exposure, |exposure| {
        batch.write(
            registers::AE_CTRL,
            if exposure.is_auto() {
                registers::AE_CTRL_FULL_AUTO
            } else {
                registers::AE_CTRL_MANUAL_EXP_TIME_GAIN
            },
        )
    });
    update_control!(batch, previous_controls, controls, gain, |gain| {
        match gain {
            Cluster::Auto => batch,
            Cluster::Manual(gain) => batch.write(registers::AE_MANUAL_GAIN, *gain as u32),
        }
    });
    update_control!(batch, previous_controls, controls, contrast, |contrast| {
        batch.write(registers::CONTRAST, *contrast as u32)
    });
    update_control!(batch, previous_controls, controls, saturation, |saturation| {
        batch.write(registers::SATURATION, *saturation as u32)
    });
    update_control!(
        batch,
        previous_controls,
        controls,
        power_line_frequency,
        |power_line_frequency| {
            batch.fields(match power_line_frequency {
                PowerLineFrequency::Disabled => registers::FlickCtrl {
                    mode: registers::FLICK_CTRL_MODE_DISABLED,
                    ..Default::default()
                },
                PowerLineFrequency::Hz50 => registers::FlickCtrl {
                    mode: registers::FLICK_CTRL_MODE_MANUAL,
                    frequency: 50,
                    ..Default::default()
                },
                PowerLineFrequency::Hz60 => registers::FlickCtrl {
                    mode: registers::FLICK_CTRL_MODE_MANUAL,
                    frequency: 60,
                    ..Default::default()
                },
                PowerLineFrequency::Auto => registers::FlickCtrl {
                    mode: registers::FLICK_CTRL_MODE_AUTO,
                    ..Default::default()
                },
            })
        }
    );
    batch
}
