#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl std::fmt::Display for Fraction {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}/{}", self.numerator, self.denominator)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}x{}", self.width, self.height)
    }
}

/// Media bus pixel codes (values match the Linux media bus format codes).
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PixelCode {
    Uyvy8_2x8 = 0x2006,
    Yuyv8_2x8 = 0x2008,
    Uyvy8_1x16 = 0x200f,
    Yuyv8_1x16 = 0x2011,
}

impl PixelCode {
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x2006 => Some(Self::Uyvy8_2x8),
            0x2008 => Some(Self::Yuyv8_2x8),
            0x200f => Some(Self::Uyvy8_1x16),
            0x2011 => Some(Self::Yuyv8_1x16),
            _ => None,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Colorspace {
    Default = 0,
    Srgb = 8,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Quantization {
    Default = 0,
    FullRange = 1,
    LimitedRange = 2,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Field {
    Any = 0,
    None = 1,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Format {
    pub width: u32,
    pub height: u32,
    pub code: PixelCode,
    pub colorspace: Colorspace,
    pub quantization: Quantization,
    pub field: Field,
}

impl Format {
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }
}
