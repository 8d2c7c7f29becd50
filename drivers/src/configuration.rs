#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{name} must be in the range [{minimum}, {maximum}] (got {value})")]
    Range {
        name: &'static str,
        value: u32,
        minimum: u32,
        maximum: u32,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BusType {
    Parallel,
    Bt656,
    Csi2Dphy,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Sensor {
    Ar0144,
    Ar0330,
    Ar0821,
    Ar1335,
}

impl Sensor {
    pub fn name(self) -> &'static str {
        match self {
            Sensor::Ar0144 => "ar0144",
            Sensor::Ar0330 => "ar0330",
            Sensor::Ar0821 => "ar0821",
            Sensor::Ar1335 => "ar1335",
        }
    }
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Configuration {
    pub bus_type: BusType,
    pub data_lanes: u8,
    pub virtual_channel: u8,
    pub sensor: Sensor,
    pub sensors: u8,
    pub xclk_frequency: u32,
    pub upside_down: bool,
    pub firmware_retries: u8,
}

pub const MIN_XCLK_FREQUENCY: u32 = 6_000_000;
pub const MAX_XCLK_FREQUENCY: u32 = 54_000_000;
pub const MAX_RETRIES: u8 = 3;

pub const DEFAULT_CONFIGURATION: Configuration = Configuration {
    bus_type: BusType::Csi2Dphy,
    data_lanes: 4,
    virtual_channel: 0,
    sensor: Sensor::Ar0821,
    sensors: 1,
    xclk_frequency: 24_000_000,
    upside_down: false,
    firmware_retries: MAX_RETRIES,
};

impl Default for Configuration {
    fn default() -> Self {
        DEFAULT_CONFIGURATION
    }
}

fn check(name: &'static str, value: u32, minimum: u32, maximum: u32) -> Result<(), Error> {
    if value < minimum || value > maximum {
        Err(Error::Range {
            name,
            value,
            minimum,
            maximum,
        })
    } else {
        Ok(())
    }
}

impl Configuration {
    pub fn deserialize_bincode(data: &[u8]) -> bincode::Result<Configuration> {
        bincode::deserialize(data)
    }

    pub fn serialize_bincode(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn validate(&self) -> Result<(), Error> {
        check(
            "xclk_frequency",
            self.xclk_frequency,
            MIN_XCLK_FREQUENCY,
            MAX_XCLK_FREQUENCY,
        )?;
        check("data_lanes", self.data_lanes as u32, 1, 4)?;
        check("virtual_channel", self.virtual_channel as u32, 0, 3)?;
        check("sensors", self.sensors as u32, 0, 2)?;
        check("firmware_retries", self.firmware_retries as u32, 1, u8::MAX as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(DEFAULT_CONFIGURATION.validate(), Ok(()));
    }

    #[test]
    fn ranges() {
        let configuration = Configuration {
            xclk_frequency: 5_999_999,
            ..DEFAULT_CONFIGURATION
        };
        assert_eq!(
            configuration.validate(),
            Err(Error::Range {
                name: "xclk_frequency",
                value: 5_999_999,
                minimum: MIN_XCLK_FREQUENCY,
                maximum: MAX_XCLK_FREQUENCY,
            })
        );
        for (data_lanes, valid) in [(0, false), (1, true), (4, true), (5, false)] {
            let configuration = Configuration {
                data_lanes,
                ..DEFAULT_CONFIGURATION
            };
            assert_eq!(configuration.validate().is_ok(), valid);
        }
        let configuration = Configuration {
            virtual_channel: 4,
            ..DEFAULT_CONFIGURATION
        };
        assert!(configuration.validate().is_err());
        let configuration = Configuration {
            sensors: 3,
            ..DEFAULT_CONFIGURATION
        };
        assert!(configuration.validate().is_err());
        let configuration = Configuration {
            firmware_retries: 0,
            ..DEFAULT_CONFIGURATION
        };
        assert!(configuration.validate().is_err());
    }

    #[test]
    fn bincode_round_trip() -> bincode::Result<()> {
        let configuration = Configuration {
            bus_type: BusType::Bt656,
            sensor: Sensor::Ar1335,
            sensors: 2,
            upside_down: true,
            ..DEFAULT_CONFIGURATION
        };
        let data = configuration.serialize_bincode()?;
        assert_eq!(Configuration::deserialize_bincode(&data)?, configuration);
        assert!(Configuration::deserialize_bincode(&data[..data.len() - 1]).is_err());
        Ok(())
    }
}
