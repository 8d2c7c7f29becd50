use crate::configuration;
use crate::controls;
use crate::registers;

#[derive(Debug, serde::Serialize)]
pub struct Isp {
    pub name: &'static str,
    pub chip_id: u32,
    pub width: u32,
    pub height: u32,
    pub default_configuration: configuration::Configuration,
    pub default_controls: controls::Controls,
}

pub const PROPERTIES: Isp = Isp {
    name: "onsemi AP1302",
    chip_id: registers::CHIP_ID,
    width: 3840,
    height: 2160,
    default_configuration: configuration::DEFAULT_CONFIGURATION,
    default_controls: controls::DEFAULT_CONTROLS,
};
