//! Supported target devices
//!
//! Every device in the ESP32 family has its own eFuse register layout. The
//! [Chip] enum is the closed set of devices whose layout is known, and maps
//! each of them to its [EfuseLayout].

use std::{fmt, str::FromStr};

use clap::{builder::PossibleValue, ValueEnum};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, IntoEnumIterator, VariantNames};

use self::efuse::EfuseLayout;
use crate::error::Error;

pub mod efuse;

/// Address of the register holding the chip detection magic value
pub const CHIP_DETECT_MAGIC_REG_ADDR: u32 = 0x4000_1000;

/// All supported devices
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    VariantNames,
)]
#[non_exhaustive]
#[strum(serialize_all = "lowercase")]
pub enum Chip {
    /// ESP32
    Esp32,
    /// ESP32-S2
    Esp32s2,
    /// ESP32-S3 (beta2 engineering samples)
    Esp32s3beta2,
    /// ESP32-S3
    Esp32s3,
    /// ESP32-C3
    Esp32c3,
    /// ESP32-H2
    Esp32h2,
}

impl Chip {
    /// The name reported for the chip, e.g. `ESP32-S3(beta2)`
    pub fn name(&self) -> &'static str {
        match self {
            Chip::Esp32 => "ESP32",
            Chip::Esp32s2 => "ESP32-S2",
            Chip::Esp32s3beta2 => "ESP32-S3(beta2)",
            Chip::Esp32s3 => "ESP32-S3",
            Chip::Esp32c3 => "ESP32-C3",
            Chip::Esp32h2 => "ESP32-H2",
        }
    }

    /// Map a reported chip name back to the chip
    pub fn from_name(name: &str) -> Result<Self, Error> {
        Chip::iter()
            .find(|chip| chip.name() == name)
            .ok_or_else(|| Error::UnsupportedChip(name.to_owned()))
    }

    /// Values of the chip detection register identifying this chip
    pub fn magic_values(&self) -> &'static [u32] {
        match self {
            Chip::Esp32 => &[0x00f0_1d83],
            Chip::Esp32s2 => &[0x0000_07c6],
            Chip::Esp32s3beta2 => &[0xeb00_4136],
            Chip::Esp32s3 => &[0x0000_0009],
            Chip::Esp32c3 => &[0x6921_506f, 0x1b31_506f, 0x4881_606f, 0x4361_606f],
            Chip::Esp32h2 => &[0xca26_cc22, 0xd7b7_3e80],
        }
    }

    /// Check if the magic value contains the specified value
    pub fn has_magic_value(&self, value: u32) -> bool {
        self.magic_values().contains(&value)
    }

    pub fn from_magic(magic: u32) -> Result<Self, Error> {
        Chip::iter()
            .find(|chip| chip.has_magic_value(magic))
            .ok_or_else(|| Error::ChipDetect(format!("unrecognized magic value {magic:#010x}")))
    }

    /// The eFuse register map of the chip
    pub fn efuse_layout(&self) -> &'static EfuseLayout {
        match self {
            Chip::Esp32 => &efuse::esp32::LAYOUT,
            Chip::Esp32s2 => &efuse::esp32s2::LAYOUT,
            Chip::Esp32s3beta2 => &efuse::esp32s3beta2::LAYOUT,
            Chip::Esp32s3 => &efuse::esp32s3::LAYOUT,
            Chip::Esp32c3 => &efuse::esp32c3::LAYOUT,
            Chip::Esp32h2 => &efuse::esp32h2::LAYOUT,
        }
    }

    /// Whether the chip supports 256-bit XTS-AES flash encryption keys
    pub fn supports_xts_aes_256(&self) -> bool {
        matches!(self, Chip::Esp32s2 | Chip::Esp32s3 | Chip::Esp32s3beta2)
    }
}

/// The chip requested on the command line
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipSelection {
    /// Detect the connected chip
    #[default]
    Auto,
    /// Use the given chip
    Chip(Chip),
}

impl ChipSelection {
    /// The explicitly selected chip, if any
    pub fn chip(&self) -> Option<Chip> {
        match self {
            ChipSelection::Auto => None,
            ChipSelection::Chip(chip) => Some(*chip),
        }
    }
}

impl From<Chip> for ChipSelection {
    fn from(chip: Chip) -> Self {
        ChipSelection::Chip(chip)
    }
}

impl fmt::Display for ChipSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChipSelection::Auto => f.write_str("auto"),
            ChipSelection::Chip(chip) => chip.fmt(f),
        }
    }
}

impl FromStr for ChipSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(ChipSelection::Auto);
        }

        Chip::from_str(&s.to_lowercase())
            .map(ChipSelection::Chip)
            .map_err(|_| Error::UnsupportedChip(s.to_owned()))
    }
}

impl ValueEnum for ChipSelection {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            ChipSelection::Auto,
            ChipSelection::Chip(Chip::Esp32),
            ChipSelection::Chip(Chip::Esp32s2),
            ChipSelection::Chip(Chip::Esp32s3beta2),
            ChipSelection::Chip(Chip::Esp32s3),
            ChipSelection::Chip(Chip::Esp32c3),
            ChipSelection::Chip(Chip::Esp32h2),
        ]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        match self {
            ChipSelection::Auto => Some(PossibleValue::new("auto").help("Detect the connected chip")),
            ChipSelection::Chip(chip) => {
                let id: &'static str = chip.into();
                Some(PossibleValue::new(id).help(chip.name()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_names_round_trip() {
        for chip in Chip::iter() {
            assert_eq!(Chip::from_name(chip.name()).unwrap(), chip);
        }

        assert!(matches!(
            Chip::from_name("ESP8266"),
            Err(Error::UnsupportedChip(name)) if name == "ESP8266"
        ));
    }

    #[test]
    fn magic_values_are_unique() {
        for chip in Chip::iter() {
            for magic in chip.magic_values() {
                assert_eq!(Chip::from_magic(*magic).unwrap(), chip);
            }
        }

        assert!(matches!(Chip::from_magic(0xdead_beef), Err(Error::ChipDetect(_))));
    }

    #[test]
    fn parses_selection() {
        assert_eq!("auto".parse::<ChipSelection>().unwrap(), ChipSelection::Auto);
        assert_eq!(
            "esp32s3beta2".parse::<ChipSelection>().unwrap(),
            ChipSelection::Chip(Chip::Esp32s3beta2)
        );
        assert_eq!(
            "ESP32C3".parse::<ChipSelection>().unwrap(),
            ChipSelection::Chip(Chip::Esp32c3)
        );
        assert!("esp8266".parse::<ChipSelection>().is_err());
    }

    #[test]
    fn value_enum_lists_every_chip_and_auto() {
        let names = ChipSelection::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value())
            .map(|v| v.get_name().to_owned())
            .collect::<Vec<_>>();

        assert_eq!(names[0], "auto");
        assert_eq!(&names[1..], Chip::VARIANTS);
    }

    #[test]
    fn layouts_belong_to_their_chip() {
        for chip in Chip::iter() {
            assert_eq!(chip.efuse_layout().chip, chip);
        }
    }
}
