//! Command-line interface configuration
//!
//! The optional `espefuse.toml` file holds the preferred serial port, baud
//! rate and the USB devices which are known to be connected to a chip. It is
//! looked up in the current directory, its parent, and finally in the user's
//! configuration directory.

use std::{
    fs::{create_dir_all, read_to_string, write},
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};
use serialport::UsbPortInfo;

use crate::error::Error;

const CONFIG_FILE_NAME: &str = "espefuse.toml";

/// A configured, known serial connection
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Name of the serial port used for communication
    pub serial: Option<String>,
}

/// A configured, known USB device
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID
    #[serde(
        serialize_with = "serialize_u16_to_hex",
        deserialize_with = "deserialize_hex_to_u16"
    )]
    pub vid: u16,
    /// USB Product ID
    #[serde(
        serialize_with = "serialize_u16_to_hex",
        deserialize_with = "deserialize_hex_to_u16"
    )]
    pub pid: u16,
}

fn deserialize_hex_to_u16<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let hex = String::deserialize(deserializer)?.to_lowercase();
    let hex = hex.trim_start_matches("0x");

    u16::from_str_radix(hex, 16).map_err(serde::de::Error::custom)
}

fn serialize_u16_to_hex<S>(value: &u16, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format!("{value:04x}"))
}

impl UsbDevice {
    /// Check if the given USB port matches this device
    pub fn matches(&self, port: &UsbPortInfo) -> bool {
        self.vid == port.vid && self.pid == port.pid
    }
}

/// Deserialized contents of a configuration file
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Preferred serial port connection information
    #[serde(default)]
    pub connection: Connection,
    /// Baud rate used unless one is given on the command line
    #[serde(default)]
    pub baudrate: Option<u32>,
    /// Preferred USB devices
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
    /// Path of the file to save the configuration to
    #[serde(skip)]
    save_path: PathBuf,
}

impl Config {
    /// Load the configuration, falling back to the defaults when no
    /// configuration file exists
    pub fn load() -> Result<Self, Error> {
        Self::load_from(&Self::find_config_path()?)
    }

    /// Load the configuration from `path`
    pub fn load_from(path: &Path) -> Result<Self, Error> {
        let mut config = match read_to_string(path) {
            Ok(data) => toml::from_str::<Config>(&data).map_err(|e| {
                Error::Configuration(format!("failed to parse {}: {e}", path.display()))
            })?,
            Err(_) => Config::default(),
        };
        config.save_path = path.to_owned();
        debug!("Config: {config:#?}");

        Ok(config)
    }

    /// Save the configuration after applying `modify_fn` to a copy of it
    pub fn save_with<F: Fn(&mut Self)>(&self, modify_fn: F) -> Result<(), Error> {
        let mut copy = self.clone();
        modify_fn(&mut copy);

        let serialized = toml::to_string(&copy)
            .map_err(|e| Error::Configuration(format!("failed to serialize config: {e}")))?;

        if let Some(parent) = self.save_path.parent() {
            create_dir_all(parent)
                .map_err(|e| Error::FileWriteError(parent.display().to_string(), e))?;
        }

        write(&self.save_path, serialized)
            .map_err(|e| Error::FileWriteError(self.save_path.display().to_string(), e))
    }

    fn find_config_path() -> Result<PathBuf, Error> {
        let current_dir = std::env::current_dir().map_err(|e| {
            Error::Configuration(format!("unable to determine the current directory: {e}"))
        })?;

        let local_config = current_dir.join(CONFIG_FILE_NAME);
        if local_config.exists() {
            return Ok(local_config);
        }

        if let Some(parent_folder) = current_dir.parent() {
            let workspace_config = parent_folder.join(CONFIG_FILE_NAME);
            if workspace_config.exists() {
                return Ok(workspace_config);
            }
        }

        let project_dirs = ProjectDirs::from("rs", "esp", "espefuse").ok_or_else(|| {
            Error::Configuration(String::from(
                "unable to determine the user configuration directory",
            ))
        })?;

        Ok(project_dirs.config_dir().join(CONFIG_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, Serialize)]
    struct TestData {
        #[serde(
            serialize_with = "serialize_u16_to_hex",
            deserialize_with = "deserialize_hex_to_u16"
        )]
        value: u16,
    }

    #[test]
    fn test_deserialize_hex_to_u16() {
        let result: Result<TestData, _> = toml::from_str(r#"value = "303a""#);
        assert_eq!(result.unwrap().value, 0x303a);

        let result: Result<TestData, _> = toml::from_str(r#"value = "0x1001""#);
        assert_eq!(result.unwrap().value, 0x1001);

        let result: Result<TestData, _> = toml::from_str(r#"value = "a""#);
        assert_eq!(result.unwrap().value, 0x0a);

        let result: Result<TestData, _> = toml::from_str(r#"value = "EA60""#);
        assert_eq!(result.unwrap().value, 0xea60);

        let result: Result<TestData, _> = toml::from_str(r#"value = "10gg""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_u16_to_hex() {
        let serialized = toml::to_string(&TestData { value: 0xa }).unwrap();
        assert_eq!(serialized.trim(), r#"value = "000a""#);

        let serialized = toml::to_string(&TestData { value: 0x7523 }).unwrap();
        let parsed: TestData = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.value, 0x7523);
    }

    #[test]
    fn parses_config_file() {
        let config: Config = toml::from_str(
            r#"
            baudrate = 460800

            [connection]
            serial = "/dev/ttyUSB0"

            [[usb_device]]
            vid = "303a"
            pid = "1001"
            "#,
        )
        .unwrap();

        assert_eq!(config.baudrate, Some(460_800));
        assert_eq!(config.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(
            config.usb_device,
            vec![UsbDevice {
                vid: 0x303a,
                pid: 0x1001
            }]
        );
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("espefuse-no-such-dir/espefuse.toml");
        let config = Config::load_from(&path).unwrap();

        assert!(config.connection.serial.is_none());
        assert!(config.baudrate.is_none());
        assert!(config.usb_device.is_empty());
    }

    #[test]
    fn saves_modified_copy() {
        let dir = std::env::temp_dir().join(format!("espefuse-config-{}", std::process::id()));
        let path = dir.join(CONFIG_FILE_NAME);

        let config = Config::load_from(&path).unwrap();
        config
            .save_with(|config| config.baudrate = Some(921_600))
            .unwrap();

        assert!(config.baudrate.is_none());
        assert_eq!(Config::load_from(&path).unwrap().baudrate, Some(921_600));

        std::fs::remove_dir_all(dir).unwrap();
    }
}
