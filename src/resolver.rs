//! Turn a requested chip into a register space backend
//!
//! The [ChipResolver] decides between a live device and an emulated one,
//! detects the connected chip when `auto` is requested and verifies it
//! otherwise.

use std::path::PathBuf;

use log::{debug, info};
use serialport::{available_ports, SerialPortType};

use crate::{
    backend::{EfuseBackend, EmulatedBackend, SerialBackend},
    connection::reset::ResetBeforeOperation,
    error::Error,
    target::{Chip, ChipSelection},
};

/// Default baud rate of the ROM loader
pub const DEFAULT_BAUD: u32 = 115_200;

/// How to reach a live device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Serial port, if known
    pub port: Option<String>,
    pub baud: u32,
    /// Reset strategy used before connecting
    pub before: ResetBeforeOperation,
    pub debug: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: None,
            baud: DEFAULT_BAUD,
            before: ResetBeforeOperation::default(),
            debug: false,
        }
    }
}

/// Everything needed to acquire a backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveRequest {
    pub selection: ChipSelection,
    pub connection: ConnectionParams,
    /// Work on an emulated chip instead of a device
    pub emulate: bool,
    /// Backing file of the emulated chip
    pub efuse_file: Option<PathBuf>,
    /// Only the command surface is needed, do not touch any device or file
    pub skip_connect: bool,
}

/// Acquires the backend for a run
pub trait Resolve {
    fn resolve(&mut self, request: &ResolveRequest) -> Result<Box<dyn EfuseBackend>, Error>;
}

/// Resolves requests to serial or emulated backends
#[derive(Debug, Default, Clone, Copy)]
pub struct ChipResolver;

impl Resolve for ChipResolver {
    fn resolve(&mut self, request: &ResolveRequest) -> Result<Box<dyn EfuseBackend>, Error> {
        if request.emulate {
            return emulated(request);
        }

        let params = &request.connection;

        match (request.selection, request.skip_connect) {
            // The ESP32 operations stand in for every chip when only help is
            // requested
            (ChipSelection::Auto, true) => Ok(Box::new(SerialBackend::detached(Chip::Esp32))),
            (ChipSelection::Chip(chip), true) => Ok(Box::new(SerialBackend::detached(chip))),
            (ChipSelection::Auto, false) => {
                let port = default_port(params)?;
                info!("Detecting chip type on {port}");

                let backend = SerialBackend::detect(&port, params.baud, params.before)
                    .map_err(|e| match e {
                        Error::ChipDetect(_) => e,
                        e => Error::ChipDetect(e.to_string()),
                    })?;

                Ok(Box::new(backend))
            }
            (ChipSelection::Chip(chip), false) => {
                let port = default_port(params)?;
                let mut backend = SerialBackend::new(chip, port, params.baud);
                backend.connect(params.before)?;

                Ok(Box::new(backend))
            }
        }
    }
}

fn emulated(request: &ResolveRequest) -> Result<Box<dyn EfuseBackend>, Error> {
    let chip = request.selection.chip().ok_or_else(|| {
        Error::Configuration(String::from(
            "the chip to emulate must be selected with `--chip`, `auto` can not be emulated",
        ))
    })?;

    info!("Emulating {}", chip.name());

    if request.skip_connect {
        return Ok(Box::new(EmulatedBackend::in_memory(chip)));
    }

    Ok(Box::new(EmulatedBackend::new(
        chip,
        request.efuse_file.clone(),
    )?))
}

/// The requested port, or the only serial port attached to the host
fn default_port(params: &ConnectionParams) -> Result<String, Error> {
    if let Some(port) = &params.port {
        return Ok(port.clone());
    }

    let ports = available_ports()?
        .into_iter()
        .filter(|info| {
            matches!(
                info.port_type,
                SerialPortType::UsbPort(..) | SerialPortType::Unknown
            )
        })
        .collect::<Vec<_>>();
    debug!("Detected serial ports: {ports:?}");

    match ports.as_slice() {
        [] => Err(Error::NoSerial),
        [port] => Ok(port.port_name.clone()),
        _ => Err(Error::Configuration(String::from(
            "more than one serial port is available, select one with `--port`",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(selection: ChipSelection, emulate: bool, skip_connect: bool) -> ResolveRequest {
        ResolveRequest {
            selection,
            emulate,
            skip_connect,
            ..Default::default()
        }
    }

    #[test]
    fn emulating_auto_is_rejected() {
        let result = ChipResolver.resolve(&request(ChipSelection::Auto, true, false));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn emulates_explicit_chip() {
        let backend = ChipResolver
            .resolve(&request(Chip::Esp32s3beta2.into(), true, false))
            .unwrap();

        assert_eq!(backend.chip_name(), "ESP32-S3(beta2)");
    }

    #[test]
    fn help_without_chip_uses_esp32() {
        let mut backend = ChipResolver
            .resolve(&request(ChipSelection::Auto, false, true))
            .unwrap();

        assert_eq!(backend.chip_name(), "ESP32");
        assert!(matches!(backend.read_reg(0x3ff5_a000), Err(Error::NotConnected)));
    }

    #[test]
    fn detached_backend_keeps_selected_chip() {
        let backend = ChipResolver
            .resolve(&request(Chip::Esp32h2.into(), false, true))
            .unwrap();

        assert_eq!(backend.chip_name(), "ESP32-H2");
    }
}
