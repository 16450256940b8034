use crossterm::style::Stylize;
use dialoguer::{theme::ColorfulTheme, Confirm, Select};
use log::debug;
use serialport::{available_ports, SerialPortInfo, SerialPortType, UsbPortInfo};

use super::config::{Config, UsbDevice};
use crate::error::Error;

/// Name of the serial port to connect to.
///
/// A port given on the command line takes precedence over the one in the
/// configuration file. Without either the user selects one of the detected
/// ports, unless there is exactly one and it belongs to a known device.
pub fn serial_port_name(port: Option<&str>, config: &Config) -> Result<String, Error> {
    if let Some(port) = port.or(config.connection.serial.as_deref()) {
        debug!("Using configured serial port {port}");
        return Ok(port.to_owned());
    }

    let ports = detect_usb_serial_ports()?;
    let (port, matches) = select_serial_port(ports, config)?;

    if let SerialPortType::UsbPort(usb_info) = &port.port_type {
        if !matches {
            let remember = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt("Remember this serial port for future use?")
                .interact_opt()?
                .unwrap_or_default();

            if remember {
                // Failing to save is not a reason to stop burning
                if let Err(e) = config.save_with(|config| {
                    config.usb_device.push(UsbDevice {
                        vid: usb_info.vid,
                        pid: usb_info.pid,
                    })
                }) {
                    eprintln!("Failed to save config {e}");
                }
            }
        }
    }

    Ok(port.port_name)
}

fn detect_usb_serial_ports() -> Result<Vec<SerialPortInfo>, Error> {
    let ports = available_ports()?
        .into_iter()
        .filter(|port_info| {
            matches!(
                &port_info.port_type,
                SerialPortType::UsbPort(..) | SerialPortType::Unknown
            )
        })
        .collect::<Vec<_>>();

    Ok(ports)
}

/// USB UART adapters which are known to be on common dev boards
const KNOWN_DEVICES: &[UsbDevice] = &[
    UsbDevice {
        vid: 0x10c4,
        pid: 0xea60,
    }, // Silicon Labs CP210x UART Bridge
    UsbDevice {
        vid: 0x1a86,
        pid: 0x7523,
    }, // QinHeng Electronics CH340 serial converter
    UsbDevice {
        vid: 0x303a,
        pid: 0x1001,
    }, // Espressif USB-JTAG-Serial
];

fn select_serial_port(
    ports: Vec<SerialPortInfo>,
    config: &Config,
) -> Result<(SerialPortInfo, bool), Error> {
    let device_matches = |info: &UsbPortInfo| {
        config
            .usb_device
            .iter()
            .chain(KNOWN_DEVICES.iter())
            .any(|dev| dev.matches(info))
    };

    if ports.len() > 1 {
        println!(
            "Detected {} serial ports. Ports which match a known common dev board are highlighted.\n",
            ports.len()
        );

        let port_names = ports
            .iter()
            .map(|port_info| match &port_info.port_type {
                SerialPortType::UsbPort(info) => {
                    let formatted = if device_matches(info) {
                        port_info.port_name.as_str().bold()
                    } else {
                        port_info.port_name.as_str().reset()
                    };

                    match &info.product {
                        Some(product) => format!("{formatted} - {product}"),
                        None => formatted.to_string(),
                    }
                }
                _ => port_info.port_name.clone(),
            })
            .collect::<Vec<_>>();

        let index = Select::with_theme(&ColorfulTheme::default())
            .items(&port_names)
            .default(0)
            .interact_opt()?
            .ok_or(Error::Cancelled)?;

        let port_info = ports
            .get(index)
            .ok_or_else(|| Error::SerialNotFound(format!("#{index}")))?;
        let matches = match &port_info.port_type {
            SerialPortType::UsbPort(usb_info) => device_matches(usb_info),
            _ => false,
        };

        Ok((port_info.to_owned(), matches))
    } else if let [port] = ports.as_slice() {
        let port_info = match &port.port_type {
            SerialPortType::UsbPort(info) => info.clone(),
            _ => UsbPortInfo {
                vid: 0,
                pid: 0,
                serial_number: None,
                manufacturer: None,
                product: None,
            },
        };

        if device_matches(&port_info) {
            Ok((port.to_owned(), true))
        } else if confirm_port(&port.port_name, &port_info)? {
            Ok((port.to_owned(), false))
        } else {
            Err(Error::SerialNotFound(port.port_name.clone()))
        }
    } else {
        Err(Error::NoSerial)
    }
}

fn confirm_port(port_name: &str, port_info: &UsbPortInfo) -> Result<bool, Error> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(match &port_info.product {
            Some(product) => format!("Use serial port '{port_name}' - {product}?"),
            None => format!("Use serial port '{port_name}'?"),
        })
        .interact_opt()?
        .ok_or(Error::Cancelled)
}
