use log::{debug, info};
use serialport::{FlowControl, SerialPortType};

use super::EfuseBackend;
use crate::{
    connection::{reset::ResetBeforeOperation, Connection},
    error::Error,
    target::{Chip, CHIP_DETECT_MAGIC_REG_ADDR},
};

/// A chip connected through its serial ROM loader
pub struct SerialBackend {
    chip: Chip,
    port: String,
    baud: u32,
    connection: Option<Connection>,
}

impl SerialBackend {
    /// A backend for `chip` on `port`, not yet connected
    pub fn new(chip: Chip, port: impl Into<String>, baud: u32) -> Self {
        Self {
            chip,
            port: port.into(),
            baud,
            connection: None,
        }
    }

    /// A backend which never connects, used to describe the operations of
    /// `chip` without touching any hardware.
    pub fn detached(chip: Chip) -> Self {
        Self::new(chip, String::new(), 0)
    }

    /// Connect to the device on `port` and identify it by its magic value
    pub fn detect(port: &str, baud: u32, before: ResetBeforeOperation) -> Result<Self, Error> {
        let mut connection = open(port, baud, before)?;
        let magic = connection.read_reg(CHIP_DETECT_MAGIC_REG_ADDR)?;
        debug!("Chip detect magic value: {magic:#010x}");

        let chip = Chip::from_magic(magic)?;
        info!("Detected {}", chip.name());

        Ok(Self {
            chip,
            port: port.to_owned(),
            baud,
            connection: Some(connection),
        })
    }

    pub fn chip(&self) -> Chip {
        self.chip
    }

    fn connection(&mut self) -> Result<&mut Connection, Error> {
        self.connection.as_mut().ok_or(Error::NotConnected)
    }
}

impl EfuseBackend for SerialBackend {
    fn chip_name(&self) -> &str {
        self.chip.name()
    }

    fn connect(&mut self, before: ResetBeforeOperation) -> Result<(), Error> {
        if self.connection.is_some() {
            return Ok(());
        }

        let mut connection = open(&self.port, self.baud, before)?;

        let magic = connection.read_reg(CHIP_DETECT_MAGIC_REG_ADDR)?;
        if !self.chip.has_magic_value(magic) {
            let detected = Chip::from_magic(magic)
                .map(|chip| chip.name().to_owned())
                .unwrap_or_else(|_| format!("unknown chip, magic {magic:#010x}"));

            return Err(Error::ChipMismatch(self.chip.to_string(), detected));
        }

        info!("Connected to {} on {}", self.chip.name(), self.port);
        self.connection = Some(connection);

        Ok(())
    }

    fn read_reg(&mut self, address: u32) -> Result<u32, Error> {
        self.connection()?.read_reg(address)
    }

    fn write_reg(&mut self, address: u32, value: u32) -> Result<(), Error> {
        self.connection()?.write_reg(address, value, None)
    }

    fn close(&mut self) -> Result<(), Error> {
        if let Some(mut connection) = self.connection.take() {
            connection.flush()?;
            debug!("Closed serial port {}", self.port);
        }

        Ok(())
    }
}

/// Open the serial port and run the connection handshake
fn open(port: &str, baud: u32, before: ResetBeforeOperation) -> Result<Connection, Error> {
    // USB-Serial-JTAG adapters need a different reset sequence
    let pid = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .find(|info| info.port_name.eq_ignore_ascii_case(port))
        .and_then(|info| match info.port_type {
            SerialPortType::UsbPort(usb) => Some(usb.pid),
            _ => None,
        })
        .unwrap_or_default();

    debug!("Opening serial port {port} at {baud} baud (USB PID {pid:#06x})");
    let serial = serialport::new(port, baud)
        .flow_control(FlowControl::None)
        .open_native()?;

    let mut connection = Connection::new(serial, pid, before);
    connection.begin()?;

    Ok(connection)
}
