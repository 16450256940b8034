//! Establish a connection with a target device
//!
//! The [Connection] struct abstracts over the serial connection and
//! sending/decoding of commands, and provides the register level operations
//! needed to read and program eFuses.

use std::{
    io::{BufWriter, Read, Write},
    iter::zip,
    thread::sleep,
    time::Duration,
};

use log::debug;
use regex::Regex;
use serialport::SerialPort;
use slip_codec::SlipDecoder;

use self::{
    encoder::SlipEncoder,
    reset::{construct_reset_strategy_sequence, ResetBeforeOperation, ResetStrategy},
};
use crate::{
    command::{Command, CommandType},
    error::{ConnectionError, Error, ResultExt, RomError, RomErrorKind},
};

pub mod reset;

const MAX_CONNECT_ATTEMPTS: usize = 7;
const MAX_SYNC_ATTEMPTS: usize = 5;
pub(crate) const USB_SERIAL_JTAG_PID: u16 = 0x1001;

#[cfg(unix)]
/// Alias for the serial TTYPort
pub type Port = serialport::TTYPort;
#[cfg(windows)]
/// Alias for the serial COMPort
pub type Port = serialport::COMPort;

/// The parts of a ROM loader response the eFuse register access relies on
#[derive(Debug, Copy, Clone)]
struct Response {
    return_op: u8,
    value: u32,
    error: u8,
    status: u8,
}

/// An established connection with a target device
pub struct Connection {
    serial: Port,
    pid: u16,
    decoder: SlipDecoder,
    before_operation: ResetBeforeOperation,
}

impl Connection {
    /// Wrap an opened serial port; `pid` is the USB product id of the adapter
    /// or zero when the port is not a USB device.
    pub fn new(serial: Port, pid: u16, before_operation: ResetBeforeOperation) -> Self {
        Connection {
            serial,
            pid,
            decoder: SlipDecoder::new(),
            before_operation,
        }
    }

    /// Initialize a connection with a device
    pub fn begin(&mut self) -> Result<(), Error> {
        let port_name = self.serial.name().unwrap_or_default();
        let reset_sequence =
            construct_reset_strategy_sequence(&port_name, self.pid, self.before_operation);

        if reset_sequence.is_empty() {
            // Without a reset strategy every attempt is identical
            for attempt in 0..MAX_CONNECT_ATTEMPTS {
                match self.connect_attempt(None) {
                    Ok(_) => return Ok(()),
                    Err(e) => debug!("Connect attempt {attempt} failed: {e:?}, retrying"),
                }
            }
        } else {
            for (_, reset_strategy) in zip(0..MAX_CONNECT_ATTEMPTS, reset_sequence.iter().cycle())
            {
                match self.connect_attempt(Some(reset_strategy.as_ref())) {
                    Ok(_) => return Ok(()),
                    Err(e) => debug!("Failed to reset, error {:#?}, retrying", e),
                }
            }
        }

        Err(Error::Connection(ConnectionError::ConnectionFailed))
    }

    /// Try to connect to a device
    fn connect_attempt(&mut self, reset_strategy: Option<&dyn ResetStrategy>) -> Result<(), Error> {
        // If we're doing no_sync, we're likely communicating as a pass through
        // with an intermediate device to the ESP32
        if !self.before_operation.syncs() {
            return Ok(());
        }

        let mut download_mode = false;
        let mut boot_mode = String::new();
        let mut boot_log_detected = false;

        if let Some(reset_strategy) = reset_strategy {
            // Reset the chip to bootloader (download mode)
            reset_strategy.reset(&mut self.serial)?;

            let available_bytes = self.serial.bytes_to_read()?;
            let mut buff = vec![0; available_bytes as usize];
            let read_bytes = self.serial.read(&mut buff)? as u32;

            if read_bytes != available_bytes {
                return Err(Error::Connection(ConnectionError::ReadMismatch(
                    available_bytes,
                    read_bytes,
                )));
            }

            let read_slice = String::from_utf8_lossy(&buff[..read_bytes as usize]);
            let pattern = Regex::new(r"boot:(0x[0-9a-fA-F]+)(.*waiting for download)?")
                .map_err(|e| Error::Configuration(e.to_string()))?;

            // Search for the boot log in the read data
            if let Some(data) = pattern.captures(&read_slice) {
                boot_log_detected = true;
                boot_mode = data
                    .get(1)
                    .map(|m| m.as_str().to_owned())
                    .unwrap_or_default();
                download_mode = data.get(2).is_some();

                debug!("Boot Mode: {}", boot_mode);
                debug!("Download Mode: {}", download_mode);
            };
        }

        for _ in 0..MAX_SYNC_ATTEMPTS {
            self.flush()?;

            if self.sync().is_ok() {
                return Ok(());
            }
        }

        if boot_log_detected {
            if download_mode {
                return Err(Error::Connection(ConnectionError::NoSyncReply));
            } else {
                return Err(Error::Connection(ConnectionError::WrongBootMode(boot_mode)));
            }
        }

        Err(Error::Connection(ConnectionError::ConnectionFailed))
    }

    /// Try to sync with the device for a given timeout
    fn sync(&mut self) -> Result<(), Error> {
        self.with_timeout(CommandType::Sync.timeout(), |connection| {
            connection.command(Command::Sync)?;
            connection.flush()?;

            sleep(Duration::from_millis(10));

            // The ROM answers a single SYNC with several identical responses
            for _ in 0..MAX_CONNECT_ATTEMPTS {
                match connection.read_response()? {
                    Some(response) if response.return_op == CommandType::Sync as u8 => {
                        if response.status == 1 {
                            connection.flush().ok();
                            return Err(Error::RomError(RomError::new(
                                CommandType::Sync,
                                RomErrorKind::from(response.error),
                            )));
                        }
                    }
                    _ => {
                        return Err(Error::RomError(RomError::new(
                            CommandType::Sync,
                            RomErrorKind::InvalidMessage,
                        )))
                    }
                }
            }

            Ok(())
        })
    }

    /// Run `f` with the serial timeout temporarily set to `timeout`
    fn with_timeout<T, F>(&mut self, timeout: Duration, mut f: F) -> Result<T, Error>
    where
        F: FnMut(&mut Connection) -> Result<T, Error>,
    {
        let old_timeout = self.serial.timeout();
        self.serial.set_timeout(timeout)?;

        let result = f(self);

        self.serial.set_timeout(old_timeout)?;

        result
    }

    fn read_response(&mut self) -> Result<Option<Response>, Error> {
        match self.read(10)? {
            None => Ok(None),
            Some(response) => {
                // Responses are 10 bytes long with two status bytes when a stub
                // is running, the ROM loader sends 12 bytes with four.
                let status_len = match response.len() {
                    10 => 2,
                    12 => 4,
                    got => return Err(Error::InvalidResponse { expected: 10, got }),
                };

                let status = response.len() - status_len;
                let mut value = [0; 4];
                value.copy_from_slice(&response[4..8]);

                Ok(Some(Response {
                    return_op: response[1],
                    value: u32::from_le_bytes(value),
                    error: response[status],
                    status: response[status + 1],
                }))
            }
        }
    }

    fn write_command(&mut self, command: Command) -> Result<(), Error> {
        debug!("Writing command: {:02x?}", command);

        self.serial.clear(serialport::ClearBuffer::Input)?;
        let mut writer = BufWriter::new(&mut self.serial);
        let mut encoder = SlipEncoder::new(&mut writer)?;
        command.write(&mut encoder)?;
        encoder.finish()?;
        writer.flush()?;

        Ok(())
    }

    /// Send `command` and wait for the matching response, returning its value
    fn command(&mut self, command: Command) -> Result<u32, Error> {
        let ty = command.command_type();
        self.write_command(command).for_command(ty)?;

        for _ in 0..100 {
            match self.read_response().for_command(ty)? {
                Some(response) if response.return_op == ty as u8 => {
                    return if response.error != 0 {
                        let _error = self.flush();
                        Err(Error::RomError(RomError::new(
                            ty,
                            RomErrorKind::from(response.error),
                        )))
                    } else {
                        Ok(response.value)
                    }
                }
                _ => continue,
            }
        }

        Err(Error::Connection(ConnectionError::ConnectionFailed))
    }

    /// Read a 32-bit register of the device
    pub fn read_reg(&mut self, address: u32) -> Result<u32, Error> {
        self.with_timeout(CommandType::ReadReg.timeout(), |connection| {
            connection.command(Command::ReadReg { address })
        })
    }

    /// Write a 32-bit register of the device, optionally only the bits in
    /// `mask`
    pub fn write_reg(&mut self, address: u32, value: u32, mask: Option<u32>) -> Result<(), Error> {
        self.with_timeout(CommandType::WriteReg.timeout(), |connection| {
            connection.command(Command::WriteReg {
                address,
                value,
                mask,
            })
        })?;

        Ok(())
    }

    fn read(&mut self, len: usize) -> Result<Option<Vec<u8>>, Error> {
        let mut tmp = Vec::with_capacity(1024);
        loop {
            self.decoder.decode(&mut self.serial, &mut tmp)?;
            if tmp.len() >= len {
                return Ok(Some(tmp));
            }
        }
    }

    /// Flush the serial port
    pub fn flush(&mut self) -> Result<(), Error> {
        self.serial.flush()?;
        Ok(())
    }
}

mod encoder {
    use std::io::Write;

    const END: u8 = 0xC0;
    const ESC: u8 = 0xDB;
    const ESC_END: u8 = 0xDC;
    const ESC_ESC: u8 = 0xDD;

    /// Writes a single SLIP frame, escaping the payload on the fly
    pub struct SlipEncoder<'a, W: Write> {
        writer: &'a mut W,
        len: usize,
    }

    impl<'a, W: Write> SlipEncoder<'a, W> {
        /// Creates a new encoder context
        pub fn new(writer: &'a mut W) -> std::io::Result<Self> {
            let len = writer.write(&[END])?;
            Ok(Self { writer, len })
        }

        pub fn finish(mut self) -> std::io::Result<usize> {
            self.len += self.writer.write(&[END])?;
            Ok(self.len)
        }
    }

    impl<W: Write> Write for SlipEncoder<'_, W> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            for value in buf.iter() {
                match *value {
                    END => {
                        self.len += self.writer.write(&[ESC, ESC_END])?;
                    }
                    ESC => {
                        self.len += self.writer.write(&[ESC, ESC_ESC])?;
                    }
                    _ => {
                        self.len += self.writer.write(&[*value])?;
                    }
                }
            }

            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.writer.flush()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn escapes_frame_delimiters() {
            let mut out = Vec::new();
            let mut encoder = SlipEncoder::new(&mut out).unwrap();
            encoder.write_all(&[0x01, END, ESC, 0x02]).unwrap();
            let len = encoder.finish().unwrap();

            assert_eq!(out, [END, 0x01, ESC, ESC_END, ESC, ESC_ESC, 0x02, END]);
            assert_eq!(len, out.len());
        }
    }
}
