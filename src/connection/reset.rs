//! Reset strategies for resetting a target device into download mode
//!
//! Each strategy toggles the DTR and RTS lines of the serial adapter in the
//! sequence expected by the auto-reset circuit of the board.

#[cfg(unix)]
use std::{
    io,
    os::{fd::AsRawFd, unix::io::RawFd},
};
use std::{thread::sleep, time::Duration};

use log::debug;
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use strum::{Display, EnumIter, EnumString, VariantNames};

use crate::{
    connection::{Port, USB_SERIAL_JTAG_PID},
    error::Error,
};

/// Default time to wait before releasing the boot pin after a reset
const DEFAULT_RESET_DELAY: u64 = 50; // ms
/// Amount of time to wait if the default reset delay does not work
const EXTRA_RESET_DELAY: u64 = 550; // ms

#[cfg(unix)]
mod syscalls {
    use nix::{ioctl_read_bad, ioctl_write_int_bad, libc};

    ioctl_read_bad!(tiocmget, libc::TIOCMGET, libc::c_int);
    ioctl_write_int_bad!(tiocmset, libc::TIOCMSET);
}

/// Some strategy for resetting a target device
pub trait ResetStrategy {
    fn reset(&self, serial_port: &mut Port) -> Result<(), Error>;

    fn set_dtr(&self, serial_port: &mut Port, level: bool) -> Result<(), Error> {
        serial_port.write_data_terminal_ready(level)?;

        Ok(())
    }

    fn set_rts(&self, serial_port: &mut Port, level: bool) -> Result<(), Error> {
        serial_port.write_request_to_send(level)?;

        Ok(())
    }

    #[cfg(unix)]
    fn set_dtr_rts(
        &self,
        serial_port: &mut Port,
        dtr_level: bool,
        rts_level: bool,
    ) -> Result<(), Error> {
        let fd = serial_port.as_raw_fd();
        let mut status = tiocmget(fd)?;

        if dtr_level {
            status |= nix::libc::TIOCM_DTR
        } else {
            status &= !nix::libc::TIOCM_DTR
        }

        if rts_level {
            status |= nix::libc::TIOCM_RTS
        } else {
            status &= !nix::libc::TIOCM_RTS
        }

        tiocmset(fd, status)?;

        Ok(())
    }
}

/// Classic reset sequence, sets DTR and RTS sequentially.
#[derive(Debug, Clone, Copy)]
pub struct ClassicReset {
    delay: u64,
}

impl ClassicReset {
    pub fn new(extra_delay: bool) -> Self {
        let delay = if extra_delay {
            EXTRA_RESET_DELAY
        } else {
            DEFAULT_RESET_DELAY
        };

        Self { delay }
    }
}

impl ResetStrategy for ClassicReset {
    fn reset(&self, serial_port: &mut Port) -> Result<(), Error> {
        debug!(
            "Using Classic reset strategy with delay of {}ms",
            self.delay
        );

        self.set_dtr(serial_port, false)?; // IO0 = HIGH
        self.set_rts(serial_port, true)?; // EN = LOW, chip in reset

        sleep(Duration::from_millis(100));

        self.set_dtr(serial_port, true)?; // IO0 = LOW
        self.set_rts(serial_port, false)?; // EN = HIGH, chip out of reset

        sleep(Duration::from_millis(self.delay));

        self.set_dtr(serial_port, false)?; // IO0 = HIGH, done

        Ok(())
    }
}

/// UNIX-only reset sequence with custom implementation, which allows setting
/// DTR and RTS lines at the same time.
#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
pub struct UnixTightReset {
    delay: u64,
}

#[cfg(unix)]
impl UnixTightReset {
    pub fn new(extra_delay: bool) -> Self {
        let delay = if extra_delay {
            EXTRA_RESET_DELAY
        } else {
            DEFAULT_RESET_DELAY
        };

        Self { delay }
    }
}

#[cfg(unix)]
impl ResetStrategy for UnixTightReset {
    fn reset(&self, serial_port: &mut Port) -> Result<(), Error> {
        debug!(
            "Using UnixTight reset strategy with delay of {}ms",
            self.delay
        );

        self.set_dtr_rts(serial_port, false, false)?;
        self.set_dtr_rts(serial_port, true, true)?;
        self.set_dtr_rts(serial_port, false, true)?; // IO = HIGH, EN = LOW, chip in reset

        sleep(Duration::from_millis(100));

        self.set_dtr_rts(serial_port, true, false)?; // IO0 = LOW, EN = HIGH, chip out of reset

        sleep(Duration::from_millis(self.delay));

        self.set_dtr_rts(serial_port, false, false)?; // IO0 = HIGH, done
        self.set_dtr(serial_port, false)?;

        Ok(())
    }
}

/// Custom reset sequence, which is required when the device is connecting via
/// its USB-JTAG-Serial peripheral.
#[derive(Debug, Clone, Copy)]
pub struct UsbJtagSerialReset;

impl ResetStrategy for UsbJtagSerialReset {
    fn reset(&self, serial_port: &mut Port) -> Result<(), Error> {
        debug!("Using UsbJtagSerial reset strategy");

        self.set_rts(serial_port, false)?;
        self.set_dtr(serial_port, false)?; // Idle

        sleep(Duration::from_millis(100));

        self.set_dtr(serial_port, true)?; // Set IO0
        self.set_rts(serial_port, false)?;

        sleep(Duration::from_millis(100));

        self.set_rts(serial_port, true)?; // Reset. Goes through (1,1) instead of (0,0)
        self.set_dtr(serial_port, false)?;
        self.set_rts(serial_port, true)?; // Windows only propagates DTR on RTS setting

        sleep(Duration::from_millis(100));

        self.set_dtr(serial_port, false)?;
        self.set_rts(serial_port, false)?;

        Ok(())
    }
}

/// Construct a sequence of reset strategies based on the OS, the serial
/// adapter and the requested mode.
///
/// Returns a [Vec] containing one or more reset strategies to be attempted
/// sequentially. The sequence is empty when no reset should happen at all.
pub fn construct_reset_strategy_sequence(
    port_name: &str,
    pid: u16,
    mode: ResetBeforeOperation,
) -> Vec<Box<dyn ResetStrategy>> {
    match mode {
        ResetBeforeOperation::NoReset | ResetBeforeOperation::NoResetNoSync => return vec![],
        // The first ESP32 silicon revision needs the long boot pin hold time
        ResetBeforeOperation::Esp32r1 => return vec![Box::new(ClassicReset::new(true))],
        ResetBeforeOperation::DefaultReset => {}
    }

    // USB-JTAG/Serial mode
    if pid == USB_SERIAL_JTAG_PID {
        return vec![Box::new(UsbJtagSerialReset)];
    }

    // USB-to-Serial bridge
    #[cfg(unix)]
    if !port_name.starts_with("rfc2217:") {
        return vec![
            Box::new(UnixTightReset::new(false)),
            Box::new(UnixTightReset::new(true)),
            Box::new(ClassicReset::new(false)),
            Box::new(ClassicReset::new(true)),
        ];
    }

    #[cfg(not(unix))]
    let _ = port_name;

    // Windows
    vec![
        Box::new(ClassicReset::new(false)),
        Box::new(ClassicReset::new(true)),
    ]
}

/// Reset strategy applied before talking to the chip
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[non_exhaustive]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ResetBeforeOperation {
    /// Uses DTR & RTS serial control lines to try to reset the chip into
    /// bootloader mode.
    #[default]
    #[value(alias = "default_reset")]
    DefaultReset,
    /// Skips DTR/RTS control signal assignments and just starts sending a
    /// serial synchronisation command to the chip.
    #[value(alias = "no_reset")]
    NoReset,
    /// Classic DTR/RTS reset with the long boot pin hold time required by the
    /// first ESP32 silicon revision.
    Esp32r1,
    /// Skips DTR/RTS control signal assignments and also skips the serial
    /// synchronization command.
    #[value(alias = "no_reset_no_sync")]
    NoResetNoSync,
}

impl ResetBeforeOperation {
    /// Whether the SYNC handshake is performed after the reset
    pub fn syncs(&self) -> bool {
        !matches!(self, ResetBeforeOperation::NoResetNoSync)
    }
}

/// Get the status of modem bits
#[cfg(unix)]
fn tiocmget(fd: RawFd) -> io::Result<nix::libc::c_int> {
    let mut bits: nix::libc::c_int = 0;

    match unsafe { syscalls::tiocmget(fd, &mut bits) } {
        Ok(_) => Ok(bits),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// Set the status of modem bits
#[cfg(unix)]
fn tiocmset(fd: RawFd, bits: nix::libc::c_int) -> io::Result<()> {
    unsafe { syscalls::tiocmset(fd, bits) }
        .map(drop)
        .map_err(io::Error::from)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn no_reset_modes_skip_the_reset_sequence() {
        assert!(
            construct_reset_strategy_sequence("/dev/ttyUSB0", 0x6001, ResetBeforeOperation::NoReset)
                .is_empty()
        );
        assert!(construct_reset_strategy_sequence(
            "/dev/ttyUSB0",
            0x6001,
            ResetBeforeOperation::NoResetNoSync
        )
        .is_empty());
    }

    #[test]
    fn usb_jtag_serial_uses_a_single_strategy() {
        let sequence = construct_reset_strategy_sequence(
            "/dev/ttyACM0",
            USB_SERIAL_JTAG_PID,
            ResetBeforeOperation::DefaultReset,
        );

        assert_eq!(sequence.len(), 1);
    }

    #[test]
    fn esp32r1_uses_a_single_long_reset() {
        let sequence = construct_reset_strategy_sequence(
            "/dev/ttyUSB0",
            0x6001,
            ResetBeforeOperation::Esp32r1,
        );

        assert_eq!(sequence.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn modem_lines_need_a_terminal() {
        let file = std::fs::File::open("/dev/null").unwrap();

        assert!(tiocmget(file.as_raw_fd()).is_err());
        assert!(tiocmset(file.as_raw_fd(), 0).is_err());
    }

    #[test]
    fn parses_reset_mode_names() {
        assert_eq!(
            ResetBeforeOperation::from_str("no-reset-no-sync").unwrap(),
            ResetBeforeOperation::NoResetNoSync
        );
        assert_eq!(ResetBeforeOperation::DefaultReset.to_string(), "default-reset");
        assert!(!ResetBeforeOperation::NoResetNoSync.syncs());
        assert!(ResetBeforeOperation::NoReset.syncs());
    }
}
