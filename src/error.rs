//! Library and application errors

use std::{
    fmt::{Display, Formatter},
    io,
    path::PathBuf,
};

use miette::Diagnostic;
use slip_codec::SlipError;
use strum::VariantNames;
use thiserror::Error;

use crate::{command::CommandType, target::Chip};

/// All possible errors returned by espefuse
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(espefuse::configuration))]
    Configuration(String),

    #[error("Unable to detect the connected chip: {0}")]
    #[diagnostic(
        code(espefuse::chip_detect_error),
        help("Supported chips are: {}\n\
              If your chip is supported, try hard-resetting the device and try again, \
              or select the chip explicitly with `-c/--chip`",
             Chip::VARIANTS.join(", "))
    )]
    ChipDetect(String),

    #[error("Chip provided ({0}) with `-c/--chip` does not match the detected chip ({1})")]
    #[diagnostic(
        code(espefuse::chip_mismatch),
        help("Ensure that the correct chip is selected, or use `--chip auto` to autodetect the chip")
    )]
    ChipMismatch(String, String),

    #[error("Unsupported chip ({0})")]
    #[diagnostic(
        code(espefuse::unsupported_chip),
        help("Supported chips are: {}", Chip::VARIANTS.join(", "))
    )]
    UnsupportedChip(String),

    #[error("Unknown operation: {0}")]
    #[diagnostic(
        code(espefuse::unknown_operation),
        help("Run `espefuse --help` to list the operations supported by the selected chip")
    )]
    UnknownOperation(String),

    #[error("Operation `{0}` is registered more than once")]
    #[diagnostic(code(espefuse::duplicate_operation))]
    DuplicateOperation(String),

    #[error("The device is not connected")]
    #[diagnostic(
        code(espefuse::not_connected),
        help("This handle was created without connecting and can only be used to list operations")
    )]
    NotConnected,

    #[error("Operation was cancelled by the user")]
    #[diagnostic(code(espefuse::cancelled))]
    Cancelled,

    #[error("No serial ports could be detected")]
    #[diagnostic(
        code(espefuse::no_serial),
        help("Make sure you have connected a device to the host system, or use `--virt` to work on an emulated chip")
    )]
    NoSerial,

    #[error("The serial port '{0}' could not be found")]
    #[diagnostic(
        code(espefuse::serial_not_found),
        help("Make sure the correct device is connected to the host system")
    )]
    SerialNotFound(String),

    #[error("Unknown eFuse field `{name}` for the {chip}")]
    #[diagnostic(
        code(espefuse::unknown_field),
        help("Run `espefuse --chip {chip} summary` to list the available fields")
    )]
    UnknownField { chip: Chip, name: String },

    #[error("Unknown eFuse block `{0}`")]
    #[diagnostic(code(espefuse::unknown_block))]
    UnknownBlock(String),

    #[error("Invalid eFuse block index: {0}")]
    #[diagnostic(code(espefuse::invalid_efuse_block))]
    InvalidEfuseBlock(u32),

    #[error("Invalid value `{value}` for {name}: {reason}")]
    #[diagnostic(code(espefuse::invalid_value))]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("{0} is write protected and can no longer be burned")]
    #[diagnostic(code(espefuse::write_protected))]
    WriteProtected(String),

    #[error("{0} can not be read or write protected")]
    #[diagnostic(code(espefuse::not_protectable))]
    NotProtectable(String),

    #[error("Burning {name} would require clearing already burned bits ({burned:#x} -> {requested:#x})")]
    #[diagnostic(
        code(espefuse::cannot_clear_bits),
        help("eFuse bits can only ever be changed from 0 to 1")
    )]
    CannotClearBits {
        name: String,
        burned: u128,
        requested: u128,
    },

    #[error("{0} already contains data and is protected by a coding scheme")]
    #[diagnostic(
        code(espefuse::block_already_written),
        help("Blocks using 3/4 or Reed-Solomon encoding can only be burned once")
    )]
    BlockAlreadyWritten(String),

    #[error("{block} uses an unsupported coding scheme ({scheme})")]
    #[diagnostic(code(espefuse::unsupported_coding_scheme))]
    UnsupportedCodingScheme { block: String, scheme: String },

    #[error("Data of {len} bytes does not fit into {block} ({max} bytes available)")]
    #[diagnostic(code(espefuse::data_too_large))]
    DataTooLarge {
        block: String,
        len: usize,
        max: usize,
    },

    #[error("Verification of {0} failed after burning")]
    #[diagnostic(
        code(espefuse::burn_verify_failed),
        help("The chip may be damaged or the programming voltage may be out of range")
    )]
    BurnVerifyFailed(String),

    #[error("The eFuse controller did not finish the command in time")]
    #[diagnostic(code(espefuse::controller_timeout))]
    ControllerTimeout,

    #[error("The {chip} does not support {feature}")]
    #[diagnostic(code(espefuse::unsupported_feature))]
    UnsupportedFeature { chip: Chip, feature: String },

    #[error("Address {0:#010x} is outside of the emulated eFuse register space")]
    #[diagnostic(code(espefuse::emulated_address))]
    EmulatedAddressOutOfRange(u32),

    #[error("The eFuse image {path} is {len} bytes long, expected {expected} bytes")]
    #[diagnostic(
        code(espefuse::corrupt_efuse_file),
        help("Delete the file to start from a fresh emulated chip")
    )]
    CorruptEfuseFile {
        path: PathBuf,
        len: usize,
        expected: usize,
    },

    #[error("Failed to open file: {0}")]
    #[diagnostic(code(espefuse::file_open))]
    FileOpenError(String, #[source] io::Error),

    #[error("Failed to write file: {0}")]
    #[diagnostic(code(espefuse::file_write))]
    FileWriteError(String, #[source] io::Error),

    #[error(transparent)]
    #[diagnostic(code(espefuse::cli))]
    Cli(#[from] clap::Error),

    #[cfg(feature = "cli")]
    #[error(transparent)]
    #[diagnostic(code(espefuse::dialoguer_error))]
    DialoguerError(#[from] dialoguer::Error),

    #[error("Invalid response length, expected >= {expected}, got {got}")]
    #[diagnostic(code(espefuse::invalid_response))]
    InvalidResponse { expected: usize, got: usize },

    #[error("Error while connecting to device")]
    #[diagnostic(transparent)]
    Connection(#[source] ConnectionError),

    #[error("The bootloader returned an error")]
    #[diagnostic(transparent)]
    RomError(#[from] RomError),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Connection(err.into())
    }
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        Self::Connection(err.into())
    }
}

impl From<SlipError> for Error {
    fn from(err: SlipError) -> Self {
        Self::Connection(err.into())
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Self::Connection(err)
    }
}

/// Connection-related errors
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    #[error("Failed to connect to the device")]
    #[diagnostic(
        code(espefuse::connection_failed),
        help("Ensure that the device is connected and the reset and boot pins are not being held down")
    )]
    ConnectionFailed,

    #[error("Serial port not found")]
    #[diagnostic(
        code(espefuse::device_not_found),
        help("Ensure that the device is connected and your host recognizes the serial adapter")
    )]
    DeviceNotFound,

    #[error("Received packet has invalid SLIP framing")]
    #[diagnostic(
        code(espefuse::slip_framing),
        help("Try hard-resetting the device and try again, if the error persists your ROM may be corrupted")
    )]
    FramingError,

    #[error("Download mode successfully detected, but getting no sync reply")]
    #[diagnostic(
        code(espefuse::no_sync_reply),
        help("The serial TX path seems to be down")
    )]
    NoSyncReply,

    #[error("Received packet to large for buffer")]
    #[diagnostic(
        code(espefuse::oversized_packet),
        help("Try hard-resetting the device and try again, if the error persists your ROM may be corrupted")
    )]
    OverSizedPacket,

    #[error("Failed to read the available bytes on the serial port. Available bytes: {0}, Read bytes: {1}")]
    #[diagnostic(code(espefuse::read_mismatch))]
    ReadMismatch(u32, u32),

    #[error("Timeout while running {0}command")]
    #[diagnostic(code(espefuse::timeout))]
    Timeout(TimedOutCommand),

    #[error("IO error while using serial port: {0}")]
    #[diagnostic(code(espefuse::serial_error))]
    Serial(#[source] serialport::Error),

    #[error("Wrong boot mode detected ({0})! The chip needs to be in download mode.")]
    #[diagnostic(code(espefuse::wrong_boot_mode))]
    WrongBootMode(String),
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        from_error_kind(err.kind(), err)
    }
}

impl From<serialport::Error> for ConnectionError {
    fn from(err: serialport::Error) -> Self {
        use serialport::ErrorKind;

        match err.kind() {
            ErrorKind::Io(kind) => from_error_kind(kind, err),
            ErrorKind::NoDevice => ConnectionError::DeviceNotFound,
            _ => ConnectionError::Serial(err),
        }
    }
}

impl From<SlipError> for ConnectionError {
    fn from(err: SlipError) -> Self {
        match err {
            SlipError::FramingError => Self::FramingError,
            SlipError::OversizedPacket => Self::OverSizedPacket,
            SlipError::ReadError(io) => Self::from(io),
            SlipError::EndOfStream => Self::FramingError,
        }
    }
}

/// An executed command which has timed out
#[derive(Clone, Debug, Default)]
pub struct TimedOutCommand {
    command: Option<CommandType>,
}

impl Display for TimedOutCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.command {
            Some(command) => write!(f, "{command} "),
            None => Ok(()),
        }
    }
}

impl From<CommandType> for TimedOutCommand {
    fn from(ct: CommandType) -> Self {
        TimedOutCommand { command: Some(ct) }
    }
}

/// Errors originating from a device's ROM functionality
#[derive(Clone, Copy, Debug, Default, Diagnostic, Error, strum::FromRepr)]
#[non_exhaustive]
#[repr(u8)]
pub enum RomErrorKind {
    #[error("Invalid message received")]
    #[diagnostic(code(espefuse::rom::invalid_message))]
    InvalidMessage = 0x05,

    #[error("Bootloader failed to execute command")]
    #[diagnostic(code(espefuse::rom::failed))]
    FailedToAct = 0x06,

    #[error("Received message has invalid CRC")]
    #[diagnostic(code(espefuse::rom::crc))]
    InvalidCrc = 0x07,

    #[error("Bad data length")]
    #[diagnostic(code(espefuse::rom::data_len))]
    BadDataLen = 0xc0,

    #[error("Bad data checksum")]
    #[diagnostic(code(espefuse::rom::data_crc))]
    BadDataChecksum = 0xc1,

    #[error("Invalid command")]
    #[diagnostic(code(espefuse::rom::cmd))]
    InvalidCommand = 0xc3,

    #[default]
    #[error("Other")]
    #[diagnostic(code(espefuse::rom::other))]
    Other = 0xff,
}

impl From<u8> for RomErrorKind {
    fn from(raw: u8) -> Self {
        Self::from_repr(raw).unwrap_or_default()
    }
}

/// An error originating from a device's ROM functionality
#[derive(Clone, Copy, Debug, Diagnostic, Error)]
#[error("Error while running {command} command")]
#[non_exhaustive]
pub struct RomError {
    command: CommandType,
    #[source]
    kind: RomErrorKind,
}

impl RomError {
    pub fn new(command: CommandType, kind: RomErrorKind) -> RomError {
        RomError { command, kind }
    }
}

pub(crate) trait ResultExt {
    /// Mark the command from which this error originates
    fn for_command(self, command: CommandType) -> Self;
}

impl<T> ResultExt for Result<T, Error> {
    fn for_command(self, command: CommandType) -> Self {
        match self {
            Err(Error::Connection(ConnectionError::Timeout(_))) => {
                Err(Error::Connection(ConnectionError::Timeout(command.into())))
            }
            res => res,
        }
    }
}

fn from_error_kind<E>(kind: io::ErrorKind, err: E) -> ConnectionError
where
    E: Into<serialport::Error>,
{
    use io::ErrorKind;

    match kind {
        ErrorKind::TimedOut => ConnectionError::Timeout(TimedOutCommand::default()),
        ErrorKind::NotFound => ConnectionError::DeviceNotFound,
        _ => ConnectionError::Serial(err.into()),
    }
}
