//! Register space backends
//!
//! Everything above this module accesses the eFuse controller through the
//! [EfuseBackend] trait, which is implemented for a device connected over a
//! serial port ([SerialBackend]) and for an in-memory emulation of the
//! register window ([EmulatedBackend]).

pub use self::{emulated::EmulatedBackend, serial::SerialBackend};
use crate::{connection::reset::ResetBeforeOperation, error::Error};

mod emulated;
mod serial;

/// Raw access to the eFuse register space of a chip
pub trait EfuseBackend {
    /// The reported name of the chip, e.g. `ESP32-C3`
    fn chip_name(&self) -> &str;

    /// Establish the connection to the chip
    fn connect(&mut self, before: ResetBeforeOperation) -> Result<(), Error>;

    /// Read a 32-bit register
    fn read_reg(&mut self, address: u32) -> Result<u32, Error>;

    /// Write a 32-bit register
    fn write_reg(&mut self, address: u32, value: u32) -> Result<(), Error>;

    /// Release the backend.
    ///
    /// Called exactly once at the end of a run; pending state is persisted
    /// here.
    fn close(&mut self) -> Result<(), Error>;
}
