//! Read and burn the eFuses of Espressif devices
//!
//! A run resolves the requested chip to a [backend](backend::EfuseBackend),
//! binds it to the eFuse layout and [operations](operations::OperationRegistry)
//! of that chip, and dispatches one operation against it. The register space
//! is either a device connected through its serial ROM loader or an emulated
//! chip whose eFuses are kept in a file.
//!
//! The [Dispatcher] drives a whole run and can be used with any
//! [Resolve](resolver::Resolve) and [Confirm](dispatch::Confirm)
//! implementation:
//!
//! ```no_run
//! use espefuse::{
//!     dispatch::{Dispatcher, Outcome, PendingAction},
//!     resolver::ChipResolver,
//! };
//!
//! let mut dispatcher = Dispatcher::new(ChipResolver, |_: &PendingAction| false);
//! let outcome = dispatcher
//!     .run_from(["espefuse", "--chip", "esp32c3", "--virt", "summary"])
//!     .unwrap();
//!
//! assert_eq!(outcome, Outcome::Succeeded);
//! ```

pub use self::{
    dispatch::{Dispatcher, Outcome},
    error::Error,
    session::{bind, EfuseSession, FieldValue},
    target::{Chip, ChipSelection},
};

pub mod backend;
pub mod coding;
pub mod command;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod operations;
pub mod resolver;
pub mod session;
pub mod target;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod logging;
