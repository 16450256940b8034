//! Pieces of the command line application which interact with the user
//!
//! Selecting a serial port, loading the configuration file and confirming
//! irreversible operations all need a terminal, and are only available with
//! the `cli` feature.

use crossterm::style::Stylize;
use dialoguer::{theme::ColorfulTheme, Input};

use self::config::Config;
use crate::{
    dispatch::{Confirm, Invocation, PendingAction},
    error::Error,
};

pub mod config;
pub mod serial;

/// The word which has to be typed to confirm burning
const CONFIRMATION: &str = "BURN";

/// Fill the connection options not given on the command line from `config`.
///
/// The serial port is only selected when a device will actually be
/// connected.
pub fn apply_config(invocation: &mut Invocation, config: &Config) -> Result<(), Error> {
    if invocation.globals.baud.is_none() {
        invocation.globals.baud = config.baudrate;
    }

    if invocation.globals.virt || invocation.skip_connect() {
        return Ok(());
    }

    let port = serial::serial_port_name(invocation.globals.port.as_deref(), config)?;
    invocation.globals.port = Some(port);

    Ok(())
}

/// Asks for confirmation on the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&mut self, action: &PendingAction) -> Result<bool, Error> {
        println!(
            "\n{} {} on the {}",
            action.operation.as_str().bold(),
            action.arguments.join(" "),
            action.chip.name()
        );
        println!("{}", "This is an irreversible operation!".red().bold());

        let input = Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Type '{CONFIRMATION}' (all capitals) to continue"))
            .allow_empty(true)
            .interact_text()?;

        Ok(input.trim() == CONFIRMATION)
    }
}
