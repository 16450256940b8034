//! Named operations on the eFuses of a chip
//!
//! Every chip has one [OperationRegistry] holding the operations it supports.
//! The registry adds one sub-command per operation to the command surface and
//! maps the name of the parsed sub-command back to the operation to run.

use std::collections::HashSet;

use clap::{builder::PossibleValuesParser, ArgMatches, Command};

use crate::{
    error::Error,
    session::EfuseSession,
    target::{
        efuse::{EfuseField, EfuseLayout},
        Chip,
    },
};

mod burn;
mod keys;
mod read;

pub(crate) mod parse;

/// Adds the arguments of an operation to its sub-command
pub type ArgsFn = fn(Command, &EfuseLayout) -> Command;
/// Runs an operation against a session
pub type RunFn = fn(&mut EfuseSession<'_>, &ArgMatches) -> Result<(), Error>;

/// A named operation
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    /// Name of the sub-command
    pub name: &'static str,
    /// One line description shown in the help
    pub about: &'static str,
    /// Whether running the operation burns eFuses
    pub destructive: bool,
    pub args: ArgsFn,
    pub run: RunFn,
}

impl Operation {
    /// The sub-command of this operation
    pub fn command(&self, layout: &EfuseLayout) -> Command {
        (self.args)(Command::new(self.name).about(self.about), layout)
    }
}

/// The operations supported by one chip
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    operations: Vec<Operation>,
}

impl OperationRegistry {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    /// The operations supported by `chip`
    pub fn for_chip(chip: Chip) -> Self {
        let mut operations = vec![
            read::SUMMARY,
            read::DUMP,
            burn::BURN_EFUSE,
            burn::READ_PROTECT_EFUSE,
            burn::WRITE_PROTECT_EFUSE,
            burn::BURN_BLOCK_DATA,
            burn::BURN_BIT,
        ];

        operations.push(match chip {
            Chip::Esp32 => keys::BURN_KEY_ESP32,
            Chip::Esp32s2
            | Chip::Esp32s3beta2
            | Chip::Esp32s3
            | Chip::Esp32c3
            | Chip::Esp32h2 => keys::BURN_KEY,
        });

        if chip.efuse_layout().flash_voltage.is_some() {
            operations.push(burn::SET_FLASH_VOLTAGE);
        }

        Self::new(operations)
    }

    /// Register one sub-command per operation on `surface`
    pub fn add_commands(
        &self,
        surface: Command,
        session: &EfuseSession<'_>,
    ) -> Result<Command, Error> {
        let mut names = HashSet::new();
        let mut surface = surface;

        for operation in &self.operations {
            if !names.insert(operation.name) {
                return Err(Error::DuplicateOperation(operation.name.to_owned()));
            }

            surface = surface.subcommand(operation.command(session.layout()));
        }

        Ok(surface)
    }

    /// The operation registered under `name`
    pub fn lookup(&self, name: &str) -> Result<&Operation, Error> {
        self.operations
            .iter()
            .find(|op| op.name == name)
            .ok_or_else(|| Error::UnknownOperation(name.to_owned()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.operations.iter().map(|op| op.name)
    }
}

/// Arguments of operations which take none
fn no_args(command: Command, _layout: &EfuseLayout) -> Command {
    command
}

/// Parser accepting the field names of `layout`
fn field_names(layout: &EfuseLayout) -> PossibleValuesParser {
    PossibleValuesParser::new(layout.field_names())
}

/// Parser accepting the names of the fields of `layout` which can be protected
/// through `bit`
fn protectable_field_names(
    layout: &EfuseLayout,
    bit: fn(&EfuseLayout, &EfuseField) -> Option<u8>,
) -> PossibleValuesParser {
    PossibleValuesParser::new(
        layout
            .fields
            .iter()
            .filter(|field| bit(layout, field).is_some())
            .map(|field| field.name)
            .collect::<Vec<_>>(),
    )
}

/// Parser accepting block names and aliases of `layout`
fn block_names(layout: &EfuseLayout) -> PossibleValuesParser {
    PossibleValuesParser::new(
        layout
            .blocks
            .iter()
            .flat_map(|block| std::iter::once(block.name).chain(block.aliases.iter().copied())),
    )
}
