//! Running one operation from the command line
//!
//! A run goes through the same steps every time: the global options are
//! parsed, a backend is resolved and bound to the layout of its chip, the
//! command surface is built from the chip's operations, and the requested
//! operation is confirmed and invoked. The backend is closed exactly once at
//! the end, whatever happened in between.

use std::{ffi::OsString, path::PathBuf};

use clap::{error::ErrorKind, Args, Command, Parser};
#[cfg(test)]
use clap::CommandFactory;
use log::{debug, info, warn};

use crate::{
    backend::EfuseBackend,
    connection::reset::ResetBeforeOperation,
    error::Error,
    operations::parse::parse_u32,
    resolver::{ConnectionParams, Resolve, ResolveRequest, DEFAULT_BAUD},
    session::bind,
    target::{Chip, ChipSelection},
};

/// Options shared by every operation.
///
/// These must be given before the name of the operation.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Target chip type
    #[arg(
        short = 'c',
        long,
        env = "ESPTOOL_CHIP",
        default_value = "auto",
        value_enum,
        ignore_case = true
    )]
    pub chip: ChipSelection,
    /// Serial port baud rate used when communicating with the device
    #[arg(short = 'b', long, env = "ESPTOOL_BAUD", value_parser = parse_u32)]
    pub baud: Option<u32>,
    /// Serial port connected to the device
    #[arg(short = 'p', long, env = "ESPTOOL_PORT")]
    pub port: Option<String>,
    /// Reset mode used before connecting to the device
    #[arg(long, default_value = "default-reset", value_enum)]
    pub before: ResetBeforeOperation,
    /// Show every register access
    #[arg(short = 'd', long)]
    pub debug: bool,
    /// Work on an emulated chip instead of a connected device
    #[arg(long)]
    pub virt: bool,
    /// File holding the eFuses of the emulated chip
    #[arg(long, value_name = "PATH", requires = "virt")]
    pub path_efuse_file: Option<PathBuf>,
    /// Burn eFuses without asking for confirmation
    #[arg(long)]
    pub do_not_confirm: bool,
}

#[derive(Debug, Parser)]
#[command(name = "espefuse", disable_help_flag = true, disable_version_flag = true)]
struct GlobalCli {
    #[command(flatten)]
    globals: GlobalArgs,
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

/// Flags which only print information about the command surface
const HELP_FLAGS: &[&str] = &["-h", "--help", "-V", "--version"];

/// One parsed command line
#[derive(Debug, Clone)]
pub struct Invocation {
    pub globals: GlobalArgs,
    /// The operation and its arguments
    pub rest: Vec<String>,
    help: bool,
    args: Vec<OsString>,
}

impl Invocation {
    /// Parse the global options of a command line, including the program
    /// name.
    ///
    /// Everything from the operation name onwards is kept for parsing against
    /// the operations of the chip.
    pub fn parse_from<I, T>(args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args = args.into_iter().map(Into::into).collect::<Vec<OsString>>();
        let is_help = |arg: &OsString| HELP_FLAGS.iter().any(|flag| arg == flag);
        let help = args.iter().skip(1).any(is_help);

        let cli = GlobalCli::try_parse_from(
            args.iter()
                .enumerate()
                .filter(|(i, arg)| *i == 0 || !is_help(*arg))
                .map(|(_, arg)| arg.clone()),
        )?;

        Ok(Self {
            globals: cli.globals,
            rest: cli.rest,
            help,
            args,
        })
    }

    /// Whether only the command surface is needed
    pub fn skip_connect(&self) -> bool {
        self.help || self.rest.is_empty()
    }

    /// Whether register accesses are logged
    pub fn debug(&self) -> bool {
        self.globals.debug || self.rest.iter().any(|arg| arg == "dump")
    }

    /// The name of the requested operation
    pub fn operation(&self) -> Option<&str> {
        self.rest
            .iter()
            .find(|arg| !arg.starts_with('-'))
            .map(String::as_str)
    }

    pub fn request(&self) -> ResolveRequest {
        ResolveRequest {
            selection: self.globals.chip,
            connection: ConnectionParams {
                port: self.globals.port.clone(),
                baud: self.globals.baud.unwrap_or(DEFAULT_BAUD),
                before: self.globals.before,
                debug: self.debug(),
            },
            emulate: self.globals.virt,
            efuse_file: self.globals.path_efuse_file.clone(),
            skip_connect: self.skip_connect(),
        }
    }
}

/// The command surface before any operation is added
pub fn base_command() -> Command {
    // `augment_args` replaces the about text with the docs of `GlobalArgs`
    GlobalArgs::augment_args(
        Command::new("espefuse")
            .version(env!("CARGO_PKG_VERSION"))
            .subcommand_value_name("OPERATION")
            .subcommand_help_heading("Operations"),
    )
    .about("Read and burn the eFuses of Espressif devices")
    .long_about(None)
}

/// An irreversible operation waiting for confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub chip: Chip,
    pub operation: String,
    pub arguments: Vec<String>,
}

/// Asks whether an irreversible operation may proceed
pub trait Confirm {
    fn confirm(&mut self, action: &PendingAction) -> Result<bool, Error>;
}

impl<F> Confirm for F
where
    F: FnMut(&PendingAction) -> bool,
{
    fn confirm(&mut self, action: &PendingAction) -> Result<bool, Error> {
        Ok(self(action))
    }
}

/// How a run ended, unless it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation ran to completion
    Succeeded,
    HelpDisplayed,
    /// No operation was given, the help was printed instead
    NoOperation,
    /// Confirmation of an irreversible operation was declined
    Aborted,
}

impl Outcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Succeeded | Outcome::HelpDisplayed => 0,
            Outcome::NoOperation | Outcome::Aborted => 1,
        }
    }
}

/// Exit code of a run which failed with an error
pub const FATAL_EXIT_CODE: u8 = 2;

/// Drives one invocation from parsed options to the release of the backend
pub struct Dispatcher<R, C> {
    resolver: R,
    confirm: C,
}

impl<R, C> Dispatcher<R, C>
where
    R: Resolve,
    C: Confirm,
{
    pub fn new(resolver: R, confirm: C) -> Self {
        Self { resolver, confirm }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Parse `args` and run the requested operation
    pub fn run_from<I, T>(&mut self, args: I) -> Result<Outcome, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        self.run(&Invocation::parse_from(args)?)
    }

    /// Run the operation requested by `invocation`
    pub fn run(&mut self, invocation: &Invocation) -> Result<Outcome, Error> {
        let request = invocation.request();
        debug!("Resolving {request:?}");

        let mut backend = self.resolver.resolve(&request)?;
        let result = self.dispatch(backend.as_mut(), invocation);

        match (result, backend.close()) {
            (Err(e), Err(close)) => {
                warn!("Failed to release the device: {close}");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(close)) => Err(close),
            (Ok(outcome), Ok(())) => Ok(outcome),
        }
    }

    fn dispatch(
        &mut self,
        backend: &mut dyn EfuseBackend,
        invocation: &Invocation,
    ) -> Result<Outcome, Error> {
        let (mut session, registry) = bind(
            backend,
            invocation.skip_connect(),
            invocation.debug(),
            invocation.globals.do_not_confirm,
        )?;

        let mut surface = registry.add_commands(base_command(), &session)?;

        let matches = match surface.try_get_matches_from_mut(&invocation.args) {
            Ok(matches) => matches,
            Err(e) => match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    e.print()?;
                    return Ok(Outcome::HelpDisplayed);
                }
                ErrorKind::InvalidSubcommand => {
                    let name = invocation.operation().unwrap_or_default();
                    return Err(Error::UnknownOperation(name.to_owned()));
                }
                _ => return Err(e.into()),
            },
        };

        let Some((name, sub_matches)) = matches.subcommand() else {
            surface.print_help()?;
            println!();
            return Ok(Outcome::NoOperation);
        };

        let operation = *registry.lookup(name)?;

        if operation.destructive && !session.do_not_confirm() {
            let action = PendingAction {
                chip: session.chip(),
                operation: operation.name.to_owned(),
                arguments: invocation.rest.iter().skip(1).cloned().collect(),
            };

            if !self.confirm.confirm(&action)? {
                info!("Aborted, no eFuses were burned");
                return Ok(Outcome::Aborted);
            }
        }

        (operation.run)(&mut session, sub_matches)?;

        Ok(Outcome::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn globals_are_split_from_the_operation() {
        let invocation = Invocation::parse_from([
            "espefuse",
            "--chip",
            "esp32c3",
            "--virt",
            "burn-efuse",
            "--foo",
            "DIS_PAD_JTAG",
            "1",
        ])
        .unwrap();

        assert_eq!(invocation.globals.chip, ChipSelection::Chip(Chip::Esp32c3));
        assert!(invocation.globals.virt);
        assert_eq!(
            invocation.rest,
            vec!["burn-efuse", "--foo", "DIS_PAD_JTAG", "1"]
        );
        assert_eq!(invocation.operation(), Some("burn-efuse"));
        assert!(!invocation.skip_connect());
    }

    #[test]
    fn help_and_empty_commands_skip_connecting() {
        let invocation = Invocation::parse_from(["espefuse", "--chip", "esp32"]).unwrap();
        assert!(invocation.skip_connect());

        let invocation = Invocation::parse_from(["espefuse", "summary", "--help"]).unwrap();
        assert!(invocation.skip_connect());
        assert_eq!(invocation.rest, vec!["summary"]);

        let invocation = Invocation::parse_from(["espefuse", "-h"]).unwrap();
        assert!(invocation.skip_connect());

        let invocation = Invocation::parse_from(["espefuse", "--version"]).unwrap();
        assert!(invocation.skip_connect());
    }

    #[test]
    fn dump_enables_debug() {
        let invocation = Invocation::parse_from(["espefuse", "dump"]).unwrap();
        assert!(invocation.debug());
        assert!(invocation.request().connection.debug);

        let invocation = Invocation::parse_from(["espefuse", "summary"]).unwrap();
        assert!(!invocation.debug());
    }

    #[test]
    fn request_carries_the_globals() {
        let invocation = Invocation::parse_from([
            "espefuse",
            "-c",
            "ESP32H2",
            "-b",
            "0x1c200",
            "-p",
            "/dev/ttyUSB1",
            "--before",
            "no_reset",
            "summary",
        ])
        .unwrap();

        let request = invocation.request();
        assert_eq!(request.selection, ChipSelection::Chip(Chip::Esp32h2));
        assert_eq!(request.connection.baud, 115_200);
        assert_eq!(request.connection.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(request.connection.before, ResetBeforeOperation::NoReset);
        assert!(!request.emulate);
    }

    #[test]
    fn efuse_file_requires_emulation() {
        assert!(matches!(
            Invocation::parse_from(["espefuse", "--path-efuse-file", "efuses.bin", "summary"]),
            Err(Error::Cli(_))
        ));
    }

    #[test]
    fn exit_codes() {
        assert_eq!(Outcome::Succeeded.exit_code(), 0);
        assert_eq!(Outcome::HelpDisplayed.exit_code(), 0);
        assert_eq!(Outcome::NoOperation.exit_code(), 1);
        assert_eq!(Outcome::Aborted.exit_code(), 1);
    }

    #[test]
    fn help_describes_the_tool() {
        let mut command = base_command();
        let help = command.render_help().to_string();

        assert!(help.starts_with("Read and burn the eFuses of Espressif devices"));
        assert!(!help.contains("Options shared by every operation"));
    }

    #[test]
    fn surfaces_are_valid() {
        base_command().debug_assert();
        GlobalCli::command().debug_assert();
    }
}
