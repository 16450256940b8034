use std::process::ExitCode;

use espefuse::{
    cli::{apply_config, config::Config, TerminalConfirm},
    dispatch::{Dispatcher, Invocation, Outcome, FATAL_EXIT_CODE},
    logging::initialize_logger,
    resolver::ChipResolver,
    Error,
};
use log::{debug, LevelFilter};

fn main() -> ExitCode {
    miette::set_panic_hook();

    match run() {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            eprintln!("\nA fatal error occurred: {e}");
            eprintln!("{:?}", miette::Report::new(e));
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}

fn run() -> Result<Outcome, Error> {
    let mut invocation = Invocation::parse_from(std::env::args_os())?;

    initialize_logger(if invocation.debug() {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    debug!("{invocation:#?}");

    // Load any user configuration, if present
    let config = Config::load()?;
    apply_config(&mut invocation, &config)?;

    Dispatcher::new(ChipResolver, TerminalConfirm).run(&invocation)
}
