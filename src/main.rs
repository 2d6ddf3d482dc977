use std::process::ExitCode;

use clap::Parser;
use cutoutfe::{cli, logger};

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Initialize session log (overwrites previous session log)
    logger::set_verbose(args.verbose);
    logger::init();

    cli::run(args)
}
