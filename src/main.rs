use clap::Parser;
use stsserver::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
