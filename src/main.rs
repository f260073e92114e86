use clap::Parser;
use nexus_forecast::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
