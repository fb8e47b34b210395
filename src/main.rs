mod cli;
mod config;
mod confirm;
mod edit;
mod target;
mod tracker;
mod workflow;

use std::{io, process};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use workflow::EXIT_CONFIG;

fn main() {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and are not failures.
            let code = if e.use_stderr() { EXIT_CONFIG } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    if let Err(e) = cli::run(&cli) {
        eprintln!("{e}");
        process::exit(e.exit_code());
    }
}

/// Log to stderr so stdout only carries the prompt and recovered text.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("JIRAE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
