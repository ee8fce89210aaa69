//! rangefetch CLI application
//!
//! Downloads one URL to a local file with resumable, range-partitioned
//! connections. Exit codes: 0 on success, -2 on argument errors, 1 on any
//! download failure.

use std::process;

use clap::error::ErrorKind as ClapErrorKind;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use rangefetch::cli::{handle_download, Cli};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let code = match error.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => 0,
                _ => -2,
            };
            let _ = error.print();
            process::exit(code);
        }
    };

    init_logging(&cli);

    if let Err(error) = handle_download(cli).await {
        eprintln!("Download failed: {error} ({})", error.kind());
        process::exit(1);
    }
}

/// Route crate logs to stderr; quiet by default so the progress bar owns the
/// terminal, chatty with --debug.
fn init_logging(cli: &Cli) {
    let level = if cli.debug { "debug" } else { "warn" };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("rangefetch={level}").parse().unwrap());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
