//! Command-line interface for rangefetch
//!
//! Thin shell over the library: argument parsing, logging setup, terminal
//! progress and the post-download digest. Kept out of the library's public
//! re-exports so embedders never pull CLI dependencies.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::Cli;
pub use commands::handle_download;
pub use progress::ProgressDisplay;
