//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing and subcommand handlers.

mod args;
mod commands;

pub use args::{Args, Command, ConfigAction, RecordArgs};
pub use commands::{
    ctrlc_received, handle_config_action, list_monitors, record, recording_size, screenshot,
    setup_ctrlc_handler, CliError,
};
