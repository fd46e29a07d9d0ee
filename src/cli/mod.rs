//! Command-line interface.
//!
//! Argument definitions live in `commands`, presentation in `output`.

mod commands;
mod output;

pub use commands::{Cli, Commands, LifecycleArgs, OutputFormat, ResourceArgs, StateCommands};
pub use output::{OutputFormatter, ResourceSummary};
