//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::planner::LifecycleParam;

/// Declarative reconciliation of Google Cloud Dataproc resources.
#[derive(Parser, Debug)]
#[command(name = "dataproc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the client configuration file.
    #[arg(short, long, global = true, env = "DATAPROC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a manifest without calling the API.
    Validate {
        /// Manifest file (defaults to dataproc.yaml in this or a parent directory).
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Show what apply would change.
    Plan {
        /// Manifest file.
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Lifecycle constraints.
        #[command(flatten)]
        lifecycle: LifecycleArgs,

        /// Ignore recorded state and fetch every resource.
        #[arg(long)]
        refresh: bool,
    },

    /// Converge every resource in a manifest.
    Apply {
        /// Manifest file.
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Lifecycle constraints.
        #[command(flatten)]
        lifecycle: LifecycleArgs,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Ignore recorded state and fetch every resource.
        #[arg(long)]
        refresh: bool,
    },

    /// Show one resource as the API reports it.
    Get {
        /// Resource to fetch.
        #[command(flatten)]
        target: ResourceArgs,
    },

    /// List resources of a kind.
    List {
        /// Resource kind.
        #[arg(short, long)]
        kind: String,

        /// Project.
        #[arg(short, long, env = "DATAPROC_PROJECT")]
        project: String,

        /// Location or region.
        #[arg(short, long, env = "DATAPROC_LOCATION")]
        location: String,
    },

    /// Delete resources.
    Delete {
        /// Resource to delete.
        #[command(flatten)]
        target: ResourceArgs,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete every resource of a kind whose name starts with a prefix.
    DeleteAll {
        /// Resource kind.
        #[arg(short, long)]
        kind: String,

        /// Project.
        #[arg(short, long, env = "DATAPROC_PROJECT")]
        project: String,

        /// Location or region.
        #[arg(short, long, env = "DATAPROC_LOCATION")]
        location: String,

        /// Only delete resources whose name starts with this prefix.
        #[arg(long, default_value = "")]
        prefix: String,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage recorded state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// Identifies a single resource.
#[derive(Args, Debug, Clone)]
pub struct ResourceArgs {
    /// Resource kind.
    #[arg(short, long)]
    pub kind: String,

    /// Resource name.
    #[arg(short, long)]
    pub name: String,

    /// Project.
    #[arg(short, long, env = "DATAPROC_PROJECT")]
    pub project: String,

    /// Location or region.
    #[arg(short, long, env = "DATAPROC_LOCATION")]
    pub location: String,
}

/// Lifecycle constraint flags.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct LifecycleArgs {
    /// Fail instead of creating missing resources.
    #[arg(long)]
    pub block_creation: bool,

    /// Fail instead of taking over existing resources not in recorded state.
    #[arg(long)]
    pub block_acquire: bool,

    /// Fail instead of changing existing resources.
    #[arg(long)]
    pub block_modification: bool,
}

impl LifecycleArgs {
    /// The selected lifecycle parameters.
    #[must_use]
    pub fn params(self) -> Vec<LifecycleParam> {
        [
            (self.block_creation, LifecycleParam::BlockCreation),
            (self.block_acquire, LifecycleParam::BlockAcquire),
            (self.block_modification, LifecycleParam::BlockModification),
        ]
        .into_iter()
        .filter_map(|(set, param)| set.then_some(param))
        .collect()
    }
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show recorded state.
    Show,

    /// Forget recorded state.
    Clear {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::try_parse_from([
            "dataproc",
            "apply",
            "--file",
            "dataproc.yaml",
            "--block-creation",
            "--block-modification",
            "-y",
        ])
        .unwrap();
        let Commands::Apply { lifecycle, yes, .. } = cli.command else {
            panic!("expected apply");
        };
        assert!(yes);
        assert_eq!(
            lifecycle.params(),
            vec![LifecycleParam::BlockCreation, LifecycleParam::BlockModification]
        );
    }

    #[test]
    fn test_get_arguments() {
        let cli = Cli::try_parse_from([
            "dataproc", "--output", "json", "get", "--kind", "Cluster", "--name", "c1", "--project", "p",
            "--location", "us-central1",
        ])
        .unwrap();
        assert!(matches!(cli.output, OutputFormat::Json));
        let Commands::Get { target } = cli.command else {
            panic!("expected get");
        };
        assert_eq!(target.name, "c1");
    }
}
