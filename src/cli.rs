//! CLI argument definitions for dsm-host.

use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Debug, Parser)]
#[command(name = "dsm-host")]
#[command(about = "Host D-Bus services whose backends live in plugin libraries")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Host services until interrupted
    ///
    /// Loads every policy in the policy directory, exposes each service on
    /// its bus and registers its backend. Ctrl+C unregisters and exits.
    Run(commands::run::RunArgs),

    /// Validate policy files
    Check(commands::check::CheckArgs),

    /// Print the JSON schema of a policy file
    Schema,
}
