use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dsm_registrar::commands;
use dsm_registrar::{Cli, Commands};

fn main() -> Result<()> {
    // Log levels come from RUST_LOG, e.g. RUST_LOG=dsm_registrar=debug
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Check(args) => commands::check::run(args),
        Commands::Schema => commands::schema::run(),
    }
}
