//! Stat Studio - Main Entry Point
//!
//! Statistical analysis server and CLI.

use clap::Parser;
use stat_studio::cli::{cmd_analyze, cmd_info, cmd_serve, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stat_studio=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, registry_capacity } => {
            cmd_serve(host, port, registry_capacity).await?;
        }
        Commands::Analyze { data, family, config } => {
            cmd_analyze(&data, &family, &config)?;
        }
        Commands::Info { data } => {
            cmd_info(data.as_deref())?;
        }
    }

    Ok(())
}
