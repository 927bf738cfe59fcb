//! `kimp` binary: runs the arbitrage engine against a TOML config.

mod engine;
mod fx_source;
mod observer;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kimp_core::config::AppConfig;

#[derive(Parser)]
#[command(name = "kimp", about = "Cross-venue KRW/USDT arbitrage engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the live engine.
    Run {
        /// Path to the TOML configuration file.
        #[arg(short, long, default_value = "config/kimp.toml")]
        config: String,
        /// Plan and log opportunities without placing orders.
        #[arg(long)]
        dry_run: bool,
        /// Directory for CSV/JSON observability artifacts.
        #[arg(long, default_value = "data")]
        out_dir: String,
    },
    /// Parse and validate a configuration file.
    CheckConfig {
        #[arg(short, long, default_value = "config/kimp.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run {
            config,
            dry_run,
            out_dir,
        } => {
            let config = AppConfig::load(&config)?;
            engine::run(config, dry_run, &out_dir).await
        }
        Command::CheckConfig { config } => {
            let config = AppConfig::load(&config)?;
            config.validate()?;
            kimp_core::fees::validate()?;
            for venue in kimp_core::Venue::ALL {
                let vc = config.venue(venue);
                println!(
                    "{venue}: enabled={} ws={} codes={:?}",
                    vc.enabled,
                    vc.ws_url,
                    config.codes_for(venue)
                );
            }
            println!(
                "symbols: {} primary, {} secondary",
                config.primary_symbols().len(),
                config.secondary_symbols().len()
            );
            Ok(())
        }
    }
}
