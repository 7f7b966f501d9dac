//! Cistern command-line harness
//!
//! ```bash
//! cistern soak --threads 16 --iterations 200 --capacity 4 --taint-every 7
//! cistern config
//! ```

mod soak;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cistern_resource::PoolConfig;

#[derive(Parser)]
#[command(name = "cistern")]
#[command(about = "Exercise and inspect Cistern resource pools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hammer a pool of simulated connections from several threads
    Soak(soak::SoakArgs),

    /// Print the effective pool configuration (environment + defaults)
    Config,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the JSON report.
    let _guard = cistern_log::auto_init().context("failed to initialize logging")?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Soak(args) => {
            let report = soak::run(&args)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.verify()
        }
        Commands::Config => {
            let config = PoolConfig::from_env();
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
