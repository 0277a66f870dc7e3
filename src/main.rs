use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use afpi_crm::config::CrmConfig;
use afpi_crm::logging;

mod cmd;

#[derive(Parser)]
#[command(name = "afpi-crm")]
#[command(version, about = "REST back-end for the AFPI training CRM")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file. Defaults to ./crm.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// SQLite database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Seed reference data and the admin account before serving
        #[arg(long)]
        seed: bool,
    },
    /// Seed permissions, roles, localisations and the admin account
    Seed {
        /// SQLite database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Create the database schema without seeding
    InitDb {
        /// SQLite database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default crm.toml in the current directory
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CrmConfig::resolve(cli.config.as_deref())?;
    let _log_guard = logging::init(&config.log, cli.verbose)?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            seed,
        } => cmd::cmd_serve(&config, port, host, db_path, seed).await?,
        Commands::Seed { db_path } => cmd::cmd_seed(&config, db_path)?,
        Commands::InitDb { db_path } => cmd::cmd_init_db(&config, db_path)?,
        Commands::Config { command } => cmd::cmd_config(&config, command)?,
    }

    Ok(())
}
