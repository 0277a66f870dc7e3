//! Configuration view and validation commands: `afpi-crm config`.

use anyhow::{Context, Result};

use super::super::ConfigCommands;
use afpi_crm::config::{CrmConfig, DEFAULT_CONFIG_FILE};
use afpi_crm::crm::auth::TokenIssuer;

const MASK: &str = "********";

pub fn cmd_config(config: &CrmConfig, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let mut shown = config.clone();
            if shown.auth.jwt_secret.is_some() {
                shown.auth.jwt_secret = Some(MASK.to_string());
            }
            shown.seed.admin_password = MASK.to_string();

            println!("Effective configuration (file, then environment):");
            println!();
            print!(
                "{}",
                toml::to_string_pretty(&shown).context("Failed to serialize configuration")?
            );
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }

            // Settings the server cannot start with.
            let secret = config.jwt_secret()?;
            TokenIssuer::from_secret(&secret, config.auth.token_ttl_minutes)
                .context("Invalid auth settings")?;
        }
        Some(ConfigCommands::Init) => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            let path = cwd.join(DEFAULT_CONFIG_FILE);
            if path.exists() {
                println!("{} already exists at {}", DEFAULT_CONFIG_FILE, path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            CrmConfig::default().save(&path)?;
            println!("Created {} at {}", DEFAULT_CONFIG_FILE, path.display());
        }
    }

    Ok(())
}
