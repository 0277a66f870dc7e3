//! Database setup commands: `afpi-crm init-db` and `afpi-crm seed`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use afpi_crm::config::CrmConfig;
use afpi_crm::crm::db::CrmDb;
use afpi_crm::crm::seed;

/// Open the database at `path`, creating its directory and schema as needed.
fn open_db(path: &Path) -> Result<CrmDb> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    CrmDb::new(path).with_context(|| format!("Failed to open database {}", path.display()))
}

pub fn cmd_init_db(config: &CrmConfig, db_path: Option<PathBuf>) -> Result<()> {
    let path = db_path.unwrap_or_else(|| config.database.path.clone());
    open_db(&path)?;
    println!("Database initialized at {}", path.display());
    Ok(())
}

pub fn cmd_seed(config: &CrmConfig, db_path: Option<PathBuf>) -> Result<()> {
    let path = db_path.unwrap_or_else(|| config.database.path.clone());
    let db = open_db(&path)?;
    let report = seed::seed_all(&db, &config.seed)?;

    println!("Seeded {}", path.display());
    println!("  {}", report);
    if report.admin_created {
        println!("  Admin account: {}", config.seed.admin_email);
    }
    Ok(())
}
