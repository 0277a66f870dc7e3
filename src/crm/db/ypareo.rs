use anyhow::{Context, Result};
use rusqlite::{Row, params};

use super::CrmDb;
use crate::crm::models::{YpareoConfig, YpareoConfigInput};

const COLUMNS: &str = "id, api_url, api_key, sync_frequency, sync_mode, enabled, last_sync, created_at, updated_at";

fn row_to_ypareo_config(row: &Row<'_>) -> rusqlite::Result<YpareoConfig> {
    Ok(YpareoConfig {
        id: row.get(0)?,
        api_url: row.get(1)?,
        api_key: row.get(2)?,
        sync_frequency: row.get(3)?,
        sync_mode: row.get(4)?,
        enabled: row.get(5)?,
        last_sync: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl CrmDb {
    pub fn create_ypareo_config(&self, input: &YpareoConfigInput) -> Result<YpareoConfig> {
        self.conn
            .execute(
                "INSERT INTO ypareo_configs (api_url, api_key, sync_frequency, sync_mode, enabled, last_sync)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    input.api_url,
                    input.api_key,
                    input.sync_frequency,
                    input.sync_mode,
                    input.enabled,
                    input.last_sync,
                ],
            )
            .context("Failed to insert Ypareo configuration")?;
        let id = self.conn.last_insert_rowid();
        self.get_ypareo_config(id)?
            .context("Ypareo configuration not found after insert")
    }

    pub fn list_ypareo_configs(&self) -> Result<Vec<YpareoConfig>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM ypareo_configs ORDER BY id", COLUMNS))
            .context("Failed to prepare list_ypareo_configs")?;
        let rows = stmt
            .query_map([], row_to_ypareo_config)
            .context("Failed to query Ypareo configurations")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read Ypareo configuration row")
    }

    pub fn get_ypareo_config(&self, id: i64) -> Result<Option<YpareoConfig>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM ypareo_configs WHERE id = ?1", COLUMNS))
            .context("Failed to prepare get_ypareo_config")?;
        let mut rows = stmt
            .query_map(params![id], row_to_ypareo_config)
            .context("Failed to query Ypareo configuration")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read Ypareo configuration row")?)),
            None => Ok(None),
        }
    }

    pub fn update_ypareo_config(
        &self,
        id: i64,
        input: &YpareoConfigInput,
    ) -> Result<Option<YpareoConfig>> {
        let count = self
            .conn
            .execute(
                "UPDATE ypareo_configs SET api_url = ?1, api_key = ?2, sync_frequency = ?3,
                     sync_mode = ?4, enabled = ?5, last_sync = ?6, updated_at = datetime('now')
                 WHERE id = ?7",
                params![
                    input.api_url,
                    input.api_key,
                    input.sync_frequency,
                    input.sync_mode,
                    input.enabled,
                    input.last_sync,
                    id,
                ],
            )
            .context("Failed to update Ypareo configuration")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_ypareo_config(id)
    }

    pub fn delete_ypareo_config(&self, id: i64) -> Result<bool> {
        self.delete_by_id("ypareo_configs", id, "Cette configuration est encore référencée")
    }
}
