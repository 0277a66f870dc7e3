use anyhow::{Context, Result};
use rusqlite::{Row, params};

use super::{CrmDb, json_column, opt_json_column, opt_to_json, to_json};
use crate::crm::models::{Plugin, PluginInput};

const COLUMNS: &str = "id, nom, version, description, enabled, config, hooks, created_at, updated_at";

fn row_to_plugin(row: &Row<'_>) -> rusqlite::Result<Plugin> {
    Ok(Plugin {
        id: row.get(0)?,
        nom: row.get(1)?,
        version: row.get(2)?,
        description: row.get(3)?,
        enabled: row.get(4)?,
        config: opt_json_column(row, 5)?,
        hooks: json_column(row, 6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl CrmDb {
    pub fn create_plugin(&self, input: &PluginInput) -> Result<Plugin> {
        self.conn
            .execute(
                "INSERT INTO plugins (nom, version, description, enabled, config, hooks)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    input.nom,
                    input.version,
                    input.description,
                    input.enabled,
                    opt_to_json(input.config.as_ref())?,
                    to_json(&input.hooks)?,
                ],
            )
            .context("Failed to insert plugin")?;
        let id = self.conn.last_insert_rowid();
        self.get_plugin(id)?.context("Plugin not found after insert")
    }

    pub fn list_plugins(&self) -> Result<Vec<Plugin>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM plugins ORDER BY nom", COLUMNS))
            .context("Failed to prepare list_plugins")?;
        let rows = stmt
            .query_map([], row_to_plugin)
            .context("Failed to query plugins")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read plugin row")
    }

    pub fn get_plugin(&self, id: i64) -> Result<Option<Plugin>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM plugins WHERE id = ?1", COLUMNS))
            .context("Failed to prepare get_plugin")?;
        let mut rows = stmt
            .query_map(params![id], row_to_plugin)
            .context("Failed to query plugin")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read plugin row")?)),
            None => Ok(None),
        }
    }

    pub fn update_plugin(&self, id: i64, input: &PluginInput) -> Result<Option<Plugin>> {
        let count = self
            .conn
            .execute(
                "UPDATE plugins SET nom = ?1, version = ?2, description = ?3, enabled = ?4,
                     config = ?5, hooks = ?6, updated_at = datetime('now')
                 WHERE id = ?7",
                params![
                    input.nom,
                    input.version,
                    input.description,
                    input.enabled,
                    opt_to_json(input.config.as_ref())?,
                    to_json(&input.hooks)?,
                    id,
                ],
            )
            .context("Failed to update plugin")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_plugin(id)
    }

    pub fn delete_plugin(&self, id: i64) -> Result<bool> {
        self.delete_by_id("plugins", id, "Ce plugin est encore référencé")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plugin_config_round_trips_as_json() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let created = db.create_plugin(&PluginInput {
            nom: "export-excel".into(),
            version: "1.2.0".into(),
            description: None,
            enabled: true,
            config: Some(json!({"sheet": "Opportunités", "maxRows": 5000})),
            hooks: vec!["opportunite.updated".into()],
        })?;
        assert_eq!(created.config, Some(json!({"sheet": "Opportunités", "maxRows": 5000})));
        assert_eq!(created.hooks, vec!["opportunite.updated"]);

        let mut input = created.to_input();
        input.enabled = false;
        input.config = None;
        let updated = db.update_plugin(created.id, &input)?.expect("plugin");
        assert!(!updated.enabled);
        assert!(updated.config.is_none());

        assert!(db.delete_plugin(created.id)?);
        assert!(db.list_plugins()?.is_empty());
        Ok(())
    }
}
