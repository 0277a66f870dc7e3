use anyhow::{Context, Result};
use rusqlite::{Row, params};

use super::CrmDb;
use crate::crm::models::{Objectif, ObjectifInput};

const COLUMNS: &str = "id, titre, description, type_objectif, periodicite, cible, realise, unite, \
                       date_debut, date_fin, actif, user_id, localisation_id, created_at, updated_at";

fn row_to_objectif(row: &Row<'_>) -> rusqlite::Result<Objectif> {
    Ok(Objectif {
        id: row.get(0)?,
        titre: row.get(1)?,
        description: row.get(2)?,
        type_objectif: row.get(3)?,
        periodicite: row.get(4)?,
        cible: row.get(5)?,
        realise: row.get(6)?,
        unite: row.get(7)?,
        date_debut: row.get(8)?,
        date_fin: row.get(9)?,
        actif: row.get(10)?,
        user_id: row.get(11)?,
        localisation_id: row.get(12)?,
        taux_realisation: 0.0,
        progression: String::new(),
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    }
    .with_progress())
}

impl CrmDb {
    // ── Objectif CRUD ─────────────────────────────────────────────────

    pub fn create_objectif(&self, input: &ObjectifInput) -> Result<Objectif> {
        self.conn
            .execute(
                "INSERT INTO objectifs (titre, description, type_objectif, periodicite, cible, realise,
                     unite, date_debut, date_fin, actif, user_id, localisation_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    input.titre,
                    input.description,
                    input.type_objectif,
                    input.periodicite,
                    input.cible,
                    input.realise,
                    input.unite,
                    input.date_debut,
                    input.date_fin,
                    input.actif,
                    input.user_id,
                    input.localisation_id,
                ],
            )
            .context("Failed to insert objectif")?;
        let id = self.conn.last_insert_rowid();
        self.get_objectif(id)?.context("Objectif not found after insert")
    }

    pub fn list_objectifs(&self) -> Result<Vec<Objectif>> {
        self.query_objectifs("1 = 1")
    }

    /// Active objectifs only; these drive the dashboard targets.
    pub fn list_active_objectifs(&self) -> Result<Vec<Objectif>> {
        self.query_objectifs("actif = 1")
    }

    fn query_objectifs(&self, condition: &str) -> Result<Vec<Objectif>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM objectifs WHERE {} ORDER BY date_debut DESC, id",
                COLUMNS, condition
            ))
            .context("Failed to prepare objectifs query")?;
        let rows = stmt
            .query_map([], row_to_objectif)
            .context("Failed to query objectifs")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read objectif row")
    }

    pub fn get_objectif(&self, id: i64) -> Result<Option<Objectif>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM objectifs WHERE id = ?1", COLUMNS))
            .context("Failed to prepare get_objectif")?;
        let mut rows = stmt
            .query_map(params![id], row_to_objectif)
            .context("Failed to query objectif")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read objectif row")?)),
            None => Ok(None),
        }
    }

    pub fn update_objectif(&self, id: i64, input: &ObjectifInput) -> Result<Option<Objectif>> {
        let count = self
            .conn
            .execute(
                "UPDATE objectifs SET titre = ?1, description = ?2, type_objectif = ?3,
                     periodicite = ?4, cible = ?5, realise = ?6, unite = ?7, date_debut = ?8,
                     date_fin = ?9, actif = ?10, user_id = ?11, localisation_id = ?12,
                     updated_at = datetime('now')
                 WHERE id = ?13",
                params![
                    input.titre,
                    input.description,
                    input.type_objectif,
                    input.periodicite,
                    input.cible,
                    input.realise,
                    input.unite,
                    input.date_debut,
                    input.date_fin,
                    input.actif,
                    input.user_id,
                    input.localisation_id,
                    id,
                ],
            )
            .context("Failed to update objectif")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_objectif(id)
    }

    pub fn delete_objectif(&self, id: i64) -> Result<bool> {
        self.delete_by_id("objectifs", id, "Cet objectif est encore référencé")
    }
}
