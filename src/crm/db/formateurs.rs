use anyhow::{Context, Result};
use rusqlite::{Row, params};

use super::{CrmDb, json_column, to_json};
use crate::crm::models::{Formateur, FormateurInput};

const COLUMNS: &str = "id, nom, prenom, email, telephone, statut, competences, domaines_expertise, \
                       disponible, localisation_id, numero_siret, taux_horaire, notes, ypareo_id, \
                       created_at, updated_at";

fn row_to_formateur(row: &Row<'_>) -> rusqlite::Result<Formateur> {
    let nom: String = row.get(1)?;
    let prenom: String = row.get(2)?;
    Ok(Formateur {
        id: row.get(0)?,
        full_name: format!("{} {}", prenom, nom),
        nom,
        prenom,
        email: row.get(3)?,
        telephone: row.get(4)?,
        statut: row.get(5)?,
        competences: json_column(row, 6)?,
        domaines_expertise: json_column(row, 7)?,
        disponible: row.get(8)?,
        localisation_id: row.get(9)?,
        numero_siret: row.get(10)?,
        taux_horaire: row.get(11)?,
        notes: row.get(12)?,
        ypareo_id: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

impl CrmDb {
    pub fn create_formateur(&self, input: &FormateurInput) -> Result<Formateur> {
        self.conn
            .execute(
                "INSERT INTO formateurs (nom, prenom, email, telephone, statut, competences,
                     domaines_expertise, disponible, localisation_id, numero_siret, taux_horaire,
                     notes, ypareo_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    input.nom,
                    input.prenom,
                    input.email,
                    input.telephone,
                    input.statut,
                    to_json(&input.competences)?,
                    to_json(&input.domaines_expertise)?,
                    input.disponible,
                    input.localisation_id,
                    input.numero_siret,
                    input.taux_horaire,
                    input.notes,
                    input.ypareo_id,
                ],
            )
            .context("Failed to insert formateur")?;
        let id = self.conn.last_insert_rowid();
        self.get_formateur(id)?
            .context("Formateur not found after insert")
    }

    pub fn list_formateurs(&self) -> Result<Vec<Formateur>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM formateurs ORDER BY nom, prenom", COLUMNS))
            .context("Failed to prepare list_formateurs")?;
        let rows = stmt
            .query_map([], row_to_formateur)
            .context("Failed to query formateurs")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read formateur row")
    }

    pub fn get_formateur(&self, id: i64) -> Result<Option<Formateur>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM formateurs WHERE id = ?1", COLUMNS))
            .context("Failed to prepare get_formateur")?;
        let mut rows = stmt
            .query_map(params![id], row_to_formateur)
            .context("Failed to query formateur")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read formateur row")?)),
            None => Ok(None),
        }
    }

    pub fn update_formateur(&self, id: i64, input: &FormateurInput) -> Result<Option<Formateur>> {
        let count = self
            .conn
            .execute(
                "UPDATE formateurs SET nom = ?1, prenom = ?2, email = ?3, telephone = ?4, statut = ?5,
                     competences = ?6, domaines_expertise = ?7, disponible = ?8, localisation_id = ?9,
                     numero_siret = ?10, taux_horaire = ?11, notes = ?12, ypareo_id = ?13,
                     updated_at = datetime('now')
                 WHERE id = ?14",
                params![
                    input.nom,
                    input.prenom,
                    input.email,
                    input.telephone,
                    input.statut,
                    to_json(&input.competences)?,
                    to_json(&input.domaines_expertise)?,
                    input.disponible,
                    input.localisation_id,
                    input.numero_siret,
                    input.taux_horaire,
                    input.notes,
                    input.ypareo_id,
                    id,
                ],
            )
            .context("Failed to update formateur")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_formateur(id)
    }

    pub fn delete_formateur(&self, id: i64) -> Result<bool> {
        self.delete_by_id("formateurs", id, "Ce formateur est encore référencé")
    }
}
