use anyhow::{Context, Result};
use rusqlite::{Row, params};

use super::CrmDb;
use crate::crm::models::{Localisation, LocalisationInput};

const COLUMNS: &str = "id, code, nom, ville, adresse, code_postal, telephone, email, site_web, \
                       actif, created_at, updated_at";

fn row_to_localisation(row: &Row<'_>) -> rusqlite::Result<Localisation> {
    Ok(Localisation {
        id: row.get(0)?,
        code: row.get(1)?,
        nom: row.get(2)?,
        ville: row.get(3)?,
        adresse: row.get(4)?,
        code_postal: row.get(5)?,
        telephone: row.get(6)?,
        email: row.get(7)?,
        site_web: row.get(8)?,
        actif: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl CrmDb {
    // ── Localisation CRUD ─────────────────────────────────────────────

    pub fn create_localisation(&self, input: &LocalisationInput) -> Result<Localisation> {
        self.conn
            .execute(
                "INSERT INTO localisations (code, nom, ville, adresse, code_postal, telephone, email, site_web, actif)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    input.code,
                    input.nom,
                    input.ville,
                    input.adresse,
                    input.code_postal,
                    input.telephone,
                    input.email,
                    input.site_web,
                    input.actif,
                ],
            )
            .context("Failed to insert localisation")?;
        let id = self.conn.last_insert_rowid();
        self.get_localisation(id)?
            .context("Localisation not found after insert")
    }

    pub fn list_localisations(&self) -> Result<Vec<Localisation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM localisations ORDER BY nom", COLUMNS))
            .context("Failed to prepare list_localisations")?;
        let rows = stmt
            .query_map([], row_to_localisation)
            .context("Failed to query localisations")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read localisation row")
    }

    pub fn get_localisation(&self, id: i64) -> Result<Option<Localisation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM localisations WHERE id = ?1", COLUMNS))
            .context("Failed to prepare get_localisation")?;
        let mut rows = stmt
            .query_map(params![id], row_to_localisation)
            .context("Failed to query localisation")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read localisation row")?)),
            None => Ok(None),
        }
    }

    pub fn get_localisation_by_code(&self, code: &str) -> Result<Option<Localisation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM localisations WHERE code = ?1", COLUMNS))
            .context("Failed to prepare get_localisation_by_code")?;
        let mut rows = stmt
            .query_map(params![code], row_to_localisation)
            .context("Failed to query localisation")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read localisation row")?)),
            None => Ok(None),
        }
    }

    pub fn update_localisation(&self, id: i64, input: &LocalisationInput) -> Result<Option<Localisation>> {
        let count = self
            .conn
            .execute(
                "UPDATE localisations SET code = ?1, nom = ?2, ville = ?3, adresse = ?4, code_postal = ?5,
                     telephone = ?6, email = ?7, site_web = ?8, actif = ?9, updated_at = datetime('now')
                 WHERE id = ?10",
                params![
                    input.code,
                    input.nom,
                    input.ville,
                    input.adresse,
                    input.code_postal,
                    input.telephone,
                    input.email,
                    input.site_web,
                    input.actif,
                    id,
                ],
            )
            .context("Failed to update localisation")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_localisation(id)
    }

    /// Users, opportunités and formateurs of the localisation are detached.
    pub fn delete_localisation(&self, id: i64) -> Result<bool> {
        self.delete_by_id(
            "localisations",
            id,
            "Cette localisation est encore référencée",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::db::test_support::localisation_input;
    use crate::crm::db::{ConstraintKind, constraint_kind};

    #[test]
    fn test_create_and_get_localisation() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let loc = db.create_localisation(&localisation_input("AISNE"))?;
        assert!(loc.id > 0);
        assert_eq!(loc.code, "AISNE");
        assert!(loc.actif);
        assert!(!loc.created_at.is_empty());

        let fetched = db.get_localisation(loc.id)?.expect("localisation should exist");
        assert_eq!(fetched.nom, "AFPI AISNE");
        assert_eq!(db.get_localisation_by_code("AISNE")?.map(|l| l.id), Some(loc.id));
        Ok(())
    }

    #[test]
    fn test_duplicate_code_is_rejected() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        db.create_localisation(&localisation_input("AISNE"))?;
        let err = db.create_localisation(&localisation_input("AISNE")).unwrap_err();
        assert_eq!(constraint_kind(&err), Some(ConstraintKind::Unique));
        Ok(())
    }

    #[test]
    fn test_update_and_delete_localisation() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let loc = db.create_localisation(&localisation_input("AISNE"))?;
        let mut input = loc.to_input();
        input.ville = Some("Saint-Quentin".into());
        let updated = db.update_localisation(loc.id, &input)?.expect("updated");
        assert_eq!(updated.ville.as_deref(), Some("Saint-Quentin"));
        assert_eq!(updated.code, "AISNE");

        assert!(db.update_localisation(999, &input)?.is_none());
        assert!(db.delete_localisation(loc.id)?);
        assert!(!db.delete_localisation(loc.id)?);
        assert!(db.get_localisation(loc.id)?.is_none());
        Ok(())
    }
}
