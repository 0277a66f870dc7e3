use anyhow::{Context, Result};
use rusqlite::{Row, params};

use super::{CrmDb, json_column, opt_json_column, opt_to_json, to_json};
use crate::crm::models::{Entreprise, EntrepriseInput};

const COLUMNS: &str = "id, raison_sociale, siret, siren, numero_tva, type_entreprise, secteur_activite, \
                       effectif, adresse, code_postal, ville, pays, telephone, email, site_web, \
                       contact_principal, notes, actif, opco_rattachement, tags, ypareo_id, \
                       last_sync_date, created_at, updated_at";

fn row_to_entreprise(row: &Row<'_>) -> rusqlite::Result<Entreprise> {
    Ok(Entreprise {
        id: row.get(0)?,
        raison_sociale: row.get(1)?,
        siret: row.get(2)?,
        siren: row.get(3)?,
        numero_tva: row.get(4)?,
        type_entreprise: row.get(5)?,
        secteur_activite: row.get(6)?,
        effectif: row.get(7)?,
        adresse: row.get(8)?,
        code_postal: row.get(9)?,
        ville: row.get(10)?,
        pays: row.get(11)?,
        telephone: row.get(12)?,
        email: row.get(13)?,
        site_web: row.get(14)?,
        contact_principal: opt_json_column(row, 15)?,
        notes: row.get(16)?,
        actif: row.get(17)?,
        opco_rattachement: row.get(18)?,
        tags: json_column(row, 19)?,
        ypareo_id: row.get(20)?,
        last_sync_date: row.get(21)?,
        created_at: row.get(22)?,
        updated_at: row.get(23)?,
    })
}

impl CrmDb {
    // ── Entreprise CRUD ───────────────────────────────────────────────

    pub fn create_entreprise(&self, input: &EntrepriseInput) -> Result<Entreprise> {
        self.conn
            .execute(
                "INSERT INTO entreprises (raison_sociale, siret, siren, numero_tva, type_entreprise,
                     secteur_activite, effectif, adresse, code_postal, ville, pays, telephone, email,
                     site_web, contact_principal, notes, actif, opco_rattachement, tags, ypareo_id,
                     last_sync_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                         ?17, ?18, ?19, ?20, ?21)",
                params![
                    input.raison_sociale,
                    input.siret,
                    input.siren,
                    input.numero_tva,
                    input.type_entreprise,
                    input.secteur_activite,
                    input.effectif,
                    input.adresse,
                    input.code_postal,
                    input.ville,
                    input.pays,
                    input.telephone,
                    input.email,
                    input.site_web,
                    opt_to_json(input.contact_principal.as_ref())?,
                    input.notes,
                    input.actif,
                    input.opco_rattachement,
                    to_json(&input.tags)?,
                    input.ypareo_id,
                    input.last_sync_date,
                ],
            )
            .context("Failed to insert entreprise")?;
        let id = self.conn.last_insert_rowid();
        self.get_entreprise(id)?
            .context("Entreprise not found after insert")
    }

    pub fn list_entreprises(&self) -> Result<Vec<Entreprise>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM entreprises ORDER BY raison_sociale",
                COLUMNS
            ))
            .context("Failed to prepare list_entreprises")?;
        let rows = stmt
            .query_map([], row_to_entreprise)
            .context("Failed to query entreprises")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read entreprise row")
    }

    pub fn get_entreprise(&self, id: i64) -> Result<Option<Entreprise>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM entreprises WHERE id = ?1", COLUMNS))
            .context("Failed to prepare get_entreprise")?;
        let mut rows = stmt
            .query_map(params![id], row_to_entreprise)
            .context("Failed to query entreprise")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read entreprise row")?)),
            None => Ok(None),
        }
    }

    pub fn update_entreprise(&self, id: i64, input: &EntrepriseInput) -> Result<Option<Entreprise>> {
        let count = self
            .conn
            .execute(
                "UPDATE entreprises SET raison_sociale = ?1, siret = ?2, siren = ?3, numero_tva = ?4,
                     type_entreprise = ?5, secteur_activite = ?6, effectif = ?7, adresse = ?8,
                     code_postal = ?9, ville = ?10, pays = ?11, telephone = ?12, email = ?13,
                     site_web = ?14, contact_principal = ?15, notes = ?16, actif = ?17,
                     opco_rattachement = ?18, tags = ?19, ypareo_id = ?20, last_sync_date = ?21,
                     updated_at = datetime('now')
                 WHERE id = ?22",
                params![
                    input.raison_sociale,
                    input.siret,
                    input.siren,
                    input.numero_tva,
                    input.type_entreprise,
                    input.secteur_activite,
                    input.effectif,
                    input.adresse,
                    input.code_postal,
                    input.ville,
                    input.pays,
                    input.telephone,
                    input.email,
                    input.site_web,
                    opt_to_json(input.contact_principal.as_ref())?,
                    input.notes,
                    input.actif,
                    input.opco_rattachement,
                    to_json(&input.tags)?,
                    input.ypareo_id,
                    input.last_sync_date,
                    id,
                ],
            )
            .context("Failed to update entreprise")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_entreprise(id)
    }

    /// Refused while opportunités still reference the entreprise.
    pub fn delete_entreprise(&self, id: i64) -> Result<bool> {
        self.delete_by_id(
            "entreprises",
            id,
            "Impossible de supprimer cette entreprise : des opportunités y sont rattachées",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::db::test_support::{entreprise_input, opportunite_input};
    use crate::crm::db::{ConstraintKind, constraint_kind};
    use crate::crm::models::{Actor, ContactPrincipal, TypeEntreprise};
    use crate::errors::CrmError;

    #[test]
    fn test_create_entreprise_with_json_columns() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let mut input = entreprise_input("12345678901234");
        input.tags = vec!["metallurgie".into(), "aisne".into()];
        input.contact_principal = Some(ContactPrincipal {
            nom: Some("Martin".into()),
            email: Some("martin@acme.fr".into()),
            ..Default::default()
        });
        input.type_entreprise = TypeEntreprise::Eti;

        let created = db.create_entreprise(&input)?;
        let fetched = db.get_entreprise(created.id)?.expect("entreprise");
        assert_eq!(fetched.tags, vec!["metallurgie", "aisne"]);
        assert_eq!(
            fetched.contact_principal.and_then(|c| c.nom).as_deref(),
            Some("Martin")
        );
        assert_eq!(fetched.type_entreprise, TypeEntreprise::Eti);
        assert!(fetched.last_sync_date.is_none());
        Ok(())
    }

    #[test]
    fn test_duplicate_siret_is_unique_violation() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        db.create_entreprise(&entreprise_input("12345678901234"))?;
        let err = db
            .create_entreprise(&entreprise_input("12345678901234"))
            .unwrap_err();
        assert_eq!(constraint_kind(&err), Some(ConstraintKind::Unique));
        Ok(())
    }

    #[test]
    fn test_update_entreprise() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let created = db.create_entreprise(&entreprise_input("12345678901234"))?;
        let mut input = created.to_input();
        input.last_sync_date = Some(chrono::Utc::now());
        input.effectif = Some(120);
        let updated = db.update_entreprise(created.id, &input)?.expect("entreprise");
        assert_eq!(updated.effectif, Some(120));
        assert!(updated.last_sync_date.is_some());
        assert!(db.update_entreprise(999, &input)?.is_none());
        Ok(())
    }

    #[test]
    fn test_delete_entreprise_with_opportunites_is_conflict() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let entreprise = db.create_entreprise(&entreprise_input("12345678901234"))?;
        db.create_opportunite(&opportunite_input(entreprise.id), &Actor::default())?;

        let err = db.delete_entreprise(entreprise.id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::Conflict(_))
        ));
        assert!(db.get_entreprise(entreprise.id)?.is_some());
        Ok(())
    }
}
