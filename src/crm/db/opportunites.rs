use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use rusqlite::{Row, params, params_from_iter, types::Value};

use super::{CrmDb, json_column, to_json};
use crate::crm::models::{
    Actor, HistoriqueEntry, Opportunite, OpportuniteFilter, OpportuniteInput,
};

const COLUMNS: &str = "id, numero_opportunite, titre, description, statut, type_formation, entreprise_id, \
                       localisation_id, commercial_id, intitule_formation, objectifs_formation, \
                       nombre_participants, budget_estime, date_debut_souhaitee, date_fin_souhaitee, \
                       lieu_formation, numero_devis, montant_devis, date_envoi_devis, organisme_financeur, \
                       montant_accorde, date_formation_debut, date_formation_fin, formateurs_assignes, \
                       numero_facture, montant_facture, date_paiement_recu, mode_paiement, notes, \
                       historique, created_at, updated_at";

fn row_to_opportunite(row: &Row<'_>) -> rusqlite::Result<Opportunite> {
    Ok(Opportunite {
        id: row.get(0)?,
        numero_opportunite: row.get(1)?,
        titre: row.get(2)?,
        description: row.get(3)?,
        statut: row.get(4)?,
        type_formation: row.get(5)?,
        entreprise_id: row.get(6)?,
        localisation_id: row.get(7)?,
        commercial_id: row.get(8)?,
        intitule_formation: row.get(9)?,
        objectifs_formation: row.get(10)?,
        nombre_participants: row.get(11)?,
        budget_estime: row.get(12)?,
        date_debut_souhaitee: row.get(13)?,
        date_fin_souhaitee: row.get(14)?,
        lieu_formation: row.get(15)?,
        numero_devis: row.get(16)?,
        montant_devis: row.get(17)?,
        date_envoi_devis: row.get(18)?,
        organisme_financeur: row.get(19)?,
        montant_accorde: row.get(20)?,
        date_formation_debut: row.get(21)?,
        date_formation_fin: row.get(22)?,
        formateurs_assignes: json_column(row, 23)?,
        numero_facture: row.get(24)?,
        montant_facture: row.get(25)?,
        date_paiement_recu: row.get(26)?,
        mode_paiement: row.get(27)?,
        notes: row.get(28)?,
        historique: json_column(row, 29)?,
        created_at: row.get(30)?,
        updated_at: row.get(31)?,
    })
}

/// `OPP-<year>-<sequence>` with a five digit, zero padded sequence.
pub fn format_numero(year: i32, sequence: i64) -> String {
    format!("OPP-{}-{:05}", year, sequence)
}

impl CrmDb {
    // ── Opportunité CRUD ──────────────────────────────────────────────

    /// Bump the per-year counter and format the number it yields. Numbers of
    /// deleted opportunités are never handed out again. A year seen for the
    /// first time starts after the highest number already stored.
    fn next_numero(&self, year: i32) -> Result<String> {
        let prefix = format!("OPP-{}-", year);
        let sequence: i64 = self
            .conn
            .query_row(
                "INSERT INTO opportunite_sequences (year, last_value)
                 VALUES (?1, COALESCE((SELECT MAX(CAST(substr(numero_opportunite, ?2) AS INTEGER))
                                       FROM opportunites WHERE numero_opportunite LIKE ?3), 0) + 1)
                 ON CONFLICT(year) DO UPDATE SET last_value = last_value + 1
                 RETURNING last_value",
                params![year, prefix.len() as i64 + 1, format!("{}%", prefix)],
                |row| row.get(0),
            )
            .context("Failed to allocate opportunité number")?;
        Ok(format_numero(year, sequence))
    }

    /// Insert with a generated number and a creation entry in the history.
    pub fn create_opportunite(&self, input: &OpportuniteInput, actor: &Actor) -> Result<Opportunite> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let numero = self.next_numero(Utc::now().year())?;
        let historique = vec![HistoriqueEntry::creation(input.statut, actor)];
        tx.execute(
            "INSERT INTO opportunites (numero_opportunite, titre, description, statut, type_formation,
                 entreprise_id, localisation_id, commercial_id, intitule_formation, objectifs_formation,
                 nombre_participants, budget_estime, date_debut_souhaitee, date_fin_souhaitee,
                 lieu_formation, numero_devis, montant_devis, date_envoi_devis, organisme_financeur,
                 montant_accorde, date_formation_debut, date_formation_fin, formateurs_assignes,
                 numero_facture, montant_facture, date_paiement_recu, mode_paiement, notes, historique)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
                     ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)",
            params![
                numero,
                input.titre,
                input.description,
                input.statut,
                input.type_formation,
                input.entreprise_id,
                input.localisation_id,
                input.commercial_id,
                input.intitule_formation,
                input.objectifs_formation,
                input.nombre_participants,
                input.budget_estime,
                input.date_debut_souhaitee,
                input.date_fin_souhaitee,
                input.lieu_formation,
                input.numero_devis,
                input.montant_devis,
                input.date_envoi_devis,
                input.organisme_financeur,
                input.montant_accorde,
                input.date_formation_debut,
                input.date_formation_fin,
                to_json(&input.formateurs_assignes)?,
                input.numero_facture,
                input.montant_facture,
                input.date_paiement_recu,
                input.mode_paiement,
                input.notes,
                to_json(&historique)?,
            ],
        )
        .context("Failed to insert opportunité")?;
        let id = tx.last_insert_rowid();
        tx.commit().context("Failed to commit opportunité insert")?;
        self.get_opportunite(id)?
            .context("Opportunité not found after insert")
    }

    /// All opportunités matching every filter set, newest first.
    pub fn list_opportunites(&self, filter: &OpportuniteFilter) -> Result<Vec<Opportunite>> {
        let mut conditions = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(statut) = filter.statut {
            values.push(Value::Text(statut.as_str().to_string()));
            conditions.push(format!("statut = ?{}", values.len()));
        }
        for (column, value) in [
            ("entreprise_id", filter.entreprise_id),
            ("localisation_id", filter.localisation_id),
            ("commercial_id", filter.commercial_id),
        ] {
            if let Some(v) = value {
                values.push(Value::Integer(v));
                conditions.push(format!("{} = ?{}", column, values.len()));
            }
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM opportunites{} ORDER BY created_at DESC, id DESC",
                COLUMNS, where_clause
            ))
            .context("Failed to prepare list_opportunites")?;
        let rows = stmt
            .query_map(params_from_iter(values), row_to_opportunite)
            .context("Failed to query opportunités")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read opportunité row")
    }

    pub fn get_opportunite(&self, id: i64) -> Result<Option<Opportunite>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM opportunites WHERE id = ?1", COLUMNS))
            .context("Failed to prepare get_opportunite")?;
        let mut rows = stmt
            .query_map(params![id], row_to_opportunite)
            .context("Failed to query opportunité")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read opportunité row")?)),
            None => Ok(None),
        }
    }

    /// Overwrite the writable fields. `entry`, when given, is appended to the
    /// stored history in the same transaction.
    pub fn update_opportunite(
        &self,
        id: i64,
        input: &OpportuniteInput,
        entry: Option<HistoriqueEntry>,
    ) -> Result<Option<Opportunite>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let Some(current) = self.get_opportunite(id)? else {
            return Ok(None);
        };
        let mut historique = current.historique;
        historique.extend(entry);

        tx.execute(
            "UPDATE opportunites SET titre = ?1, description = ?2, statut = ?3, type_formation = ?4,
                 entreprise_id = ?5, localisation_id = ?6, commercial_id = ?7, intitule_formation = ?8,
                 objectifs_formation = ?9, nombre_participants = ?10, budget_estime = ?11,
                 date_debut_souhaitee = ?12, date_fin_souhaitee = ?13, lieu_formation = ?14,
                 numero_devis = ?15, montant_devis = ?16, date_envoi_devis = ?17,
                 organisme_financeur = ?18, montant_accorde = ?19, date_formation_debut = ?20,
                 date_formation_fin = ?21, formateurs_assignes = ?22, numero_facture = ?23,
                 montant_facture = ?24, date_paiement_recu = ?25, mode_paiement = ?26, notes = ?27,
                 historique = ?28, updated_at = datetime('now')
             WHERE id = ?29",
            params![
                input.titre,
                input.description,
                input.statut,
                input.type_formation,
                input.entreprise_id,
                input.localisation_id,
                input.commercial_id,
                input.intitule_formation,
                input.objectifs_formation,
                input.nombre_participants,
                input.budget_estime,
                input.date_debut_souhaitee,
                input.date_fin_souhaitee,
                input.lieu_formation,
                input.numero_devis,
                input.montant_devis,
                input.date_envoi_devis,
                input.organisme_financeur,
                input.montant_accorde,
                input.date_formation_debut,
                input.date_formation_fin,
                to_json(&input.formateurs_assignes)?,
                input.numero_facture,
                input.montant_facture,
                input.date_paiement_recu,
                input.mode_paiement,
                input.notes,
                to_json(&historique)?,
                id,
            ],
        )
        .context("Failed to update opportunité")?;
        tx.commit().context("Failed to commit opportunité update")?;
        self.get_opportunite(id)
    }

    pub fn delete_opportunite(&self, id: i64) -> Result<bool> {
        self.delete_by_id("opportunites", id, "Cette opportunité est encore référencée")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::db::test_support::{create_user, entreprise_input, opportunite_input};
    use crate::crm::db::{ConstraintKind, constraint_kind};
    use crate::crm::models::{RoleType, StatutOpportunite};

    fn actor() -> Actor {
        Actor {
            user_id: Some(7),
            user_name: Some("Claire Petit".into()),
        }
    }

    #[test]
    fn test_format_numero() {
        assert_eq!(format_numero(2025, 1), "OPP-2025-00001");
        assert_eq!(format_numero(2025, 123456), "OPP-2025-123456");
    }

    #[test]
    fn test_create_generates_sequential_numbers() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let entreprise = db.create_entreprise(&entreprise_input("12345678901234"))?;
        let first = db.create_opportunite(&opportunite_input(entreprise.id), &actor())?;
        let second = db.create_opportunite(&opportunite_input(entreprise.id), &actor())?;

        let year = Utc::now().year();
        assert_eq!(first.numero_opportunite, format_numero(year, 1));
        assert_eq!(second.numero_opportunite, format_numero(year, 2));

        db.delete_opportunite(first.id)?;
        let third = db.create_opportunite(&opportunite_input(entreprise.id), &actor())?;
        assert_eq!(third.numero_opportunite, format_numero(year, 3));

        // Removing the newest one does not free its number either.
        db.delete_opportunite(third.id)?;
        let fourth = db.create_opportunite(&opportunite_input(entreprise.id), &actor())?;
        assert_eq!(fourth.numero_opportunite, format_numero(year, 4));
        Ok(())
    }

    #[test]
    fn test_failed_insert_does_not_consume_a_number() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let entreprise = db.create_entreprise(&entreprise_input("12345678901234"))?;
        assert!(db.create_opportunite(&opportunite_input(42), &actor()).is_err());
        let opp = db.create_opportunite(&opportunite_input(entreprise.id), &actor())?;
        assert_eq!(opp.numero_opportunite, format_numero(Utc::now().year(), 1));
        Ok(())
    }

    #[test]
    fn test_counter_starts_after_existing_numbers() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let entreprise = db.create_entreprise(&entreprise_input("12345678901234"))?;
        let opp = db.create_opportunite(&opportunite_input(entreprise.id), &actor())?;
        let year = Utc::now().year();
        db.conn.execute(
            "UPDATE opportunites SET numero_opportunite = ?1 WHERE id = ?2",
            params![format_numero(year, 41), opp.id],
        )?;
        db.conn.execute("DELETE FROM opportunite_sequences", [])?;

        let next = db.create_opportunite(&opportunite_input(entreprise.id), &actor())?;
        assert_eq!(next.numero_opportunite, format_numero(year, 42));
        Ok(())
    }

    #[test]
    fn test_create_records_creation_history() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let entreprise = db.create_entreprise(&entreprise_input("12345678901234"))?;
        let opp = db.create_opportunite(&opportunite_input(entreprise.id), &actor())?;
        assert_eq!(opp.statut, StatutOpportunite::EnCoursCollecte);
        assert_eq!(opp.historique.len(), 1);
        assert_eq!(opp.historique[0].action, "creation");
        assert_eq!(opp.historique[0].user_name.as_deref(), Some("Claire Petit"));
        Ok(())
    }

    #[test]
    fn test_unknown_entreprise_is_foreign_key_error() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let err = db
            .create_opportunite(&opportunite_input(42), &actor())
            .unwrap_err();
        assert_eq!(constraint_kind(&err), Some(ConstraintKind::ForeignKey));
        Ok(())
    }

    #[test]
    fn test_update_appends_history_entry() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let entreprise = db.create_entreprise(&entreprise_input("12345678901234"))?;
        let opp = db.create_opportunite(&opportunite_input(entreprise.id), &actor())?;

        let mut input = opp.to_input();
        input.statut = StatutOpportunite::EnAttenteValidationResp;
        let entry = HistoriqueEntry::status_change(
            opp.statut,
            input.statut,
            &actor(),
            Some("Dossier complet".into()),
        );
        let updated = db
            .update_opportunite(opp.id, &input, Some(entry))?
            .expect("opportunité");
        assert_eq!(updated.statut, StatutOpportunite::EnAttenteValidationResp);
        assert_eq!(updated.historique.len(), 2);
        assert_eq!(
            updated.historique[1].statut_avant,
            Some(StatutOpportunite::EnCoursCollecte)
        );
        assert_eq!(updated.historique[1].commentaire.as_deref(), Some("Dossier complet"));
        assert_eq!(updated.numero_opportunite, opp.numero_opportunite);

        let untouched = db.update_opportunite(opp.id, &input, None)?.expect("opportunité");
        assert_eq!(untouched.historique.len(), 2);
        assert!(db.update_opportunite(999, &input, None)?.is_none());
        Ok(())
    }

    #[test]
    fn test_list_filters() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let a = db.create_entreprise(&entreprise_input("12345678901234"))?;
        let b = db.create_entreprise(&entreprise_input("22345678901234"))?;
        let commercial = create_user(&db, "c@afpi.fr", RoleType::Commercial)?;

        let mut input = opportunite_input(a.id);
        input.commercial_id = Some(commercial.id);
        input.statut = StatutOpportunite::DevisEnvoye;
        db.create_opportunite(&input, &actor())?;
        db.create_opportunite(&opportunite_input(a.id), &actor())?;
        db.create_opportunite(&opportunite_input(b.id), &actor())?;

        assert_eq!(db.list_opportunites(&OpportuniteFilter::default())?.len(), 3);
        let by_entreprise = OpportuniteFilter {
            entreprise_id: Some(a.id),
            ..Default::default()
        };
        assert_eq!(db.list_opportunites(&by_entreprise)?.len(), 2);
        let combined = OpportuniteFilter {
            entreprise_id: Some(a.id),
            statut: Some(StatutOpportunite::DevisEnvoye),
            commercial_id: Some(commercial.id),
            ..Default::default()
        };
        let found = db.list_opportunites(&combined)?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].commercial_id, Some(commercial.id));
        Ok(())
    }
}
