//! Sales opportunities and their status workflow.
//!
//! An opportunité moves through six sections, each owned by one role:
//!
//! | Section | Stage                    | Owner                    |
//! |---------|--------------------------|--------------------------|
//! | 1       | Collecte d'informations  | `commercial`             |
//! | 2       | Devis                    | `responsable_commercial` |
//! | 3       | Montage administratif    | `assistante`             |
//! | 4       | Planification            | `planificateur`          |
//! | 5       | Documents administratifs | `assistante`             |
//! | 6       | Facturation              | `facturation`            |
//!
//! plus the special statuts `annule` and `en_attente`. Transitions are not
//! enforced; every change of statut is appended to the record's history.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{RoleType, Validator, merge, merge_opt, string_enum};
use crate::errors::CrmError;

string_enum! {
    /// Workflow statut, in workflow order.
    #[derive(Default)]
    pub enum StatutOpportunite {
        #[default]
        EnCoursCollecte => "en_cours_collecte",
        EnAttenteValidationResp => "en_attente_validation_resp",
        EnCoursDevis => "en_cours_devis",
        DevisEnvoye => "devis_envoye",
        DevisAccepte => "devis_accepte",
        DevisRefuse => "devis_refuse",
        EnCoursMontage => "en_cours_montage",
        EnAttenteFinancement => "en_attente_financement",
        FinancementValide => "financement_valide",
        EnCoursPlanification => "en_cours_planification",
        Planifie => "planifie",
        EnCoursDocuments => "en_cours_documents",
        PretFormation => "pret_formation",
        EnCoursFacturation => "en_cours_facturation",
        Facture => "facture",
        Paye => "paye",
        Termine => "termine",
        Annule => "annule",
        EnAttente => "en_attente",
    }
}

impl StatutOpportunite {
    /// Workflow section (1 to 6), `None` for the special statuts.
    pub fn section(&self) -> Option<u8> {
        use StatutOpportunite::*;
        match self {
            EnCoursCollecte | EnAttenteValidationResp => Some(1),
            EnCoursDevis | DevisEnvoye | DevisAccepte | DevisRefuse => Some(2),
            EnCoursMontage | EnAttenteFinancement | FinancementValide => Some(3),
            EnCoursPlanification | Planifie => Some(4),
            EnCoursDocuments | PretFormation => Some(5),
            EnCoursFacturation | Facture | Paye | Termine => Some(6),
            Annule | EnAttente => None,
        }
    }

    /// Role responsible for moving the opportunité out of this statut.
    pub fn owner_role(&self) -> Option<RoleType> {
        match self.section()? {
            1 => Some(RoleType::Commercial),
            2 => Some(RoleType::ResponsableCommercial),
            3 | 5 => Some(RoleType::Assistante),
            4 => Some(RoleType::Planificateur),
            _ => Some(RoleType::Facturation),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatutOpportunite::Paye | StatutOpportunite::Termine | StatutOpportunite::Annule
        )
    }

    /// The client accepted the quote and the deal has not been lost since.
    pub fn is_won(&self) -> bool {
        let position = |s: &StatutOpportunite| Self::ALL.iter().position(|x| x == s);
        match self {
            StatutOpportunite::DevisRefuse
            | StatutOpportunite::Annule
            | StatutOpportunite::EnAttente => false,
            other => position(other) >= position(&StatutOpportunite::DevisAccepte),
        }
    }

    /// Counted in turnover.
    pub fn is_invoiced(&self) -> bool {
        matches!(
            self,
            StatutOpportunite::Facture | StatutOpportunite::Paye | StatutOpportunite::Termine
        )
    }

    pub fn label(&self) -> &'static str {
        use StatutOpportunite::*;
        match self {
            EnCoursCollecte => "En cours de collecte",
            EnAttenteValidationResp => "En attente de validation responsable",
            EnCoursDevis => "Devis en cours",
            DevisEnvoye => "Devis envoyé",
            DevisAccepte => "Devis accepté",
            DevisRefuse => "Devis refusé",
            EnCoursMontage => "Montage administratif en cours",
            EnAttenteFinancement => "En attente de financement",
            FinancementValide => "Financement validé",
            EnCoursPlanification => "Planification en cours",
            Planifie => "Planifié",
            EnCoursDocuments => "Documents en cours",
            PretFormation => "Prêt pour la formation",
            EnCoursFacturation => "Facturation en cours",
            Facture => "Facturé",
            Paye => "Payé",
            Termine => "Terminé",
            Annule => "Annulé",
            EnAttente => "En attente",
        }
    }
}

string_enum! {
    #[derive(Default)]
    pub enum TypeFormation {
        InterEntreprise => "inter_entreprise",
        #[default]
        IntraEntreprise => "intra_entreprise",
        Individuelle => "individuelle",
        Alternance => "alternance",
    }
}

string_enum! {
    pub enum ModePaiement {
        Virement => "virement",
        Cheque => "cheque",
        CarteBancaire => "carte_bancaire",
        Prelevement => "prelevement",
        Opco => "opco",
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatut {
    pub statut: StatutOpportunite,
    pub label: &'static str,
    pub terminal: bool,
}

/// One stage of the workflow as served by `GET /api/opportunites/workflow`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStage {
    pub section: Option<u8>,
    pub name: &'static str,
    pub owner_role: Option<RoleType>,
    pub statuts: Vec<WorkflowStatut>,
}

pub fn workflow() -> Vec<WorkflowStage> {
    const STAGES: [(Option<u8>, &str); 7] = [
        (Some(1), "Collecte d'informations"),
        (Some(2), "Devis"),
        (Some(3), "Montage administratif"),
        (Some(4), "Planification"),
        (Some(5), "Documents administratifs"),
        (Some(6), "Facturation"),
        (None, "Statuts spéciaux"),
    ];

    STAGES
        .iter()
        .map(|&(section, name)| {
            let statuts: Vec<WorkflowStatut> = StatutOpportunite::ALL
                .iter()
                .filter(|s| s.section() == section)
                .map(|s| WorkflowStatut {
                    statut: *s,
                    label: s.label(),
                    terminal: s.is_terminal(),
                })
                .collect();
            WorkflowStage {
                section,
                name,
                owner_role: statuts.first().and_then(|s| s.statut.owner_role()),
                statuts,
            }
        })
        .collect()
}

/// An entry of the opportunité's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoriqueEntry {
    pub id: String,
    pub action: String,
    pub statut_avant: Option<StatutOpportunite>,
    pub statut_apres: StatutOpportunite,
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub commentaire: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Who performed a change, for the history trail.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
}

impl HistoriqueEntry {
    pub fn creation(statut: StatutOpportunite, actor: &Actor) -> Self {
        Self::new("creation", None, statut, actor, None)
    }

    pub fn status_change(
        before: StatutOpportunite,
        after: StatutOpportunite,
        actor: &Actor,
        commentaire: Option<String>,
    ) -> Self {
        Self::new("changement_statut", Some(before), after, actor, commentaire)
    }

    fn new(
        action: &str,
        statut_avant: Option<StatutOpportunite>,
        statut_apres: StatutOpportunite,
        actor: &Actor,
        commentaire: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action: action.to_string(),
            statut_avant,
            statut_apres,
            user_id: actor.user_id,
            user_name: actor.user_name.clone(),
            commentaire,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunite {
    pub id: i64,
    pub numero_opportunite: String,
    pub titre: String,
    pub description: Option<String>,
    pub statut: StatutOpportunite,
    pub type_formation: TypeFormation,
    pub entreprise_id: i64,
    pub localisation_id: Option<i64>,
    pub commercial_id: Option<i64>,
    // Section 1
    pub intitule_formation: Option<String>,
    pub objectifs_formation: Option<String>,
    pub nombre_participants: Option<i64>,
    pub budget_estime: Option<f64>,
    pub date_debut_souhaitee: Option<NaiveDate>,
    pub date_fin_souhaitee: Option<NaiveDate>,
    pub lieu_formation: Option<String>,
    // Section 2
    pub numero_devis: Option<String>,
    pub montant_devis: Option<f64>,
    pub date_envoi_devis: Option<NaiveDate>,
    // Section 3
    pub organisme_financeur: Option<String>,
    pub montant_accorde: Option<f64>,
    // Section 4
    pub date_formation_debut: Option<NaiveDate>,
    pub date_formation_fin: Option<NaiveDate>,
    pub formateurs_assignes: Vec<i64>,
    // Section 6
    pub numero_facture: Option<String>,
    pub montant_facture: Option<f64>,
    pub date_paiement_recu: Option<NaiveDate>,
    pub mode_paiement: Option<ModePaiement>,
    pub notes: Option<String>,
    pub historique: Vec<HistoriqueEntry>,
    pub created_at: String,
    pub updated_at: String,
}

impl Opportunite {
    /// Amount counted in turnover: the invoice, else the accepted quote.
    pub fn chiffre_affaires(&self) -> f64 {
        if !self.statut.is_invoiced() {
            return 0.0;
        }
        self.montant_facture.or(self.montant_devis).unwrap_or(0.0)
    }

    pub fn to_input(&self) -> OpportuniteInput {
        OpportuniteInput {
            titre: self.titre.clone(),
            description: self.description.clone(),
            statut: self.statut,
            type_formation: self.type_formation,
            entreprise_id: self.entreprise_id,
            localisation_id: self.localisation_id,
            commercial_id: self.commercial_id,
            intitule_formation: self.intitule_formation.clone(),
            objectifs_formation: self.objectifs_formation.clone(),
            nombre_participants: self.nombre_participants,
            budget_estime: self.budget_estime,
            date_debut_souhaitee: self.date_debut_souhaitee,
            date_fin_souhaitee: self.date_fin_souhaitee,
            lieu_formation: self.lieu_formation.clone(),
            numero_devis: self.numero_devis.clone(),
            montant_devis: self.montant_devis,
            date_envoi_devis: self.date_envoi_devis,
            organisme_financeur: self.organisme_financeur.clone(),
            montant_accorde: self.montant_accorde,
            date_formation_debut: self.date_formation_debut,
            date_formation_fin: self.date_formation_fin,
            formateurs_assignes: self.formateurs_assignes.clone(),
            numero_facture: self.numero_facture.clone(),
            montant_facture: self.montant_facture,
            date_paiement_recu: self.date_paiement_recu,
            mode_paiement: self.mode_paiement,
            notes: self.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OpportuniteInput {
    pub titre: String,
    pub description: Option<String>,
    #[serde(default)]
    pub statut: StatutOpportunite,
    #[serde(default)]
    pub type_formation: TypeFormation,
    pub entreprise_id: i64,
    pub localisation_id: Option<i64>,
    pub commercial_id: Option<i64>,
    pub intitule_formation: Option<String>,
    pub objectifs_formation: Option<String>,
    pub nombre_participants: Option<i64>,
    pub budget_estime: Option<f64>,
    pub date_debut_souhaitee: Option<NaiveDate>,
    pub date_fin_souhaitee: Option<NaiveDate>,
    pub lieu_formation: Option<String>,
    pub numero_devis: Option<String>,
    pub montant_devis: Option<f64>,
    pub date_envoi_devis: Option<NaiveDate>,
    pub organisme_financeur: Option<String>,
    pub montant_accorde: Option<f64>,
    pub date_formation_debut: Option<NaiveDate>,
    pub date_formation_fin: Option<NaiveDate>,
    #[serde(default)]
    pub formateurs_assignes: Vec<i64>,
    pub numero_facture: Option<String>,
    pub montant_facture: Option<f64>,
    pub date_paiement_recu: Option<NaiveDate>,
    pub mode_paiement: Option<ModePaiement>,
    pub notes: Option<String>,
}

/// `end` must not precede `start` when both are set.
fn ordered(start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    match (start, end) {
        (Some(s), Some(e)) => e >= s,
        _ => true,
    }
}

impl OpportuniteInput {
    pub fn validate(&self) -> Result<(), CrmError> {
        Validator::new()
            .required("titre", &self.titre)
            .max_len("titre", &self.titre, 255)
            .check("entrepriseId", self.entreprise_id > 0, "doit référencer une entreprise")
            .check(
                "nombreParticipants",
                self.nombre_participants.is_none_or(|n| n >= 1),
                "doit être au moins 1",
            )
            .non_negative("budgetEstime", self.budget_estime)
            .non_negative("montantDevis", self.montant_devis)
            .non_negative("montantAccorde", self.montant_accorde)
            .non_negative("montantFacture", self.montant_facture)
            .check(
                "dateFinSouhaitee",
                ordered(self.date_debut_souhaitee, self.date_fin_souhaitee),
                "doit être postérieure à la date de début souhaitée",
            )
            .check(
                "dateFormationFin",
                ordered(self.date_formation_debut, self.date_formation_fin),
                "doit être postérieure à la date de début de formation",
            )
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OpportunitePatch {
    pub titre: Option<String>,
    pub description: Option<String>,
    pub statut: Option<StatutOpportunite>,
    pub type_formation: Option<TypeFormation>,
    pub entreprise_id: Option<i64>,
    pub localisation_id: Option<i64>,
    pub commercial_id: Option<i64>,
    pub intitule_formation: Option<String>,
    pub objectifs_formation: Option<String>,
    pub nombre_participants: Option<i64>,
    pub budget_estime: Option<f64>,
    pub date_debut_souhaitee: Option<NaiveDate>,
    pub date_fin_souhaitee: Option<NaiveDate>,
    pub lieu_formation: Option<String>,
    pub numero_devis: Option<String>,
    pub montant_devis: Option<f64>,
    pub date_envoi_devis: Option<NaiveDate>,
    pub organisme_financeur: Option<String>,
    pub montant_accorde: Option<f64>,
    pub date_formation_debut: Option<NaiveDate>,
    pub date_formation_fin: Option<NaiveDate>,
    pub formateurs_assignes: Option<Vec<i64>>,
    pub numero_facture: Option<String>,
    pub montant_facture: Option<f64>,
    pub date_paiement_recu: Option<NaiveDate>,
    pub mode_paiement: Option<ModePaiement>,
    pub notes: Option<String>,
    /// Comment recorded in the history when the statut changes.
    pub commentaire: Option<String>,
}

impl OpportunitePatch {
    /// Merge into `input` and return the history comment, if any.
    pub fn apply_to(self, input: &mut OpportuniteInput) -> Option<String> {
        merge(&mut input.titre, self.titre);
        merge_opt(&mut input.description, self.description);
        merge(&mut input.statut, self.statut);
        merge(&mut input.type_formation, self.type_formation);
        merge(&mut input.entreprise_id, self.entreprise_id);
        merge_opt(&mut input.localisation_id, self.localisation_id);
        merge_opt(&mut input.commercial_id, self.commercial_id);
        merge_opt(&mut input.intitule_formation, self.intitule_formation);
        merge_opt(&mut input.objectifs_formation, self.objectifs_formation);
        merge_opt(&mut input.nombre_participants, self.nombre_participants);
        merge_opt(&mut input.budget_estime, self.budget_estime);
        merge_opt(&mut input.date_debut_souhaitee, self.date_debut_souhaitee);
        merge_opt(&mut input.date_fin_souhaitee, self.date_fin_souhaitee);
        merge_opt(&mut input.lieu_formation, self.lieu_formation);
        merge_opt(&mut input.numero_devis, self.numero_devis);
        merge_opt(&mut input.montant_devis, self.montant_devis);
        merge_opt(&mut input.date_envoi_devis, self.date_envoi_devis);
        merge_opt(&mut input.organisme_financeur, self.organisme_financeur);
        merge_opt(&mut input.montant_accorde, self.montant_accorde);
        merge_opt(&mut input.date_formation_debut, self.date_formation_debut);
        merge_opt(&mut input.date_formation_fin, self.date_formation_fin);
        merge(&mut input.formateurs_assignes, self.formateurs_assignes);
        merge_opt(&mut input.numero_facture, self.numero_facture);
        merge_opt(&mut input.montant_facture, self.montant_facture);
        merge_opt(&mut input.date_paiement_recu, self.date_paiement_recu);
        merge_opt(&mut input.mode_paiement, self.mode_paiement);
        merge_opt(&mut input.notes, self.notes);
        self.commentaire
    }
}

/// Query-string filters for `GET /api/opportunites`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportuniteFilter {
    pub statut: Option<StatutOpportunite>,
    pub entreprise_id: Option<i64>,
    pub localisation_id: Option<i64>,
    pub commercial_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_statut_has_one_stage() {
        let stages = workflow();
        assert_eq!(stages.len(), 7);
        let total: usize = stages.iter().map(|s| s.statuts.len()).sum();
        assert_eq!(total, StatutOpportunite::ALL.len());
        assert_eq!(stages[1].owner_role, Some(RoleType::ResponsableCommercial));
        assert_eq!(stages[4].owner_role, Some(RoleType::Assistante));
        assert_eq!(stages[6].owner_role, None);
    }

    #[test]
    fn test_sections() {
        assert_eq!(StatutOpportunite::EnCoursCollecte.section(), Some(1));
        assert_eq!(StatutOpportunite::DevisRefuse.section(), Some(2));
        assert_eq!(StatutOpportunite::Planifie.section(), Some(4));
        assert_eq!(StatutOpportunite::Termine.section(), Some(6));
        assert_eq!(StatutOpportunite::Annule.section(), None);
    }

    #[test]
    fn test_won_statuts() {
        assert!(!StatutOpportunite::DevisEnvoye.is_won());
        assert!(StatutOpportunite::DevisAccepte.is_won());
        assert!(!StatutOpportunite::DevisRefuse.is_won());
        assert!(StatutOpportunite::Planifie.is_won());
        assert!(StatutOpportunite::Paye.is_won());
        assert!(!StatutOpportunite::Annule.is_won());
        assert!(!StatutOpportunite::EnAttente.is_won());
    }

    #[test]
    fn test_terminal_statuts() {
        assert!(StatutOpportunite::Paye.is_terminal());
        assert!(StatutOpportunite::Annule.is_terminal());
        assert!(!StatutOpportunite::Facture.is_terminal());
    }

    #[test]
    fn test_input_defaults_and_dates() {
        let input: OpportuniteInput = serde_json::from_value(serde_json::json!({
            "titre": "Formation soudure",
            "entrepriseId": 1,
            "dateDebutSouhaitee": "2025-03-10",
            "dateFinSouhaitee": "2025-03-01",
        }))
        .unwrap();
        assert_eq!(input.statut, StatutOpportunite::EnCoursCollecte);
        assert_eq!(input.type_formation, TypeFormation::IntraEntreprise);
        match input.validate() {
            Err(CrmError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "dateFinSouhaitee");
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_patch_returns_comment() {
        let mut input: OpportuniteInput = serde_json::from_value(serde_json::json!({
            "titre": "Formation soudure",
            "entrepriseId": 1,
        }))
        .unwrap();
        let patch: OpportunitePatch = serde_json::from_value(serde_json::json!({
            "statut": "devis_envoye",
            "commentaire": "Envoyé par mail",
        }))
        .unwrap();
        let comment = patch.apply_to(&mut input);
        assert_eq!(input.statut, StatutOpportunite::DevisEnvoye);
        assert_eq!(input.titre, "Formation soudure");
        assert_eq!(comment.as_deref(), Some("Envoyé par mail"));
    }

    #[test]
    fn test_status_change_entry() {
        let actor = Actor {
            user_id: Some(4),
            user_name: Some("Jean Martin".into()),
        };
        let entry = HistoriqueEntry::status_change(
            StatutOpportunite::EnCoursDevis,
            StatutOpportunite::DevisEnvoye,
            &actor,
            None,
        );
        assert_eq!(entry.action, "changement_statut");
        assert_eq!(entry.statut_avant, Some(StatutOpportunite::EnCoursDevis));
        assert_eq!(entry.user_id, Some(4));
        assert!(!entry.id.is_empty());
    }
}
