//! Fixtures shared by the database and API tests.

use std::sync::LazyLock;

use anyhow::Result;

use super::CrmDb;
use crate::crm::auth::hash_password;
use crate::crm::models::{
    EntrepriseInput, LocalisationInput, OpportuniteInput, RoleInput, RoleType, TypeEntreprise,
    TypeFormation, User, UserInput,
};

/// Password of every fixture user.
pub(crate) const TEST_PASSWORD: &str = "Password123!";

static TEST_PASSWORD_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password(TEST_PASSWORD).unwrap());

/// Hash of `TEST_PASSWORD`, computed once per test binary.
pub(crate) fn test_password_hash() -> String {
    TEST_PASSWORD_HASH.clone()
}

pub(crate) fn localisation_input(code: &str) -> LocalisationInput {
    LocalisationInput {
        code: code.to_string(),
        nom: format!("AFPI {code}"),
        ville: None,
        adresse: None,
        code_postal: None,
        telephone: None,
        email: None,
        site_web: None,
        actif: true,
    }
}

pub(crate) fn entreprise_input(siret: &str) -> EntrepriseInput {
    EntrepriseInput {
        raison_sociale: format!("Entreprise {siret}"),
        siret: siret.to_string(),
        siren: None,
        numero_tva: None,
        type_entreprise: TypeEntreprise::Pme,
        secteur_activite: None,
        effectif: None,
        adresse: None,
        code_postal: None,
        ville: None,
        pays: None,
        telephone: None,
        email: None,
        site_web: None,
        contact_principal: None,
        notes: None,
        actif: true,
        opco_rattachement: None,
        tags: vec![],
        ypareo_id: None,
        last_sync_date: None,
    }
}

pub(crate) fn role_input(role_type: RoleType) -> RoleInput {
    RoleInput {
        name: role_type.display_name().to_string(),
        role_type,
        description: Some(role_type.description().to_string()),
        level: role_type.level(),
        actif: true,
        permission_ids: vec![],
    }
}

pub(crate) fn user_input(email: &str, role_id: i64) -> UserInput {
    UserInput {
        email: email.to_string(),
        first_name: "Claire".to_string(),
        last_name: "Petit".to_string(),
        phone: None,
        avatar: None,
        actif: true,
        role_id,
        localisation_id: None,
        managed_localisations: vec![],
    }
}

/// Create a user, creating the role of `role_type` first when missing.
pub(crate) fn create_user(db: &CrmDb, email: &str, role_type: RoleType) -> Result<User> {
    let role = match db.get_role_by_type(role_type)? {
        Some(role) => role,
        None => db.create_role(&role_input(role_type))?,
    };
    db.create_user(&user_input(email, role.id), &test_password_hash())
}

pub(crate) fn opportunite_input(entreprise_id: i64) -> OpportuniteInput {
    OpportuniteInput {
        titre: "Formation soudure".to_string(),
        description: None,
        statut: Default::default(),
        type_formation: TypeFormation::IntraEntreprise,
        entreprise_id,
        localisation_id: None,
        commercial_id: None,
        intitule_formation: None,
        objectifs_formation: None,
        nombre_participants: None,
        budget_estime: None,
        date_debut_souhaitee: None,
        date_fin_souhaitee: None,
        lieu_formation: None,
        numero_devis: None,
        montant_devis: None,
        date_envoi_devis: None,
        organisme_financeur: None,
        montant_accorde: None,
        date_formation_debut: None,
        date_formation_fin: None,
        formateurs_assignes: vec![],
        numero_facture: None,
        montant_facture: None,
        date_paiement_recu: None,
        mode_paiement: None,
        notes: None,
    }
}
