use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Validator, default_true, merge, merge_opt, string_enum};
use crate::errors::CrmError;

string_enum! {
    /// Legal size/category of a client company.
    #[derive(Default)]
    pub enum TypeEntreprise {
        #[default]
        Pme => "pme",
        Eti => "eti",
        GrandeEntreprise => "grande_entreprise",
        Tpe => "tpe",
        Association => "association",
        OrganismePublic => "organisme_public",
    }
}

/// Main contact person at a client company, stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContactPrincipal {
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub fonction: Option<String>,
    pub email: Option<String>,
    pub telephone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entreprise {
    pub id: i64,
    pub raison_sociale: String,
    pub siret: String,
    pub siren: Option<String>,
    pub numero_tva: Option<String>,
    pub type_entreprise: TypeEntreprise,
    pub secteur_activite: Option<String>,
    pub effectif: Option<i64>,
    pub adresse: Option<String>,
    pub code_postal: Option<String>,
    pub ville: Option<String>,
    pub pays: Option<String>,
    pub telephone: Option<String>,
    pub email: Option<String>,
    pub site_web: Option<String>,
    pub contact_principal: Option<ContactPrincipal>,
    pub notes: Option<String>,
    pub actif: bool,
    pub opco_rattachement: Option<String>,
    pub tags: Vec<String>,
    pub ypareo_id: Option<String>,
    pub last_sync_date: Option<DateTime<Utc>>,
    pub created_at: String,
    pub updated_at: String,
}

impl Entreprise {
    pub fn to_input(&self) -> EntrepriseInput {
        EntrepriseInput {
            raison_sociale: self.raison_sociale.clone(),
            siret: self.siret.clone(),
            siren: self.siren.clone(),
            numero_tva: self.numero_tva.clone(),
            type_entreprise: self.type_entreprise,
            secteur_activite: self.secteur_activite.clone(),
            effectif: self.effectif,
            adresse: self.adresse.clone(),
            code_postal: self.code_postal.clone(),
            ville: self.ville.clone(),
            pays: self.pays.clone(),
            telephone: self.telephone.clone(),
            email: self.email.clone(),
            site_web: self.site_web.clone(),
            contact_principal: self.contact_principal.clone(),
            notes: self.notes.clone(),
            actif: self.actif,
            opco_rattachement: self.opco_rattachement.clone(),
            tags: self.tags.clone(),
            ypareo_id: self.ypareo_id.clone(),
            last_sync_date: self.last_sync_date,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntrepriseInput {
    pub raison_sociale: String,
    pub siret: String,
    pub siren: Option<String>,
    pub numero_tva: Option<String>,
    #[serde(default)]
    pub type_entreprise: TypeEntreprise,
    pub secteur_activite: Option<String>,
    pub effectif: Option<i64>,
    pub adresse: Option<String>,
    pub code_postal: Option<String>,
    pub ville: Option<String>,
    pub pays: Option<String>,
    pub telephone: Option<String>,
    pub email: Option<String>,
    pub site_web: Option<String>,
    pub contact_principal: Option<ContactPrincipal>,
    pub notes: Option<String>,
    #[serde(default = "default_true")]
    pub actif: bool,
    pub opco_rattachement: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub ypareo_id: Option<String>,
    pub last_sync_date: Option<DateTime<Utc>>,
}

impl EntrepriseInput {
    pub fn validate(&self) -> Result<(), CrmError> {
        let mut v = Validator::new();
        v.required("raisonSociale", &self.raison_sociale)
            .max_len("raisonSociale", &self.raison_sociale, 255)
            .digits("siret", &self.siret, 14)
            .optional_digits("siren", self.siren.as_deref(), 9)
            .optional_email("email", self.email.as_deref())
            .check(
                "effectif",
                self.effectif.is_none_or(|e| e >= 0),
                "doit être positif ou nul",
            );
        if let Some(contact) = &self.contact_principal {
            v.optional_email("contactPrincipal.email", contact.email.as_deref());
        }
        if let Some(site) = &self.site_web {
            v.url("siteWeb", site);
        }
        v.finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntreprisePatch {
    pub raison_sociale: Option<String>,
    pub siret: Option<String>,
    pub siren: Option<String>,
    pub numero_tva: Option<String>,
    pub type_entreprise: Option<TypeEntreprise>,
    pub secteur_activite: Option<String>,
    pub effectif: Option<i64>,
    pub adresse: Option<String>,
    pub code_postal: Option<String>,
    pub ville: Option<String>,
    pub pays: Option<String>,
    pub telephone: Option<String>,
    pub email: Option<String>,
    pub site_web: Option<String>,
    pub contact_principal: Option<ContactPrincipal>,
    pub notes: Option<String>,
    pub actif: Option<bool>,
    pub opco_rattachement: Option<String>,
    pub tags: Option<Vec<String>>,
    pub ypareo_id: Option<String>,
    pub last_sync_date: Option<DateTime<Utc>>,
}

impl EntreprisePatch {
    pub fn apply_to(self, input: &mut EntrepriseInput) {
        merge(&mut input.raison_sociale, self.raison_sociale);
        merge(&mut input.siret, self.siret);
        merge_opt(&mut input.siren, self.siren);
        merge_opt(&mut input.numero_tva, self.numero_tva);
        merge(&mut input.type_entreprise, self.type_entreprise);
        merge_opt(&mut input.secteur_activite, self.secteur_activite);
        merge_opt(&mut input.effectif, self.effectif);
        merge_opt(&mut input.adresse, self.adresse);
        merge_opt(&mut input.code_postal, self.code_postal);
        merge_opt(&mut input.ville, self.ville);
        merge_opt(&mut input.pays, self.pays);
        merge_opt(&mut input.telephone, self.telephone);
        merge_opt(&mut input.email, self.email);
        merge_opt(&mut input.site_web, self.site_web);
        merge_opt(&mut input.contact_principal, self.contact_principal);
        merge_opt(&mut input.notes, self.notes);
        merge(&mut input.actif, self.actif);
        merge_opt(&mut input.opco_rattachement, self.opco_rattachement);
        merge(&mut input.tags, self.tags);
        merge_opt(&mut input.ypareo_id, self.ypareo_id);
        merge_opt(&mut input.last_sync_date, self.last_sync_date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> EntrepriseInput {
        serde_json::from_value(serde_json::json!({
            "raisonSociale": "Acme Industrie",
            "siret": "12345678901234",
        }))
        .unwrap()
    }

    #[test]
    fn test_input_defaults() {
        let input = sample_input();
        assert_eq!(input.type_entreprise, TypeEntreprise::Pme);
        assert!(input.actif);
        assert!(input.tags.is_empty());
        input.validate().unwrap();
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<EntrepriseInput, _> = serde_json::from_value(serde_json::json!({
            "raisonSociale": "Acme",
            "siret": "12345678901234",
            "chiffreAffaires": 12,
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_siret_and_email() {
        let mut input = sample_input();
        input.siret = "123".into();
        input.email = Some("nope".into());
        match input.validate() {
            Err(CrmError::Validation(errors)) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "siret");
                assert_eq!(errors[1].field, "email");
            }
            other => panic!("Expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_patch_merges_only_supplied_fields() {
        let mut input = sample_input();
        input.ville = Some("Laon".into());
        let patch: EntreprisePatch = serde_json::from_value(serde_json::json!({
            "raisonSociale": "Acme SAS",
            "ville": null,
            "typeEntreprise": "eti",
        }))
        .unwrap();
        patch.apply_to(&mut input);
        assert_eq!(input.raison_sociale, "Acme SAS");
        assert_eq!(input.ville.as_deref(), Some("Laon"));
        assert_eq!(input.type_entreprise, TypeEntreprise::Eti);
        assert_eq!(input.siret, "12345678901234");
    }
}
