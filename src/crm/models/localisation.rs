use serde::{Deserialize, Serialize};

use super::{Validator, default_true, merge, merge_opt};
use crate::errors::CrmError;

/// A regional AFPI centre.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Localisation {
    pub id: i64,
    pub code: String,
    pub nom: String,
    pub ville: Option<String>,
    pub adresse: Option<String>,
    pub code_postal: Option<String>,
    pub telephone: Option<String>,
    pub email: Option<String>,
    pub site_web: Option<String>,
    pub actif: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Localisation {
    pub fn to_input(&self) -> LocalisationInput {
        LocalisationInput {
            code: self.code.clone(),
            nom: self.nom.clone(),
            ville: self.ville.clone(),
            adresse: self.adresse.clone(),
            code_postal: self.code_postal.clone(),
            telephone: self.telephone.clone(),
            email: self.email.clone(),
            site_web: self.site_web.clone(),
            actif: self.actif,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LocalisationInput {
    pub code: String,
    pub nom: String,
    #[serde(default)]
    pub ville: Option<String>,
    #[serde(default)]
    pub adresse: Option<String>,
    #[serde(default)]
    pub code_postal: Option<String>,
    #[serde(default)]
    pub telephone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub site_web: Option<String>,
    #[serde(default = "default_true")]
    pub actif: bool,
}

impl LocalisationInput {
    pub fn validate(&self) -> Result<(), CrmError> {
        let mut v = Validator::new();
        v.required("code", &self.code)
            .max_len("code", &self.code, 50)
            .required("nom", &self.nom)
            .max_len("nom", &self.nom, 255)
            .optional_email("email", self.email.as_deref());
        if let Some(site) = &self.site_web {
            v.url("siteWeb", site);
        }
        v.finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LocalisationPatch {
    pub code: Option<String>,
    pub nom: Option<String>,
    pub ville: Option<String>,
    pub adresse: Option<String>,
    pub code_postal: Option<String>,
    pub telephone: Option<String>,
    pub email: Option<String>,
    pub site_web: Option<String>,
    pub actif: Option<bool>,
}

impl LocalisationPatch {
    pub fn apply_to(self, input: &mut LocalisationInput) {
        merge(&mut input.code, self.code);
        merge(&mut input.nom, self.nom);
        merge_opt(&mut input.ville, self.ville);
        merge_opt(&mut input.adresse, self.adresse);
        merge_opt(&mut input.code_postal, self.code_postal);
        merge_opt(&mut input.telephone, self.telephone);
        merge_opt(&mut input.email, self.email);
        merge_opt(&mut input.site_web, self.site_web);
        merge(&mut input.actif, self.actif);
    }
}
