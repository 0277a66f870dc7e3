use serde::{Deserialize, Serialize};

use super::{Validator, default_true, merge, merge_opt, string_enum};
use crate::errors::CrmError;

string_enum! {
    #[derive(Default)]
    pub enum StatutFormateur {
        #[default]
        Actif => "actif",
        Inactif => "inactif",
        Vacataire => "vacataire",
        Permanent => "permanent",
    }
}

/// A trainer who can be assigned to opportunités.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Formateur {
    pub id: i64,
    pub nom: String,
    pub prenom: String,
    pub full_name: String,
    pub email: String,
    pub telephone: Option<String>,
    pub statut: StatutFormateur,
    pub competences: Vec<String>,
    pub domaines_expertise: Vec<String>,
    pub disponible: bool,
    pub localisation_id: Option<i64>,
    pub numero_siret: Option<String>,
    pub taux_horaire: Option<f64>,
    pub notes: Option<String>,
    pub ypareo_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Formateur {
    pub fn to_input(&self) -> FormateurInput {
        FormateurInput {
            nom: self.nom.clone(),
            prenom: self.prenom.clone(),
            email: self.email.clone(),
            telephone: self.telephone.clone(),
            statut: self.statut,
            competences: self.competences.clone(),
            domaines_expertise: self.domaines_expertise.clone(),
            disponible: self.disponible,
            localisation_id: self.localisation_id,
            numero_siret: self.numero_siret.clone(),
            taux_horaire: self.taux_horaire,
            notes: self.notes.clone(),
            ypareo_id: self.ypareo_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FormateurInput {
    pub nom: String,
    pub prenom: String,
    pub email: String,
    pub telephone: Option<String>,
    #[serde(default)]
    pub statut: StatutFormateur,
    #[serde(default)]
    pub competences: Vec<String>,
    #[serde(default)]
    pub domaines_expertise: Vec<String>,
    #[serde(default = "default_true")]
    pub disponible: bool,
    pub localisation_id: Option<i64>,
    pub numero_siret: Option<String>,
    pub taux_horaire: Option<f64>,
    pub notes: Option<String>,
    pub ypareo_id: Option<String>,
}

impl FormateurInput {
    pub fn validate(&self) -> Result<(), CrmError> {
        Validator::new()
            .required("nom", &self.nom)
            .required("prenom", &self.prenom)
            .email("email", &self.email)
            .optional_digits("numeroSiret", self.numero_siret.as_deref(), 14)
            .non_negative("tauxHoraire", self.taux_horaire)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FormateurPatch {
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub email: Option<String>,
    pub telephone: Option<String>,
    pub statut: Option<StatutFormateur>,
    pub competences: Option<Vec<String>>,
    pub domaines_expertise: Option<Vec<String>>,
    pub disponible: Option<bool>,
    pub localisation_id: Option<i64>,
    pub numero_siret: Option<String>,
    pub taux_horaire: Option<f64>,
    pub notes: Option<String>,
    pub ypareo_id: Option<String>,
}

impl FormateurPatch {
    pub fn apply_to(self, input: &mut FormateurInput) {
        merge(&mut input.nom, self.nom);
        merge(&mut input.prenom, self.prenom);
        merge(&mut input.email, self.email);
        merge_opt(&mut input.telephone, self.telephone);
        merge(&mut input.statut, self.statut);
        merge(&mut input.competences, self.competences);
        merge(&mut input.domaines_expertise, self.domaines_expertise);
        merge(&mut input.disponible, self.disponible);
        merge_opt(&mut input.localisation_id, self.localisation_id);
        merge_opt(&mut input.numero_siret, self.numero_siret);
        merge_opt(&mut input.taux_horaire, self.taux_horaire);
        merge_opt(&mut input.notes, self.notes);
        merge_opt(&mut input.ypareo_id, self.ypareo_id);
    }
}
