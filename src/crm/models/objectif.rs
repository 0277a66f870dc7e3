use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Validator, default_true, merge, merge_opt, string_enum};
use crate::errors::CrmError;

string_enum! {
    pub enum TypeObjectif {
        ChiffreAffaires => "chiffre_affaires",
        NombreOpportunites => "nombre_opportunites",
        TauxConversion => "taux_conversion",
        NombreFormations => "nombre_formations",
        SatisfactionClient => "satisfaction_client",
        Custom => "custom",
    }
}

string_enum! {
    #[derive(Default)]
    pub enum PeriodiciteObjectif {
        #[default]
        Mensuel => "mensuel",
        Trimestriel => "trimestriel",
        Annuel => "annuel",
    }
}

/// A sales target for a user, a localisation or the whole organisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objectif {
    pub id: i64,
    pub titre: String,
    pub description: Option<String>,
    pub type_objectif: TypeObjectif,
    pub periodicite: PeriodiciteObjectif,
    pub cible: f64,
    pub realise: f64,
    pub unite: Option<String>,
    pub date_debut: NaiveDate,
    pub date_fin: NaiveDate,
    pub actif: bool,
    pub user_id: Option<i64>,
    pub localisation_id: Option<i64>,
    /// Derived from `realise / cible`.
    pub taux_realisation: f64,
    pub progression: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Percentage of the target reached; zero for a non-positive target.
pub fn taux_realisation(cible: f64, realise: f64) -> f64 {
    if cible > 0.0 {
        realise / cible * 100.0
    } else {
        0.0
    }
}

pub fn progression_label(taux: f64) -> &'static str {
    if taux >= 100.0 {
        "Objectif atteint"
    } else if taux >= 75.0 {
        "Bon progrès"
    } else if taux >= 50.0 {
        "En cours"
    } else if taux >= 25.0 {
        "Démarrage lent"
    } else {
        "Nécessite attention"
    }
}

impl Objectif {
    /// Fill the derived fields from `cible` and `realise`.
    pub fn with_progress(mut self) -> Self {
        self.taux_realisation = taux_realisation(self.cible, self.realise);
        self.progression = progression_label(self.taux_realisation).to_string();
        self
    }

    pub fn to_input(&self) -> ObjectifInput {
        ObjectifInput {
            titre: self.titre.clone(),
            description: self.description.clone(),
            type_objectif: self.type_objectif,
            periodicite: self.periodicite,
            cible: self.cible,
            realise: self.realise,
            unite: self.unite.clone(),
            date_debut: self.date_debut,
            date_fin: self.date_fin,
            actif: self.actif,
            user_id: self.user_id,
            localisation_id: self.localisation_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObjectifInput {
    pub titre: String,
    pub description: Option<String>,
    pub type_objectif: TypeObjectif,
    #[serde(default)]
    pub periodicite: PeriodiciteObjectif,
    pub cible: f64,
    #[serde(default)]
    pub realise: f64,
    pub unite: Option<String>,
    pub date_debut: NaiveDate,
    pub date_fin: NaiveDate,
    #[serde(default = "default_true")]
    pub actif: bool,
    pub user_id: Option<i64>,
    pub localisation_id: Option<i64>,
}

impl ObjectifInput {
    pub fn validate(&self) -> Result<(), CrmError> {
        Validator::new()
            .required("titre", &self.titre)
            .max_len("titre", &self.titre, 255)
            .check("cible", self.cible > 0.0, "doit être strictement positive")
            .non_negative("realise", Some(self.realise))
            .check(
                "dateFin",
                self.date_fin >= self.date_debut,
                "doit être postérieure à la date de début",
            )
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObjectifPatch {
    pub titre: Option<String>,
    pub description: Option<String>,
    pub type_objectif: Option<TypeObjectif>,
    pub periodicite: Option<PeriodiciteObjectif>,
    pub cible: Option<f64>,
    pub realise: Option<f64>,
    pub unite: Option<String>,
    pub date_debut: Option<NaiveDate>,
    pub date_fin: Option<NaiveDate>,
    pub actif: Option<bool>,
    pub user_id: Option<i64>,
    pub localisation_id: Option<i64>,
}

impl ObjectifPatch {
    pub fn apply_to(self, input: &mut ObjectifInput) {
        merge(&mut input.titre, self.titre);
        merge_opt(&mut input.description, self.description);
        merge(&mut input.type_objectif, self.type_objectif);
        merge(&mut input.periodicite, self.periodicite);
        merge(&mut input.cible, self.cible);
        merge(&mut input.realise, self.realise);
        merge_opt(&mut input.unite, self.unite);
        merge(&mut input.date_debut, self.date_debut);
        merge(&mut input.date_fin, self.date_fin);
        merge(&mut input.actif, self.actif);
        merge_opt(&mut input.user_id, self.user_id);
        merge_opt(&mut input.localisation_id, self.localisation_id);
    }
}
