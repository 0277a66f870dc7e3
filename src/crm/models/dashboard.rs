use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Validator, merge, merge_opt};
use crate::errors::CrmError;

/// A stored daily figure for a user and/or a localisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStat {
    pub id: i64,
    pub utilisateur_id: Option<i64>,
    pub localisation_id: Option<i64>,
    pub date: NaiveDate,
    pub ca: f64,
    pub nb_opportunites: i64,
    pub nb_opportunites_gagnees: i64,
    pub taux_conversion: f64,
    pub created_at: String,
}

impl DashboardStat {
    pub fn to_input(&self) -> DashboardStatInput {
        DashboardStatInput {
            utilisateur_id: self.utilisateur_id,
            localisation_id: self.localisation_id,
            date: self.date,
            ca: self.ca,
            nb_opportunites: self.nb_opportunites,
            nb_opportunites_gagnees: self.nb_opportunites_gagnees,
            taux_conversion: self.taux_conversion,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DashboardStatInput {
    pub utilisateur_id: Option<i64>,
    pub localisation_id: Option<i64>,
    pub date: NaiveDate,
    #[serde(default)]
    pub ca: f64,
    #[serde(default)]
    pub nb_opportunites: i64,
    #[serde(default)]
    pub nb_opportunites_gagnees: i64,
    #[serde(default)]
    pub taux_conversion: f64,
}

impl DashboardStatInput {
    pub fn validate(&self) -> Result<(), CrmError> {
        Validator::new()
            .non_negative("ca", Some(self.ca))
            .check("nbOpportunites", self.nb_opportunites >= 0, "doit être positif ou nul")
            .check(
                "nbOpportunitesGagnees",
                (0..=self.nb_opportunites).contains(&self.nb_opportunites_gagnees),
                "doit être compris entre 0 et nbOpportunites",
            )
            .check(
                "tauxConversion",
                (0.0..=100.0).contains(&self.taux_conversion),
                "doit être compris entre 0 et 100",
            )
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DashboardStatPatch {
    pub utilisateur_id: Option<i64>,
    pub localisation_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub ca: Option<f64>,
    pub nb_opportunites: Option<i64>,
    pub nb_opportunites_gagnees: Option<i64>,
    pub taux_conversion: Option<f64>,
}

impl DashboardStatPatch {
    pub fn apply_to(self, input: &mut DashboardStatInput) {
        merge_opt(&mut input.utilisateur_id, self.utilisateur_id);
        merge_opt(&mut input.localisation_id, self.localisation_id);
        merge(&mut input.date, self.date);
        merge(&mut input.ca, self.ca);
        merge(&mut input.nb_opportunites, self.nb_opportunites);
        merge(&mut input.nb_opportunites_gagnees, self.nb_opportunites_gagnees);
        merge(&mut input.taux_conversion, self.taux_conversion);
    }
}

/// Live figures computed from opportunités and objectifs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub total_ca: f64,
    pub total_opportunites: i64,
    pub opportunites_gagnees: i64,
    pub conversion_rate: f64,
    pub target_ca: f64,
    pub target_opportunites: f64,
    pub target_conversion_rate: f64,
}

/// Per-localisation breakdown of the live figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalisationPerformance {
    pub localisation_id: Option<i64>,
    pub name: String,
    pub ca: f64,
    pub opportunites: i64,
    pub conversion: f64,
}

/// Won over total as a percentage; zero without opportunités.
pub fn conversion_rate(won: i64, total: i64) -> f64 {
    if total > 0 {
        won as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}
