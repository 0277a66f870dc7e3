use serde::{Deserialize, Serialize};

use super::{Validator, merge, merge_opt};
use crate::errors::CrmError;

/// A registered extension with its free-form configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub id: i64,
    pub nom: String,
    pub version: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub config: Option<serde_json::Value>,
    pub hooks: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Plugin {
    pub fn to_input(&self) -> PluginInput {
        PluginInput {
            nom: self.nom.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            enabled: self.enabled,
            config: self.config.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PluginInput {
    pub nom: String,
    pub version: String,
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub hooks: Vec<String>,
}

impl PluginInput {
    pub fn validate(&self) -> Result<(), CrmError> {
        Validator::new()
            .required("nom", &self.nom)
            .max_len("nom", &self.nom, 100)
            .required("version", &self.version)
            .check(
                "hooks",
                self.hooks.iter().all(|h| !h.trim().is_empty()),
                "ne doit pas contenir de valeur vide",
            )
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PluginPatch {
    pub nom: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub config: Option<serde_json::Value>,
    pub hooks: Option<Vec<String>>,
}

impl PluginPatch {
    pub fn apply_to(self, input: &mut PluginInput) {
        merge(&mut input.nom, self.nom);
        merge(&mut input.version, self.version);
        merge_opt(&mut input.description, self.description);
        merge(&mut input.enabled, self.enabled);
        merge_opt(&mut input.config, self.config);
        merge(&mut input.hooks, self.hooks);
    }
}
