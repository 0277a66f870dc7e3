use serde::{Deserialize, Serialize};

use super::{Validator, merge, merge_opt, string_enum};
use crate::errors::CrmError;

string_enum! {
    #[derive(Default)]
    pub enum TypeNotification {
        #[default]
        Info => "info",
        Success => "success",
        Warning => "warning",
        Error => "error",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub utilisateur_id: i64,
    pub titre: Option<String>,
    pub message: String,
    #[serde(rename = "type")]
    pub type_notification: TypeNotification,
    pub lu: bool,
    pub lien: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Notification {
    pub fn to_input(&self) -> NotificationInput {
        NotificationInput {
            utilisateur_id: self.utilisateur_id,
            titre: self.titre.clone(),
            message: self.message.clone(),
            type_notification: self.type_notification,
            lu: self.lu,
            lien: self.lien.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NotificationInput {
    pub utilisateur_id: i64,
    pub titre: Option<String>,
    pub message: String,
    #[serde(rename = "type", default)]
    pub type_notification: TypeNotification,
    #[serde(default)]
    pub lu: bool,
    pub lien: Option<String>,
}

impl NotificationInput {
    pub fn validate(&self) -> Result<(), CrmError> {
        Validator::new()
            .check("utilisateurId", self.utilisateur_id > 0, "doit référencer un utilisateur")
            .required("message", &self.message)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NotificationPatch {
    pub utilisateur_id: Option<i64>,
    pub titre: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub type_notification: Option<TypeNotification>,
    pub lu: Option<bool>,
    pub lien: Option<String>,
}

impl NotificationPatch {
    pub fn apply_to(self, input: &mut NotificationInput) {
        merge(&mut input.utilisateur_id, self.utilisateur_id);
        merge_opt(&mut input.titre, self.titre);
        merge(&mut input.message, self.message);
        merge(&mut input.type_notification, self.type_notification);
        merge(&mut input.lu, self.lu);
        merge_opt(&mut input.lien, self.lien);
    }
}

/// Query-string filters for `GET /api/notifications`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilter {
    pub utilisateur_id: Option<i64>,
    pub lu: Option<bool>,
}
