//! Typed error hierarchy for the CRM back-end.
//!
//! `CrmError` carries the domain failures the HTTP layer maps onto status
//! codes. Database plumbing stays on `anyhow` with `.context(..)`; a
//! `CrmError` travelling inside an `anyhow::Error` is recovered by downcasting
//! in `crm::api::ApiError`.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The kinds of record the API exposes, used to phrase "not found" errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Entreprise,
    Opportunite,
    Objectif,
    Localisation,
    Formateur,
    Notification,
    Plugin,
    YpareoConfig,
    DashboardStat,
    User,
    Role,
    Permission,
}

impl Entity {
    fn label(&self) -> &'static str {
        match self {
            Entity::Entreprise => "Entreprise",
            Entity::Opportunite => "Opportunité",
            Entity::Objectif => "Objectif",
            Entity::Localisation => "Localisation",
            Entity::Formateur => "Formateur",
            Entity::Notification => "Notification",
            Entity::Plugin => "Plugin",
            Entity::YpareoConfig => "Configuration Ypareo",
            Entity::DashboardStat => "Statistique",
            Entity::User => "Utilisateur",
            Entity::Role => "Rôle",
            Entity::Permission => "Permission",
        }
    }

    /// Past participle agreeing with the entity's grammatical gender.
    pub fn not_found_word(&self) -> &'static str {
        match self {
            Entity::Entreprise
            | Entity::Opportunite
            | Entity::Localisation
            | Entity::Notification
            | Entity::YpareoConfig
            | Entity::DashboardStat
            | Entity::Permission => "non trouvée",
            _ => "non trouvé",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One failed validation rule on one request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Errors from the CRM services and their HTTP surface.
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("{entity} avec l'ID {id} {}", .entity.not_found_word())]
    NotFound { entity: Entity, id: i64 },

    #[error("Les données fournies sont invalides ({} erreur(s))", .0.len())]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrmError {
    pub fn not_found(entity: Entity, id: i64) -> Self {
        CrmError::NotFound { entity, id }
    }
}
