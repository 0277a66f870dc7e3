//! Roles and the `(action, resource)` permission matrix.
//!
//! Every action/resource pair is one permission named `<action>_<resource>`.
//! The seven role archetypes receive fixed subsets, see [`RoleType::grants`].

use serde::{Deserialize, Serialize};

use super::{Validator, default_true, merge, merge_opt, string_enum};
use crate::errors::CrmError;

string_enum! {
    pub enum PermissionAction {
        Create => "create",
        Read => "read",
        Update => "update",
        Delete => "delete",
        Validate => "validate",
        Export => "export",
        Manage => "manage",
    }
}

string_enum! {
    pub enum PermissionResource {
        Users => "users",
        Roles => "roles",
        Entreprises => "entreprises",
        Opportunites => "opportunites",
        Objectifs => "objectifs",
        Dashboard => "dashboard",
        Localisations => "localisations",
        Formateurs => "formateurs",
        Ypareo => "ypareo",
        Plugins => "plugins",
        Settings => "settings",
    }
}

string_enum! {
    pub enum RoleType {
        Administrateur => "administrateur",
        ResponsableCommercial => "responsable_commercial",
        Manager => "manager",
        Commercial => "commercial",
        Planificateur => "planificateur",
        Assistante => "assistante",
        Facturation => "facturation",
    }
}

/// `<action>_<resource>`, e.g. `read_entreprises`.
pub fn permission_name(action: PermissionAction, resource: PermissionResource) -> String {
    format!("{}_{}", action.as_str(), resource.as_str())
}

impl RoleType {
    pub fn display_name(&self) -> &'static str {
        match self {
            RoleType::Administrateur => "Administrateur",
            RoleType::ResponsableCommercial => "Responsable Commercial",
            RoleType::Manager => "Manager",
            RoleType::Commercial => "Commercial",
            RoleType::Planificateur => "Planificateur",
            RoleType::Assistante => "Assistante",
            RoleType::Facturation => "Facturation",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RoleType::Administrateur => "Accès complet à toutes les fonctionnalités",
            RoleType::ResponsableCommercial => {
                "Gestion des équipes commerciales et validation des opportunités"
            }
            RoleType::Manager => "Gestion d'une localisation et de son équipe",
            RoleType::Commercial => "Gestion des opportunités commerciales",
            RoleType::Planificateur => "Planification des formations et gestion des formateurs",
            RoleType::Assistante => "Support administratif et saisie des données",
            RoleType::Facturation => "Gestion de la facturation",
        }
    }

    /// Hierarchy level; lower is more privileged.
    pub fn level(&self) -> i64 {
        match self {
            RoleType::Administrateur => 0,
            RoleType::ResponsableCommercial => 1,
            RoleType::Manager => 2,
            _ => 3,
        }
    }

    /// Whether the seeded role of this type holds `action` on `resource`.
    pub fn grants(&self, action: PermissionAction, resource: PermissionResource) -> bool {
        use PermissionAction as A;
        use PermissionResource as R;
        match self {
            RoleType::Administrateur => true,
            RoleType::ResponsableCommercial => resource != R::Settings,
            RoleType::Manager => matches!(
                resource,
                R::Opportunites | R::Entreprises | R::Objectifs | R::Dashboard | R::Formateurs | R::Users
            ),
            RoleType::Commercial => match resource {
                R::Opportunites => true,
                R::Entreprises => matches!(action, A::Read | A::Create | A::Update),
                R::Dashboard => action == A::Read,
                _ => false,
            },
            RoleType::Planificateur => {
                matches!(resource, R::Formateurs | R::Opportunites | R::Dashboard)
                    && matches!(action, A::Read | A::Update)
            }
            RoleType::Assistante => {
                matches!(resource, R::Entreprises | R::Opportunites | R::Dashboard)
                    && matches!(action, A::Read | A::Create | A::Update)
            }
            RoleType::Facturation => match resource {
                R::Opportunites => matches!(action, A::Read | A::Update),
                R::Entreprises | R::Dashboard => action == A::Read,
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub action: PermissionAction,
    pub resource: PermissionResource,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub role_type: RoleType,
    pub description: Option<String>,
    pub level: i64,
    pub actif: bool,
    pub permissions: Vec<Permission>,
    pub created_at: String,
    pub updated_at: String,
}

impl Role {
    pub fn to_input(&self) -> RoleInput {
        RoleInput {
            name: self.name.clone(),
            role_type: self.role_type,
            description: self.description.clone(),
            level: self.level,
            actif: self.actif,
            permission_ids: self.permissions.iter().map(|p| p.id).collect(),
        }
    }

    pub fn permission_names(&self) -> Vec<String> {
        self.permissions.iter().map(|p| p.name.clone()).collect()
    }
}

fn default_level() -> i64 {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleInput {
    pub name: String,
    #[serde(rename = "type")]
    pub role_type: RoleType,
    pub description: Option<String>,
    #[serde(default = "default_level")]
    pub level: i64,
    #[serde(default = "default_true")]
    pub actif: bool,
    #[serde(default)]
    pub permission_ids: Vec<i64>,
}

impl RoleInput {
    pub fn validate(&self) -> Result<(), CrmError> {
        Validator::new()
            .required("name", &self.name)
            .max_len("name", &self.name, 100)
            .check("level", self.level >= 0, "doit être positif ou nul")
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RolePatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub role_type: Option<RoleType>,
    pub description: Option<String>,
    pub level: Option<i64>,
    pub actif: Option<bool>,
    pub permission_ids: Option<Vec<i64>>,
}

impl RolePatch {
    pub fn apply_to(self, input: &mut RoleInput) {
        merge(&mut input.name, self.name);
        merge(&mut input.role_type, self.role_type);
        merge_opt(&mut input.description, self.description);
        merge(&mut input.level, self.level);
        merge(&mut input.actif, self.actif);
        merge(&mut input.permission_ids, self.permission_ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granted(role: RoleType) -> usize {
        PermissionAction::ALL
            .iter()
            .flat_map(|a| PermissionResource::ALL.iter().map(move |r| (*a, *r)))
            .filter(|(a, r)| role.grants(*a, *r))
            .count()
    }

    #[test]
    fn test_permission_matrix_size() {
        assert_eq!(PermissionAction::ALL.len() * PermissionResource::ALL.len(), 77);
    }

    #[test]
    fn test_permission_name() {
        assert_eq!(
            permission_name(PermissionAction::Read, PermissionResource::Entreprises),
            "read_entreprises"
        );
    }

    #[test]
    fn test_role_permission_counts() {
        assert_eq!(granted(RoleType::Administrateur), 77);
        assert_eq!(granted(RoleType::ResponsableCommercial), 70);
        assert_eq!(granted(RoleType::Manager), 42);
        assert_eq!(granted(RoleType::Commercial), 11);
        assert_eq!(granted(RoleType::Planificateur), 6);
        assert_eq!(granted(RoleType::Assistante), 9);
        assert_eq!(granted(RoleType::Facturation), 4);
    }

    #[test]
    fn test_commercial_cannot_delete_entreprises() {
        assert!(RoleType::Commercial.grants(PermissionAction::Update, PermissionResource::Entreprises));
        assert!(!RoleType::Commercial.grants(PermissionAction::Delete, PermissionResource::Entreprises));
        assert!(RoleType::Commercial.grants(PermissionAction::Delete, PermissionResource::Opportunites));
    }

    #[test]
    fn test_levels() {
        assert_eq!(RoleType::Administrateur.level(), 0);
        assert_eq!(RoleType::ResponsableCommercial.level(), 1);
        assert_eq!(RoleType::Manager.level(), 2);
        assert_eq!(RoleType::Facturation.level(), 3);
    }

    #[test]
    fn test_role_type_serializes_as_type() {
        let input: RoleInput = serde_json::from_value(serde_json::json!({
            "name": "Commercial",
            "type": "commercial",
        }))
        .unwrap();
        assert_eq!(input.role_type, RoleType::Commercial);
        assert_eq!(input.level, 3);
        assert!(input.permission_ids.is_empty());
    }
}
