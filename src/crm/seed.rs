//! Idempotent reference data: the permission matrix, the seven roles, the
//! AFPI localisations and the first administrator.
//!
//! Every step looks records up by their natural key first, so running the
//! seed again only fills what is missing. Role permissions are re-applied on
//! each run.

use anyhow::{Context, Result};
use tracing::info;

use super::auth::hash_password;
use super::db::CrmDb;
use super::models::{
    LocalisationInput, PermissionAction, PermissionResource, RoleInput, RoleType, UserInput,
};
use crate::config::SeedSection;

/// What a seed run created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
    pub localisations_created: usize,
    pub admin_created: bool,
}

impl std::fmt::Display for SeedReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} permissions, {} roles, {} localisations created; admin {}",
            self.permissions_created,
            self.roles_created,
            self.localisations_created,
            if self.admin_created { "created" } else { "already present" }
        )
    }
}

struct SeedLocalisation {
    code: &'static str,
    nom: &'static str,
    ville: &'static str,
    adresse: &'static str,
    code_postal: &'static str,
    telephone: &'static str,
    email: &'static str,
    site_web: &'static str,
}

const LOCALISATIONS: [SeedLocalisation; 5] = [
    SeedLocalisation {
        code: "AISNE",
        nom: "AFPI de l'Aisne",
        ville: "Laon",
        adresse: "Parc Technologique Delta 3",
        code_postal: "02000",
        telephone: "03 23 26 30 00",
        email: "afpi.aisne@formation-industries-aisne-oise.fr",
        site_web: "https://www.formation-industries-aisne-oise.fr",
    },
    SeedLocalisation {
        code: "OISE",
        nom: "AFPI de l'Oise",
        ville: "Beauvais",
        adresse: "Avenue du Parc",
        code_postal: "60000",
        telephone: "03 44 12 30 00",
        email: "afpi.oise@formation-industries-aisne-oise.fr",
        site_web: "https://www.formation-industries-aisne-oise.fr",
    },
    SeedLocalisation {
        code: "SOMME",
        nom: "AFPI de la Somme",
        ville: "Amiens",
        adresse: "Rue des Industries",
        code_postal: "80000",
        telephone: "03 22 54 30 00",
        email: "contact@afpi-somme.fr",
        site_web: "https://www.afpi-somme.fr",
    },
    SeedLocalisation {
        code: "NORD",
        nom: "AFPI du Nord",
        ville: "Lille",
        adresse: "Boulevard de la Formation",
        code_postal: "59000",
        telephone: "03 20 54 30 00",
        email: "contact@afpi-nord.fr",
        site_web: "https://www.afpi-nord.fr",
    },
    SeedLocalisation {
        code: "PAS_DE_CALAIS",
        nom: "AFPI du Pas-de-Calais",
        ville: "Arras",
        adresse: "Zone Industrielle",
        code_postal: "62000",
        telephone: "03 21 60 30 00",
        email: "contact@afpi-pas-de-calais.fr",
        site_web: "https://www.afpi-pas-de-calais.fr",
    },
];

/// Localisation the administrator is attached to.
const ADMIN_LOCALISATION: &str = "AISNE";

/// Run every seeding step in dependency order.
pub fn seed_all(db: &CrmDb, seed: &SeedSection) -> Result<SeedReport> {
    let mut report = SeedReport {
        permissions_created: seed_permissions(db)?,
        ..Default::default()
    };
    report.roles_created = seed_roles(db)?;
    report.localisations_created = seed_localisations(db)?;
    report.admin_created = seed_admin(db, seed)?;
    info!(%report, "Seeding completed");
    Ok(report)
}

pub fn seed_permissions(db: &CrmDb) -> Result<usize> {
    let mut created = 0;
    for action in PermissionAction::ALL {
        for resource in PermissionResource::ALL {
            let (permission, is_new) = db.ensure_permission(*action, *resource)?;
            if is_new {
                info!(permission = %permission.name, "Created permission");
                created += 1;
            }
        }
    }
    Ok(created)
}

/// Create missing roles and reset every role's permissions to its grants.
pub fn seed_roles(db: &CrmDb) -> Result<usize> {
    let permissions = db.list_permissions()?;
    let mut created = 0;
    for role_type in RoleType::ALL {
        let permission_ids: Vec<i64> = permissions
            .iter()
            .filter(|p| role_type.grants(p.action, p.resource))
            .map(|p| p.id)
            .collect();

        match db.get_role_by_type(*role_type)? {
            Some(existing) => {
                let mut input = existing.to_input();
                input.permission_ids = permission_ids;
                db.update_role(existing.id, &input)?;
                info!(role = role_type.display_name(), "Role already exists, permissions refreshed");
            }
            None => {
                let role = db.create_role(&RoleInput {
                    name: role_type.display_name().to_string(),
                    role_type: *role_type,
                    description: Some(role_type.description().to_string()),
                    level: role_type.level(),
                    actif: true,
                    permission_ids,
                })?;
                info!(
                    role = %role.name,
                    permissions = role.permissions.len(),
                    "Created role"
                );
                created += 1;
            }
        }
    }
    Ok(created)
}

pub fn seed_localisations(db: &CrmDb) -> Result<usize> {
    let mut created = 0;
    for loc in &LOCALISATIONS {
        if db.get_localisation_by_code(loc.code)?.is_some() {
            info!(localisation = loc.nom, "Localisation already exists");
            continue;
        }
        db.create_localisation(&LocalisationInput {
            code: loc.code.to_string(),
            nom: loc.nom.to_string(),
            ville: Some(loc.ville.to_string()),
            adresse: Some(loc.adresse.to_string()),
            code_postal: Some(loc.code_postal.to_string()),
            telephone: Some(loc.telephone.to_string()),
            email: Some(loc.email.to_string()),
            site_web: Some(loc.site_web.to_string()),
            actif: true,
        })?;
        info!(localisation = loc.nom, "Created localisation");
        created += 1;
    }
    Ok(created)
}

/// Create the administrator unless an account with that email exists.
pub fn seed_admin(db: &CrmDb, seed: &SeedSection) -> Result<bool> {
    if db.get_user_by_email(&seed.admin_email)?.is_some() {
        info!(email = %seed.admin_email, "Admin user already exists");
        return Ok(false);
    }
    let role = db
        .get_role_by_type(RoleType::Administrateur)?
        .context("Admin role not found; seed roles first")?;
    let localisation = db.get_localisation_by_code(ADMIN_LOCALISATION)?;

    let password_hash = hash_password(&seed.admin_password)?;
    db.create_user(
        &UserInput {
            email: seed.admin_email.clone(),
            first_name: "Admin".to_string(),
            last_name: "AFPI".to_string(),
            phone: Some("03 23 26 30 00".to_string()),
            avatar: None,
            actif: true,
            role_id: role.id,
            localisation_id: localisation.map(|l| l.id),
            managed_localisations: vec![],
        },
        &password_hash,
    )?;
    info!(email = %seed.admin_email, "Created admin user");
    Ok(true)
}
