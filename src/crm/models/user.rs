use serde::{Deserialize, Serialize};

use super::{RoleType, Validator, default_true, merge, merge_opt};
use crate::errors::CrmError;

pub const MIN_PASSWORD_LEN: usize = 8;

/// An account able to log in to the CRM.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    /// Argon2 PHC string; never leaves the server.
    #[serde(skip)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub actif: bool,
    pub role_id: i64,
    pub role_name: Option<String>,
    pub role_type: Option<RoleType>,
    pub localisation_id: Option<i64>,
    pub managed_localisations: Vec<i64>,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// The writable profile; the password hash is never part of it.
    pub fn to_input(&self) -> UserInput {
        UserInput {
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            avatar: self.avatar.clone(),
            actif: self.actif,
            role_id: self.role_id,
            localisation_id: self.localisation_id,
            managed_localisations: self.managed_localisations.clone(),
        }
    }
}

/// Minimum length rule shared by creation and password changes.
pub fn validate_password(password: &str) -> Result<(), CrmError> {
    Validator::new()
        .check(
            "password",
            password.chars().count() >= MIN_PASSWORD_LEN,
            "doit contenir au moins 8 caractères",
        )
        .finish()
}

/// Writable user profile. Passwords travel separately and reach the
/// database only as Argon2 hashes.
#[derive(Debug, Clone)]
pub struct UserInput {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub actif: bool,
    pub role_id: i64,
    pub localisation_id: Option<i64>,
    pub managed_localisations: Vec<i64>,
}

impl UserInput {
    fn check_fields(&self, validator: &mut Validator) {
        validator
            .email("email", &self.email)
            .required("firstName", &self.first_name)
            .required("lastName", &self.last_name)
            .check("roleId", self.role_id > 0, "doit référencer un rôle");
    }

    pub fn validate(&self) -> Result<(), CrmError> {
        let mut validator = Validator::new();
        self.check_fields(&mut validator);
        validator.finish()
    }
}

/// `POST /api/users` body: the profile plus a plain-text password.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    #[serde(default = "default_true")]
    pub actif: bool,
    pub role_id: i64,
    pub localisation_id: Option<i64>,
    #[serde(default)]
    pub managed_localisations: Vec<i64>,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), CrmError> {
        let input = self.clone().into_parts().0;
        let mut validator = Validator::new();
        input.check_fields(&mut validator);
        validator
            .check(
                "password",
                self.password.chars().count() >= MIN_PASSWORD_LEN,
                "doit contenir au moins 8 caractères",
            )
            .finish()
    }

    /// Split into the stored profile and the password still to hash.
    pub fn into_parts(self) -> (UserInput, String) {
        (
            UserInput {
                email: self.email,
                first_name: self.first_name,
                last_name: self.last_name,
                phone: self.phone,
                avatar: self.avatar,
                actif: self.actif,
                role_id: self.role_id,
                localisation_id: self.localisation_id,
                managed_localisations: self.managed_localisations,
            },
            self.password,
        )
    }
}

/// Partial update. `password` is not merged into the profile; the handler
/// hashes it and stores it alongside.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserPatch {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub actif: Option<bool>,
    pub role_id: Option<i64>,
    pub localisation_id: Option<i64>,
    pub managed_localisations: Option<Vec<i64>>,
}

impl UserPatch {
    pub fn apply_to(self, input: &mut UserInput) {
        merge(&mut input.email, self.email);
        merge(&mut input.first_name, self.first_name);
        merge(&mut input.last_name, self.last_name);
        merge_opt(&mut input.phone, self.phone);
        merge_opt(&mut input.avatar, self.avatar);
        merge(&mut input.actif, self.actif);
        merge(&mut input.role_id, self.role_id);
        merge_opt(&mut input.localisation_id, self.localisation_id);
        merge(&mut input.managed_localisations, self.managed_localisations);
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// Seconds until the token expires.
    pub expires_in: i64,
    pub user: User,
}

/// `GET /api/auth/me` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub user: User,
    pub permissions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_is_not_serialized() {
        let user = User {
            id: 1,
            email: "admin@afpi-crm.fr".into(),
            password_hash: "$argon2id$v=19$secret".into(),
            first_name: "Admin".into(),
            last_name: "AFPI".into(),
            full_name: "Admin AFPI".into(),
            phone: None,
            avatar: None,
            actif: true,
            role_id: 1,
            role_name: None,
            role_type: None,
            localisation_id: None,
            managed_localisations: vec![],
            last_login_at: None,
            created_at: "2025-01-01 00:00:00".into(),
            updated_at: "2025-01-01 00:00:00".into(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password").is_none());
        assert_eq!(json["fullName"], "Admin AFPI");
    }

    #[test]
    fn test_short_password_rejected() {
        let input: NewUser = serde_json::from_value(serde_json::json!({
            "email": "c@afpi.fr",
            "password": "short",
            "firstName": "Claire",
            "lastName": "Petit",
            "roleId": 2,
        }))
        .unwrap();
        assert!(matches!(input.validate(), Err(CrmError::Validation(_))));
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
    }

    #[test]
    fn test_new_user_splits_password_from_profile() {
        let input: NewUser = serde_json::from_value(serde_json::json!({
            "email": "c@afpi.fr",
            "password": "$argon2-but-plain",
            "firstName": "Claire",
            "lastName": "Petit",
            "roleId": 2,
        }))
        .unwrap();
        input.validate().unwrap();
        let (profile, password) = input.into_parts();
        assert_eq!(profile.role_id, 2);
        assert!(profile.actif);
        assert_eq!(password, "$argon2-but-plain");
    }
}
