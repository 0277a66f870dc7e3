//! Shared types for the CRM resources.
//!
//! Each resource module defines three shapes:
//! - the entity returned by the API (camelCase JSON),
//! - an `*Input` carrying every writable field, used for create and as the
//!   merge target of updates,
//! - an `*Patch` where every field is optional.
//!
//! Updates load the stored entity, turn it back into its input, apply the
//! patch and re-run the create validation on the merged result.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{CrmError, FieldError};

/// Declare a closed set of string values stored as TEXT and exchanged as
/// JSON strings.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| rusqlite::types::FromSqlError::Other(e.into()))
            }
        }
    };
}

pub(crate) use string_enum;

pub mod dashboard;
pub mod entreprise;
pub mod formateur;
pub mod localisation;
pub mod notification;
pub mod objectif;
pub mod opportunite;
pub mod plugin;
pub mod role;
pub mod user;
pub mod ypareo;

pub use dashboard::*;
pub use entreprise::*;
pub use formateur::*;
pub use localisation::*;
pub use notification::*;
pub use objectif::*;
pub use opportunite::*;
pub use plugin::*;
pub use role::*;
pub use user::*;
pub use ypareo::*;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap());

/// Collects field errors and turns them into a single `CrmError::Validation`.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, field: &str, ok: bool, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    /// Non-blank string.
    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        self.check(field, !value.trim().is_empty(), "ne doit pas être vide")
    }

    pub fn max_len(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        let ok = value.chars().count() <= max;
        self.check(field, ok, &format!("ne doit pas dépasser {} caractères", max))
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        self.check(field, EMAIL_REGEX.is_match(value), "doit être une adresse email valide")
    }

    pub fn optional_email(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => self.email(field, v),
            None => self,
        }
    }

    pub fn url(&mut self, field: &str, value: &str) -> &mut Self {
        self.check(field, URL_REGEX.is_match(value), "doit être une URL http(s) valide")
    }

    /// Exactly `len` ASCII digits.
    pub fn digits(&mut self, field: &str, value: &str, len: usize) -> &mut Self {
        let ok = value.len() == len && value.bytes().all(|b| b.is_ascii_digit());
        self.check(field, ok, &format!("doit contenir exactement {} chiffres", len))
    }

    pub fn optional_digits(&mut self, field: &str, value: Option<&str>, len: usize) -> &mut Self {
        match value {
            Some(v) => self.digits(field, v, len),
            None => self,
        }
    }

    pub fn non_negative(&mut self, field: &str, value: Option<f64>) -> &mut Self {
        let ok = value.is_none_or(|v| v >= 0.0);
        self.check(field, ok, "doit être positif ou nul")
    }

    pub fn finish(&mut self) -> Result<(), CrmError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CrmError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

pub(crate) fn default_true() -> bool {
    true
}

/// Overwrite `target` with `value` when the patch carries one.
pub(crate) fn merge<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

/// Like [`merge`] for nullable fields.
pub(crate) fn merge_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}
