//! Password hashing and access tokens.
//!
//! Passwords are stored as Argon2id PHC strings. Access tokens are HS256
//! JWTs carrying the user id, role type and permission names; the HTTP layer
//! still reloads the user on each request, so the embedded permissions are
//! informational for clients.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{RoleType, User};
use crate::config::MIN_JWT_SECRET_LEN;

const ISSUER: &str = "afpi-crm";
const AUDIENCE: &str = "afpi-crm-api";

// ── Passwords ─────────────────────────────────────────────────────────

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {e}"))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash: {e}"))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("Password verification failed: {e}")),
    }
}

/// `hash_password` on the blocking pool, away from async workers and the
/// database lock.
pub async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task panicked")?
}

/// `verify_password` on the blocking pool.
pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("Password verification task panicked")?
}

// ── Tokens ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub role: Option<RoleType>,
    pub permissions: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64> {
        self.sub
            .parse()
            .map_err(|_| anyhow!("Invalid subject in token: {}", self.sub))
    }
}

/// Signs and validates access tokens with a shared HS256 secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn from_secret(secret: &str, ttl_minutes: i64) -> Result<Self> {
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(anyhow!(
                "JWT secret must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            ));
        }
        if ttl_minutes <= 0 {
            return Err(anyhow!("Token lifetime must be positive"));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
        })
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    pub fn issue(&self, user: &User, permissions: Vec<String>) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role_type,
            permissions,
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to sign token: {e}"))
    }

    pub fn validate(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.leeway = 30;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| anyhow!("Token validation failed: {e}"))
    }
}

/// The token part of an `Authorization: Bearer <token>` header.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
