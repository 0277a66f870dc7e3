//! Bearer authentication, permission checks and the `/api/auth` routes.

use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{header, request::Parts},
    response::IntoResponse,
    routing::{get, post},
};
use tracing::info;

use super::{ApiError, ApiJson, SharedState};
use crate::crm::auth::{extract_bearer_token, verify_password_blocking};
use crate::crm::models::{
    Actor, CurrentUser, LoginRequest, LoginResponse, PermissionAction, PermissionResource, User,
    permission_name,
};
use crate::errors::CrmError;

const INVALID_CREDENTIALS: &str = "Email ou mot de passe incorrect";
const INACTIVE_ACCOUNT: &str = "Ce compte est désactivé";

/// The caller behind a valid bearer token, reloaded from the database so a
/// deactivated account or a changed role applies immediately.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub permissions: Vec<String>,
}

impl AuthUser {
    pub fn has_permission(&self, action: PermissionAction, resource: PermissionResource) -> bool {
        let name = permission_name(action, resource);
        self.permissions.iter().any(|p| *p == name)
    }

    pub fn require(
        &self,
        action: PermissionAction,
        resource: PermissionResource,
    ) -> Result<(), ApiError> {
        if self.has_permission(action, resource) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Permission requise : {}",
                permission_name(action, resource)
            )))
        }
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: Some(self.user.id),
            user_name: Some(self.user.full_name.clone()),
        }
    }
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(extract_bearer_token)
            .ok_or_else(|| ApiError::Unauthorized("Jeton d'authentification manquant".into()))?;

        let claims = state
            .tokens
            .validate(token)
            .map_err(|_| ApiError::Unauthorized("Jeton d'authentification invalide ou expiré".into()))?;
        let user_id = claims
            .user_id()
            .map_err(|_| ApiError::Unauthorized("Jeton d'authentification invalide".into()))?;

        let loaded = state
            .db
            .call(move |db| {
                let Some(user) = db.get_user(user_id)? else {
                    return Ok(None);
                };
                let permissions = db.user_permission_names(user_id)?;
                Ok(Some((user, permissions)))
            })
            .await?;

        match loaded {
            Some((user, permissions)) if user.actif => Ok(AuthUser { user, permissions }),
            Some(_) => Err(ApiError::Unauthorized(INACTIVE_ACCOUNT.into())),
            None => Err(ApiError::Unauthorized("Utilisateur introuvable".into())),
        }
    }
}

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

/// The Argon2 check runs between two short database calls so the
/// connection lock is never held while verifying.
async fn login(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let LoginRequest { email, password } = req;
    let user = state
        .db
        .call(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    if !verify_password_blocking(password, user.password_hash.clone()).await? {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    }
    if !user.actif {
        return Err(ApiError::Unauthorized(INACTIVE_ACCOUNT.into()));
    }

    let user_id = user.id;
    let (user, permissions) = state
        .db
        .call(move |db| {
            db.touch_last_login(user_id)?;
            let permissions = db.user_permission_names(user_id)?;
            let user = db.get_user(user_id)?.ok_or_else(|| {
                anyhow::Error::from(CrmError::Unauthorized(INVALID_CREDENTIALS.into()))
            })?;
            Ok((user, permissions))
        })
        .await?;

    let access_token = state.tokens.issue(&user, permissions)?;
    info!(user_id = user.id, email = %user.email, "User logged in");
    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.tokens.ttl_seconds(),
        user,
    }))
}

/// Tokens are stateless; the client discards its copy.
async fn logout(auth: AuthUser) -> impl IntoResponse {
    info!(user_id = auth.user.id, "User logged out");
    Json(serde_json::json!({ "message": "Déconnexion réussie" }))
}

async fn me(auth: AuthUser) -> impl IntoResponse {
    Json(CurrentUser {
        user: auth.user,
        permissions: auth.permissions,
    })
}
