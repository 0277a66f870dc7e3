//! User accounts. Role assignment is guarded twice: the caller needs
//! `manage_users` or `update_roles`, and can never hand out, or act on an
//! account holding, a role more privileged than their own.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tracing::info;

use super::auth::AuthUser;
use super::{ApiError, ApiJson, ApiPath, SharedState, missing};
use crate::crm::auth::hash_password_blocking;
use crate::crm::db::CrmDb;
use crate::crm::models::{
    NewUser, PermissionAction, PermissionResource, UserPatch, validate_password,
};
use crate::errors::{CrmError, Entity};

const RESOURCE: PermissionResource = PermissionResource::Users;

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

impl AuthUser {
    fn require_role_assignment(&self) -> Result<(), ApiError> {
        if self.has_permission(PermissionAction::Manage, RESOURCE)
            || self.has_permission(PermissionAction::Update, PermissionResource::Roles)
        {
            Ok(())
        } else {
            self.require(PermissionAction::Manage, RESOURCE)
        }
    }
}

/// Fails with 403 when `role_id` is more privileged (lower level) than the
/// caller's role. Unknown roles pass here and fail later on the foreign key.
fn ensure_within_level(db: &CrmDb, caller_role_id: i64, role_id: i64) -> anyhow::Result<()> {
    let caller_level = db
        .get_role(caller_role_id)?
        .map_or(i64::MAX, |role| role.level);
    match db.get_role(role_id)? {
        Some(role) if role.level < caller_level => Err(CrmError::Forbidden(format!(
            "Rôle « {} » hors de votre niveau d'autorisation",
            role.name
        ))
        .into()),
        _ => Ok(()),
    }
}

async fn list_users(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let users = state.db.call(|db| db.list_users()).await?;
    Ok(Json(users))
}

async fn create_user(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(new_user): ApiJson<NewUser>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Create, RESOURCE)?;
    auth.require_role_assignment()?;
    new_user.validate()?;
    let (input, password) = new_user.into_parts();
    let password_hash = hash_password_blocking(password).await?;

    let caller_role_id = auth.user.role_id;
    let user = state
        .db
        .call(move |db| {
            ensure_within_level(db, caller_role_id, input.role_id)?;
            db.create_user(&input, &password_hash)
        })
        .await?;
    info!(id = user.id, email = %user.email, created_by = auth.user.id, "Created user");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let user = state
        .db
        .call(move |db| db.get_user(id))
        .await?
        .ok_or_else(|| ApiError::not_found(Entity::User, id))?;
    Ok(Json(user))
}

/// A `password` in the body is hashed and replaces the stored hash; without
/// one the existing hash stays.
async fn update_user(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(mut patch): ApiJson<UserPatch>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Update, RESOURCE)?;
    if patch.role_id.is_some() {
        auth.require_role_assignment()?;
    }
    let password_hash = match patch.password.take() {
        Some(password) => {
            validate_password(&password)?;
            Some(hash_password_blocking(password).await?)
        }
        None => None,
    };
    let password_changed = password_hash.is_some();

    let caller_role_id = auth.user.role_id;
    let user = state
        .db
        .call(move |db| {
            let current = db
                .get_user(id)?
                .ok_or_else(|| missing(Entity::User, id))?;
            ensure_within_level(db, caller_role_id, current.role_id)?;
            let mut input = current.to_input();
            patch.apply_to(&mut input);
            input.validate()?;
            if input.role_id != current.role_id {
                ensure_within_level(db, caller_role_id, input.role_id)?;
            }
            db.update_user(id, &input, password_hash.as_deref())?
                .ok_or_else(|| missing(Entity::User, id))
        })
        .await?;
    info!(id, password_changed, actif = user.actif, "Updated user");
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Delete, RESOURCE)?;
    let caller_role_id = auth.user.role_id;
    let deleted = state
        .db
        .call(move |db| {
            let Some(current) = db.get_user(id)? else {
                return Ok(false);
            };
            ensure_within_level(db, caller_role_id, current.role_id)?;
            db.delete_user(id)
        })
        .await?;
    if !deleted {
        return Err(ApiError::not_found(Entity::User, id));
    }
    info!(id, deleted_by = auth.user.id, "Deleted user");
    Ok(StatusCode::NO_CONTENT)
}
