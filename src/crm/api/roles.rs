//! Role routes and the read-only permission catalogue.

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
use crate::crm::models::{PermissionAction, PermissionResource, RoleInput, RolePatch};
use crate::errors::Entity;

const RESOURCE: PermissionResource = PermissionResource::Roles;

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/roles", get(list_roles).post(create_role))
        .route(
            "/api/roles/{id}",
            get(get_role).patch(update_role).delete(delete_role),
        )
        .route("/api/permissions", get(list_permissions))
}

async fn list_permissions(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let permissions = state.db.call(|db| db.list_permissions()).await?;
    Ok(Json(permissions))
}

async fn list_roles(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let roles = state.db.call(|db| db.list_roles()).await?;
    Ok(Json(roles))
}

async fn create_role(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<RoleInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Create, RESOURCE)?;
    input.validate()?;
    let role = state.db.call(move |db| db.create_role(&input)).await?;
    info!(id = role.id, name = %role.name, permissions = role.permissions.len(), "Created role");
    Ok((StatusCode::CREATED, Json(role)))
}

async fn get_role(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let role = state
        .db
        .call(move |db| db.get_role(id))
        .await?
        .ok_or_else(|| ApiError::not_found(Entity::Role, id))?;
    Ok(Json(role))
}

/// `permissionIds`, when present, replaces the whole grant list.
async fn update_role(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<RolePatch>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Update, RESOURCE)?;
    let role = state
        .db
        .call(move |db| {
            let current = db.get_role(id)?.ok_or_else(|| missing(Entity::Role, id))?;
            let mut input = current.to_input();
            patch.apply_to(&mut input);
            input.validate()?;
            db.update_role(id, &input)?
                .ok_or_else(|| missing(Entity::Role, id))
        })
        .await?;
    info!(id, permissions = role.permissions.len(), "Updated role");
    Ok(Json(role))
}

async fn delete_role(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Delete, RESOURCE)?;
    if !state.db.call(move |db| db.delete_role(id)).await? {
        return Err(ApiError::not_found(Entity::Role, id));
    }
    info!(id, "Deleted role");
    Ok(StatusCode::NO_CONTENT)
}
