//! Localisation routes. Any authenticated user may read them; writes need
//! the matching `*_localisations` permission.

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
use crate::crm::models::{
    LocalisationInput, LocalisationPatch, PermissionAction, PermissionResource,
};
use crate::errors::Entity;

const RESOURCE: PermissionResource = PermissionResource::Localisations;

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/localisations",
            get(list_localisations).post(create_localisation),
        )
        .route(
            "/api/localisations/{id}",
            get(get_localisation)
                .patch(update_localisation)
                .delete(delete_localisation),
        )
}

async fn list_localisations(
    State(state): State<SharedState>,
    _auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let localisations = state.db.call(|db| db.list_localisations()).await?;
    Ok(Json(localisations))
}

async fn create_localisation(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<LocalisationInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Create, RESOURCE)?;
    input.validate()?;
    let localisation = state
        .db
        .call(move |db| db.create_localisation(&input))
        .await?;
    info!(id = localisation.id, code = %localisation.code, "Created localisation");
    Ok((StatusCode::CREATED, Json(localisation)))
}

async fn get_localisation(
    State(state): State<SharedState>,
    _auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let localisation = state
        .db
        .call(move |db| db.get_localisation(id))
        .await?
        .ok_or_else(|| ApiError::not_found(Entity::Localisation, id))?;
    Ok(Json(localisation))
}

async fn update_localisation(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<LocalisationPatch>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Update, RESOURCE)?;
    let localisation = state
        .db
        .call(move |db| {
            let current = db
                .get_localisation(id)?
                .ok_or_else(|| missing(Entity::Localisation, id))?;
            let mut input = current.to_input();
            patch.apply_to(&mut input);
            input.validate()?;
            db.update_localisation(id, &input)?
                .ok_or_else(|| missing(Entity::Localisation, id))
        })
        .await?;
    Ok(Json(localisation))
}

async fn delete_localisation(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Delete, RESOURCE)?;
    if !state.db.call(move |db| db.delete_localisation(id)).await? {
        return Err(ApiError::not_found(Entity::Localisation, id));
    }
    info!(id, "Deleted localisation");
    Ok(StatusCode::NO_CONTENT)
}
