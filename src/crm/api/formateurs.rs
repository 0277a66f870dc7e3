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
use crate::crm::models::{FormateurInput, FormateurPatch, PermissionAction, PermissionResource};
use crate::errors::Entity;

const RESOURCE: PermissionResource = PermissionResource::Formateurs;

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/formateurs",
            get(list_formateurs).post(create_formateur),
        )
        .route(
            "/api/formateurs/{id}",
            get(get_formateur)
                .patch(update_formateur)
                .delete(delete_formateur),
        )
}

async fn list_formateurs(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let formateurs = state.db.call(|db| db.list_formateurs()).await?;
    Ok(Json(formateurs))
}

async fn create_formateur(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<FormateurInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Create, RESOURCE)?;
    input.validate()?;
    let formateur = state.db.call(move |db| db.create_formateur(&input)).await?;
    info!(id = formateur.id, name = %formateur.full_name, "Created formateur");
    Ok((StatusCode::CREATED, Json(formateur)))
}

async fn get_formateur(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let formateur = state
        .db
        .call(move |db| db.get_formateur(id))
        .await?
        .ok_or_else(|| ApiError::not_found(Entity::Formateur, id))?;
    Ok(Json(formateur))
}

async fn update_formateur(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<FormateurPatch>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Update, RESOURCE)?;
    let formateur = state
        .db
        .call(move |db| {
            let current = db
                .get_formateur(id)?
                .ok_or_else(|| missing(Entity::Formateur, id))?;
            let mut input = current.to_input();
            patch.apply_to(&mut input);
            input.validate()?;
            db.update_formateur(id, &input)?
                .ok_or_else(|| missing(Entity::Formateur, id))
        })
        .await?;
    Ok(Json(formateur))
}

async fn delete_formateur(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Delete, RESOURCE)?;
    if !state.db.call(move |db| db.delete_formateur(id)).await? {
        return Err(ApiError::not_found(Entity::Formateur, id));
    }
    info!(id, "Deleted formateur");
    Ok(StatusCode::NO_CONTENT)
}
