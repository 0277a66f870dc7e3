//! Opportunité routes. Status changes made through `PATCH` are appended to
//! the record's history together with the caller and an optional
//! `commentaire` from the request body.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tracing::info;

use super::auth::AuthUser;
use super::{ApiError, ApiJson, ApiPath, ApiQuery, SharedState, missing};
use crate::crm::models::{
    HistoriqueEntry, OpportuniteFilter, OpportuniteInput, OpportunitePatch, PermissionAction,
    PermissionResource, workflow,
};
use crate::errors::Entity;

const RESOURCE: PermissionResource = PermissionResource::Opportunites;

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/opportunites",
            get(list_opportunites).post(create_opportunite),
        )
        .route("/api/opportunites/workflow", get(get_workflow))
        .route(
            "/api/opportunites/{id}",
            get(get_opportunite)
                .patch(update_opportunite)
                .delete(delete_opportunite),
        )
}

async fn list_opportunites(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<OpportuniteFilter>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let opportunites = state
        .db
        .call(move |db| db.list_opportunites(&filter))
        .await?;
    Ok(Json(opportunites))
}

async fn get_workflow(auth: AuthUser) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    Ok(Json(workflow()))
}

async fn create_opportunite(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<OpportuniteInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Create, RESOURCE)?;
    input.validate()?;
    let actor = auth.actor();
    let opportunite = state
        .db
        .call(move |db| db.create_opportunite(&input, &actor))
        .await?;
    info!(
        id = opportunite.id,
        numero = %opportunite.numero_opportunite,
        "Created opportunité"
    );
    Ok((StatusCode::CREATED, Json(opportunite)))
}

async fn get_opportunite(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let opportunite = state
        .db
        .call(move |db| db.get_opportunite(id))
        .await?
        .ok_or_else(|| ApiError::not_found(Entity::Opportunite, id))?;
    Ok(Json(opportunite))
}

async fn update_opportunite(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<OpportunitePatch>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Update, RESOURCE)?;
    let actor = auth.actor();
    let opportunite = state
        .db
        .call(move |db| {
            let current = db
                .get_opportunite(id)?
                .ok_or_else(|| missing(Entity::Opportunite, id))?;
            let mut input = current.to_input();
            let commentaire = patch.apply_to(&mut input);
            input.validate()?;

            let entry = (input.statut != current.statut).then(|| {
                HistoriqueEntry::status_change(current.statut, input.statut, &actor, commentaire)
            });
            if let Some(entry) = &entry {
                info!(
                    id,
                    from = %current.statut,
                    to = %entry.statut_apres,
                    "Opportunité statut changed"
                );
            }
            db.update_opportunite(id, &input, entry)?
                .ok_or_else(|| missing(Entity::Opportunite, id))
        })
        .await?;
    Ok(Json(opportunite))
}

async fn delete_opportunite(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Delete, RESOURCE)?;
    if !state.db.call(move |db| db.delete_opportunite(id)).await? {
        return Err(ApiError::not_found(Entity::Opportunite, id));
    }
    info!(id, "Deleted opportunité");
    Ok(StatusCode::NO_CONTENT)
}
