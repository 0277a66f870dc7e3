//! Stored dashboard snapshots plus the live KPI views.

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
    DashboardStatInput, DashboardStatPatch, PermissionAction, PermissionResource,
};
use crate::errors::Entity;

const RESOURCE: PermissionResource = PermissionResource::Dashboard;

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/dashboard", get(list_stats).post(create_stat))
        .route("/api/dashboard/kpis", get(kpis))
        .route("/api/dashboard/localisations", get(localisations))
        .route(
            "/api/dashboard/{id}",
            get(get_stat).patch(update_stat).delete(delete_stat),
        )
}

async fn kpis(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let summary = state.db.call(|db| db.kpi_summary()).await?;
    Ok(Json(summary))
}

async fn localisations(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let performance = state.db.call(|db| db.localisation_performance()).await?;
    Ok(Json(performance))
}

async fn list_stats(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let stats = state.db.call(|db| db.list_dashboard_stats()).await?;
    Ok(Json(stats))
}

async fn create_stat(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<DashboardStatInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Create, RESOURCE)?;
    input.validate()?;
    let stat = state
        .db
        .call(move |db| db.create_dashboard_stat(&input))
        .await?;
    info!(id = stat.id, date = %stat.date, "Recorded dashboard stat");
    Ok((StatusCode::CREATED, Json(stat)))
}

async fn get_stat(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let stat = state
        .db
        .call(move |db| db.get_dashboard_stat(id))
        .await?
        .ok_or_else(|| ApiError::not_found(Entity::DashboardStat, id))?;
    Ok(Json(stat))
}

async fn update_stat(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<DashboardStatPatch>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Update, RESOURCE)?;
    let stat = state
        .db
        .call(move |db| {
            let current = db
                .get_dashboard_stat(id)?
                .ok_or_else(|| missing(Entity::DashboardStat, id))?;
            let mut input = current.to_input();
            patch.apply_to(&mut input);
            input.validate()?;
            db.update_dashboard_stat(id, &input)?
                .ok_or_else(|| missing(Entity::DashboardStat, id))
        })
        .await?;
    Ok(Json(stat))
}

async fn delete_stat(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Delete, RESOURCE)?;
    if !state.db.call(move |db| db.delete_dashboard_stat(id)).await? {
        return Err(ApiError::not_found(Entity::DashboardStat, id));
    }
    Ok(StatusCode::NO_CONTENT)
}
