//! Ypareo connection settings. Only the records are managed here; no
//! synchronisation is performed.

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
    PermissionAction, PermissionResource, YpareoConfigInput, YpareoConfigPatch,
};
use crate::errors::Entity;

const RESOURCE: PermissionResource = PermissionResource::Ypareo;

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/ypareo", get(list_configs).post(create_config))
        .route(
            "/api/ypareo/{id}",
            get(get_config).patch(update_config).delete(delete_config),
        )
}

async fn list_configs(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let configs = state.db.call(|db| db.list_ypareo_configs()).await?;
    Ok(Json(configs))
}

async fn create_config(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<YpareoConfigInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Create, RESOURCE)?;
    input.validate()?;
    let config = state
        .db
        .call(move |db| db.create_ypareo_config(&input))
        .await?;
    info!(id = config.id, api_url = %config.api_url, "Created Ypareo configuration");
    Ok((StatusCode::CREATED, Json(config)))
}

async fn get_config(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let config = state
        .db
        .call(move |db| db.get_ypareo_config(id))
        .await?
        .ok_or_else(|| ApiError::not_found(Entity::YpareoConfig, id))?;
    Ok(Json(config))
}

async fn update_config(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<YpareoConfigPatch>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Update, RESOURCE)?;
    let config = state
        .db
        .call(move |db| {
            let current = db
                .get_ypareo_config(id)?
                .ok_or_else(|| missing(Entity::YpareoConfig, id))?;
            let mut input = current.to_input();
            patch.apply_to(&mut input);
            input.validate()?;
            db.update_ypareo_config(id, &input)?
                .ok_or_else(|| missing(Entity::YpareoConfig, id))
        })
        .await?;
    Ok(Json(config))
}

async fn delete_config(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Delete, RESOURCE)?;
    if !state.db.call(move |db| db.delete_ypareo_config(id)).await? {
        return Err(ApiError::not_found(Entity::YpareoConfig, id));
    }
    info!(id, "Deleted Ypareo configuration");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::crm::api::test_support::{send, test_app, token_for};
    use crate::crm::models::RoleType;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_ypareo_config_crud() {
        let (app, state) = test_app().await;
        let token = token_for(&state, RoleType::ResponsableCommercial).await;

        let (status, created) = send(
            &app,
            "POST",
            "/api/ypareo",
            Some(&token),
            Some(json!({"apiUrl": "https://ypareo.afpi.fr/api", "apiKey": "ypareo-key-9876"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["syncFrequency"], 3600);
        assert_eq!(created["syncMode"], "read");
        assert_eq!(created["enabled"], true);
        assert_eq!(created["apiKey"], "********9876");
        let id = created["id"].as_i64().unwrap();
        let uri = format!("/api/ypareo/{}", created["id"]);

        let (status, updated) = send(
            &app,
            "PATCH",
            &uri,
            Some(&token),
            Some(json!({"syncMode": "read_write", "syncFrequency": 900})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["syncMode"], "read_write");
        assert_eq!(updated["apiKey"], "********9876");
        let (_, listed) = send(&app, "GET", "/api/ypareo", Some(&token), None).await;
        assert_eq!(listed[0]["apiKey"], "********9876");
        let stored = state
            .db
            .call(move |db| db.get_ypareo_config(id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.api_key, "ypareo-key-9876");

        let (status, _) = send(
            &app,
            "PATCH",
            &uri,
            Some(&token),
            Some(json!({"apiUrl": "ftp://ypareo"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, "GET", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].as_str().unwrap().starts_with("Configuration Ypareo"));
    }
}
