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
use crate::crm::models::{PermissionAction, PermissionResource, PluginInput, PluginPatch};
use crate::errors::Entity;

const RESOURCE: PermissionResource = PermissionResource::Plugins;

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/plugins", get(list_plugins).post(create_plugin))
        .route(
            "/api/plugins/{id}",
            get(get_plugin).patch(update_plugin).delete(delete_plugin),
        )
}

async fn list_plugins(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let plugins = state.db.call(|db| db.list_plugins()).await?;
    Ok(Json(plugins))
}

async fn create_plugin(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<PluginInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Create, RESOURCE)?;
    input.validate()?;
    let plugin = state.db.call(move |db| db.create_plugin(&input)).await?;
    info!(id = plugin.id, nom = %plugin.nom, version = %plugin.version, "Registered plugin");
    Ok((StatusCode::CREATED, Json(plugin)))
}

async fn get_plugin(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let plugin = state
        .db
        .call(move |db| db.get_plugin(id))
        .await?
        .ok_or_else(|| ApiError::not_found(Entity::Plugin, id))?;
    Ok(Json(plugin))
}

async fn update_plugin(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<PluginPatch>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Update, RESOURCE)?;
    let plugin = state
        .db
        .call(move |db| {
            let current = db
                .get_plugin(id)?
                .ok_or_else(|| missing(Entity::Plugin, id))?;
            let mut input = current.to_input();
            patch.apply_to(&mut input);
            input.validate()?;
            db.update_plugin(id, &input)?
                .ok_or_else(|| missing(Entity::Plugin, id))
        })
        .await?;
    info!(id, enabled = plugin.enabled, "Updated plugin");
    Ok(Json(plugin))
}

async fn delete_plugin(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Delete, RESOURCE)?;
    if !state.db.call(move |db| db.delete_plugin(id)).await? {
        return Err(ApiError::not_found(Entity::Plugin, id));
    }
    info!(id, "Deleted plugin");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::crm::api::test_support::{send, test_app, token_for};
    use crate::crm::models::RoleType;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_plugin_crud() {
        let (app, state) = test_app().await;
        let token = token_for(&state, RoleType::Administrateur).await;

        let (status, created) = send(
            &app,
            "POST",
            "/api/plugins",
            Some(&token),
            Some(json!({
                "nom": "export-excel",
                "version": "1.2.0",
                "config": {"sheet": "Opportunités", "columns": ["numero", "statut"]},
                "hooks": ["opportunite.updated"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["enabled"], false);
        assert_eq!(created["config"]["sheet"], "Opportunités");
        let uri = format!("/api/plugins/{}", created["id"]);

        let (status, updated) =
            send(&app, "PATCH", &uri, Some(&token), Some(json!({"enabled": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["enabled"], true);
        assert_eq!(updated["hooks"], json!(["opportunite.updated"]));

        let (status, _) = send(
            &app,
            "POST",
            "/api/plugins",
            Some(&token),
            Some(json!({"nom": "export-excel", "version": "2.0.0"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_manager_has_no_plugin_access() {
        let (app, state) = test_app().await;
        let token = token_for(&state, RoleType::Manager).await;
        let (status, body) = send(&app, "GET", "/api/plugins", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Permission requise : read_plugins");
    }
}
