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
use crate::crm::models::{ObjectifInput, ObjectifPatch, PermissionAction, PermissionResource};
use crate::errors::Entity;

const RESOURCE: PermissionResource = PermissionResource::Objectifs;

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/objectifs", get(list_objectifs).post(create_objectif))
        .route(
            "/api/objectifs/{id}",
            get(get_objectif)
                .patch(update_objectif)
                .delete(delete_objectif),
        )
}

async fn list_objectifs(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let objectifs = state.db.call(|db| db.list_objectifs()).await?;
    Ok(Json(objectifs))
}

async fn create_objectif(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<ObjectifInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Create, RESOURCE)?;
    input.validate()?;
    let objectif = state.db.call(move |db| db.create_objectif(&input)).await?;
    info!(id = objectif.id, type_objectif = %objectif.type_objectif, "Created objectif");
    Ok((StatusCode::CREATED, Json(objectif)))
}

async fn get_objectif(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let objectif = state
        .db
        .call(move |db| db.get_objectif(id))
        .await?
        .ok_or_else(|| ApiError::not_found(Entity::Objectif, id))?;
    Ok(Json(objectif))
}

async fn update_objectif(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<ObjectifPatch>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Update, RESOURCE)?;
    let objectif = state
        .db
        .call(move |db| {
            let current = db
                .get_objectif(id)?
                .ok_or_else(|| missing(Entity::Objectif, id))?;
            let mut input = current.to_input();
            patch.apply_to(&mut input);
            input.validate()?;
            db.update_objectif(id, &input)?
                .ok_or_else(|| missing(Entity::Objectif, id))
        })
        .await?;
    Ok(Json(objectif))
}

async fn delete_objectif(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Delete, RESOURCE)?;
    if !state.db.call(move |db| db.delete_objectif(id)).await? {
        return Err(ApiError::not_found(Entity::Objectif, id));
    }
    info!(id, "Deleted objectif");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::crm::api::test_support::{send, test_app, token_for};
    use crate::crm::models::RoleType;
    use axum::http::StatusCode;
    use serde_json::json;

    fn objectif_body() -> serde_json::Value {
        json!({
            "titre": "CA annuel Aisne",
            "typeObjectif": "chiffre_affaires",
            "cible": 100000.0,
            "realise": 30000.0,
            "dateDebut": "2025-01-01",
            "dateFin": "2025-12-31"
        })
    }

    #[tokio::test]
    async fn test_objectif_progress_follows_updates() {
        let (app, state) = test_app().await;
        let token = token_for(&state, RoleType::Manager).await;

        let (status, created) =
            send(&app, "POST", "/api/objectifs", Some(&token), Some(objectif_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["periodicite"], "mensuel");
        assert_eq!(created["tauxRealisation"], 30.0);
        assert_eq!(created["progression"], "Démarrage lent");

        let uri = format!("/api/objectifs/{}", created["id"]);
        let (status, updated) = send(
            &app,
            "PATCH",
            &uri,
            Some(&token),
            Some(json!({"realise": 100000.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["tauxRealisation"], 100.0);
        assert_eq!(updated["progression"], "Objectif atteint");
        assert_eq!(updated["titre"], "CA annuel Aisne");

        let (status, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_objectif_dates_are_validated() {
        let (app, state) = test_app().await;
        let token = token_for(&state, RoleType::Manager).await;
        let mut body = objectif_body();
        body["dateFin"] = json!("2024-06-30");
        let (status, body) = send(&app, "POST", "/api/objectifs", Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0]["field"], "dateFin");
    }

    #[tokio::test]
    async fn test_commercial_cannot_read_objectifs() {
        let (app, state) = test_app().await;
        let token = token_for(&state, RoleType::Commercial).await;
        let (status, _) = send(&app, "GET", "/api/objectifs", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
