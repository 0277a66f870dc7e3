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
use crate::crm::models::{EntrepriseInput, EntreprisePatch, PermissionAction, PermissionResource};
use crate::errors::Entity;

const RESOURCE: PermissionResource = PermissionResource::Entreprises;

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/entreprises",
            get(list_entreprises).post(create_entreprise),
        )
        .route(
            "/api/entreprises/{id}",
            get(get_entreprise)
                .patch(update_entreprise)
                .delete(delete_entreprise),
        )
}

async fn list_entreprises(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let entreprises = state.db.call(|db| db.list_entreprises()).await?;
    Ok(Json(entreprises))
}

async fn create_entreprise(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<EntrepriseInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Create, RESOURCE)?;
    input.validate()?;
    let entreprise = state
        .db
        .call(move |db| db.create_entreprise(&input))
        .await?;
    info!(id = entreprise.id, siret = %entreprise.siret, "Created entreprise");
    Ok((StatusCode::CREATED, Json(entreprise)))
}

async fn get_entreprise(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Read, RESOURCE)?;
    let entreprise = state
        .db
        .call(move |db| db.get_entreprise(id))
        .await?
        .ok_or_else(|| ApiError::not_found(Entity::Entreprise, id))?;
    Ok(Json(entreprise))
}

async fn update_entreprise(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<EntreprisePatch>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Update, RESOURCE)?;
    let entreprise = state
        .db
        .call(move |db| {
            let current = db
                .get_entreprise(id)?
                .ok_or_else(|| missing(Entity::Entreprise, id))?;
            let mut input = current.to_input();
            patch.apply_to(&mut input);
            input.validate()?;
            db.update_entreprise(id, &input)?
                .ok_or_else(|| missing(Entity::Entreprise, id))
        })
        .await?;
    info!(id, "Updated entreprise");
    Ok(Json(entreprise))
}

async fn delete_entreprise(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(PermissionAction::Delete, RESOURCE)?;
    if !state.db.call(move |db| db.delete_entreprise(id)).await? {
        return Err(ApiError::not_found(Entity::Entreprise, id));
    }
    info!(id, "Deleted entreprise");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::crm::api::test_support::{send, test_app, token_for};
    use crate::crm::models::RoleType;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_entreprise_crud() {
        let (app, state) = test_app().await;
        let token = token_for(&state, RoleType::Manager).await;

        let (status, created) = send(
            &app,
            "POST",
            "/api/entreprises",
            Some(&token),
            Some(json!({
                "raisonSociale": "Métallerie Picarde",
                "siret": "12345678901234",
                "ville": "Amiens",
                "contactPrincipal": {"nom": "Martin", "prenom": "Luc", "email": "luc@metal.fr"},
                "tags": ["soudure"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["typeEntreprise"], "pme");
        assert_eq!(created["actif"], true);
        let id = created["id"].as_i64().unwrap();

        let (status, fetched) =
            send(&app, "GET", &format!("/api/entreprises/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["raisonSociale"], "Métallerie Picarde");
        assert_eq!(fetched["contactPrincipal"]["prenom"], "Luc");
        assert_eq!(fetched["tags"], json!(["soudure"]));

        let (status, updated) = send(
            &app,
            "PATCH",
            &format!("/api/entreprises/{id}"),
            Some(&token),
            Some(json!({"effectif": 42, "ville": null})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["effectif"], 42);
        assert_eq!(updated["ville"], "Amiens");
        assert_eq!(updated["siret"], "12345678901234");

        let (status, list) = send(&app, "GET", "/api/entreprises", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, body) =
            send(&app, "DELETE", &format!("/api/entreprises/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());

        let (status, body) =
            send(&app, "GET", &format!("/api/entreprises/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], format!("Entreprise avec l'ID {id} non trouvée"));
    }

    #[tokio::test]
    async fn test_entreprise_validation_and_duplicates() {
        let (app, state) = test_app().await;
        let token = token_for(&state, RoleType::Manager).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/entreprises",
            Some(&token),
            Some(json!({"raisonSociale": "", "siret": "123"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields: Vec<&str> = body["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"raisonSociale"));
        assert!(fields.contains(&"siret"));

        let payload = json!({"raisonSociale": "Acme", "siret": "11111111111111"});
        let (status, _) =
            send(&app, "POST", "/api/entreprises", Some(&token), Some(payload.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) =
            send(&app, "POST", "/api/entreprises", Some(&token), Some(payload)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["statusCode"], 409);
    }

    #[tokio::test]
    async fn test_entreprise_update_is_validated() {
        let (app, state) = test_app().await;
        let token = token_for(&state, RoleType::Manager).await;
        let (_, created) = send(
            &app,
            "POST",
            "/api/entreprises",
            Some(&token),
            Some(json!({"raisonSociale": "Acme", "siret": "11111111111111"})),
        )
        .await;
        let id = created["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/api/entreprises/{id}"),
            Some(&token),
            Some(json!({"email": "pas-un-email"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "PATCH",
            "/api/entreprises/999",
            Some(&token),
            Some(json!({"ville": "Laon"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_entreprise_permissions() {
        let (app, state) = test_app().await;
        let token = token_for(&state, RoleType::Facturation).await;

        let (status, _) = send(&app, "GET", "/api/entreprises", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "GET", "/api/entreprises", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "POST",
            "/api/entreprises",
            Some(&token),
            Some(json!({"raisonSociale": "Acme", "siret": "11111111111111"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Permission requise : create_entreprises");
    }

    #[tokio::test]
    async fn test_malformed_id_is_bad_request() {
        let (app, state) = test_app().await;
        let token = token_for(&state, RoleType::Manager).await;
        let (status, body) =
            send(&app, "GET", "/api/entreprises/abc", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["statusCode"], 400);
    }

    #[tokio::test]
    async fn test_entreprise_with_opportunites_cannot_be_deleted() {
        let (app, state) = test_app().await;
        let token = token_for(&state, RoleType::Manager).await;
        let (_, entreprise) = send(
            &app,
            "POST",
            "/api/entreprises",
            Some(&token),
            Some(json!({"raisonSociale": "Acme", "siret": "11111111111111"})),
        )
        .await;
        let id = entreprise["id"].as_i64().unwrap();
        let (status, _) = send(
            &app,
            "POST",
            "/api/opportunites",
            Some(&token),
            Some(json!({"titre": "Habilitation électrique", "entrepriseId": id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) =
            send(&app, "DELETE", &format!("/api/entreprises/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
