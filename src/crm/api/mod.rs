//! HTTP surface of the CRM: shared state, the JSON error envelope, request
//! extractors and the `/api` router.
//!
//! Each resource lives in its own submodule exposing `routes()`; handlers
//! authorize through [`auth::AuthUser`], run their database work through
//! `DbHandle::call` and return `Result<_, ApiError>`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{error, warn};
use uuid::Uuid;

use super::auth::TokenIssuer;
use super::db::{ConstraintKind, DbHandle, constraint_kind};
use crate::errors::{CrmError, Entity, FieldError};

pub mod auth;
mod dashboard;
mod entreprises;
mod formateurs;
mod localisations;
mod notifications;
mod objectifs;
mod opportunites;
mod plugins;
mod roles;
mod users;
mod ypareo;

#[cfg(test)]
pub(crate) mod test_support;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

// ── Shared application state ──────────────────────────────────────────

/// Identity reported by `GET /api`.
#[derive(Debug, Clone, Serialize)]
pub struct AppInfo {
    pub name: String,
    pub environment: String,
    pub version: String,
}

pub struct AppState {
    pub db: DbHandle,
    pub tokens: TokenIssuer,
    pub app: AppInfo,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: DbHandle, tokens: TokenIssuer, app: AppInfo) -> Self {
        Self {
            db,
            tokens,
            app,
            started_at: Instant::now(),
        }
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest {
        message: String,
        details: Vec<FieldError>,
    },
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn not_found(entity: Entity, id: i64) -> Self {
        CrmError::not_found(entity, id).into()
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CrmError> for ApiError {
    fn from(err: CrmError) -> Self {
        match err {
            CrmError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            CrmError::Validation(ref details) => ApiError::BadRequest {
                message: err.to_string(),
                details: details.clone(),
            },
            CrmError::Conflict(msg) => ApiError::Conflict(msg),
            CrmError::Unauthorized(msg) => ApiError::Unauthorized(msg),
            CrmError::Forbidden(msg) => ApiError::Forbidden(msg),
            CrmError::LockPoisoned => ApiError::Internal(err.to_string()),
            CrmError::Other(inner) => inner.into(),
        }
    }
}

/// Domain errors keep their meaning; SQLite constraint failures become
/// 409 (unique) or 400 (foreign key); everything else is a 500.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<CrmError>() {
            Ok(crm) => return crm.into(),
            Err(err) => err,
        };
        match constraint_kind(&err) {
            Some(ConstraintKind::Unique) => {
                ApiError::Conflict("Un enregistrement avec ces valeurs existe déjà".to_string())
            }
            Some(ConstraintKind::ForeignKey) => ApiError::bad_request(
                "Référence invalide : l'enregistrement lié n'existe pas",
            ),
            _ => ApiError::Internal(format!("{:#}", err)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let correlation_id = Uuid::new_v4().to_string();
        let (message, details) = match self {
            ApiError::BadRequest { message, details } => (message, details),
            ApiError::Internal(cause) => {
                error!(correlation_id = %correlation_id, error = %cause, "Internal server error");
                ("Erreur interne du serveur".to_string(), Vec::new())
            }
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => (msg, Vec::new()),
        };
        if status.is_client_error() {
            warn!(correlation_id = %correlation_id, status = status.as_u16(), reason = %message, "Request rejected");
        }

        let mut body = serde_json::json!({
            "statusCode": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
            "correlationId": correlation_id,
        });
        if !details.is_empty() {
            body["details"] = serde_json::json!(details);
        }

        let mut response = (status, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&correlation_id) {
            response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }
        response
    }
}

/// Not-found error for use inside `DbHandle::call` closures.
fn missing(entity: Entity, id: i64) -> anyhow::Error {
    CrmError::not_found(entity, id).into()
}

// ── Extractors ────────────────────────────────────────────────────────

/// `Json` whose rejections use the API error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

/// `Path` that answers 400 with the API error body on malformed ids.
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(ApiPath(value)),
            Err(rejection) => Err(ApiError::bad_request(format!(
                "Paramètre de chemin invalide : {}",
                rejection.body_text()
            ))),
        }
    }
}

/// `Query` with API error rejections.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api", get(app_info))
        .route("/api/health", get(health_check))
        .merge(auth::routes())
        .merge(entreprises::routes())
        .merge(opportunites::routes())
        .merge(objectifs::routes())
        .merge(localisations::routes())
        .merge(formateurs::routes())
        .merge(notifications::routes())
        .merge(plugins::routes())
        .merge(ypareo::routes())
        .merge(dashboard::routes())
        .merge(users::routes())
        .merge(roles::routes())
        .fallback(route_not_found)
}

async fn app_info(State(state): State<SharedState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": state.app.name,
        "version": state.app.version,
        "environment": state.app.environment,
        "status": "running",
    }))
}

async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "environment": state.app.environment,
    }))
}

async fn route_not_found(req: Request) -> ApiError {
    ApiError::NotFound(format!(
        "Route {} {} introuvable",
        req.method(),
        req.uri().path()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use test_support::{body_json, test_app};

    #[tokio::test]
    async fn test_app_info() {
        let (app, _) = test_app().await;
        let request = Request::builder().uri("/api").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let info: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(info["name"], "AFPI CRM");
        assert_eq!(info["status"], "running");
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = test_app().await;
        let request = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(health["status"], "ok");
        assert!(health["uptime"].as_f64().unwrap() >= 0.0);
        assert!(health["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_route_uses_error_envelope() {
        let (app, _) = test_app().await;
        let request = Request::builder()
            .uri("/api/nothing-here")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(CORRELATION_ID_HEADER));

        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["statusCode"], 404);
        assert_eq!(body["error"], "Not Found");
        assert!(body["correlationId"].is_string());
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_validation_error_lists_details() {
        let err = ApiError::from(CrmError::Validation(vec![FieldError::new(
            "siret",
            "doit contenir 14 chiffres",
        )]));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["details"][0]["field"], "siret");
    }

    #[tokio::test]
    async fn test_internal_error_hides_cause() {
        let err = ApiError::from(anyhow::anyhow!("disk on fire"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Erreur interne du serveur");
    }

    #[test]
    fn test_anyhow_wrapping_crm_error_keeps_status() {
        let err: anyhow::Error = CrmError::Conflict("déjà utilisé".into()).into();
        assert_eq!(ApiError::from(err).status(), StatusCode::CONFLICT);
        let err: anyhow::Error = CrmError::not_found(Entity::Plugin, 3).into();
        match ApiError::from(err) {
            ApiError::NotFound(msg) => assert_eq!(msg, "Plugin avec l'ID 3 non trouvé"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }
}
