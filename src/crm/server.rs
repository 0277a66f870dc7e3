use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::api::{self, AppInfo, AppState, CORRELATION_ID_HEADER, SharedState};
use super::auth::TokenIssuer;
use super::db::{CrmDb, DbHandle};
use super::seed;
use crate::config::CrmConfig;

/// Everything `start_server` needs, resolved from the layered config and the
/// `serve` flags.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub cors_origin: String,
    pub seed: bool,
}

impl ServerConfig {
    pub fn from_config(config: &CrmConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.database.path.clone(),
            cors_origin: config.server.cors_origin.clone(),
            seed: config.seed.on_startup,
        }
    }
}

/// CORS for the single front-end origin, with bearer auth headers allowed.
fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin)
        .with_context(|| format!("Invalid CORS origin '{}'", origin))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(CORRELATION_ID_HEADER)])
        .allow_credentials(true))
}

/// Build the full application router: API routes, CORS and request tracing.
pub fn build_router(state: SharedState, cors_origin: &str) -> Result<Router> {
    Ok(api::api_router()
        .layer(cors_layer(cors_origin)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Open the database, seed it on request and serve until Ctrl+C.
pub async fn start_server(config: &CrmConfig, server: ServerConfig) -> Result<()> {
    if let Some(parent) = server.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = CrmDb::new(&server.db_path).context("Failed to initialize CRM database")?;
    if server.seed {
        let report = seed::seed_all(&db, &config.seed).context("Failed to seed database")?;
        info!(%report, "Database seeded");
    }

    for warning in config.validate() {
        warn!("{}", warning);
    }
    let tokens = TokenIssuer::from_secret(&config.jwt_secret()?, config.auth.token_ttl_minutes)?;

    let state: SharedState = Arc::new(AppState::new(
        DbHandle::new(db),
        tokens,
        AppInfo {
            name: config.app.name.clone(),
            environment: config.app.environment.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    ));
    let app = build_router(state, &server.cors_origin)?;

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr: SocketAddr = listener.local_addr()?;
    info!(
        address = %local_addr,
        environment = %config.app.environment,
        database = %server.db_path.display(),
        "{} listening",
        config.app.name
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down");
        return;
    }
    info!("Shutting down...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let db = CrmDb::new_in_memory().unwrap();
        let state = Arc::new(AppState::new(
            DbHandle::new(db),
            TokenIssuer::from_secret("server-test-secret-at-least-32-bytes", 5).unwrap(),
            AppInfo {
                name: "AFPI CRM".into(),
                environment: "test".into(),
                version: "0.0.0".into(),
            },
        ));
        build_router(state, "http://localhost:4200").unwrap()
    }

    #[test]
    fn test_server_config_from_crm_config() {
        let mut config = CrmConfig::default();
        config.server.port = 8080;
        config.seed.on_startup = true;
        let server = ServerConfig::from_config(&config);
        assert_eq!(server.port, 8080);
        assert!(server.seed);
        assert_eq!(server.cors_origin, "http://localhost:4200");
    }

    #[test]
    fn test_invalid_cors_origin_is_rejected() {
        assert!(cors_layer("http://bad\norigin").is_err());
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let app = test_router();
        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_frontend() {
        let app = test_router();
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/entreprises")
            .header("origin", "http://localhost:4200")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "authorization,content-type")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()["access-control-allow-origin"],
            "http://localhost:4200"
        );
    }

    #[tokio::test]
    async fn test_protected_route_without_token() {
        let app = test_router();
        let req = Request::builder()
            .uri("/api/opportunites")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
