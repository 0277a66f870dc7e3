//! Router and token helpers for the HTTP tests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use super::{AppInfo, AppState, SharedState, api_router};
use crate::config::SeedSection;
use crate::crm::auth::TokenIssuer;
use crate::crm::db::test_support::{test_password_hash, user_input};
use crate::crm::db::{CrmDb, DbHandle};
use crate::crm::models::RoleType;
use crate::crm::seed;

pub(crate) const TEST_SECRET: &str = "test-secret-with-at-least-32-bytes!!";

/// Router over a freshly seeded in-memory database.
pub(crate) async fn test_app() -> (Router, SharedState) {
    let db = CrmDb::new_in_memory().unwrap();
    seed::seed_permissions(&db).unwrap();
    seed::seed_roles(&db).unwrap();
    seed::seed_localisations(&db).unwrap();
    let state = Arc::new(AppState::new(
        DbHandle::new(db),
        TokenIssuer::from_secret(TEST_SECRET, 60).unwrap(),
        AppInfo {
            name: "AFPI CRM".into(),
            environment: "test".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        },
    ));
    (api_router().with_state(state.clone()), state)
}

/// The seeded administrator, for tests that log in with a password.
pub(crate) async fn seed_admin(state: &SharedState) {
    state
        .db
        .call(|db| seed::seed_admin(db, &SeedSection::default()))
        .await
        .unwrap();
}

/// Create a user holding the seeded role of `role_type` and return a token for it.
pub(crate) async fn token_for(state: &SharedState, role_type: RoleType) -> String {
    let email = format!("{}@afpi.fr", role_type.as_str());
    let (user, permissions) = state
        .db
        .call(move |db| {
            let role = db.get_role_by_type(role_type)?.expect("seeded role");
            let user = db.create_user(&user_input(&email, role.id), &test_password_hash())?;
            let permissions = db.user_permission_names(user.id)?;
            Ok((user, permissions))
        })
        .await
        .unwrap();
    state.tokens.issue(&user, permissions).unwrap()
}

pub(crate) async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Send one request, returning the status and the JSON body (`Null` when empty).
pub(crate) async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
