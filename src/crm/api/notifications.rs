//! Notification routes. A user always reaches their own notifications;
//! touching someone else's needs the matching `*_users` permission.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use tracing::info;

use super::auth::AuthUser;
use super::{ApiError, ApiJson, ApiPath, ApiQuery, SharedState, missing};
use crate::crm::models::{
    Notification, NotificationFilter, NotificationInput, NotificationPatch, PermissionAction,
    PermissionResource,
};
use crate::errors::Entity;

pub(super) fn routes() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/notifications",
            get(list_notifications).post(create_notification),
        )
        .route(
            "/api/notifications/{id}",
            get(get_notification)
                .patch(update_notification)
                .delete(delete_notification),
        )
        .route("/api/notifications/{id}/lu", patch(mark_read))
}

impl AuthUser {
    /// Allow `action` on a notification addressed to `owner_id`.
    fn require_owner_or(&self, owner_id: i64, action: PermissionAction) -> Result<(), ApiError> {
        if owner_id == self.user.id {
            Ok(())
        } else {
            self.require(action, PermissionResource::Users)
        }
    }
}

async fn load(state: &SharedState, id: i64) -> Result<Notification, ApiError> {
    state
        .db
        .call(move |db| db.get_notification(id))
        .await?
        .ok_or_else(|| ApiError::not_found(Entity::Notification, id))
}

/// Without an explicit `utilisateurId`, callers see their own notifications.
async fn list_notifications(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiQuery(mut filter): ApiQuery<NotificationFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = *filter.utilisateur_id.get_or_insert(auth.user.id);
    auth.require_owner_or(owner, PermissionAction::Read)?;
    let notifications = state
        .db
        .call(move |db| db.list_notifications(&filter))
        .await?;
    Ok(Json(notifications))
}

async fn create_notification(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<NotificationInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_owner_or(input.utilisateur_id, PermissionAction::Create)?;
    input.validate()?;
    let notification = state
        .db
        .call(move |db| db.create_notification(&input))
        .await?;
    info!(
        id = notification.id,
        utilisateur_id = notification.utilisateur_id,
        "Created notification"
    );
    Ok((StatusCode::CREATED, Json(notification)))
}

async fn get_notification(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = load(&state, id).await?;
    auth.require_owner_or(notification.utilisateur_id, PermissionAction::Read)?;
    Ok(Json(notification))
}

async fn update_notification(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<NotificationPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let current = load(&state, id).await?;
    auth.require_owner_or(current.utilisateur_id, PermissionAction::Update)?;
    if let Some(new_owner) = patch.utilisateur_id {
        auth.require_owner_or(new_owner, PermissionAction::Update)?;
    }

    let notification = state
        .db
        .call(move |db| {
            let mut input = current.to_input();
            patch.apply_to(&mut input);
            input.validate()?;
            db.update_notification(id, &input)?
                .ok_or_else(|| missing(Entity::Notification, id))
        })
        .await?;
    Ok(Json(notification))
}

async fn mark_read(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let current = load(&state, id).await?;
    auth.require_owner_or(current.utilisateur_id, PermissionAction::Update)?;
    let notification = state
        .db
        .call(move |db| db.mark_notification_read(id))
        .await?
        .ok_or_else(|| ApiError::not_found(Entity::Notification, id))?;
    Ok(Json(notification))
}

async fn delete_notification(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let current = load(&state, id).await?;
    auth.require_owner_or(current.utilisateur_id, PermissionAction::Delete)?;
    if !state.db.call(move |db| db.delete_notification(id)).await? {
        return Err(ApiError::not_found(Entity::Notification, id));
    }
    Ok(StatusCode::NO_CONTENT)
}
