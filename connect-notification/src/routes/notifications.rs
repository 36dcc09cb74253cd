use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use connect_shared::errors::{AppError, AppResult, ErrorCode};
use connect_shared::types::api::ApiResponse;
use connect_shared::types::auth::AuthUser;

use crate::models::Notification;
use crate::services::notification_service;
use crate::AppState;

/// GET /notifications
/// List the 50 most recent notifications for the authenticated user.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<Notification>>>> {
    let items = notification_service::list_notifications(&state.db, auth_user.id)?;

    Ok(Json(ApiResponse::ok(items)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateNotificationRequest {
    pub notification_id: Option<Uuid>,
    /// Desired read state; defaults to true.
    pub read: Option<bool>,
}

/// PATCH /notifications
/// Toggle the read state of one of the user's notifications.
pub async fn update_notification(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(req): Json<UpdateNotificationRequest>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let notification_id = req.notification_id.ok_or_else(|| {
        AppError::new(ErrorCode::ValidationError, "ID de notification requis")
    })?;

    let notification = notification_service::set_read(
        &state.db,
        notification_id,
        auth_user.id,
        req.read.unwrap_or(true),
    )?;

    Ok(Json(ApiResponse::ok(notification)))
}
