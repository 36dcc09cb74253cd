use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{service}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Auth errors
/// - E2xxx: Messaging errors
/// - E3xxx: Notification errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    StoreUnavailable,

    // Auth (E1xxx)
    TokenExpired,
    TokenInvalid,

    // Messaging (E2xxx)
    NotConversationParticipant,

    // Notification (E3xxx)
    NotificationNotFound,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::StoreUnavailable => "E0007",

            // Auth
            Self::TokenExpired => "E1001",
            Self::TokenInvalid => "E1002",

            // Messaging
            Self::NotConversationParticipant => "E2002",

            // Notification
            Self::NotificationNotFound => "E3001",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::NotificationNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::TokenExpired | Self::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotConversationParticipant => StatusCode::FORBIDDEN,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known { code: ErrorCode, message: String },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("store unavailable: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, message) = match &self {
            AppError::Known { code, message } => (*code, message.clone()),
            // Unexpected failures surface the raw error message; this is a
            // debugging convenience, not a hardened posture.
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (ErrorCode::InternalError, err.to_string())
            }
            AppError::Database(diesel::result::Error::NotFound) => {
                (ErrorCode::NotFound, "Ressource introuvable".to_string())
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    ErrorCode::InternalError,
                    format!("erreur de base de données: {err}"),
                )
            }
            AppError::Pool(err) => {
                tracing::error!(error = %err, "database pool checkout failed");
                (
                    ErrorCode::StoreUnavailable,
                    "Base de données injoignable. Vérifiez DATABASE_URL et que PostgreSQL est démarré"
                        .to_string(),
                )
            }
        };

        (
            code.status_code(),
            Json(ApiErrorResponse::new(code.code(), message)),
        )
            .into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    /// Helper: convert an `AppError` into its JSON body string.
    async fn body_string(err: AppError) -> String {
        let response = err.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn known_error_json_structure() {
        let json = body_string(AppError::new(
            ErrorCode::ValidationError,
            "Au moins un participant est requis",
        ))
        .await;
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "E0002");
        assert_eq!(value["error"]["message"], "Au moins un participant est requis");
    }

    #[tokio::test]
    async fn status_codes_follow_taxonomy() {
        let cases = [
            (ErrorCode::ValidationError, StatusCode::BAD_REQUEST),
            (ErrorCode::Unauthorized, StatusCode::UNAUTHORIZED),
            (ErrorCode::NotConversationParticipant, StatusCode::FORBIDDEN),
            (ErrorCode::NotificationNotFound, StatusCode::NOT_FOUND),
            (ErrorCode::StoreUnavailable, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (code, status) in cases {
            let response = AppError::new(code, "x").into_response();
            assert_eq!(response.status(), status, "{:?}", code);
        }
    }

    #[test]
    fn wire_codes_are_stable() {
        assert_eq!(ErrorCode::InternalError.code(), "E0001");
        assert_eq!(ErrorCode::ValidationError.code(), "E0002");
        assert_eq!(ErrorCode::StoreUnavailable.code(), "E0007");
        assert_eq!(ErrorCode::NotConversationParticipant.code(), "E2002");
        assert_eq!(ErrorCode::NotificationNotFound.code(), "E3001");
    }

    #[tokio::test]
    async fn diesel_not_found_maps_to_404() {
        let response = AppError::Database(diesel::result::Error::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn internal_error_surfaces_raw_message() {
        let json = body_string(AppError::Internal(anyhow::anyhow!("boom"))).await;
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["error"]["message"], "boom");
    }
}
