use axum::Json;
use connect_shared::types::api::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("connect-notification", env!("CARGO_PKG_VERSION")))
}
