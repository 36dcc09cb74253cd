use axum::Json;
use connect_shared::types::api::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("connect-messaging", env!("CARGO_PKG_VERSION")))
}
