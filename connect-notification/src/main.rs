use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod config;
mod events;
mod models;
mod routes;
mod schema;
mod services;

use config::AppConfig;
use connect_shared::clients::db::{create_pool, DbPool};
use connect_shared::clients::rabbitmq::RabbitMQClient;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub rabbitmq: RabbitMQClient,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    connect_shared::middleware::init_tracing("connect-notification");

    let config = AppConfig::load()?;
    let port = config.port;

    // The auth extractor reads the secret from the environment.
    std::env::set_var("JWT_SECRET", &config.jwt_secret);

    let db = create_pool(&config.database_url);
    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;

    let state = Arc::new(AppState { db, config, rabbitmq });

    // Spawn message event subscriber
    let message_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = events::subscriber::listen_message_events(message_state).await {
            tracing::error!(error = %e, "message event subscriber failed");
        }
    });

    // Spawn community event subscriber
    let community_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = events::subscriber::listen_community_events(community_state).await {
            tracing::error!(error = %e, "community event subscriber failed");
        }
    });

    // Spawn resource event subscriber
    let resource_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = events::subscriber::listen_resource_events(resource_state).await {
            tracing::error!(error = %e, "resource event subscriber failed");
        }
    });

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/notifications",
            get(routes::notifications::list_notifications)
                .patch(routes::notifications::update_notification),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "connect-notification starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
