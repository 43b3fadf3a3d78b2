use axum::{middleware, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::account;
use crate::auth::middleware::JwtSecret;
use crate::chat::{conversations, messages};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting: 10 requests per minute per IP on auth endpoints
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(6) // 1 token every 6 seconds = 10 per minute
            .burst_size(10)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    let auth_routes = Router::new()
        .route(
            "/api/v1/auth/register",
            axum::routing::post(account::register),
        )
        .route("/api/v1/auth/login", axum::routing::post(account::login))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Authenticated routes (Claims extractor validates the bearer token)
    let chat_routes = Router::new()
        .route(
            "/api/v1/conversations/direct",
            axum::routing::post(conversations::create_direct_conversation),
        )
        .route(
            "/api/v1/conversations",
            axum::routing::get(conversations::list_conversations),
        )
        .route(
            "/api/v1/conversations/{id}/messages",
            axum::routing::get(messages::list_messages).post(messages::send_message),
        );

    // Push channel (auth via query param, not header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(auth_routes)
        .merge(chat_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
