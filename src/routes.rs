use axum::{middleware, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::middleware::JwtSecret;
use crate::dm::routes as dm_routes;
use crate::notify::routes as notify_routes;
use crate::presence;
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
    // Rate limiting on notification ingestion: 30/min/IP with bursts.
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(2) // 1 token every 2 seconds = 30 per minute
            .burst_size(30)
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

    // Notification surface is invoked by the portal's CRUD services,
    // rate-limited per IP as a group
    let notification_routes = Router::new()
        .route(
            "/api/notifications",
            axum::routing::post(notify_routes::create_notification)
                .get(notify_routes::list_notifications),
        )
        .route(
            "/api/notifications/{id}/read",
            axum::routing::patch(notify_routes::mark_notification_read),
        )
        .route(
            "/api/notifications/{id}",
            axum::routing::delete(notify_routes::delete_notification),
        )
        .layer(GovernorLayer {
            config: governor_config,
        });

    let message_routes = Router::new()
        .route(
            "/api/messages/{user_id}/{other_id}",
            axum::routing::get(dm_routes::get_history),
        )
        .route(
            "/api/messages/{user_id}/{other_id}/read",
            axum::routing::patch(dm_routes::mark_read),
        );

    let presence_routes = Router::new().route(
        "/api/presence",
        axum::routing::get(presence::get_presence),
    );

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(notification_routes)
        .merge(message_routes)
        .merge(presence_routes)
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
