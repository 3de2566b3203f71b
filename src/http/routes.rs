//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::{require_capacity, ws_handler};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let ws_routes = Router::new()
        .route("/ws", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_capacity));

    let api_routes = Router::new().route("/api/health", get(health_handler));

    // Anything else is the built client
    let static_files = ServeDir::new(&state.config.static_files_dir);

    Router::new()
        .merge(ws_routes)
        .merge(api_routes)
        .fallback_service(static_files)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origin))
        .with_state(state)
}

/// `*` allows any origin; otherwise a comma-separated allow list with credentials
fn cors_layer(client_origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return base.allow_origin(Any);
    }

    let allowed_origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();

    base.allow_origin(allowed_origins).allow_credentials(true)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    time: String,
    uptime_secs: u64,
    players: usize,
    bullets: usize,
    sessions: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (players, bullets) = state.game.counts();

    Json(HealthResponse {
        status: "ok",
        time: chrono::Utc::now().to_rfc3339(),
        uptime_secs: uptime_secs(),
        players,
        bullets,
        sessions: state.sessions.len(),
    })
}
