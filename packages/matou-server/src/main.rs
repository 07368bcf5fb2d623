//! MATOU coordination service.
//!
//! The HTTP boundary over `matou-core`: a thin axum app translating
//! requests into calls on the identity store, space manager, trust
//! service, and credential caches, plus a long-lived SSE event stream.
//!
//! All bodies are JSON; errors are `{error}` with the status mapping in
//! [`error`]. Exit code is `0` on clean shutdown and non-zero on fatal
//! init errors (corrupt identity file, unbindable port).

mod api;
mod error;
mod state;

use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::{AppState, ServerConfig};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "matou-server", version, about = "MATOU per-user coordination service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8420, env = "MATOU_PORT")]
    port: u16,

    /// Data directory for identity, keys, spaces, and caches
    #[arg(long, default_value = "./data", env = "MATOU_DATA_DIR")]
    data_dir: std::path::PathBuf,

    /// Coordinator operation deadline in seconds
    #[arg(long, default_value_t = 60, env = "MATOU_COORDINATOR_TIMEOUT_SECS")]
    coordinator_timeout_secs: u64,

    /// Tree operation deadline in seconds
    #[arg(long, default_value_t = 30, env = "MATOU_TREE_TIMEOUT_SECS")]
    tree_timeout_secs: u64,

    /// Per-subscriber event channel capacity (minimum 16)
    #[arg(long, default_value_t = 64, env = "MATOU_EVENT_CAPACITY")]
    event_capacity: usize,

    /// Trust graph cache TTL in milliseconds (capped at 5000)
    #[arg(long, default_value_t = 2000, env = "MATOU_TRUST_CACHE_TTL_MS")]
    trust_cache_ttl_ms: u64,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matou_server=info,matou_core=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        port: args.port,
        data_dir: args.data_dir,
        coordinator_timeout_secs: args.coordinator_timeout_secs,
        tree_timeout_secs: args.tree_timeout_secs,
        event_capacity: args.event_capacity,
        trust_cache_ttl_ms: args.trust_cache_ttl_ms,
    };

    let state = match AppState::open(config.clone()) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Fatal: failed to open service state");
            std::process::exit(1);
        }
    };

    let app = router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("MATOU coordination service starting on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = addr.as_str(), "Fatal: failed to bind");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        // Identity
        .route("/identity/set", post(api::identity::set_identity))
        .route(
            "/identity",
            get(api::identity::get_identity).delete(api::identity::delete_identity),
        )
        // Org config
        .route(
            "/org/config",
            get(api::org::get_config)
                .post(api::org::set_config)
                .delete(api::org::delete_config),
        )
        // Spaces
        .route("/spaces/community", post(api::spaces::create_community))
        .route("/spaces/private", post(api::spaces::create_private))
        .route("/spaces/community/invite", post(api::spaces::invite))
        .route("/spaces/community/join", post(api::spaces::join))
        .route(
            "/spaces/community/verify-access",
            get(api::spaces::verify_access),
        )
        .route("/spaces/user", get(api::spaces::user_spaces))
        // Credentials
        .route(
            "/credentials",
            get(api::credentials::list).post(api::credentials::create),
        )
        .route("/credentials/validate", post(api::credentials::validate))
        .route("/credentials/roles", get(api::credentials::roles))
        .route("/credentials/:said", get(api::credentials::get))
        .route("/sync/credentials", post(api::credentials::sync_credentials))
        .route("/sync/kel", post(api::credentials::sync_kel))
        .route("/sync/kel/:aid", get(api::credentials::get_kel))
        // Trust
        .route("/trust/graph", get(api::trust::graph))
        .route("/trust/score/:aid", get(api::trust::score))
        .route("/trust/scores", get(api::trust::scores))
        .route("/trust/summary", get(api::trust::summary))
        // Endorsements
        .route("/endorsements/sync", post(api::endorsements::sync))
        .route("/endorsements/revoke", post(api::endorsements::revoke))
        .route("/endorsements/issued/:aid", get(api::endorsements::issued))
        .route("/endorsements/:aid", get(api::endorsements::received))
        // Events
        .route("/events", get(api::events::stream))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// Liveness probe. Also useful for client-side latency measurement
/// (time the round-trip against the returned timestamp).
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "matou-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
