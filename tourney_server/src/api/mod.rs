//! HTTP/WebSocket API for the tournament service.
//!
//! # Endpoints
//!
//! ```text
//! GET  /health                                               - Health check
//! GET  /api/v1/tournaments/{id}                              - Tournament view
//! POST /api/v1/tournaments/{id}/status                       - Status transition
//! POST /api/v1/tournaments/{id}/matches/{match_id}/result    - Record a result
//! GET  /ws/tournaments/{id}                                  - Room subscription
//! ```
//!
//! Every request passes through the request id middleware and a permissive
//! CORS layer.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tourney::{db::{Database, DatabaseConfig}, notify::{NotificationHub, DEFAULT_HUB_CAPACITY}};
//! use tourney_server::api::{AppState, create_router};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(&DatabaseConfig::development()).await?;
//! let (hub, _hub_task) = NotificationHub::spawn(DEFAULT_HUB_CAPACITY);
//!
//! let app = create_router(AppState::new(Arc::new(db.store()), hub));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod request_id;
pub mod tournaments;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tourney::{
    db::TournamentStore,
    notify::{HubHandle, NotificationSink},
    tournament::{MatchResults, TournamentLifecycle, TournamentViews},
};
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers and WebSocket connections.
///
/// Cloned per request; every field is a handle around an `Arc`.
pub struct AppState<S: TournamentStore> {
    pub lifecycle: TournamentLifecycle<S>,
    pub results: MatchResults<S>,
    pub views: TournamentViews<S>,
    pub hub: HubHandle,
    pub store: Arc<S>,
}

impl<S: TournamentStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
            results: self.results.clone(),
            views: self.views.clone(),
            hub: self.hub.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: TournamentStore> AppState<S> {
    /// Wire the services to `store`, notifying through `hub`.
    pub fn new(store: Arc<S>, hub: HubHandle) -> Self {
        let notifier: Arc<dyn NotificationSink> = Arc::new(hub.clone());
        Self {
            lifecycle: TournamentLifecycle::new(Arc::clone(&store), Arc::clone(&notifier)),
            results: MatchResults::new(Arc::clone(&store), notifier),
            views: TournamentViews::new(Arc::clone(&store)),
            hub,
            store,
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Create the API router with all endpoints and middleware.
pub fn create_router<S: TournamentStore>(state: AppState<S>) -> Router {
    let v1_routes = Router::new()
        .route("/tournaments/{id}", get(tournaments::get_tournament::<S>))
        .route(
            "/tournaments/{id}/status",
            post(tournaments::update_status::<S>),
        )
        .route(
            "/tournaments/{id}/matches/{match_id}/result",
            post(tournaments::record_result::<S>),
        );

    Router::new()
        .route("/health", get(health_check::<S>))
        .route(
            "/ws/tournaments/{id}",
            get(websocket::websocket_handler::<S>),
        )
        .nest("/api/v1", v1_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the database answers, `503 Service Unavailable`
/// otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","version":"0.4.0","database":true,"timestamp":"2026-10-19T10:30:00Z"}
/// ```
async fn health_check<S: TournamentStore>(State(state): State<AppState<S>>) -> impl IntoResponse {
    let db_healthy = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check: database unreachable");
            false
        }
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
