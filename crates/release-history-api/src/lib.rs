//! release-history-api — REST API for deployment and release events.
//!
//! Provides the axum router. Every route except `/health` sits behind
//! HTTP Basic auth (see [`auth`]).
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Liveness, empty body |
//! | POST | `/deployment` | Record a deployment |
//! | GET | `/deployment` | Latest (or all, `showAll=true`) deployments as of `date` |
//! | POST | `/release` | Record a release, returned with its prod snapshot |
//! | GET | `/release` | Releases by `number`, all, or latest as of `date` |

pub mod auth;
pub mod error;
pub mod handlers;
pub mod query;

use axum::Router;
use axum::routing::get;
use release_history_store::SharedStore;
use tower_http::trace::TraceLayer;

pub use auth::{AuthConfig, BasicAuthLayer};
pub use error::{ApiError, ApiResult};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: SharedStore,
}

/// Build the complete API router.
pub fn build_router(store: SharedStore, auth: AuthConfig) -> Router {
    let api_state = ApiState { store };

    let protected = Router::new()
        .route(
            "/deployment",
            get(handlers::list_deployments).post(handlers::create_deployment),
        )
        .route(
            "/release",
            get(handlers::list_releases).post(handlers::create_release),
        )
        .route_layer(BasicAuthLayer::new(auth))
        .with_state(api_state);

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
}
