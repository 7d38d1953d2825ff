pub mod error;
pub mod routes;
pub mod state;

pub use error::AdminError;
pub use state::AdminState;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Base path the admin surface is nested under. Exported so the public-plane
/// binary can run its own port guard: a defense-in-depth 404 for this prefix
/// even though the admin router is never bound to the public listener.
pub const ADMIN_BASE_PATH: &str = "/poormansRateLimit/api/admin";

/// Builds the admin surface router, loopback-bound by the caller (the
/// binary never advertises this on a public-facing address). Every route
/// lives under [`ADMIN_BASE_PATH`], matching the operator-facing path the
/// rest of this product family nests its admin surfaces under.
#[must_use]
pub fn router(state: AdminState) -> Router {
	let admin = Router::new()
		.route("/healthz", get(healthz))
		.merge(routes::rules::router())
		.merge(routes::config::router())
		.merge(routes::analytics::router())
		.merge(routes::ws::router());

	Router::new()
		.nest(ADMIN_BASE_PATH, admin)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
		.with_state(state)
}

async fn healthz(axum::extract::State(state): axum::extract::State<AdminState>) -> (StatusCode, Json<serde_json::Value>) {
	let store_ok = state.store.load_config().await.is_ok();
	let status = if store_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
	(status, Json(serde_json::json!({ "status": if store_ok { "ok" } else { "degraded" }, "store": store_ok })))
}
