//! Public, unauthenticated endpoints a legitimate client hits before
//! submitting a write request: token issuance and the challenge page that
//! plants the fallback cookie for clients that strip custom headers.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use gateway_antibot::AntibotValidator;
use gateway_state::GatewayStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct TokenState {
	pub store: GatewayStore,
	pub antibot: Arc<AntibotValidator>,
}

#[derive(Serialize)]
struct FormTokenResponse {
	token: String,
	#[serde(rename = "loadTime")]
	load_time: u64,
	#[serde(rename = "honeypotField")]
	honeypot_field: String,
	#[serde(rename = "expiresIn")]
	expires_in: u64,
}

fn now_secs() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// `GET /api/tokens/form`: issues a fresh one-time token for an inline form.
pub async fn issue_form_token(State(state): State<TokenState>) -> Response {
	let config = state.store.load_config().await.unwrap_or_default();
	let issued = state.antibot.issue_token(now_secs(), &config);
	Json(FormTokenResponse {
		token: issued.token,
		load_time: issued.load_time_secs,
		honeypot_field: issued.honeypot_field,
		expires_in: issued.ttl_seconds,
	})
	.into_response()
}

/// `GET /api/tokens/challenge`: renders an interstitial page that plants
/// `X-Form-Token-Challenge` as a cookie, for clients whose form-building
/// layer cannot attach a custom request header.
pub async fn issue_challenge(State(state): State<TokenState>) -> Response {
	let config = state.store.load_config().await.unwrap_or_default();
	let issued = state.antibot.issue_token(now_secs(), &config);

	let body = match config.antibot_challenge_type().as_str() {
		"javascript" => javascript_challenge(&issued.token),
		"preact" => preact_challenge(&issued.token, config.antibot_preact_difficulty_secs()),
		_ => metarefresh_challenge(&issued.token, config.antibot_metarefresh_delay_secs()),
	};

	let cookie = format!("X-Form-Token-Challenge={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}", issued.token, issued.ttl_seconds);
	let mut response = Html(body).into_response();
	if let Ok(value) = cookie.parse() {
		response.headers_mut().insert(header::SET_COOKIE, value);
	}
	response
}

fn metarefresh_challenge(token: &str, delay_secs: u64) -> String {
	format!(
		"<!doctype html><html><head><meta http-equiv=\"refresh\" content=\"{delay_secs};url=/\"></head>\
         <body data-token=\"{token}\">Verifying your browser&hellip;</body></html>"
	)
}

fn javascript_challenge(token: &str) -> String {
	format!(
		"<!doctype html><html><body>\
         <script>document.cookie = 'X-Form-Token-Challenge={token}; path=/'; window.location.replace('/');</script>\
         </body></html>"
	)
}

fn preact_challenge(token: &str, difficulty_secs: u64) -> String {
	format!(
		"<!doctype html><html><body data-token=\"{token}\" data-difficulty=\"{difficulty_secs}\">\
         <div id=\"app\"></div></body></html>"
	)
}

/// `GET /healthz` on the public plane: only reports store reachability, not
/// rule-cache freshness (the admin plane's `/healthz` covers that).
pub async fn healthz(State(state): State<TokenState>) -> (StatusCode, Json<serde_json::Value>) {
	let ok = state.store.load_config().await.is_ok();
	let status = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
	(status, Json(serde_json::json!({ "status": if ok { "ok" } else { "degraded" }, "store": ok })))
}
