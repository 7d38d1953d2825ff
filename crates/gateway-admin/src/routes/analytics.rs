use crate::error::AdminError;
use crate::state::AdminState;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use gateway_types::decision::DecisionLogEntry;
use serde::{Deserialize, Serialize};

pub fn router() -> Router<AdminState> {
	Router::new()
		.route("/analytics/summary", get(summary))
		.route("/analytics/timeseries", get(timeseries))
		.route("/analytics/traffic", get(traffic))
}

#[derive(Serialize)]
struct SummaryResponse {
	allowed: u64,
	blocked: u64,
	active_policies: usize,
}

async fn summary(State(state): State<AdminState>) -> Result<Json<SummaryResponse>, AdminError> {
	let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
	let now_minute = i64::try_from(now / 60).unwrap_or(i64::MAX);
	let buckets = state.store.minute_buckets_in_range(now_minute - 24 * 60, now_minute).await?;
	let (allowed, blocked) = buckets.iter().fold((0u64, 0u64), |(a, b), (_, al, bl)| (a + al, b + bl));
	let active_policies = state.rule_cache.snapshot().await.len();
	Ok(Json(SummaryResponse { allowed, blocked, active_policies }))
}

#[derive(Deserialize)]
struct TimeseriesQuery {
	#[serde(default = "default_hours")]
	hours: u64,
}

fn default_hours() -> u64 {
	24
}

#[derive(Serialize)]
struct TimeseriesEntry {
	timestamp: i64,
	allowed: u64,
	blocked: u64,
}

async fn timeseries(State(state): State<AdminState>, Query(query): Query<TimeseriesQuery>) -> Result<Json<Vec<TimeseriesEntry>>, AdminError> {
	let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
	let now_minute = i64::try_from(now / 60).unwrap_or(i64::MAX);
	let span_minutes = i64::try_from(query.hours.saturating_mul(60)).unwrap_or(i64::MAX);
	let buckets = state.store.minute_buckets_in_range(now_minute - span_minutes, now_minute).await?;
	Ok(Json(buckets.into_iter().map(|(minute, allowed, blocked)| TimeseriesEntry { timestamp: minute, allowed, blocked }).collect()))
}

#[derive(Deserialize)]
struct TrafficQuery {
	#[serde(default = "default_limit")]
	limit: u64,
}

fn default_limit() -> u64 {
	100
}

async fn traffic(State(state): State<AdminState>, Query(query): Query<TrafficQuery>) -> Result<Json<Vec<DecisionLogEntry>>, AdminError> {
	Ok(Json(state.store.recent_decisions(query.limit).await?))
}
