use crate::error::AdminError;
use crate::state::AdminState;
use axum::extract::{Path, State};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use gateway_types::rule::{BodyLimitConfig, QueueConfig, Rule};
use serde::Deserialize;

pub fn router() -> Router<AdminState> {
	Router::new()
		.route("/rules", get(list_rules).post(create_rule))
		.route("/rules/active", get(list_active_rules))
		.route("/rules/refresh", post(refresh_rules))
		.route("/rules/:id", get(get_rule).put(put_rule).delete(delete_rule))
		.route("/rules/:id/queue", patch(patch_queue))
		.route("/rules/:id/body-limit", patch(patch_body_limit))
}

async fn list_rules(State(state): State<AdminState>) -> Result<Json<Vec<Rule>>, AdminError> {
	Ok(Json(state.store.load_rules().await?))
}

async fn list_active_rules(State(state): State<AdminState>) -> Json<Vec<Rule>> {
	let snapshot = state.rule_cache.snapshot().await;
	Json(snapshot.as_ref().clone())
}

async fn get_rule(State(state): State<AdminState>, Path(id): Path<String>) -> Result<Json<Rule>, AdminError> {
	let rules = state.store.load_rules().await?;
	rules.into_iter().find(|r| r.id == id).map(Json).ok_or(AdminError::RuleNotFound(id))
}

async fn create_rule(State(state): State<AdminState>, Json(mut rule): Json<Rule>) -> Result<Json<Rule>, AdminError> {
	if rule.id.is_empty() {
		rule.id = uuid_like_id();
	}
	rule.validate()?;
	state.store.put_rule(&rule).await?;
	state.rule_cache.refresh().await?;
	Ok(Json(rule))
}

async fn put_rule(State(state): State<AdminState>, Path(id): Path<String>, Json(mut rule): Json<Rule>) -> Result<Json<Rule>, AdminError> {
	rule.id = id;
	rule.validate()?;
	state.store.put_rule(&rule).await?;
	state.rule_cache.refresh().await?;
	Ok(Json(rule))
}

async fn delete_rule(State(state): State<AdminState>, Path(id): Path<String>) -> Result<(), AdminError> {
	state.store.delete_rule(&id).await?;
	state.rule_cache.refresh().await?;
	Ok(())
}

async fn refresh_rules(State(state): State<AdminState>) -> Result<Json<serde_json::Value>, AdminError> {
	let count = state.rule_cache.refresh().await?;
	Ok(Json(serde_json::json!({ "ruleCount": count })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueuePatch {
	queue_enabled: bool,
	max_queue_size: u32,
	delay_per_request_ms: u64,
}

async fn patch_queue(State(state): State<AdminState>, Path(id): Path<String>, Json(patch): Json<QueuePatch>) -> Result<Json<Rule>, AdminError> {
	let mut rules = state.store.load_rules().await?;
	let rule = rules.iter_mut().find(|r| r.id == id).ok_or_else(|| AdminError::RuleNotFound(id.clone()))?;
	rule.queue = QueueConfig {
		enabled: patch.queue_enabled,
		max_queue_size: patch.max_queue_size,
		delay_per_request_ms: patch.delay_per_request_ms,
	};
	rule.validate()?;
	state.store.put_rule(rule).await?;
	let updated = rule.clone();
	state.rule_cache.refresh().await?;
	Ok(Json(updated))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BodyLimitPatch {
	body_limit_enabled: bool,
	body_field_path: String,
	body_limit_type: gateway_types::rule::BodyContentType,
}

async fn patch_body_limit(State(state): State<AdminState>, Path(id): Path<String>, Json(patch): Json<BodyLimitPatch>) -> Result<Json<Rule>, AdminError> {
	let mut rules = state.store.load_rules().await?;
	let rule = rules.iter_mut().find(|r| r.id == id).ok_or_else(|| AdminError::RuleNotFound(id.clone()))?;
	rule.body_limit = BodyLimitConfig {
		enabled: patch.body_limit_enabled,
		field_path: patch.body_field_path,
		limit_type: patch.body_limit_type,
	};
	state.store.put_rule(rule).await?;
	let updated = rule.clone();
	state.rule_cache.refresh().await?;
	Ok(Json(updated))
}

fn uuid_like_id() -> String {
	use rand_lite::generate_id;
	generate_id()
}

mod rand_lite {
	use std::time::{SystemTime, UNIX_EPOCH};

	/// A process-unique, sortable rule ID. Rules are small in number and
	/// admin-created, so a timestamp-plus-counter scheme is sufficient
	/// without pulling in a UUID dependency the rest of the gateway doesn't
	/// otherwise need.
	pub fn generate_id() -> String {
		use std::sync::atomic::{AtomicU64, Ordering};
		static COUNTER: AtomicU64 = AtomicU64::new(0);
		let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
		let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
		format!("rule-{nanos:x}-{seq:x}")
	}
}
