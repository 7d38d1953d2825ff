use crate::error::AdminError;
use crate::state::AdminState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use gateway_types::config::SystemConfig;
use serde::Deserialize;
use std::collections::HashMap;

pub fn router() -> Router<AdminState> {
	Router::new().route("/config", get(list_config)).route("/config/:key", post(set_config))
}

async fn list_config(State(state): State<AdminState>) -> Result<Json<HashMap<String, String>>, AdminError> {
	let config: SystemConfig = state.store.load_config().await?;
	Ok(Json(config.raw().clone()))
}

#[derive(Deserialize)]
struct ConfigValue {
	value: String,
}

async fn set_config(State(state): State<AdminState>, Path(key): Path<String>, Json(body): Json<ConfigValue>) -> Result<(), AdminError> {
	state.store.set_config_value(&key, &body.value).await?;
	Ok(())
}
