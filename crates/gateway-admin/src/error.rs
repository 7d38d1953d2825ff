use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdminError {
	#[error("rule {0} not found")]
	RuleNotFound(String),

	#[error("rule failed validation: {0}")]
	InvalidRule(#[from] gateway_types::rule::RuleValidationError),

	#[error("shared state error: {0}")]
	Store(#[from] gateway_state::StoreError),

	#[error("rate limiter error: {0}")]
	Limiter(#[from] gateway_limiter::LimiterError),

	#[error("request body was not valid JSON: {0}")]
	Json(#[from] serde_json::Error),
}

impl AdminError {
	const fn status_code(&self) -> StatusCode {
		match self {
			Self::RuleNotFound(_) => StatusCode::NOT_FOUND,
			Self::InvalidRule(_) | Self::Json(_) => StatusCode::BAD_REQUEST,
			Self::Store(_) | Self::Limiter(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

#[derive(Serialize)]
struct ErrorBody {
	error: String,
}

impl IntoResponse for AdminError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		(status, Json(ErrorBody { error: self.to_string() })).into_response()
	}
}
