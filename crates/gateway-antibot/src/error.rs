use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// A terminal anti-bot rejection, with the status and reason tag the data
/// plane surfaces as `X-Rejection-Reason` / `X-Duplicate-Request`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntibotRejection {
	#[error("honeypot field was not empty")]
	Honeypot,
	#[error("form submitted before the minimum elapsed time")]
	TooFast,
	#[error("token missing or expired")]
	InvalidToken,
	#[error("token already consumed")]
	ReusedToken,
	#[error("idempotency key already seen")]
	Duplicate,
}

impl AntibotRejection {
	#[must_use]
	pub fn reason(self) -> &'static str {
		match self {
			Self::Honeypot => "honeypot",
			Self::TooFast => "too-fast",
			Self::InvalidToken => "invalid-token",
			Self::ReusedToken => "reused-token",
			Self::Duplicate => "duplicate",
		}
	}

	#[must_use]
	pub fn status(self) -> StatusCode {
		match self {
			Self::Duplicate => StatusCode::CONFLICT,
			_ => StatusCode::FORBIDDEN,
		}
	}
}

impl IntoResponse for AntibotRejection {
	fn into_response(self) -> Response {
		let mut response = self.status().into_response();
		if let Ok(value) = self.reason().parse() {
			response.headers_mut().insert("X-Rejection-Reason", value);
		}
		if self == Self::Duplicate {
			response.headers_mut().insert("X-Duplicate-Request", "true".parse().expect("static header value"));
		}
		response
	}
}
