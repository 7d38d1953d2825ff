//! Forwards an admitted request to the matched rule's upstream. There is
//! no teacher module for reverse-proxying specifically; this is a thin
//! `reqwest`-based forwarder built for this crate, grounded only in the
//! teacher's general pattern of wrapping a `reqwest::Client` behind a
//! narrow async function.

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tracing::warn;

#[derive(Clone)]
pub struct Proxy {
	client: reqwest::Client,
}

impl Proxy {
	#[must_use]
	pub fn new() -> Self {
		Self { client: reqwest::Client::new() }
	}

	/// Forwards `method`/`path_and_query` to `target_uri`'s origin, carrying
	/// `headers` and `body` through unchanged.
	pub async fn forward(&self, target_uri: &str, method: &Method, path_and_query: &Uri, headers: &HeaderMap, body: Bytes) -> Response {
		let url = match build_upstream_url(target_uri, path_and_query) {
			Ok(url) => url,
			Err(e) => {
				warn!(error = %e, target_uri, "failed to build upstream url");
				return StatusCode::BAD_GATEWAY.into_response();
			}
		};

		let mut request = self.client.request(method.clone(), url).body(body);
		for (name, value) in headers {
			if name == axum::http::header::HOST {
				continue;
			}
			request = request.header(name, value);
		}

		match request.send().await {
			Ok(upstream) => into_axum_response(upstream).await,
			Err(e) => {
				warn!(error = %e, "upstream request failed");
				StatusCode::BAD_GATEWAY.into_response()
			}
		}
	}
}

impl Default for Proxy {
	fn default() -> Self {
		Self::new()
	}
}

fn build_upstream_url(target_uri: &str, path_and_query: &Uri) -> Result<String, anyhow::Error> {
	let base = target_uri.trim_end_matches('/');
	let suffix = path_and_query.path_and_query().map(axum::http::uri::PathAndQuery::as_str).unwrap_or("/");
	Ok(format!("{base}{suffix}"))
}

async fn into_axum_response(upstream: reqwest::Response) -> Response {
	let status = upstream.status();
	let headers = upstream.headers().clone();
	let body = upstream.bytes().await.unwrap_or_default();

	let mut response = Response::new(axum::body::Body::from(body));
	*response.status_mut() = status;
	*response.headers_mut() = headers;
	response
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builds_upstream_url_from_target_and_path() {
		let uri: Uri = "/api/hello?x=1".parse().unwrap();
		let url = build_upstream_url("http://upstream.local/", &uri).unwrap();
		assert_eq!(url, "http://upstream.local/api/hello?x=1");
	}
}
