//! Maps a request to the rate-limit key a rule's quota is counted against.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use gateway_types::rule::{BodyContentType, IdentifierMode, IdentifierSource};

/// Everything about an inbound request the resolver needs, collected once
/// by the ingress filter chain before rule evaluation.
pub struct RequestParts<'a> {
	pub headers: &'a axum::http::HeaderMap,
	pub cookies: &'a std::collections::HashMap<String, String>,
	pub body: &'a [u8],
	pub body_content_type: Option<&'a str>,
	pub client_ip: &'a str,
}

/// Resolves the identifier for `source` against `req`. A rule configures
/// exactly one source; if that source's value is absent from the request
/// (header not sent, cookie not set, body field missing, claim absent),
/// resolution falls back to the caller's IP rather than failing closed.
#[must_use]
pub fn resolve(source: &IdentifierSource, req: &RequestParts<'_>) -> String {
	match source {
		IdentifierSource::Header { name, mode } => resolve_header(name, *mode, req),
		IdentifierSource::Cookie { name, mode } => resolve_cookie(name, *mode, req),
		IdentifierSource::Body { field_path, content_type, mode } => resolve_body(field_path, *content_type, *mode, req),
		IdentifierSource::Jwt { claims, separator, mode } => resolve_jwt(claims, separator, *mode, req),
		IdentifierSource::Ip => req.client_ip.to_owned(),
	}
}

fn combine(mode: IdentifierMode, ip: &str, value: String) -> String {
	match mode {
		IdentifierMode::ReplaceIp => value,
		IdentifierMode::CombineWithIp => format!("{ip}:{value}"),
	}
}

fn resolve_header(name: &str, mode: IdentifierMode, req: &RequestParts<'_>) -> String {
	match req.headers.get(name).and_then(|v| v.to_str().ok()).filter(|v| !v.is_empty()) {
		Some(value) => combine(mode, req.client_ip, value.to_owned()),
		None => req.client_ip.to_owned(),
	}
}

fn resolve_cookie(name: &str, mode: IdentifierMode, req: &RequestParts<'_>) -> String {
	match req.cookies.get(name).filter(|v| !v.is_empty()) {
		Some(value) => combine(mode, req.client_ip, value.clone()),
		None => req.client_ip.to_owned(),
	}
}

fn resolve_body(field_path: &str, content_type: BodyContentType, mode: IdentifierMode, req: &RequestParts<'_>) -> String {
	let extracted = match content_type {
		BodyContentType::Json => extract_json_field(req.body, field_path),
		BodyContentType::FormUrlEncoded => extract_form_field(req.body, field_path),
		BodyContentType::Xml => extract_xml_field(req.body, field_path),
		BodyContentType::Multipart => extract_multipart_field(req.body, req.body_content_type, field_path),
	};
	match extracted.filter(|v| !v.is_empty()) {
		Some(value) => combine(mode, req.client_ip, value),
		None => req.client_ip.to_owned(),
	}
}

fn extract_json_field(body: &[u8], field_path: &str) -> Option<String> {
	let value: serde_json::Value = serde_json::from_slice(body).ok()?;
	let mut cursor = &value;
	for segment in field_path.split('.') {
		cursor = cursor.get(segment)?;
	}
	match cursor {
		serde_json::Value::String(s) => Some(s.clone()),
		serde_json::Value::Null => None,
		other => Some(other.to_string()),
	}
}

fn extract_form_field(body: &[u8], field_path: &str) -> Option<String> {
	let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).ok()?;
	pairs.into_iter().find(|(k, _)| k == field_path).map(|(_, v)| v)
}

/// Descends `field_path` (dot-separated tag names) through the XML tree.
/// `quick_xml::Reader` never fetches external entities or resolves DOCTYPEs
/// (it has no DTD subsystem at all), so this is XXE-safe by construction.
/// A `<!DOCTYPE` token is still rejected up front rather than trusted to the
/// parser's lack of a DTD subsystem: a malformed body falls through to the
/// next identifier source, same as any other parse failure.
fn extract_xml_field(body: &[u8], field_path: &str) -> Option<String> {
	use quick_xml::events::Event;
	use quick_xml::reader::Reader;

	if contains_doctype(body) {
		return None;
	}

	let path: Vec<&str> = field_path.split('.').collect();
	let mut reader = Reader::from_reader(body);
	reader.config_mut().trim_text(true);

	let mut depth_stack: Vec<String> = Vec::new();
	let mut buf = Vec::new();
	loop {
		match reader.read_event_into(&mut buf) {
			Ok(Event::Eof) => return None,
			Ok(Event::Start(tag)) => {
				depth_stack.push(String::from_utf8_lossy(tag.local_name().as_ref()).into_owned());
			}
			Ok(Event::End(_)) => {
				depth_stack.pop();
			}
			Ok(Event::Text(text)) if depth_stack.as_slice() == path => {
				return text.unescape().ok().map(|s| s.into_owned());
			}
			Ok(_) => {}
			Err(_) => return None,
		}
		buf.clear();
	}
}

/// Case-insensitive scan for a `<!DOCTYPE` token anywhere in the body,
/// without assuming well-formed XML (the token could precede a parse error).
fn contains_doctype(body: &[u8]) -> bool {
	body.windows(9).any(|w| w.eq_ignore_ascii_case(b"<!doctype"))
}

/// Finds the multipart part named `field_path` and returns its bytes as
/// text. Parsing is driven synchronously over the already-buffered body
/// by wrapping it as a single-chunk stream, since the body was captured
/// once up front by the ingress filter chain.
fn extract_multipart_field(body: &[u8], content_type: Option<&str>, field_path: &str) -> Option<String> {
	let boundary = content_type.and_then(multer::parse_boundary_from_content_type_or_default)?;
	let body = body.to_vec();
	let field_path = field_path.to_owned();

	tokio::task::block_in_place(|| {
		tokio::runtime::Handle::current().block_on(async move {
			let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(body) });
			let mut multipart = multer::Multipart::new(stream, boundary);
			while let Ok(Some(field)) = multipart.next_field().await {
				if field.name() == Some(field_path.as_str()) {
					return field.text().await.ok();
				}
			}
			None
		})
	})
}

fn resolve_jwt(claims: &[String], separator: &str, mode: IdentifierMode, req: &RequestParts<'_>) -> String {
	match extract_jwt_claims(req.headers, claims, separator) {
		Some(value) => combine(mode, req.client_ip, value),
		None => req.client_ip.to_owned(),
	}
}

/// Decodes the bearer token's claims segment without verifying its
/// signature — verification is explicitly out of scope. If any
/// configured claim is absent the whole source fails and the caller falls
/// through to IP.
fn extract_jwt_claims(headers: &axum::http::HeaderMap, claims: &[String], separator: &str) -> Option<String> {
	let auth = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
	let token = auth.strip_prefix("Bearer ")?;
	let mut parts = token.split('.');
	let _header = parts.next()?;
	let payload = parts.next()?;
	let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
	let json: serde_json::Value = serde_json::from_slice(&decoded).ok()?;

	let mut values = Vec::with_capacity(claims.len());
	for claim in claims {
		let value = json.get(claim)?;
		values.push(match value {
			serde_json::Value::String(s) => s.clone(),
			other => other.to_string(),
		});
	}
	Some(values.join(separator))
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::HeaderMap;
	use std::collections::HashMap;

	fn parts<'a>(headers: &'a HeaderMap, cookies: &'a HashMap<String, String>, body: &'a [u8]) -> RequestParts<'a> {
		RequestParts {
			headers,
			cookies,
			body,
			body_content_type: None,
			client_ip: "10.0.0.1",
		}
	}

	#[test]
	fn header_source_replaces_ip() {
		let mut headers = HeaderMap::new();
		headers.insert("x-api-key", "abc".parse().unwrap());
		let cookies = HashMap::new();
		let req = parts(&headers, &cookies, b"");
		let source = IdentifierSource::Header {
			name: "x-api-key".into(),
			mode: IdentifierMode::ReplaceIp,
		};
		assert_eq!(resolve(&source, &req), "abc");
	}

	#[test]
	fn header_source_combines_with_ip() {
		let mut headers = HeaderMap::new();
		headers.insert("x-api-key", "abc".parse().unwrap());
		let cookies = HashMap::new();
		let req = parts(&headers, &cookies, b"");
		let source = IdentifierSource::Header {
			name: "x-api-key".into(),
			mode: IdentifierMode::CombineWithIp,
		};
		assert_eq!(resolve(&source, &req), "10.0.0.1:abc");
	}

	#[test]
	fn missing_header_falls_through_to_ip() {
		let headers = HeaderMap::new();
		let cookies = HashMap::new();
		let req = parts(&headers, &cookies, b"");
		let source = IdentifierSource::Header {
			name: "x-api-key".into(),
			mode: IdentifierMode::ReplaceIp,
		};
		assert_eq!(resolve(&source, &req), "10.0.0.1");
	}

	#[test]
	fn json_body_field_dot_path() {
		let headers = HeaderMap::new();
		let cookies = HashMap::new();
		let body = br#"{"user": {"id": "u-42"}}"#;
		let req = parts(&headers, &cookies, body);
		let source = IdentifierSource::Body {
			field_path: "user.id".into(),
			content_type: BodyContentType::Json,
			mode: IdentifierMode::ReplaceIp,
		};
		assert_eq!(resolve(&source, &req), "u-42");
	}

	#[test]
	fn form_url_encoded_body_field() {
		let headers = HeaderMap::new();
		let cookies = HashMap::new();
		let body = b"account=acme&other=1";
		let req = parts(&headers, &cookies, body);
		let source = IdentifierSource::Body {
			field_path: "account".into(),
			content_type: BodyContentType::FormUrlEncoded,
			mode: IdentifierMode::ReplaceIp,
		};
		assert_eq!(resolve(&source, &req), "acme");
	}

	#[test]
	fn xml_body_field_nested_path() {
		let headers = HeaderMap::new();
		let cookies = HashMap::new();
		let body = b"<request><account><id>acct-7</id></account></request>";
		let req = parts(&headers, &cookies, body);
		let source = IdentifierSource::Body {
			field_path: "account.id".into(),
			content_type: BodyContentType::Xml,
			mode: IdentifierMode::ReplaceIp,
		};
		assert_eq!(resolve(&source, &req), "acct-7");
	}

	#[test]
	fn jwt_claims_are_joined_in_order_without_signature_check() {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
		let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"u1","tenant":"t1"}"#);
		let token = format!("{header}.{payload}.unsigned");

		let mut headers = HeaderMap::new();
		headers.insert(axum::http::header::AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
		let cookies = HashMap::new();
		let req = parts(&headers, &cookies, b"");
		let source = IdentifierSource::Jwt {
			claims: vec!["sub".into(), "tenant".into()],
			separator: ":".into(),
			mode: IdentifierMode::ReplaceIp,
		};
		assert_eq!(resolve(&source, &req), "u1:t1");
	}

	#[test]
	fn jwt_missing_claim_falls_through_to_ip() {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
		let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"u1"}"#);
		let token = format!("{header}.{payload}.unsigned");

		let mut headers = HeaderMap::new();
		headers.insert(axum::http::header::AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
		let cookies = HashMap::new();
		let req = parts(&headers, &cookies, b"");
		let source = IdentifierSource::Jwt {
			claims: vec!["sub".into(), "tenant".into()],
			separator: ":".into(),
			mode: IdentifierMode::ReplaceIp,
		};
		assert_eq!(resolve(&source, &req), "10.0.0.1");
	}
}
