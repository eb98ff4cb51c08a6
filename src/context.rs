//! Web-server request plumbing seen by the consumer.

// self
use crate::{_prelude::*, error::ConfigError};

/// HTTP method of an inbound request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HttpMethod {
	/// `GET`.
	Get,
	/// `POST`.
	Post,
	/// Any other method.
	Other(String),
}
impl HttpMethod {
	/// Parses a method token, case-insensitively.
	pub fn parse(method: &str) -> Self {
		if method.eq_ignore_ascii_case("GET") {
			HttpMethod::Get
		} else if method.eq_ignore_ascii_case("POST") {
			HttpMethod::Post
		} else {
			HttpMethod::Other(method.to_ascii_uppercase())
		}
	}
}
impl Display for HttpMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			HttpMethod::Get => f.write_str("GET"),
			HttpMethod::Post => f.write_str("POST"),
			HttpMethod::Other(method) => f.write_str(method),
		}
	}
}

/// Read-only view of the request the host is currently serving.
pub trait RequestContext
where
	Self: Send + Sync,
{
	/// Request method.
	fn method(&self) -> HttpMethod;

	/// Origin of the request (`scheme://host[:port]`), optionally followed by the path
	/// (`include_path`) and the query string (`include_query`).
	fn base_url(&self, include_query: bool, include_path: bool) -> String;

	/// Complete request URL.
	fn full_url(&self) -> String {
		self.base_url(true, true)
	}

	/// Raw query string without the leading `?`.
	fn query(&self) -> Option<&str>;

	/// Raw form body of a `POST` request.
	fn post_body(&self) -> Option<&str>;
}

/// Plain [`RequestContext`] value for hosts that already parsed the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackRequest {
	method: HttpMethod,
	url: Url,
	body: Option<String>,
}
impl CallbackRequest {
	/// Builds a request from its parts.
	pub fn new(method: HttpMethod, url: Url, body: Option<String>) -> Self {
		Self { method, url, body }
	}

	/// Builds a `GET` request for `url`.
	pub fn get(url: &str) -> Result<Self, ConfigError> {
		Ok(Self::new(HttpMethod::Get, parse_url(url)?, None))
	}

	/// Builds a form `POST` request for `url`.
	pub fn post(url: &str, body: impl Into<String>) -> Result<Self, ConfigError> {
		Ok(Self::new(HttpMethod::Post, parse_url(url)?, Some(body.into())))
	}

	/// Request URL.
	pub fn url(&self) -> &Url {
		&self.url
	}
}
impl RequestContext for CallbackRequest {
	fn method(&self) -> HttpMethod {
		self.method.clone()
	}

	fn base_url(&self, include_query: bool, include_path: bool) -> String {
		let mut base = self.url.origin().ascii_serialization();

		if include_path {
			base.push_str(self.url.path());
		}
		if let Some(query) = self.url.query().filter(|_| include_query) {
			base.push('?');
			base.push_str(query);
		}

		base
	}

	fn query(&self) -> Option<&str> {
		self.url.query()
	}

	fn post_body(&self) -> Option<&str> {
		self.body.as_deref()
	}
}

fn parse_url(url: &str) -> Result<Url, ConfigError> {
	Url::parse(url).map_err(|source| ConfigError::InvalidUrl { what: "request", source })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn base_url_variants() {
		let request = CallbackRequest::get("https://rp.example.org:8443/authz_cb?code=1&state=2")
			.expect("Callback URL should parse.");

		assert_eq!(request.base_url(false, false), "https://rp.example.org:8443");
		assert_eq!(request.base_url(false, true), "https://rp.example.org:8443/authz_cb");
		assert_eq!(request.full_url(), "https://rp.example.org:8443/authz_cb?code=1&state=2");
		assert_eq!(request.query(), Some("code=1&state=2"));
		assert!(request.post_body().is_none());
	}

	#[test]
	fn methods_parse_case_insensitively() {
		assert_eq!(HttpMethod::parse("get"), HttpMethod::Get);
		assert_eq!(HttpMethod::parse("Post"), HttpMethod::Post);
		assert_eq!(HttpMethod::parse("put").to_string(), "PUT");
	}
}
