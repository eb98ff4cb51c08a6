//! OAuth2/OIDC message encoding, decoding, and request construction.
//!
//! The consumer never touches wire formats directly; it goes through a [`MessageLayer`].
//! [`StandardMessages`] covers the form/JSON encodings used by most providers, and hosts can
//! swap in their own layer when a provider needs something else.

pub(crate) mod codec;
mod types;

pub use types::*;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use oauth2::{
	HttpRequest,
	http::{
		Method,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use url::form_urlencoded::Serializer as FormSerializer;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	http::{MIME_FORM, MIME_JSON},
};

/// Payload encoding of an inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageFormat {
	/// `application/x-www-form-urlencoded` (query strings and form posts).
	UrlEncoded,
	/// JSON object.
	Json,
}

/// Outcome of parsing a provider message: the expected message or a provider error shape.
#[derive(Clone, Debug, PartialEq)]
pub enum Parsed<T> {
	/// Expected message.
	Message(T),
	/// Provider error response.
	Error(ErrorShape),
}

/// Failures raised while decoding provider payloads.
#[derive(Debug, ThisError)]
pub enum MessageError {
	/// Payload is not valid JSON.
	#[error("Payload is not valid JSON.")]
	Json(#[from] serde_json::Error),
	/// JSON payload is not an object.
	#[error("Payload must be a JSON object.")]
	NotAnObject,
	/// A field failed to decode.
	#[error("Field `{path}` is invalid: {message}.")]
	Field {
		/// Path to the offending field.
		path: String,
		/// Decoder message.
		message: String,
	},
}
impl From<serde_path_to_error::Error<serde_json::Error>> for MessageError {
	fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		Self::Field { path: e.path().to_string(), message: e.inner().to_string() }
	}
}

/// Collaborator that encodes requests and decodes responses for the consumer.
pub trait MessageLayer
where
	Self: Send + Sync,
{
	/// Renders the URL-encoded query of an authorization request.
	fn authorization_request(&self, request: &AuthorizationRequest) -> String;

	/// Parses an authorization response delivered on the callback.
	fn parse_authorization_response(
		&self,
		raw: &str,
		format: MessageFormat,
	) -> Result<Parsed<AuthorizationResponse>, MessageError>;

	/// Parses an access-token response; unknown parameters are kept only when `extended`.
	fn parse_access_token_response(
		&self,
		raw: &str,
		format: MessageFormat,
		extended: bool,
	) -> Result<Parsed<AccessTokenResponse>, MessageError>;

	/// Builds the HTTP request redeeming an authorization code at `endpoint`.
	fn access_token_request(
		&self,
		endpoint: &Url,
		request: &AccessTokenRequest,
	) -> Result<HttpRequest, ConfigError>;

	/// Builds the bearer-authenticated userinfo request.
	fn user_info_request(
		&self,
		endpoint: &Url,
		token: &TokenSecret,
	) -> Result<HttpRequest, ConfigError>;

	/// Parses a userinfo response body.
	fn parse_user_info(&self, raw: &str) -> Result<Parsed<UserInfo>, MessageError>;
}

/// Default [`MessageLayer`] speaking form-encoded requests and JSON responses.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardMessages;
impl MessageLayer for StandardMessages {
	fn authorization_request(&self, request: &AuthorizationRequest) -> String {
		FormSerializer::new(String::new()).extend_pairs(request.query_pairs()).finish()
	}

	fn parse_authorization_response(
		&self,
		raw: &str,
		format: MessageFormat,
	) -> Result<Parsed<AuthorizationResponse>, MessageError> {
		codec::decode(codec::payload_object(raw, format)?)
	}

	fn parse_access_token_response(
		&self,
		raw: &str,
		format: MessageFormat,
		extended: bool,
	) -> Result<Parsed<AccessTokenResponse>, MessageError> {
		let parsed = codec::decode::<AccessTokenResponse>(codec::payload_object(raw, format)?)?;

		Ok(match parsed {
			Parsed::Message(mut response) => {
				if !extended {
					response.extra.clear();
				}

				Parsed::Message(response)
			},
			error => error,
		})
	}

	fn access_token_request(
		&self,
		endpoint: &Url,
		request: &AccessTokenRequest,
	) -> Result<HttpRequest, ConfigError> {
		let mut form = FormSerializer::new(String::new());

		form.append_pair("grant_type", "authorization_code");
		form.append_pair("code", request.code.expose());

		if let Some(redirect_uri) = request.redirect_uri.as_deref() {
			form.append_pair("redirect_uri", redirect_uri);
		}

		let mut builder = oauth2::http::Request::builder()
			.method(Method::POST)
			.uri(endpoint.as_str())
			.header(ACCEPT, MIME_JSON)
			.header(CONTENT_TYPE, MIME_FORM);

		match &request.auth {
			ClientAuth::Basic { client_id, password } => {
				let credentials =
					STANDARD.encode(format!("{client_id}:{}", password.expose()).as_bytes());

				builder = builder.header(AUTHORIZATION, format!("Basic {credentials}"));
			},
			ClientAuth::RequestBody { client_id, client_secret } => {
				form.append_pair("client_id", client_id);
				form.append_pair("client_secret", client_secret.expose());
			},
		}

		Ok(builder.body(form.finish().into_bytes())?)
	}

	fn user_info_request(
		&self,
		endpoint: &Url,
		token: &TokenSecret,
	) -> Result<HttpRequest, ConfigError> {
		Ok(oauth2::http::Request::builder()
			.method(Method::GET)
			.uri(endpoint.as_str())
			.header(ACCEPT, MIME_JSON)
			.header(AUTHORIZATION, format!("Bearer {}", token.expose()))
			.body(Vec::new())?)
	}

	fn parse_user_info(&self, raw: &str) -> Result<Parsed<UserInfo>, MessageError> {
		codec::decode(codec::payload_object(raw, MessageFormat::Json)?)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn authorization_response_parses_query_and_error_shapes() {
		let layer = StandardMessages;
		let parsed = layer
			.parse_authorization_response("?code=abc&state=xyz&foo=bar", MessageFormat::UrlEncoded)
			.expect("Authorization response should parse.");
		let Parsed::Message(response) = parsed else {
			panic!("Expected an authorization response, got {parsed:?}.");
		};

		assert_eq!(response.code.as_ref().map(TokenSecret::expose), Some("abc"));
		assert_eq!(response.state, "xyz");
		assert!(response.access_token.is_none());

		let error = layer
			.parse_authorization_response(
				"error=access_denied&error_description=denied&state=xyz",
				MessageFormat::UrlEncoded,
			)
			.expect("Error shape should parse.");

		assert!(matches!(error, Parsed::Error(ref shape) if shape.error == "access_denied"));
	}

	#[test]
	fn authorization_response_requires_state() {
		let err = StandardMessages
			.parse_authorization_response("code=abc", MessageFormat::UrlEncoded)
			.expect_err("Responses without state should be rejected.");

		assert!(err.to_string().contains("state"), "Unexpected error: {err}.");
	}

	#[test]
	fn access_token_response_extended_mode_keeps_unknown_fields() {
		let raw = "access_token=tok&token_type=Bearer&expires_in=3600&state=s1&session_state=xyz";
		let layer = StandardMessages;
		let Parsed::Message(extended) = layer
			.parse_access_token_response(raw, MessageFormat::UrlEncoded, true)
			.expect("Extended parse should succeed.")
		else {
			panic!("Expected an access token response.");
		};
		let Parsed::Message(strict) = layer
			.parse_access_token_response(raw, MessageFormat::UrlEncoded, false)
			.expect("Strict parse should succeed.")
		else {
			panic!("Expected an access token response.");
		};

		assert_eq!(extended.expires_in, Some(3600));
		assert_eq!(extended.state.as_deref(), Some("s1"));
		assert!(extended.extra.contains_key("session_state"));
		assert!(strict.extra.is_empty());
	}

	#[test]
	fn access_token_response_reports_bad_field_path() {
		let err = StandardMessages
			.parse_access_token_response(
				r#"{"access_token":"tok","expires_in":"soon"}"#,
				MessageFormat::Json,
				false,
			)
			.expect_err("Non-numeric expires_in should fail.");

		assert!(matches!(err, MessageError::Field { ref path, .. } if path == "expires_in"));
	}

	#[test]
	fn token_request_applies_client_auth() {
		let endpoint = Url::parse("https://op.example.org/token").expect("URL should parse.");
		let layer = StandardMessages;
		let basic = layer
			.access_token_request(
				&endpoint,
				&AccessTokenRequest {
					code: TokenSecret::new("code-1"),
					redirect_uri: Some("https://rp.example.org/cb".into()),
					auth: ClientAuth::Basic {
						client_id: "client".into(),
						password: TokenSecret::new("pw"),
					},
				},
			)
			.expect("Basic token request should build.");
		let expected = format!("Basic {}", STANDARD.encode("client:pw"));

		assert_eq!(
			basic.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
			Some(expected.as_str())
		);
		assert!(!String::from_utf8_lossy(basic.body()).contains("client_secret"));

		let body = layer
			.access_token_request(
				&endpoint,
				&AccessTokenRequest {
					code: TokenSecret::new("code-1"),
					redirect_uri: None,
					auth: ClientAuth::RequestBody {
						client_id: "client".into(),
						client_secret: TokenSecret::new("secret"),
					},
				},
			)
			.expect("Request-body token request should build.");
		let form = String::from_utf8_lossy(body.body()).into_owned();

		assert!(body.headers().get(AUTHORIZATION).is_none());
		assert!(form.contains("grant_type=authorization_code"));
		assert!(form.contains("client_id=client"));
		assert!(form.contains("client_secret=secret"));
	}

	#[test]
	fn user_info_parses_claims() {
		let Parsed::Message(info) = StandardMessages
			.parse_user_info(r#"{"sub":"alice","email":"alice@example.org"}"#)
			.expect("Userinfo should parse.")
		else {
			panic!("Expected userinfo claims.");
		};

		assert_eq!(info.sub, "alice");
		assert_eq!(info.claim_str("email"), Some("alice@example.org"));
	}
}
