//! Typed protocol messages exchanged with the provider.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	message::codec,
};

/// Authorization request sent to the provider's authorization endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
	/// Requested response type (`code`, `token`, `code id_token`, ...).
	pub response_type: String,
	/// Client identifier.
	pub client_id: String,
	/// Redirect URI the provider returns the user to.
	pub redirect_uri: Option<String>,
	/// Space-delimited requested scopes.
	pub scope: String,
	/// Session state binding the callback to this request.
	pub state: String,
	/// Replay-protection nonce.
	pub nonce: Option<String>,
	/// Inline request object.
	pub request: Option<String>,
	/// Location of a request object file.
	pub request_uri: Option<String>,
}
impl AuthorizationRequest {
	/// Non-empty parameters in wire order.
	pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
		let mut pairs = vec![
			("response_type", self.response_type.as_str()),
			("client_id", self.client_id.as_str()),
		];
		let optional = [
			("redirect_uri", self.redirect_uri.as_deref()),
			("scope", Some(self.scope.as_str())),
			("state", Some(self.state.as_str())),
			("nonce", self.nonce.as_deref()),
			("request", self.request.as_deref()),
			("request_uri", self.request_uri.as_deref()),
		];

		for (name, value) in optional {
			if let Some(value) = value.filter(|v| !v.is_empty()) {
				pairs.push((name, value));
			}
		}

		pairs
	}
}

/// Authorization response delivered on the callback (code flow).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
	/// Authorization code.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<TokenSecret>,
	/// State echoed by the provider.
	pub state: String,
	/// Inline access token (hybrid response types).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub access_token: Option<TokenSecret>,
	/// Token type accompanying an inline access token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// Lifetime of an inline access token in seconds.
	#[serde(default, deserialize_with = "codec::lenient_i64", skip_serializing_if = "Option::is_none")]
	pub expires_in: Option<i64>,
	/// Inline refresh token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Inline id token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
	/// Granted scopes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<ScopeSet>,
	/// Parameters outside the known set.
	#[serde(flatten)]
	pub extra: BTreeMap<String, Value>,
}
impl AuthorizationResponse {
	/// Builds an access-token response from inline token fields, if an access token is present.
	pub fn access_token_response(&self) -> Option<AccessTokenResponse> {
		let access_token = self.access_token.clone()?;

		Some(AccessTokenResponse {
			access_token,
			token_type: self.token_type.clone(),
			expires_in: self.expires_in,
			refresh_token: self.refresh_token.clone(),
			id_token: self.id_token.clone(),
			scope: self.scope.clone(),
			state: Some(self.state.clone()),
			extra: BTreeMap::new(),
		})
	}
}

/// Access-token response returned by the token endpoint or the implicit callback.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenResponse {
	/// Access token secret.
	pub access_token: TokenSecret,
	/// Token type (usually `Bearer`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// Lifetime in seconds.
	#[serde(default, deserialize_with = "codec::lenient_i64", skip_serializing_if = "Option::is_none")]
	pub expires_in: Option<i64>,
	/// Refresh token secret.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Id token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
	/// Granted scopes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<ScopeSet>,
	/// State echoed on implicit callbacks.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
	/// Parameters outside the known set; only kept when parsed in extended mode.
	#[serde(flatten)]
	pub extra: BTreeMap<String, Value>,
}

/// Claims returned by the userinfo endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
	/// Subject identifier.
	pub sub: String,
	/// Remaining claims.
	#[serde(flatten)]
	pub claims: BTreeMap<String, Value>,
}
impl UserInfo {
	/// Returns a string claim by name.
	pub fn claim_str(&self, name: &str) -> Option<&str> {
		self.claims.get(name).and_then(Value::as_str)
	}
}

/// Provider error response (`error`, `error_description`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
	/// Error code.
	pub error: String,
	/// Human-readable description.
	#[serde(default)]
	pub error_description: Option<String>,
	/// Documentation link.
	#[serde(default)]
	pub error_uri: Option<String>,
	/// State echoed alongside the error.
	#[serde(default)]
	pub state: Option<String>,
}

/// Client authentication applied to token requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientAuth {
	/// HTTP Basic with `client_id:password`.
	Basic {
		/// Client identifier.
		client_id: String,
		/// Client password.
		password: TokenSecret,
	},
	/// `client_id` and `client_secret` in the form body.
	RequestBody {
		/// Client identifier.
		client_id: String,
		/// Client secret.
		client_secret: TokenSecret,
	},
}

/// Arguments for an authorization-code token request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessTokenRequest {
	/// Authorization code being redeemed.
	pub code: TokenSecret,
	/// Redirect URI used on the authorization request.
	pub redirect_uri: Option<String>,
	/// Client authentication.
	pub auth: ClientAuth,
}
