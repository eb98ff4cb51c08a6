//! Per-state grant envelopes holding the authorization code and issued tokens.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
	message::AccessTokenResponse,
};

/// Grants keyed by scope or state, as persisted on a session.
pub type GrantMap = BTreeMap<String, Grant>;

/// Tokens issued for one grant, captured from an access-token response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Token type reported by the provider (usually `Bearer`).
	pub token_type: Option<String>,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Raw id token, if the provider issued one.
	pub id_token: Option<String>,
	/// Scopes the provider reported for the token.
	pub scope: Option<ScopeSet>,
	/// Instant the response was attached.
	pub issued_at: OffsetDateTime,
	/// Expiry derived from `issued_at + expires_in`.
	pub expires_at: Option<OffsetDateTime>,
}
impl Token {
	/// Builds a token from a provider response received at `issued_at`.
	///
	/// Fails when `expires_in` pushes the expiry past the representable date range.
	pub fn from_response(
		response: &AccessTokenResponse,
		issued_at: OffsetDateTime,
	) -> Result<Self, ConfigError> {
		let expires_at = response
			.expires_in
			.filter(|secs| *secs > 0)
			.map(|secs| {
				issued_at.checked_add(Duration::seconds(secs)).ok_or(ConfigError::ExpiresInOutOfRange)
			})
			.transpose()?;

		Ok(Self {
			access_token: response.access_token.clone(),
			token_type: response.token_type.clone(),
			refresh_token: response.refresh_token.clone(),
			id_token: response.id_token.clone(),
			scope: response.scope.clone(),
			issued_at,
			expires_at,
		})
	}

	/// Returns `true` if the token has a known expiry at or before `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| instant >= expires_at)
	}
}

/// Token envelope bound to one authorization `state`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
	/// State the grant was created for.
	pub state: String,
	/// Authorization code received on the callback.
	pub code: Option<TokenSecret>,
	/// Tokens attached so far, oldest first.
	#[serde(default)]
	pub tokens: Vec<Token>,
	/// Most recent id token seen for this grant.
	pub id_token: Option<String>,
}
impl Grant {
	/// Creates an empty grant for `state`.
	pub fn new(state: impl Into<String>) -> Self {
		Self { state: state.into(), code: None, tokens: Vec::new(), id_token: None }
	}

	/// Records the authorization code returned by the provider.
	pub fn add_code(&mut self, code: impl Into<String>) {
		self.code = Some(TokenSecret::new(code));
	}

	/// Attaches an access-token response; the grant is left untouched on error.
	pub fn add_token(&mut self, response: &AccessTokenResponse) -> Result<(), ConfigError> {
		let token = Token::from_response(response, OffsetDateTime::now_utc())?;

		if token.id_token.is_some() {
			self.id_token = token.id_token.clone();
		}

		self.tokens.push(token);

		Ok(())
	}

	/// Latest attached token, if any.
	pub fn latest_token(&self) -> Option<&Token> {
		self.tokens.last()
	}

	/// Returns `true` once at least one token has been attached.
	pub fn has_token(&self) -> bool {
		!self.tokens.is_empty()
	}
}

/// Merges persisted grants into `local` without dropping either side; local entries win on
/// key collisions.
pub fn merge_grants(local: &mut GrantMap, persisted: GrantMap) {
	for (key, grant) in persisted {
		local.entry(key).or_insert(grant);
	}
}
