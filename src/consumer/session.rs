//! Persisted session snapshot, flow states, and identifier generation.

// crates.io
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{GrantMap, merge_grants},
	message::UserInfo,
};

/// Length of the per-consumer seed.
pub const SEED_LEN: usize = 16;
/// Length of the authorization request nonce.
pub const NONCE_LEN: usize = 12;

/// Position of a session in the authorization flow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
	/// Nothing has happened yet.
	#[default]
	Idle,
	/// `begin` is assembling the authorization request.
	Initiated,
	/// The user was redirected; the callback has not arrived.
	AwaitingCallback,
	/// The callback delivered an authorization code.
	CodeReceived,
	/// The callback delivered tokens directly.
	TokensReceived,
	/// The code was redeemed at the token endpoint.
	TokenExchanged,
	/// Userinfo claims were fetched.
	UserInfoFetched,
	/// The last operation failed (in-memory only).
	Failed(FailureKind),
}
impl FlowState {
	/// Returns `true` if an authorization callback may be processed.
	pub fn accepts_callback(&self) -> bool {
		matches!(self, FlowState::AwaitingCallback)
	}

	/// Returns `true` once an access token is available.
	pub fn has_tokens(&self) -> bool {
		matches!(
			self,
			FlowState::TokensReceived | FlowState::TokenExchanged | FlowState::UserInfoFetched
		)
	}
}

/// Coarse classification of the error that moved a flow into [`FlowState::Failed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	/// Provider rejected the authorization.
	Authorization,
	/// Provider rejected a token or userinfo request.
	Token,
	/// Callback state was unknown or replayed.
	State,
	/// Malformed callback.
	BadRequest,
	/// Local configuration problem.
	Config,
	/// Store failure.
	Storage,
	/// Network or upstream failure.
	Transport,
	/// Operation not legal in the current state.
	Transition,
	/// Anything else.
	Other,
}
impl From<&Error> for FailureKind {
	fn from(error: &Error) -> Self {
		match error {
			Error::AuthzError { .. } => FailureKind::Authorization,
			Error::TokenError { .. } => FailureKind::Token,
			Error::UnknownState { .. } | Error::ReplayedCallback { .. } | Error::Cookie(_) =>
				FailureKind::State,
			Error::BadRequest { .. } => FailureKind::BadRequest,
			Error::Config(_) => FailureKind::Config,
			Error::Storage(_) => FailureKind::Storage,
			Error::Transient(_) | Error::Transport(_) => FailureKind::Transport,
			Error::InvalidTransition { .. } | Error::TokenAlreadyIssued { .. } =>
				FailureKind::Transition,
			_ => FailureKind::Other,
		}
	}
}

/// Complete persisted state of one flow attempt, stored under its `state`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
	/// Client identifier in use for this flow.
	pub client_id: Option<String>,
	/// Session id; doubles as the OAuth `state`.
	pub state: Option<String>,
	/// Grants keyed by state.
	pub grant: GrantMap,
	/// Redirect URI sent on the authorization request.
	pub redirect_uri: Option<String>,
	/// Provider authorization endpoint.
	pub authorization_endpoint: Option<Url>,
	/// Provider token endpoint.
	pub token_endpoint: Option<Url>,
	/// Provider token revocation endpoint.
	pub token_revocation_endpoint: Option<Url>,
	/// Provider userinfo endpoint.
	pub user_info_endpoint: Option<Url>,
	/// Consumer seed.
	pub seed: Option<String>,
	/// Debug events enabled.
	pub debug: bool,
	/// Nonce sent on the authorization request.
	pub nonce: Option<String>,
	/// Request-object file path (prefixed with `/`).
	pub request_filename: Option<String>,
	/// Claims returned by the userinfo endpoint.
	pub user_info: Option<UserInfo>,
	/// Latest id token.
	pub id_token: Option<String>,
	/// Last flow state reached successfully.
	pub flow: FlowState,
}
impl Session {
	/// Fills empty attributes from `persisted` without clobbering local values.
	///
	/// The grant map is the exception: persisted grants are always merged in, with local
	/// entries winning on key collisions.
	pub fn merge_from(&mut self, persisted: Session) {
		fill(&mut self.client_id, persisted.client_id);
		fill(&mut self.state, persisted.state);
		merge_grants(&mut self.grant, persisted.grant);
		fill(&mut self.redirect_uri, persisted.redirect_uri);
		fill(&mut self.authorization_endpoint, persisted.authorization_endpoint);
		fill(&mut self.token_endpoint, persisted.token_endpoint);
		fill(&mut self.token_revocation_endpoint, persisted.token_revocation_endpoint);
		fill(&mut self.user_info_endpoint, persisted.user_info_endpoint);
		fill(&mut self.seed, persisted.seed);

		self.debug |= persisted.debug;

		fill(&mut self.nonce, persisted.nonce);
		fill(&mut self.request_filename, persisted.request_filename);
		fill(&mut self.user_info, persisted.user_info);
		fill(&mut self.id_token, persisted.id_token);

		if self.flow == FlowState::Idle {
			self.flow = persisted.flow;
		}
	}
}

fn fill<T>(local: &mut Option<T>, incoming: Option<T>) {
	if local.is_none() {
		*local = incoming;
	}
}

/// Derives a session id from `instant`, the site `url`, and the consumer `seed`.
///
/// The id is the lowercase hex SHA-256 over the nanosecond timestamp, the URL, and the seed.
pub fn state_id(instant: OffsetDateTime, url: &str, seed: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(instant.unix_timestamp_nanos().to_string().as_bytes());
	hasher.update(url.as_bytes());
	hasher.update(seed.as_bytes());

	format!("{:x}", hasher.finalize())
}

/// Random ASCII letters and digits.
pub fn rndstr(len: usize) -> String {
	rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::Grant;

	#[test]
	fn state_ids_are_deterministic_per_instant() {
		let instant = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("Instant should be valid.");
		let later = instant + Duration::nanoseconds(1);
		let id = state_id(instant, "https://rp.example.org", "seed");

		assert_eq!(id, state_id(instant, "https://rp.example.org", "seed"));
		assert_ne!(id, state_id(later, "https://rp.example.org", "seed"));
		assert_eq!(id.len(), 64);
		assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}

	#[test]
	fn rndstr_uses_alphanumerics() {
		let value = rndstr(SEED_LEN);

		assert_eq!(value.len(), SEED_LEN);
		assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
	}

	#[test]
	fn merge_keeps_local_values_and_unions_grants() {
		let mut local = Session {
			state: Some("s1".into()),
			nonce: Some("local-nonce".into()),
			..Session::default()
		};

		local.grant.insert("s1".into(), Grant::new("s1"));

		let mut persisted = Session {
			state: Some("s1".into()),
			nonce: Some("persisted-nonce".into()),
			redirect_uri: Some("https://rp.example.org/authz_cb".into()),
			flow: FlowState::AwaitingCallback,
			..Session::default()
		};

		persisted.grant.insert("s0".into(), Grant::new("s0"));

		local.merge_from(persisted.clone());

		assert_eq!(local.nonce.as_deref(), Some("local-nonce"));
		assert_eq!(local.redirect_uri, persisted.redirect_uri);
		assert_eq!(local.flow, FlowState::AwaitingCallback);
		assert_eq!(local.grant.keys().collect::<Vec<_>>(), ["s0", "s1"]);

		let snapshot = local.clone();

		local.merge_from(persisted);

		assert_eq!(local, snapshot, "Repeated merges must be idempotent.");
	}

	#[test]
	fn failure_kinds_classify_errors() {
		assert_eq!(
			FailureKind::from(&Error::UnknownState { state: "x".into() }),
			FailureKind::State
		);
		assert_eq!(
			FailureKind::from(&Error::AuthzError { code: "access_denied".into(), description: None }),
			FailureKind::Authorization
		);
		assert!(!FlowState::Failed(FailureKind::Token).accepts_callback());
		assert!(FlowState::AwaitingCallback.accepts_callback());
	}
}
