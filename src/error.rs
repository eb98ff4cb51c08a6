//! Consumer-level error types shared across flows, discovery, registration, and stores.

// self
use crate::{_prelude::*, consumer::FlowState};

/// Consumer-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical consumer error exposed by public APIs.
///
/// Provider-returned error shapes always surface as [`Error::AuthzError`] or
/// [`Error::TokenError`] carrying the provider's `error` code so callers can pattern-match
/// instead of inspecting messages.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Session cookie failed verification.
	#[error(transparent)]
	Cookie(#[from] crate::cookie::CookieError),

	/// Provider returned an error during authorization.
	#[error("Authorization failed with provider error `{code}`.")]
	AuthzError {
		/// Provider `error` code.
		code: String,
		/// Provider `error_description`, if supplied.
		description: Option<String>,
	},
	/// Provider returned an error during token exchange or userinfo.
	#[error("Token request failed with provider error `{code}`.")]
	TokenError {
		/// Provider `error` code.
		code: String,
		/// Provider `error_description`, if supplied.
		description: Option<String>,
	},
	/// Callback references a session id absent from the store.
	#[error("Unknown session state `{state}`.")]
	UnknownState {
		/// State value echoed by the provider.
		state: String,
	},
	/// Callback request cannot be processed (unsupported method or malformed payload).
	#[error("Bad callback request: {reason}.")]
	BadRequest {
		/// Human-readable reason.
		reason: String,
	},
	/// Issuer resolution or provider configuration lookup failed.
	#[error("Discovery failed: {reason}.")]
	DiscoveryFailure {
		/// Human-readable reason.
		reason: String,
		/// HTTP status returned by the discovery endpoint, when one was received.
		status: Option<u16>,
	},
	/// Dynamic client registration returned a non-200 status.
	#[error("Registration failed with HTTP status {status}.")]
	RegistrationFailure {
		/// HTTP status returned by the registration endpoint.
		status: u16,
	},
	/// Callback arrived for a session that is no longer waiting for one.
	#[error("Session `{state}` already consumed its authorization callback.")]
	ReplayedCallback {
		/// State value echoed by the provider.
		state: String,
	},
	/// Token exchange was requested although the callback already carried a token.
	#[error("Session `{state}` already holds an access token from the authorization response.")]
	TokenAlreadyIssued {
		/// Session state.
		state: String,
	},
	/// Operation is not legal in the current flow state.
	#[error("Operation `{operation}` is not allowed in flow state {from:?}.")]
	InvalidTransition {
		/// Operation that was attempted.
		operation: &'static str,
		/// Flow state at the time of the attempt.
		from: FlowState,
	},
	/// Bounded retry loop gave up.
	#[error("Resource exhausted: {reason}.")]
	ResourceExhausted {
		/// Human-readable reason.
		reason: String,
	},
	/// Placeholder operation that has no defined behavior yet.
	#[error("Operation `{operation}` is not implemented.")]
	NotImplemented {
		/// Operation name.
		operation: &'static str,
	},
}

/// Configuration and validation failures raised by the consumer.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A URL assembled from configuration or session data cannot be parsed.
	#[error("The {what} URL is invalid.")]
	InvalidUrl {
		/// Which URL failed to parse.
		what: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A required configuration option is absent or empty.
	#[error("Configuration option `{option}` is required.")]
	MissingOption {
		/// Option name.
		option: &'static str,
	},
	/// A provider endpoint required by the current step is not known.
	#[error("The {endpoint} endpoint is not configured.")]
	MissingEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
	},
	/// Neither a password nor a client secret is available for token exchange.
	#[error("Nothing to authenticate with: configure `password` or `client_secret`.")]
	NoClientAuthentication,
	/// `request_method` is not one of `parameter`, `simple`, `file`.
	#[error("Unsupported request method `{value}`.")]
	UnsupportedRequestMethod {
		/// Raw option value.
		value: String,
	},
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Provider returned an `expires_in` that overflows the supported date range.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Registration attributes do not fit the registration fields.
	#[error("Registration attributes are invalid.")]
	InvalidRegistration {
		/// Field-level decoding failure.
		#[source]
		source: serde_json::Error,
	},
	/// The request-object builder rejected the authorization request.
	#[error("Request object could not be built.")]
	RequestObject {
		/// Builder failure.
		#[source]
		source: BoxError,
	},
	/// Local I/O failure while writing a request object file.
	#[error("Failed to write request object file {path}.")]
	RequestFile {
		/// File path.
		path: String,
		/// Underlying I/O failure.
		#[source]
		source: std::io::Error,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Wraps a request-object builder failure.
	pub fn request_object(src: impl Into<BoxError>) -> Self {
		Self::RequestObject { source: src.into() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// The transport gave up waiting for a response.
	#[error("Request to {url} timed out.")]
	Timeout {
		/// URL that was requested.
		url: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Provider returned an unexpected but non-fatal response.
	#[error("The {endpoint} endpoint returned an unexpected response: {message}.")]
	UnexpectedResponse {
		/// Endpoint label.
		endpoint: &'static str,
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Provider responded with a payload that could not be decoded.
	#[error("The {endpoint} endpoint returned a malformed payload.")]
	ResponseParse {
		/// Endpoint label.
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: crate::message::MessageError,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// The remote host could not be reached at all (DNS failure, refused connection).
	#[error("Host is unreachable: {url}.")]
	HostUnreachable {
		/// URL that was requested.
		url: String,
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// URL that was requested.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: impl Into<String>, src: impl Into<BoxError>) -> Self {
		Self::Network { url: url.into(), source: src.into() }
	}

	/// Wraps a connection failure that means the host is unreachable.
	pub fn host_unreachable(url: impl Into<String>, src: impl Into<BoxError>) -> Self {
		Self::HostUnreachable { url: url.into(), source: src.into() }
	}
}

impl Error {
	/// Returns `true` if the error is a host-unreachable transport failure.
	pub fn is_host_unreachable(&self) -> bool {
		matches!(self, Error::Transport(TransportError::HostUnreachable { .. }))
	}

	/// Returns `true` if retrying the same call later may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Error::Transient(_) | Error::Transport(TransportError::Network { .. } | TransportError::Io(_))
		)
	}
}
