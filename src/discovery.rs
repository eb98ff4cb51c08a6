//! Provider discovery: principal → issuer (Simple Web Discovery) → provider configuration.
//!
//! Issuer lookups start over plaintext HTTP at `http://<domain>/.well-known/simple-web-discovery`.
//! When the host cannot be reached that way the same URI is retried once over HTTPS.
//! `SWD_service_redirect` answers are chased up to [`Discoverer::max_hops`] times.

// crates.io
use oauth2::http::StatusCode;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	error::TransientError,
	http::{self, HttpTransport, TransportErrorMapper},
	message::codec,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Path of the Simple Web Discovery endpoint on the principal's domain.
pub const SWD_PATH: &str = "/.well-known/simple-web-discovery";
/// Path of the provider configuration document below an issuer.
pub const OIDCONF_PATH: &str = "/.well-known/openid-configuration";
/// Service identifier requested from Simple Web Discovery.
pub const ISSUER_SERVICE: &str = "http://openid.net/specs/connect/1.0/issuer";
/// Default bound on followed `SWD_service_redirect` answers.
pub const DEFAULT_MAX_HOPS: usize = 5;

/// How a discovery principal is written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
	/// `user@domain`.
	#[default]
	Mail,
	/// A URL whose host names the domain.
	Url,
	/// Anything else; resolves to an empty domain.
	Other,
}

/// Simple Web Discovery answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SwdResponse {
	/// Issuer locations, most preferred first.
	#[serde(default)]
	pub locations: Vec<String>,
	/// Single raw location used as a fallback.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub location: Option<String>,
	/// Redirect to another discovery service.
	#[serde(
		default,
		rename = "SWD_service_redirect",
		skip_serializing_if = "Option::is_none"
	)]
	pub service_redirect: Option<SwdRedirect>,
	/// Members outside the known set.
	#[serde(flatten)]
	pub extra: BTreeMap<String, Value>,
}
impl SwdResponse {
	/// First redirect location, if the answer is a redirect.
	pub fn redirect_location(&self) -> Option<&str> {
		self.service_redirect.as_ref().and_then(|redirect| redirect.locations.first()).map(String::as_str)
	}
}

/// Body of an `SWD_service_redirect` member.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwdRedirect {
	/// Discovery services to ask instead.
	#[serde(default)]
	pub locations: Vec<String>,
}

/// Provider configuration document (`/.well-known/openid-configuration`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfiguration {
	/// Issuer identifier.
	pub issuer: Option<String>,
	/// Authorization endpoint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub authorization_endpoint: Option<Url>,
	/// Token endpoint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_endpoint: Option<Url>,
	/// Userinfo endpoint.
	#[serde(
		default,
		rename = "userinfo_endpoint",
		alias = "user_info_endpoint",
		skip_serializing_if = "Option::is_none"
	)]
	pub user_info_endpoint: Option<Url>,
	/// Token revocation endpoint.
	#[serde(
		default,
		rename = "revocation_endpoint",
		alias = "token_revocation_endpoint",
		skip_serializing_if = "Option::is_none"
	)]
	pub token_revocation_endpoint: Option<Url>,
	/// Dynamic client registration endpoint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub registration_endpoint: Option<Url>,
	/// End-session endpoint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_session_endpoint: Option<Url>,
	/// JWK set location.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub jwks_uri: Option<Url>,
	/// Supported scopes.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub scopes_supported: Vec<String>,
	/// Supported response types.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub response_types_supported: Vec<String>,
	/// Supported subject identifier types.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub subject_types_supported: Vec<String>,
	/// Supported token endpoint client authentication methods.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub token_endpoint_auth_methods_supported: Vec<String>,
	/// Supported id token signing algorithms.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub id_token_signing_alg_values_supported: Vec<String>,
	/// Supported claims.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub claims_supported: Vec<String>,
	/// Members outside the known set.
	#[serde(flatten)]
	pub extra: BTreeMap<String, Value>,
}

/// Result of [`Discoverer::discover`].
#[derive(Clone, Debug, PartialEq)]
pub enum DiscoveryOutcome {
	/// Provider configuration fetched from the first issuer location.
	Configuration(Box<ProviderConfiguration>),
	/// Raw `location` returned by discovery when no configuration could be fetched.
	Location(String),
}

/// Resolves principals to providers over a pluggable transport.
pub struct Discoverer<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	/// Maximum number of followed `SWD_service_redirect` answers.
	pub max_hops: usize,
}
impl<C, M> Discoverer<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a resolver with the default hop bound.
	pub fn new(http_client: Arc<C>, transport_mapper: Arc<M>) -> Self {
		Self { http_client, transport_mapper, max_hops: DEFAULT_MAX_HOPS }
	}

	/// Overrides the redirect hop bound.
	pub fn with_max_hops(mut self, max_hops: usize) -> Self {
		self.max_hops = max_hops;

		self
	}

	/// Resolves `principal` to a provider configuration.
	///
	/// Falls back to [`DiscoveryOutcome::Location`] when the issuer's configuration cannot be
	/// fetched but discovery returned a raw `location`.
	pub async fn discover(&self, principal: &str, id_type: IdType) -> Result<DiscoveryOutcome> {
		const KIND: FlowKind = FlowKind::Discovery;

		let span = FlowSpan::new(KIND, "discover");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let domain = get_domain(principal, id_type)?;
				let uri = issuer_query(&format!("http://{domain}{SWD_PATH}"), principal)?;
				let answer = self.disc_query(&uri, principal).await?;
				let configuration = match answer.locations.first() {
					Some(issuer) => self.provider_config(issuer).await,
					None => Err(discovery_failure("discovery answer lists no issuer locations", None)),
				};

				match (configuration, answer.location) {
					(Ok(configuration), _) => Ok(DiscoveryOutcome::Configuration(Box::new(configuration))),
					(Err(_), Some(location)) => Ok(DiscoveryOutcome::Location(location)),
					(Err(e), None) => Err(e),
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Queries a discovery service, upgrading to HTTPS once per URI when the plaintext host is
	/// unreachable and following `SWD_service_redirect` answers.
	pub async fn disc_query(&self, uri: &Url, principal: &str) -> Result<SwdResponse> {
		let mut uri = uri.clone();
		let mut upgraded = false;
		let mut hops = 0;

		loop {
			let response = match self.get(&uri).await {
				Ok(response) => response,
				Err(e) if e.is_host_unreachable() && uri.scheme() == "http" && !upgraded => {
					uri.set_scheme("https").map_err(|_| {
						discovery_failure(format!("{uri} cannot be switched to https"), None)
					})?;

					upgraded = true;

					continue;
				},
				Err(e) => return Err(e),
			};
			let status = response.status();

			if status != StatusCode::OK {
				return Err(discovery_failure(
					format!("{uri} answered with HTTP {status}"),
					Some(status.as_u16()),
				));
			}

			let answer: SwdResponse = decode_body(response.body(), status)?;
			let Some(location) = answer.redirect_location() else {
				return Ok(answer);
			};

			hops += 1;

			if hops > self.max_hops {
				return Err(discovery_failure(
					format!("gave up after {} discovery redirects", self.max_hops),
					None,
				));
			}

			uri = issuer_query(location, principal)?;
			upgraded = false;
		}
	}

	/// Fetches `<issuer>/.well-known/openid-configuration`.
	pub async fn provider_config(&self, issuer: &str) -> Result<ProviderConfiguration> {
		let url = Url::parse(&format!("{}{OIDCONF_PATH}", issuer.trim_end_matches('/')))
			.map_err(|e| discovery_failure(format!("issuer {issuer} is not a URL: {e}"), None))?;
		let response = self.get(&url).await?;
		let status = response.status();

		if status != StatusCode::OK {
			return Err(discovery_failure(
				format!("{url} answered with HTTP {status}"),
				Some(status.as_u16()),
			));
		}

		decode_body(response.body(), status)
	}

	async fn get(&self, url: &Url) -> Result<oauth2::HttpResponse> {
		http::execute(
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
			http::get_request(url)?,
		)
		.await
	}
}
impl<C, M> Debug for Discoverer<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Discoverer").field("max_hops", &self.max_hops).finish()
	}
}

/// Extracts the domain a principal belongs to.
pub fn get_domain(principal: &str, id_type: IdType) -> Result<String> {
	match id_type {
		IdType::Mail => principal
			.split_once('@')
			.map(|(_, domain)| domain)
			.filter(|domain| !domain.is_empty())
			.map(str::to_owned)
			.ok_or_else(|| discovery_failure(format!("principal {principal} has no domain"), None)),
		IdType::Url => {
			let url = Url::parse(principal)
				.map_err(|e| discovery_failure(format!("principal {principal} is not a URL: {e}"), None))?;
			let host = url
				.host_str()
				.ok_or_else(|| discovery_failure(format!("principal {principal} has no host"), None))?;

			Ok(match url.port() {
				Some(port) => format!("{host}:{port}"),
				None => host.to_owned(),
			})
		},
		IdType::Other => Ok(String::new()),
	}
}

/// Appends the issuer `service` and `principal` parameters to `location`.
pub fn issuer_query(location: &str, principal: &str) -> Result<Url> {
	let mut url = Url::parse(location)
		.map_err(|e| discovery_failure(format!("discovery location {location} is invalid: {e}"), None))?;

	url.query_pairs_mut().append_pair("service", ISSUER_SERVICE).append_pair("principal", principal);

	Ok(url)
}

fn decode_body<T>(body: &[u8], status: StatusCode) -> Result<T>
where
	T: serde::de::DeserializeOwned,
{
	codec::decode_json(body).map_err(|source| {
		Error::from(TransientError::ResponseParse {
			endpoint: "discovery",
			source,
			status: Some(status.as_u16()),
		})
	})
}

fn discovery_failure(reason: impl Into<String>, status: Option<u16>) -> Error {
	Error::DiscoveryFailure { reason: reason.into(), status }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn domains_follow_the_identifier_type() {
		assert_eq!(
			get_domain("user@example.org", IdType::Mail).expect("Mail principal should resolve."),
			"example.org"
		);
		assert_eq!(
			get_domain("https://example.org:8443/alice", IdType::Url)
				.expect("URL principal should resolve."),
			"example.org:8443"
		);
		assert_eq!(
			get_domain("https://example.org/alice", IdType::Url).expect("URL principal should resolve."),
			"example.org"
		);
		assert_eq!(get_domain("alice", IdType::Other).expect("Other principals resolve."), "");
		assert!(matches!(
			get_domain("alice", IdType::Mail),
			Err(Error::DiscoveryFailure { status: None, .. })
		));
	}

	#[test]
	fn issuer_query_round_trips_parameters() {
		let url = issuer_query("http://example.org/.well-known/simple-web-discovery", "user@example.org")
			.expect("Issuer query should build.");
		let pairs: BTreeMap<_, _> = url.query_pairs().into_owned().collect();

		assert_eq!(url.path(), SWD_PATH);
		assert_eq!(pairs.len(), 2);
		assert_eq!(pairs.get("service").map(String::as_str), Some(ISSUER_SERVICE));
		assert_eq!(pairs.get("principal").map(String::as_str), Some("user@example.org"));
	}

	#[test]
	fn swd_redirects_and_provider_aliases_decode() {
		let answer: SwdResponse = serde_json::from_str(
			r#"{"SWD_service_redirect":{"locations":["https://other.example.org/swd"]},"expires":7200}"#,
		)
		.expect("Redirect answer should decode.");

		assert_eq!(answer.redirect_location(), Some("https://other.example.org/swd"));
		assert!(answer.extra.contains_key("expires"));

		let configuration: ProviderConfiguration = serde_json::from_str(
			r#"{"issuer":"https://op.example.org","revocation_endpoint":"https://op.example.org/revoke","x_custom":true}"#,
		)
		.expect("Provider configuration should decode.");

		assert_eq!(
			configuration.token_revocation_endpoint.as_ref().map(Url::as_str),
			Some("https://op.example.org/revoke")
		);
		assert_eq!(configuration.extra.get("x_custom"), Some(&Value::Bool(true)));
	}
}
