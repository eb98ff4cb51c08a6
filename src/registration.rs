//! Dynamic client registration (`client_associate` / `client_update`).

// crates.io
use oauth2::http::StatusCode;
use serde_json::Value;
use url::form_urlencoded::Serializer as FormSerializer;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, TransientError},
	http::{self, HttpTransport, TransportErrorMapper},
	message::codec,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

const RESERVED_ATTRIBUTES: [&str; 3] = ["type", "client_id", "client_secret"];

/// Registration operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationType {
	/// Registers a new client.
	#[default]
	ClientAssociate,
	/// Updates an existing client's metadata.
	ClientUpdate,
}
impl RegistrationType {
	/// Returns the wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			RegistrationType::ClientAssociate => "client_associate",
			RegistrationType::ClientUpdate => "client_update",
		}
	}
}

/// Client registration request.
///
/// Serializes to the registration form fields; list-valued fields travel space-delimited.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationRequest {
	/// Operation.
	#[serde(rename = "type")]
	pub kind: RegistrationType,
	/// Existing client identifier (`client_update` only).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub client_id: Option<String>,
	/// Existing client secret (`client_update` only).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub client_secret: Option<TokenSecret>,
	/// Contact addresses.
	#[serde(with = "space_delimited", skip_serializing_if = "Vec::is_empty")]
	pub contacts: Vec<String>,
	/// `web` or `native`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub application_type: Option<String>,
	/// Human-readable client name.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub application_name: Option<String>,
	/// Logo location.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub logo_url: Option<String>,
	/// Redirect URIs.
	#[serde(with = "space_delimited", skip_serializing_if = "Vec::is_empty")]
	pub redirect_uris: Vec<String>,
	/// Token endpoint client authentication type.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub token_endpoint_auth_type: Option<String>,
	/// Policy document location.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub policy_url: Option<String>,
	/// JWK set location.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub jwk_url: Option<String>,
	/// JWK encryption key set location.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub jwk_encryption_url: Option<String>,
	/// X.509 certificate location.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub x509_url: Option<String>,
	/// X.509 encryption certificate location.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub x509_encryption_url: Option<String>,
	/// Sector identifier location.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sector_identifier_url: Option<String>,
	/// Requested subject identifier type.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_id_type: Option<String>,
	/// Request object signing algorithm the client commits to.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub require_signed_request_object: Option<String>,
	/// Signing algorithm for userinfo responses.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub userinfo_signed_response_algs: Option<String>,
	/// Encryption algorithm for userinfo responses.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub userinfo_encrypted_response_alg: Option<String>,
	/// Signing algorithm for id tokens.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id_token_signed_response_algs: Option<String>,
	/// Encryption algorithm for id tokens.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id_token_encrypted_response_alg: Option<String>,
	/// Default maximum authentication age in seconds.
	#[serde(deserialize_with = "codec::lenient_i64", skip_serializing_if = "Option::is_none")]
	pub default_max_age: Option<i64>,
	/// Whether `auth_time` must be returned.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub require_auth_time: Option<bool>,
	/// Default authentication context class.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub default_acr: Option<String>,
}
impl RegistrationRequest {
	/// Creates an empty request of the given operation.
	pub fn new(kind: RegistrationType) -> Self {
		Self { kind, ..Self::default() }
	}

	/// Overlays every attribute that names a registration field.
	///
	/// `type`, `client_id`, `client_secret` and unknown names are ignored. A value of the
	/// wrong shape fails the whole overlay and leaves the request unchanged.
	pub fn apply(&mut self, attributes: &BTreeMap<String, Value>) -> Result<(), ConfigError> {
		let mut fields = serde_json::to_value(&*self).map_err(invalid_registration)?;

		if let Some(fields) = fields.as_object_mut() {
			fields.extend(
				attributes
					.iter()
					.filter(|(name, _)| !RESERVED_ATTRIBUTES.contains(&name.as_str()))
					.map(|(name, value)| (name.clone(), value.clone())),
			);
		}

		*self = serde_json::from_value(fields).map_err(invalid_registration)?;

		Ok(())
	}

	/// Renders the request as a form body.
	pub fn to_urlencoded(&self) -> Result<String, ConfigError> {
		let fields = serde_json::to_value(self).map_err(invalid_registration)?;
		let mut form = FormSerializer::new(String::new());

		for (name, value) in fields.as_object().into_iter().flatten() {
			match value {
				Value::String(text) => form.append_pair(name, text),
				other => form.append_pair(name, &other.to_string()),
			};
		}

		Ok(form.finish())
	}
}

/// Credentials returned by a successful registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResponse {
	/// Issued client identifier.
	pub client_id: String,
	/// Issued client secret.
	#[serde(default)]
	pub client_secret: Option<TokenSecret>,
	/// Credential lifetime in seconds.
	#[serde(default, deserialize_with = "codec::lenient_i64")]
	pub expires_in: Option<i64>,
	/// Members outside the known set.
	#[serde(flatten)]
	pub extra: BTreeMap<String, Value>,
}

/// Registers clients over a pluggable transport.
pub struct Registrar<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
}
impl<C, M> Registrar<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a registrar.
	pub fn new(http_client: Arc<C>, transport_mapper: Arc<M>) -> Self {
		Self { http_client, transport_mapper }
	}

	/// POSTs `request` to `endpoint` and decodes the issued credentials.
	pub async fn register(
		&self,
		endpoint: &Url,
		request: &RegistrationRequest,
	) -> Result<RegistrationResponse> {
		const KIND: FlowKind = FlowKind::Registration;

		let span = FlowSpan::new(KIND, request.kind.as_str());

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let response = http::execute(
					self.http_client.as_ref(),
					self.transport_mapper.as_ref(),
					http::form_request(endpoint, request.to_urlencoded()?)?,
				)
				.await?;
				let status = response.status();

				if status != StatusCode::OK {
					return Err(Error::RegistrationFailure { status: status.as_u16() });
				}

				codec::decode_json(response.body()).map_err(|source| {
					Error::from(TransientError::ResponseParse {
						endpoint: "registration",
						source,
						status: Some(status.as_u16()),
					})
				})
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}
impl<C, M> Debug for Registrar<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Registrar(..)")
	}
}

fn invalid_registration(source: serde_json::Error) -> ConfigError {
	ConfigError::InvalidRegistration { source }
}

mod space_delimited {
	// crates.io
	use serde::{Deserializer, Serializer, de::Error as DeError};
	use serde_json::Value;
	// self
	use crate::_prelude::*;

	pub(super) fn serialize<S>(items: &[String], serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&items.join(" "))
	}

	pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
	where
		D: Deserializer<'de>,
	{
		match Value::deserialize(deserializer)? {
			Value::Null => Ok(Vec::new()),
			Value::String(text) => Ok(text.split_whitespace().map(str::to_owned).collect()),
			Value::Array(items) => items
				.into_iter()
				.map(|item| match item {
					Value::String(text) => Ok(text),
					other => Err(DeError::custom(format!("expected a string, found {other}"))),
				})
				.collect(),
			other => Err(DeError::custom(format!("expected a string or a list, found {other}"))),
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn reserved_and_unknown_attributes_are_ignored() {
		let mut request = RegistrationRequest::new(RegistrationType::ClientAssociate);
		let attributes = BTreeMap::from([
			("type".to_owned(), json!("client_update")),
			("client_id".to_owned(), json!("forged")),
			("client_secret".to_owned(), json!("forged")),
			("unknown".to_owned(), json!("ignored")),
			("redirect_uris".to_owned(), json!(["https://rp.example.org/cb", "https://rp.example.org/alt"])),
			("application_name".to_owned(), json!("Demo RP")),
			("default_max_age".to_owned(), json!(600)),
		]);

		request.apply(&attributes).expect("Attributes should apply.");

		assert_eq!(request.kind, RegistrationType::ClientAssociate);
		assert!(request.client_id.is_none());
		assert!(request.client_secret.is_none());
		assert_eq!(request.redirect_uris.len(), 2);

		let pairs: BTreeMap<_, _> =
			url::form_urlencoded::parse(
			request.to_urlencoded().expect("Request should encode.").as_bytes(),
		)
		.into_owned()
		.collect();

		assert_eq!(pairs.get("type").map(String::as_str), Some("client_associate"));
		assert_eq!(
			pairs.get("redirect_uris").map(String::as_str),
			Some("https://rp.example.org/cb https://rp.example.org/alt")
		);
		assert_eq!(pairs.get("application_name").map(String::as_str), Some("Demo RP"));
		assert_eq!(pairs.get("default_max_age").map(String::as_str), Some("600"));
		assert!(!pairs.contains_key("client_id"));
		assert!(!pairs.contains_key("unknown"));
	}

	#[test]
	fn update_credentials_survive_an_overlay() {
		let mut request = RegistrationRequest::new(RegistrationType::ClientUpdate);

		request.client_id = Some("c1".into());
		request.client_secret = Some(TokenSecret::new("s1"));
		request
			.apply(&BTreeMap::from([
				("contacts".to_owned(), json!("ops@example.org admin@example.org")),
				("require_auth_time".to_owned(), json!(true)),
				("default_max_age".to_owned(), json!("300")),
			]))
			.expect("Attributes should apply.");

		let pairs: BTreeMap<_, _> = url::form_urlencoded::parse(
			request.to_urlencoded().expect("Request should encode.").as_bytes(),
		)
		.into_owned()
		.collect();

		assert_eq!(request.contacts, ["ops@example.org", "admin@example.org"]);
		assert_eq!(request.default_max_age, Some(300));
		assert_eq!(pairs.get("type").map(String::as_str), Some("client_update"));
		assert_eq!(pairs.get("client_id").map(String::as_str), Some("c1"));
		assert_eq!(pairs.get("client_secret").map(String::as_str), Some("s1"));
		assert_eq!(pairs.get("require_auth_time").map(String::as_str), Some("true"));
		assert_eq!(pairs.get("default_max_age").map(String::as_str), Some("300"));
	}

	#[test]
	fn misshaped_attributes_leave_the_request_unchanged() {
		let mut request = RegistrationRequest::new(RegistrationType::ClientAssociate);

		request.application_name = Some("Demo RP".into());

		let before = request.clone();
		let err = request
			.apply(&BTreeMap::from([("require_auth_time".to_owned(), json!("sometimes"))]))
			.expect_err("Non-boolean flags should fail.");

		assert!(matches!(err, ConfigError::InvalidRegistration { .. }));
		assert_eq!(request, before);
	}

	#[test]
	fn response_accepts_string_lifetimes() {
		let response: RegistrationResponse =
			serde_json::from_str(r#"{"client_id":"c1","client_secret":"s1","expires_in":"3600"}"#)
				.expect("Registration response should decode.");

		assert_eq!(response.client_id, "c1");
		assert_eq!(response.client_secret.as_ref().map(TokenSecret::expose), Some("s1"));
		assert_eq!(response.expires_in, Some(3600));
	}
}
