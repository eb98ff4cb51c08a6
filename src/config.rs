//! Immutable consumer configuration and its validating builder.

// std
use std::{env, path::PathBuf};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
	ext::RequestObjectBuilder,
};

/// How the OpenID request object accompanies the authorization request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMethod {
	/// Request object sent inline as the `request` parameter.
	#[default]
	Parameter,
	/// Plain authorization request without a request object.
	Simple,
	/// Request object written to a file and referenced through `request_uri`.
	File,
}
impl RequestMethod {
	/// Returns the configuration label.
	pub const fn as_str(self) -> &'static str {
		match self {
			RequestMethod::Parameter => "parameter",
			RequestMethod::Simple => "simple",
			RequestMethod::File => "file",
		}
	}

	/// Returns `true` if the method needs a request-object builder.
	pub const fn uses_request_object(self) -> bool {
		!matches!(self, RequestMethod::Simple)
	}
}
impl Display for RequestMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for RequestMethod {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"parameter" => Ok(RequestMethod::Parameter),
			"simple" => Ok(RequestMethod::Simple),
			"file" => Ok(RequestMethod::File),
			other => Err(ConfigError::UnsupportedRequestMethod { value: other.to_owned() }),
		}
	}
}

/// Consumer configuration shared (behind an [`Arc`]) by every consumer a factory produces.
#[derive(Clone)]
pub struct ConsumerConfig {
	/// Consumer name; doubles as the session cookie name.
	pub name: String,
	/// Client identifier known before registration.
	pub client_id: Option<String>,
	/// Client secret for request-body client authentication.
	pub client_secret: Option<TokenSecret>,
	/// Default scope for authorization requests.
	pub scope: Option<String>,
	/// Default response type for authorization requests.
	pub response_type: Option<String>,
	/// Callback path appended to the request base URL to form the redirect URI.
	pub authz_page: Option<String>,
	/// Request-object transport.
	pub request_method: RequestMethod,
	/// Directory receiving request-object files.
	pub temp_dir: PathBuf,
	/// Key handed to the request-object builder.
	pub key: Option<String>,
	/// Client password for HTTP Basic client authentication.
	pub password: Option<TokenSecret>,
	/// Flow label reported in debug events.
	pub flow_type: Option<String>,
	/// Enables debug events on flow spans.
	pub debug: bool,
	/// Request-object builder.
	pub openid_request: Option<Arc<dyn RequestObjectBuilder>>,
}
impl ConsumerConfig {
	/// Creates a builder for a consumer named `name`.
	pub fn builder(name: impl Into<String>) -> ConsumerConfigBuilder {
		ConsumerConfigBuilder::new(name)
	}
}
impl Debug for ConsumerConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConsumerConfig")
			.field("name", &self.name)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("scope", &self.scope)
			.field("response_type", &self.response_type)
			.field("authz_page", &self.authz_page)
			.field("request_method", &self.request_method)
			.field("temp_dir", &self.temp_dir)
			.field("key_set", &self.key.is_some())
			.field("password_set", &self.password.is_some())
			.field("flow_type", &self.flow_type)
			.field("debug", &self.debug)
			.field("openid_request_set", &self.openid_request.is_some())
			.finish()
	}
}

/// Builder for [`ConsumerConfig`] values.
pub struct ConsumerConfigBuilder {
	config: ConsumerConfig,
}
impl ConsumerConfigBuilder {
	fn new(name: impl Into<String>) -> Self {
		Self {
			config: ConsumerConfig {
				name: name.into(),
				client_id: None,
				client_secret: None,
				scope: None,
				response_type: None,
				authz_page: None,
				request_method: RequestMethod::default(),
				temp_dir: env::temp_dir(),
				key: None,
				password: None,
				flow_type: None,
				debug: false,
				openid_request: None,
			},
		}
	}

	/// Sets the client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.config.client_id = Some(client_id.into());

		self
	}

	/// Sets the client secret.
	pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
		self.config.client_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Sets the default scope.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.config.scope = Some(scope.into());

		self
	}

	/// Sets the default response type.
	pub fn response_type(mut self, response_type: impl Into<String>) -> Self {
		self.config.response_type = Some(response_type.into());

		self
	}

	/// Sets the callback path.
	pub fn authz_page(mut self, path: impl Into<String>) -> Self {
		self.config.authz_page = Some(path.into());

		self
	}

	/// Sets the request-object transport.
	pub fn request_method(mut self, method: RequestMethod) -> Self {
		self.config.request_method = method;

		self
	}

	/// Sets the request-object file directory.
	pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.config.temp_dir = dir.into();

		self
	}

	/// Sets the request-object key.
	pub fn key(mut self, key: impl Into<String>) -> Self {
		self.config.key = Some(key.into());

		self
	}

	/// Sets the client password (switches token requests to HTTP Basic).
	pub fn password(mut self, password: impl Into<String>) -> Self {
		self.config.password = Some(TokenSecret::new(password));

		self
	}

	/// Sets the flow label.
	pub fn flow_type(mut self, flow_type: impl Into<String>) -> Self {
		self.config.flow_type = Some(flow_type.into());

		self
	}

	/// Toggles debug events.
	pub fn debug(mut self, debug: bool) -> Self {
		self.config.debug = debug;

		self
	}

	/// Sets the request-object builder.
	pub fn openid_request(mut self, builder: Arc<dyn RequestObjectBuilder>) -> Self {
		self.config.openid_request = Some(builder);

		self
	}

	/// Validates and returns the configuration.
	pub fn build(self) -> Result<ConsumerConfig, ConfigError> {
		let config = self.config;

		if config.name.trim().is_empty() {
			return Err(ConfigError::MissingOption { option: "name" });
		}
		if let Some(scope) = config.scope.as_deref() {
			ScopeSet::from_str(scope)?;
		}
		if config.request_method.uses_request_object() {
			if config.openid_request.is_none() {
				return Err(ConfigError::MissingOption { option: "openid_request" });
			}
			if config.key.as_deref().is_none_or(str::is_empty) {
				return Err(ConfigError::MissingOption { option: "key" });
			}
		}

		Ok(config)
	}
}
