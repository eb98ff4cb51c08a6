//! Flow engine: authorization redirect, callback handling, code redemption, and userinfo.
//!
//! Every public operation runs inside a [`FlowSpan`], records attempt/success/failure
//! counters, and moves the in-memory flow to [`FlowState::Failed`] when it returns an error.
//! The persisted flow only moves forward on success.

// crates.io
use oauth2::http::StatusCode;
// self
use crate::{
	_prelude::*,
	auth::{Grant, TokenSecret},
	config::RequestMethod,
	consumer::{
		Consumer, request_file,
		session::{self, FailureKind, FlowState, NONCE_LEN, SEED_LEN},
	},
	context::{HttpMethod, RequestContext},
	error::{ConfigError, TransientError},
	http::{self, HttpTransport, TransportErrorMapper},
	message::{
		AccessTokenRequest, AccessTokenResponse, AuthorizationRequest, AuthorizationResponse,
		ClientAuth, MessageError, MessageFormat, Parsed, UserInfo,
	},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{StoreKey, StoreValue},
};

/// Messages recovered from an authorization callback.
#[derive(Clone, Debug, PartialEq)]
pub struct CallbackOutcome {
	/// Authorization response (code flow only).
	pub authorization: Option<AuthorizationResponse>,
	/// Access-token response delivered on the callback, if any.
	pub access_token: Option<AccessTokenResponse>,
	/// Id token delivered on the callback; currently always `None`.
	pub id_token: Option<String>,
}

impl<C, M> Consumer<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts the authorization flow and returns the provider redirect URL.
	///
	/// `scope` and `response_type` override the configured defaults. The session is
	/// persisted under the new `state` (with a `seed:<seed>` pointer) before the URL is
	/// returned.
	pub async fn begin(
		&mut self,
		ctx: &dyn RequestContext,
		scope: Option<&str>,
		response_type: Option<&str>,
	) -> Result<Url> {
		const KIND: FlowKind = FlowKind::Begin;

		let span = FlowSpan::new(KIND, "begin");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.begin_inner(&span, ctx, scope, response_type)).await;

		self.finish(KIND, result)
	}

	/// Processes the provider callback carried by `ctx`.
	pub async fn parse_authz(&mut self, ctx: &dyn RequestContext) -> Result<CallbackOutcome> {
		const KIND: FlowKind = FlowKind::Callback;

		let span = FlowSpan::new(KIND, "parse_authz");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.parse_authz_inner(&span, ctx)).await;

		self.finish(KIND, result)
	}

	/// Redeems the authorization code received on the callback.
	pub async fn complete(&mut self) -> Result<AccessTokenResponse> {
		const KIND: FlowKind = FlowKind::TokenExchange;

		let span = FlowSpan::new(KIND, "complete");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.complete_inner()).await;

		self.finish(KIND, result)
	}

	/// Fetches the userinfo claims with the latest access token.
	pub async fn userinfo(&mut self) -> Result<UserInfo> {
		const KIND: FlowKind = FlowKind::UserInfo;

		let span = FlowSpan::new(KIND, "userinfo");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.userinfo_inner()).await;

		self.finish(KIND, result)
	}

	async fn begin_inner(
		&mut self,
		span: &FlowSpan,
		ctx: &dyn RequestContext,
		scope: Option<&str>,
		response_type: Option<&str>,
	) -> Result<Url> {
		let config = self.factory.config.clone();
		let authz_page = non_empty(config.authz_page.as_deref())
			.ok_or(ConfigError::MissingOption { option: "authz_page" })?;
		let scope = non_empty(scope.or(config.scope.as_deref()))
			.ok_or(ConfigError::MissingOption { option: "scope" })?;
		let response_type = non_empty(response_type.or(config.response_type.as_deref()))
			.ok_or(ConfigError::MissingOption { option: "response_type" })?;
		let client_id = non_empty(self.session.client_id.as_deref())
			.ok_or(ConfigError::MissingOption { option: "client_id" })?
			.to_owned();
		let mut endpoint = self
			.session
			.authorization_endpoint
			.clone()
			.ok_or(ConfigError::MissingEndpoint { endpoint: "authorization" })?;

		self.flow = FlowState::Initiated;

		let base = ctx.base_url(false, false);
		let redirect_uri = format!("{base}{authz_page}");
		let seed = self.session.seed.get_or_insert_with(|| session::rndstr(SEED_LEN)).clone();
		let state = session::state_id(OffsetDateTime::now_utc(), &base, &seed);
		let nonce = session::rndstr(NONCE_LEN);

		self.session.state = Some(state.clone());
		self.session.grant.insert(state.clone(), Grant::new(&state));
		self.session.redirect_uri = Some(redirect_uri.clone());
		self.session.nonce = Some(nonce.clone());
		self.session.flow = FlowState::AwaitingCallback;
		self.backup(&state).await?;
		self.factory.store.set(StoreKey::seed(&seed), StoreValue::Pointer(state.clone())).await?;

		let mut request = AuthorizationRequest {
			response_type: response_type.to_owned(),
			client_id,
			redirect_uri: Some(redirect_uri),
			scope: scope.to_owned(),
			state: state.clone(),
			nonce: Some(nonce),
			request: None,
			request_uri: None,
		};

		match config.request_method {
			RequestMethod::Simple => {},
			RequestMethod::Parameter => request.request = Some(self.request_object(&request)?),
			RequestMethod::File => {
				let payload = self.request_object(&request)?;
				let path = request_file::write_request_file(&config.temp_dir, &payload)?;
				let filename = request_file::request_filename(&path);

				request.request_uri = Some(format!("{base}{filename}"));
				self.session.request_filename = Some(filename);
				self.backup(&state).await?;
			},
		}

		let query = self.factory.messages.authorization_request(&request);
		let query = match endpoint.query().filter(|existing| !existing.is_empty()) {
			Some(existing) => format!("{existing}&{query}"),
			None => query,
		};

		endpoint.set_query(Some(&query));
		self.flow = FlowState::AwaitingCallback;

		if let Some(flow_type) = config.flow_type.as_deref() {
			span.debug(self.session.debug, "flow_type", &flow_type);
		}

		span.debug(self.session.debug, "redirect", &endpoint);

		Ok(endpoint)
	}

	async fn parse_authz_inner(
		&mut self,
		span: &FlowSpan,
		ctx: &dyn RequestContext,
	) -> Result<CallbackOutcome> {
		let method = ctx.method();
		let raw = match &method {
			HttpMethod::Get => ctx.query().unwrap_or_default().to_owned(),
			HttpMethod::Post => ctx.post_body().unwrap_or_default().to_owned(),
			HttpMethod::Other(other) =>
				return Err(Error::BadRequest { reason: format!("unsupported method {other}") }),
		};

		span.debug(self.session.debug, "callback", &method);

		let code_flow = self
			.factory
			.config
			.response_type
			.as_deref()
			.is_some_and(|response_type| response_type.contains("code"));

		if code_flow { self.parse_code_callback(&raw).await } else { self.parse_implicit_callback(&raw) }
	}

	async fn parse_code_callback(&mut self, raw: &str) -> Result<CallbackOutcome> {
		let response =
			match self.factory.messages.parse_authorization_response(raw, MessageFormat::UrlEncoded) {
				Ok(Parsed::Message(response)) => response,
				Ok(Parsed::Error(shape)) =>
					return Err(Error::AuthzError {
						code: shape.error,
						description: shape.error_description,
					}),
				Err(e) => return Err(bad_request(e)),
			};

		if response.code.is_none() && response.access_token.is_none() {
			return Err(Error::BadRequest {
				reason: "callback carries neither a code nor an access token".into(),
			});
		}

		let state = response.state.clone();
		let _guard = self.factory.lock_flow(&state).await;
		let persisted = self.load_bound_session(&state).await?;

		if !persisted.flow.accepts_callback() {
			return Err(Error::ReplayedCallback { state });
		}

		let redirect_uri = persisted.redirect_uri.clone();

		self.session.merge_from(persisted);
		self.session.state = Some(state.clone());
		self.session.redirect_uri = redirect_uri;

		let access_token = response.access_token_response();
		let grant = self.session.grant.entry(state.clone()).or_insert_with(|| Grant::new(&state));

		if let Some(code) = response.code.as_ref() {
			grant.add_code(code.expose());
		}
		if let Some(token) = access_token.as_ref() {
			grant.add_token(token)?;
		}
		if let Some(id_token) = access_token.as_ref().and_then(|token| token.id_token.clone()) {
			self.session.id_token = Some(id_token);
		}

		self.session.flow = if access_token.is_some() {
			FlowState::TokensReceived
		} else {
			FlowState::CodeReceived
		};
		self.flow = self.session.flow.clone();
		self.access_token = access_token.clone();
		self.backup(&state).await?;

		Ok(CallbackOutcome { authorization: Some(response), access_token, id_token: None })
	}

	fn parse_implicit_callback(&mut self, raw: &str) -> Result<CallbackOutcome> {
		let response =
			match self.factory.messages.parse_access_token_response(raw, MessageFormat::UrlEncoded, true)
			{
				Ok(Parsed::Message(response)) => response,
				Ok(Parsed::Error(shape)) =>
					return Err(Error::TokenError {
						code: shape.error,
						description: shape.error_description,
					}),
				Err(e) => return Err(bad_request(e)),
			};

		self.flow = FlowState::TokensReceived;
		self.access_token = Some(response.clone());

		Ok(CallbackOutcome { authorization: None, access_token: Some(response), id_token: None })
	}

	async fn complete_inner(&mut self) -> Result<AccessTokenResponse> {
		let config = self.factory.config.clone();
		let auth = match (config.password.as_ref(), self.client_secret.as_ref()) {
			(Some(password), _) =>
				ClientAuth::Basic { client_id: self.required_client_id()?, password: password.clone() },
			(None, Some(client_secret)) => ClientAuth::RequestBody {
				client_id: self.required_client_id()?,
				client_secret: client_secret.clone(),
			},
			(None, None) => return Err(ConfigError::NoClientAuthentication.into()),
		};
		let state = self.session.state.clone().unwrap_or_default();

		ensure_redeemable(&self.flow, &state)?;

		let endpoint = self
			.session
			.token_endpoint
			.clone()
			.ok_or(ConfigError::MissingEndpoint { endpoint: "token" })?;
		let _guard = self.factory.lock_flow(&state).await;
		let persisted = self.load_bound_session(&state).await?;

		// Another consumer may have redeemed the code since this one was restored.
		ensure_redeemable(&persisted.flow, &state)?;
		self.session.merge_from(persisted);

		let code = self.session.grant.get(&state).and_then(|grant| grant.code.clone()).ok_or(
			Error::InvalidTransition { operation: "complete", from: self.flow.clone() },
		)?;
		let request = AccessTokenRequest { code, redirect_uri: self.session.redirect_uri.clone(), auth };
		let http_request = self.factory.messages.access_token_request(&endpoint, &request)?;
		let response = http::execute(
			self.factory.http_client.as_ref(),
			self.factory.transport_mapper.as_ref(),
			http_request,
		)
		.await?;
		let body = String::from_utf8_lossy(response.body());
		let token = expect_message(
			"token",
			response.status(),
			self.factory.messages.parse_access_token_response(&body, MessageFormat::Json, false),
		)?;
		let grant = self.session.grant.entry(state.clone()).or_insert_with(|| Grant::new(&state));

		grant.add_token(&token)?;

		if token.id_token.is_some() {
			self.session.id_token = token.id_token.clone();
		}

		self.session.flow = FlowState::TokenExchanged;
		self.flow = FlowState::TokenExchanged;
		self.access_token = Some(token.clone());
		self.backup(&state).await?;

		Ok(token)
	}

	async fn userinfo_inner(&mut self) -> Result<UserInfo> {
		if !self.flow.has_tokens() {
			return Err(Error::InvalidTransition { operation: "userinfo", from: self.flow.clone() });
		}

		let endpoint = self
			.session
			.user_info_endpoint
			.clone()
			.ok_or(ConfigError::MissingEndpoint { endpoint: "userinfo" })?;
		let state = self.session.state.clone();
		let _guard = match state.as_deref() {
			Some(state) => Some(self.factory.lock_flow(state).await),
			None => None,
		};

		if let Some(state) = state.as_deref() {
			match self.load_session(state).await {
				Ok(persisted) => self.session.merge_from(persisted),
				Err(Error::Storage(e)) if e.is_not_found() => {},
				Err(e) => return Err(e),
			}
		}

		let token = self.latest_access_token().ok_or(Error::InvalidTransition {
			operation: "userinfo",
			from: self.flow.clone(),
		})?;
		let http_request = self.factory.messages.user_info_request(&endpoint, &token)?;
		let response = http::execute(
			self.factory.http_client.as_ref(),
			self.factory.transport_mapper.as_ref(),
			http_request,
		)
		.await?;
		let body = String::from_utf8_lossy(response.body());
		let user_info = expect_message(
			"userinfo",
			response.status(),
			self.factory.messages.parse_user_info(&body),
		)?;

		self.session.user_info = Some(user_info.clone());
		self.session.flow = FlowState::UserInfoFetched;
		self.flow = FlowState::UserInfoFetched;

		if let Some(state) = state.as_deref() {
			self.backup(state).await?;
		}

		Ok(user_info)
	}

	fn request_object(&self, request: &AuthorizationRequest) -> Result<String> {
		let config = &self.factory.config;
		let builder = config
			.openid_request
			.as_ref()
			.ok_or(ConfigError::MissingOption { option: "openid_request" })?;
		let key = config.key.as_deref().unwrap_or_default();

		Ok(builder.build(request, key).map_err(ConfigError::request_object)?)
	}

	fn required_client_id(&self) -> Result<String> {
		Ok(non_empty(self.session.client_id.as_deref())
			.ok_or(ConfigError::MissingOption { option: "client_id" })?
			.to_owned())
	}

	fn latest_access_token(&self) -> Option<TokenSecret> {
		self.session
			.state
			.as_deref()
			.and_then(|state| self.session.grant.get(state))
			.and_then(Grant::latest_token)
			.map(|token| token.access_token.clone())
			.or_else(|| self.access_token.as_ref().map(|response| response.access_token.clone()))
	}

	fn finish<T>(&mut self, kind: FlowKind, result: Result<T>) -> Result<T> {
		match &result {
			Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(e) => {
				obs::record_flow_outcome(kind, FlowOutcome::Failure);

				self.flow = FlowState::Failed(FailureKind::from(e));
			},
		}

		result
	}
}

fn non_empty(value: Option<&str>) -> Option<&str> {
	value.filter(|value| !value.is_empty())
}

/// Only a session holding an unredeemed code may reach the token endpoint.
fn ensure_redeemable(flow: &FlowState, state: &str) -> Result<()> {
	match flow {
		FlowState::CodeReceived => Ok(()),
		FlowState::TokensReceived => Err(Error::TokenAlreadyIssued { state: state.to_owned() }),
		other => Err(Error::InvalidTransition { operation: "complete", from: other.clone() }),
	}
}

fn bad_request(e: MessageError) -> Error {
	Error::BadRequest { reason: e.to_string() }
}

/// Interprets a provider response: the expected message on success, typed errors otherwise.
fn expect_message<T>(
	endpoint: &'static str,
	status: StatusCode,
	parsed: Result<Parsed<T>, MessageError>,
) -> Result<T> {
	match parsed {
		Ok(Parsed::Message(message)) if status.is_success() => Ok(message),
		Ok(Parsed::Error(shape)) =>
			Err(Error::TokenError { code: shape.error, description: shape.error_description }),
		Err(source) if status.is_success() =>
			Err(TransientError::ResponseParse { endpoint, source, status: Some(status.as_u16()) }
				.into()),
		_ => Err(TransientError::UnexpectedResponse {
			endpoint,
			message: format!("HTTP {status}"),
			status: Some(status.as_u16()),
			retry_after: None,
		}
		.into()),
	}
}
