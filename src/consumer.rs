//! Relying-party consumer: session-bound state across the authorization round trip.
//!
//! A [`ConsumerFactory`] owns the services shared by every request (store, configuration,
//! transport, message layer, and the per-state guards). Each inbound request gets its own
//! [`Consumer`], either fresh ([`ConsumerFactory::consumer`]) or rebuilt from the session
//! cookie ([`ConsumerFactory::from_cookie`]) or the seed pointer
//! ([`ConsumerFactory::from_seed`]). The consumer re-persists the whole [`Session`] after
//! every successful transition.

mod flow;
mod request_file;
mod session;

pub use flow::CallbackOutcome;
pub use session::*;

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{Grant, TokenSecret},
	config::ConsumerConfig,
	cookie::{self, CookieError},
	discovery::{Discoverer, DiscoveryOutcome, IdType, ProviderConfiguration},
	http::{HttpTransport, TransportErrorMapper},
	message::{AccessTokenResponse, MessageLayer, StandardMessages},
	registration::{Registrar, RegistrationRequest, RegistrationType},
	store::{SessionStore, StoreError, StoreKey, StoreValue},
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Factory specialized for the crate's default reqwest transport stack.
pub type ReqwestConsumerFactory = ConsumerFactory<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Provider endpoints applied to fresh sessions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint.
	pub authorization: Option<Url>,
	/// Token endpoint.
	pub token: Option<Url>,
	/// Token revocation endpoint.
	pub token_revocation: Option<Url>,
	/// Userinfo endpoint.
	pub user_info: Option<Url>,
}
impl From<&ProviderConfiguration> for ProviderEndpoints {
	fn from(configuration: &ProviderConfiguration) -> Self {
		Self {
			authorization: configuration.authorization_endpoint.clone(),
			token: configuration.token_endpoint.clone(),
			token_revocation: configuration.token_revocation_endpoint.clone(),
			user_info: configuration.user_info_endpoint.clone(),
		}
	}
}

/// Per-state async guards serializing read-modify-write cycles on one session.
///
/// An entry lives only while some caller holds or awaits its lock.
#[derive(Debug, Default)]
pub struct FlowGuards(Mutex<HashMap<String, Arc<AsyncMutex<()>>>>);
impl FlowGuards {
	/// Waits for exclusive access to `state`.
	pub async fn lock(self: &Arc<Self>, state: &str) -> FlowLock {
		let mutex = self
			.0
			.lock()
			.entry(state.to_owned())
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone();
		let held = mutex.lock_arc().await;

		FlowLock { guards: self.clone(), state: state.to_owned(), held: Some(held) }
	}

	/// Number of states with a live guard.
	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	/// Returns `true` if no state is currently guarded.
	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}

	fn release(&self, state: &str) {
		let mut guards = self.0.lock();

		// The map holds the only remaining reference once no one else waits on the state.
		if guards.get(state).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
			guards.remove(state);
		}
	}
}

/// Exclusive access to one state; released on drop.
#[derive(Debug)]
pub struct FlowLock {
	guards: Arc<FlowGuards>,
	state: String,
	held: Option<AsyncMutexGuardArc<()>>,
}
impl Drop for FlowLock {
	fn drop(&mut self) {
		drop(self.held.take());

		self.guards.release(&self.state);
	}
}

/// Services shared by every consumer serving the same relying party.
pub struct ConsumerFactory<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Session store.
	pub store: Arc<dyn SessionStore>,
	/// Immutable consumer configuration.
	pub config: Arc<ConsumerConfig>,
	/// Message encoding layer.
	pub messages: Arc<dyn MessageLayer>,
	/// Endpoints copied into fresh sessions.
	pub endpoints: ProviderEndpoints,
	flow_guards: Arc<FlowGuards>,
}
impl<C, M> ConsumerFactory<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a factory that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn SessionStore>,
		config: impl Into<Arc<ConsumerConfig>>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			config: config.into(),
			messages: Arc::new(StandardMessages),
			endpoints: ProviderEndpoints::default(),
			flow_guards: Default::default(),
		}
	}

	/// Sets the endpoints copied into fresh sessions.
	pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Replaces the message layer.
	pub fn with_message_layer(mut self, messages: Arc<dyn MessageLayer>) -> Self {
		self.messages = messages;

		self
	}

	/// Creates a consumer with a fresh session.
	pub fn consumer(&self) -> Consumer<C, M> {
		Consumer::new(self.clone())
	}

	/// Rebuilds the consumer bound to the session cookie in a `Cookie` header.
	///
	/// Returns `Ok(None)` when the header does not carry the consumer's cookie. The session
	/// is restored from the store and the cookie signature is then verified against the
	/// restored seed.
	pub async fn from_cookie(&self, header: &str) -> Result<Option<Consumer<C, M>>> {
		let name = self.config.name.as_str();
		let Some(parts) = cookie::cookie_parts(name, header) else {
			return Ok(None);
		};
		let sid = parts
			.first()
			.filter(|sid| !sid.is_empty())
			.ok_or_else(|| CookieError::Malformed { name: name.to_owned() })?;
		let mut consumer = self.consumer();

		consumer.restore(sid).await?;

		let seed = consumer.session.seed.clone().unwrap_or_default();

		cookie::parse_cookie(name, &seed, header)?;

		Ok(Some(consumer))
	}

	/// Rebuilds the consumer whose seed pointer is `seed`.
	pub async fn from_seed(&self, seed: &str) -> Result<Consumer<C, M>> {
		let key = StoreKey::seed(seed);
		let state = match self.store.get(&key).await {
			Ok(value) => value.into_pointer(&key)?,
			Err(e) if e.is_not_found() => return Err(Error::UnknownState { state: key.to_string() }),
			Err(e) => return Err(e.into()),
		};
		let mut consumer = self.consumer();

		consumer.restore(&state).await?;

		Ok(consumer)
	}

	/// Per-state guards shared by every consumer built from this factory.
	pub fn flow_guards(&self) -> &FlowGuards {
		&self.flow_guards
	}

	pub(crate) async fn lock_flow(&self, state: &str) -> FlowLock {
		self.flow_guards.lock(state).await
	}
}
#[cfg(feature = "reqwest")]
impl ConsumerFactory<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a factory that provisions its own reqwest-backed transport.
	pub fn new(store: Arc<dyn SessionStore>, config: impl Into<Arc<ConsumerConfig>>) -> Self {
		Self::with_http_client(
			store,
			config,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> Clone for ConsumerFactory<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			store: self.store.clone(),
			config: self.config.clone(),
			messages: self.messages.clone(),
			endpoints: self.endpoints.clone(),
			flow_guards: self.flow_guards.clone(),
		}
	}
}
impl<C, M> Debug for ConsumerFactory<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConsumerFactory")
			.field("config", &self.config)
			.field("endpoints", &self.endpoints)
			.finish()
	}
}

/// Per-request relying-party consumer.
pub struct Consumer<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	factory: ConsumerFactory<C, M>,
	session: Session,
	flow: FlowState,
	client_secret: Option<TokenSecret>,
	registration_expires_in: Option<i64>,
	access_token: Option<AccessTokenResponse>,
}
impl<C, M> Consumer<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn new(factory: ConsumerFactory<C, M>) -> Self {
		let config = factory.config.clone();
		let endpoints = factory.endpoints.clone();
		let session = Session {
			client_id: config.client_id.clone(),
			authorization_endpoint: endpoints.authorization,
			token_endpoint: endpoints.token,
			token_revocation_endpoint: endpoints.token_revocation,
			user_info_endpoint: endpoints.user_info,
			debug: config.debug,
			..Session::default()
		};

		Self {
			factory,
			session,
			flow: FlowState::Idle,
			client_secret: config.client_secret.clone(),
			registration_expires_in: None,
			access_token: None,
		}
	}

	/// Current session attributes.
	pub fn session(&self) -> &Session {
		&self.session
	}

	/// In-memory flow state (may be [`FlowState::Failed`] after an error).
	pub fn flow_state(&self) -> &FlowState {
		&self.flow
	}

	/// Client identifier currently in use.
	pub fn client_id(&self) -> Option<&str> {
		self.session.client_id.as_deref()
	}

	/// Client secret currently in use (from configuration or registration).
	pub fn client_secret(&self) -> Option<&TokenSecret> {
		self.client_secret.as_ref()
	}

	/// Lifetime of the registered client credentials, as reported by the provider.
	pub fn registration_expires_in(&self) -> Option<i64> {
		self.registration_expires_in
	}

	/// Latest access-token response seen by this consumer.
	pub fn access_token(&self) -> Option<&AccessTokenResponse> {
		self.access_token.as_ref()
	}

	/// Shared configuration.
	pub fn config(&self) -> &ConsumerConfig {
		&self.factory.config
	}

	/// Fills empty attributes from the session persisted under `sid`; grants always merge.
	pub async fn update(&mut self, sid: &str) -> Result<()> {
		let persisted = self.load_session(sid).await?;

		self.session.merge_from(persisted);

		if self.flow == FlowState::Idle {
			self.flow = self.session.flow.clone();
		}

		Ok(())
	}

	/// Replaces every attribute with the session persisted under `sid`.
	///
	/// A missing session is reported as [`Error::UnknownState`].
	pub async fn restore(&mut self, sid: &str) -> Result<()> {
		let persisted = self.load_bound_session(sid).await?;

		self.flow = persisted.flow.clone();
		self.session = persisted;

		Ok(())
	}

	/// Finds the grant issued for `state`, falling back to the session persisted under it.
	///
	/// A grant found in the store is cached on the local session.
	pub async fn grant_from_state(&mut self, state: &str) -> Result<Option<&Grant>> {
		if let Some(key) = grant_key(&self.session, state) {
			return Ok(self.session.grant.get(&key));
		}

		let persisted = match self.load_bound_session(state).await {
			Ok(session) => session,
			Err(Error::UnknownState { .. }) => return Ok(None),
			Err(e) => return Err(e),
		};
		let Some((key, grant)) = persisted.grant.into_iter().find(|(_, grant)| grant.state == state)
		else {
			return Ok(None);
		};

		self.session.grant.insert(key.clone(), grant);

		Ok(self.session.grant.get(&key))
	}

	/// Signed `Set-Cookie` value binding the browser to this session.
	pub fn session_cookie(&self, max_age: Option<Duration>) -> Result<String> {
		let state = self.session.state.as_deref().ok_or(Error::InvalidTransition {
			operation: "session_cookie",
			from: self.flow.clone(),
		})?;
		let seed = self.session.seed.as_deref().unwrap_or_default();

		Ok(cookie::make_cookie(&self.factory.config.name, state, seed, max_age)?)
	}

	/// Copies the endpoints advertised by a provider configuration into the session.
	pub fn apply_provider_configuration(&mut self, configuration: &ProviderConfiguration) {
		let endpoints = ProviderEndpoints::from(configuration);

		if endpoints.authorization.is_some() {
			self.session.authorization_endpoint = endpoints.authorization;
		}
		if endpoints.token.is_some() {
			self.session.token_endpoint = endpoints.token;
		}
		if endpoints.token_revocation.is_some() {
			self.session.token_revocation_endpoint = endpoints.token_revocation;
		}
		if endpoints.user_info.is_some() {
			self.session.user_info_endpoint = endpoints.user_info;
		}
	}

	/// Resolves `principal` to a provider configuration (or a raw issuer location).
	pub async fn discover(&self, principal: &str, id_type: IdType) -> Result<DiscoveryOutcome> {
		Discoverer::new(self.factory.http_client.clone(), self.factory.transport_mapper.clone())
			.discover(principal, id_type)
			.await
	}

	/// Registers (or updates) the client at `endpoint` and adopts the returned credentials.
	///
	/// `attributes` name registration fields; `type`, `client_id`, `client_secret`, and
	/// unknown names are ignored. For [`RegistrationType::ClientUpdate`] the current
	/// credentials are always sent.
	pub async fn register(
		&mut self,
		endpoint: &Url,
		kind: RegistrationType,
		attributes: &BTreeMap<String, Value>,
	) -> Result<()> {
		let mut request = RegistrationRequest::new(kind);

		if kind == RegistrationType::ClientUpdate {
			request.client_id = self.session.client_id.clone();
			request.client_secret = self.client_secret.clone();
		}

		request.apply(attributes)?;

		let response = Registrar::new(
			self.factory.http_client.clone(),
			self.factory.transport_mapper.clone(),
		)
		.register(endpoint, &request)
		.await?;

		self.session.client_id = Some(response.client_id);
		self.client_secret = response.client_secret;
		self.registration_expires_in = response.expires_in;

		Ok(())
	}

	/// Token refresh has no defined behavior yet.
	pub async fn refresh_token(&mut self) -> Result<AccessTokenResponse> {
		Err(Error::NotImplemented { operation: "refresh_token" })
	}

	/// Session refresh has no defined behavior yet.
	pub async fn refresh_session(&mut self) -> Result<()> {
		Err(Error::NotImplemented { operation: "refresh_session" })
	}

	/// Session checks have no defined behavior yet.
	pub async fn check_session(&self) -> Result<()> {
		Err(Error::NotImplemented { operation: "check_session" })
	}

	/// Logout has no defined behavior yet.
	pub async fn end_session(&mut self) -> Result<()> {
		Err(Error::NotImplemented { operation: "end_session" })
	}

	async fn load_session(&self, sid: &str) -> Result<Session> {
		let key = StoreKey::session(sid);
		let value = self.factory.store.get(&key).await?;

		Ok(value.into_session(&key)?)
	}

	/// Loads the session bound to `state`; anything but a stored session is an unknown state.
	async fn load_bound_session(&self, state: &str) -> Result<Session> {
		self.load_session(state).await.map_err(|e| match e {
			Error::Storage(StoreError::KeyNotFound { .. } | StoreError::UnexpectedValue { .. }) =>
				Error::UnknownState { state: state.to_owned() },
			other => other,
		})
	}

	async fn backup(&self, sid: &str) -> Result<()> {
		self.factory
			.store
			.set(StoreKey::session(sid), StoreValue::Session(Box::new(self.session.clone())))
			.await?;

		Ok(())
	}
}
impl<C, M> Debug for Consumer<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Consumer")
			.field("session", &self.session)
			.field("flow", &self.flow)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("registration_expires_in", &self.registration_expires_in)
			.finish()
	}
}

fn grant_key(session: &Session, state: &str) -> Option<String> {
	session.grant.iter().find(|(_, grant)| grant.state == state).map(|(key, _)| key.clone())
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, store::MemoryStore};

	fn factory() -> (ReqwestTestFactory, Arc<MemoryStore>) {
		build_reqwest_test_factory(test_config(), test_endpoints("https://op.example.org"))
	}

	fn persisted(state: &str, seed: &str) -> Session {
		let mut session = Session {
			client_id: Some("client-test".into()),
			state: Some(state.into()),
			seed: Some(seed.into()),
			nonce: Some("persisted-nonce".into()),
			redirect_uri: Some("https://rp.example.org/authz_cb".into()),
			flow: FlowState::AwaitingCallback,
			..Session::default()
		};

		session.grant.insert(state.into(), Grant::new(state));

		session
	}

	#[tokio::test]
	async fn restore_replaces_every_attribute() {
		let (factory, store) = factory();
		let record = persisted("state-1", "seed-1");

		store
			.set(StoreKey::session("state-1"), StoreValue::Session(Box::new(record.clone())))
			.await
			.expect("Seeding the store should succeed.");

		let mut consumer = factory.consumer();

		consumer.restore("state-1").await.expect("Restore should succeed.");

		assert_eq!(consumer.session(), &record);
		assert_eq!(consumer.flow_state(), &FlowState::AwaitingCallback);

		let err = consumer.restore("missing").await.expect_err("Missing sessions should fail.");

		assert!(matches!(err, Error::UnknownState { ref state } if state == "missing"));
	}

	#[tokio::test]
	async fn update_never_clobbers_local_values() {
		let (factory, store) = factory();

		store
			.set(
				StoreKey::session("state-1"),
				StoreValue::Session(Box::new(persisted("state-1", "seed-1"))),
			)
			.await
			.expect("Seeding the store should succeed.");

		let mut consumer = factory.consumer();

		consumer.session.nonce = Some("local-nonce".into());
		consumer.update("state-1").await.expect("First update should succeed.");

		let first = consumer.session().clone();

		consumer.update("state-1").await.expect("Second update should succeed.");

		assert_eq!(consumer.session(), &first);
		assert_eq!(first.nonce.as_deref(), Some("local-nonce"));
		assert_eq!(first.seed.as_deref(), Some("seed-1"));
		assert!(first.grant.contains_key("state-1"));
	}

	#[tokio::test]
	async fn grant_from_state_falls_back_to_store_and_caches() {
		let (factory, store) = factory();

		store
			.set(
				StoreKey::session("state-1"),
				StoreValue::Session(Box::new(persisted("state-1", "seed-1"))),
			)
			.await
			.expect("Seeding the store should succeed.");

		let mut consumer = factory.consumer();
		let grant = consumer
			.grant_from_state("state-1")
			.await
			.expect("Lookup should succeed.")
			.cloned()
			.expect("Persisted grant should be found.");

		assert_eq!(grant.state, "state-1");
		assert!(consumer.session().grant.contains_key("state-1"));
		assert!(
			consumer.grant_from_state("other").await.expect("Lookup should succeed.").is_none()
		);
	}

	#[tokio::test]
	async fn cookie_and_seed_rebuild_the_same_session() {
		let (factory, store) = factory();
		let record = persisted("state-1", "seed-1");

		store
			.set(StoreKey::session("state-1"), StoreValue::Session(Box::new(record.clone())))
			.await
			.expect("Seeding the store should succeed.");
		store
			.set(StoreKey::seed("seed-1"), StoreValue::Pointer("state-1".into()))
			.await
			.expect("Seeding the store should succeed.");

		let mut consumer = factory.consumer();

		consumer.restore("state-1").await.expect("Restore should succeed.");

		let set_cookie = consumer.session_cookie(None).expect("Cookie should be issued.");
		let header = set_cookie.split(';').next().expect("Cookie pair should exist.").to_owned();
		let rebuilt = factory
			.from_cookie(&header)
			.await
			.expect("Cookie should verify.")
			.expect("Cookie should be recognized.");

		assert_eq!(rebuilt.session(), &record);
		assert!(
			factory.from_cookie("unrelated=1").await.expect("Lookup should succeed.").is_none()
		);

		let forged = header.replacen("state-1", "state-1x", 1);
		let err = factory.from_cookie(&forged).await.expect_err("Forged cookies should fail.");

		assert!(matches!(err, Error::UnknownState { .. } | Error::Cookie(_)));

		let by_seed = factory.from_seed("seed-1").await.expect("Seed pointer should resolve.");

		assert_eq!(by_seed.session(), &record);
		assert!(matches!(
			factory.from_seed("seed-unknown").await,
			Err(Error::UnknownState { .. })
		));
	}

	#[tokio::test]
	async fn guards_live_only_while_held_or_awaited() {
		let guards = Arc::new(FlowGuards::default());
		let first = guards.lock("state-1").await;
		let waiter = tokio::spawn({
			let guards = guards.clone();

			async move { drop(guards.lock("state-1").await) }
		});

		tokio::task::yield_now().await;

		assert_eq!(guards.len(), 1);

		drop(first);
		waiter.await.expect("Waiter should acquire the guard.");

		assert!(guards.is_empty());
	}

	#[tokio::test]
	async fn placeholders_never_succeed() {
		let (factory, _) = factory();
		let mut consumer = factory.consumer();

		assert!(matches!(
			consumer.refresh_token().await,
			Err(Error::NotImplemented { operation: "refresh_token" })
		));
		assert!(matches!(consumer.refresh_session().await, Err(Error::NotImplemented { .. })));
		assert!(matches!(consumer.check_session().await, Err(Error::NotImplemented { .. })));
		assert!(matches!(consumer.end_session().await, Err(Error::NotImplemented { .. })));
	}

	#[test]
	fn provider_configuration_fills_endpoints() {
		let (factory, _) = factory();
		let mut consumer = factory.consumer();
		let configuration: ProviderConfiguration = serde_json::from_value(serde_json::json!({
			"issuer": "https://issuer.example.org",
			"authorization_endpoint": "https://issuer.example.org/authz",
			"token_endpoint": "https://issuer.example.org/token",
			"userinfo_endpoint": "https://issuer.example.org/me",
		}))
		.expect("Provider configuration should deserialize.");

		consumer.apply_provider_configuration(&configuration);

		assert_eq!(
			consumer.session().authorization_endpoint.as_ref().map(Url::as_str),
			Some("https://issuer.example.org/authz")
		);
		assert_eq!(
			consumer.session().user_info_endpoint.as_ref().map(Url::as_str),
			Some("https://issuer.example.org/me")
		);
		assert!(consumer.session().token_revocation_endpoint.is_none());
	}
}
