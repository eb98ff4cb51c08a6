//! Shared fixtures for integration tests: consumer configuration plus a scripted transport.

#![allow(dead_code)]

// std
use std::{
	collections::HashMap,
	future::{self, Ready},
	io::{self, ErrorKind},
	sync::Arc,
};
// crates.io
use parking_lot::Mutex;
// self
use oidc_consumer::{
	config::{ConsumerConfig, ConsumerConfigBuilder, RequestMethod},
	consumer::{ConsumerFactory, ProviderEndpoints},
	error::{Error, TransportError},
	http::{HttpTransport, ResponseMetadata, ResponseMetadataSlot, TransportErrorMapper},
	oauth2::{
		AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse, http::StatusCode,
	},
	store::{MemoryStore, SessionStore},
	url::{self, Url},
};

pub const CLIENT_ID: &str = "client-it";
pub const CLIENT_SECRET: &str = "secret-it";

/// Code-flow configuration builder without a request object.
pub fn config_builder() -> ConsumerConfigBuilder {
	ConsumerConfig::builder("oidc-it")
		.client_id(CLIENT_ID)
		.client_secret(CLIENT_SECRET)
		.scope("openid")
		.response_type("code")
		.authz_page("/authz_cb")
		.request_method(RequestMethod::Simple)
}

/// Provider endpoints rooted at `base`.
pub fn endpoints(base: &str) -> ProviderEndpoints {
	let join = |path: &str| Url::parse(&format!("{base}{path}")).expect("Endpoint URL should parse.");

	ProviderEndpoints {
		authorization: Some(join("/authorization")),
		token: Some(join("/token")),
		token_revocation: None,
		user_info: Some(join("/userinfo")),
	}
}

/// Factory over the scripted transport and a fresh in-memory store.
pub fn fake_factory(
	config: ConsumerConfig,
	endpoints: ProviderEndpoints,
	transport: FakeTransport,
) -> (ConsumerFactory<FakeTransport, FakeMapper>, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());
	let shared: Arc<dyn SessionStore> = store.clone();
	let factory = ConsumerFactory::with_http_client(shared, config, transport, FakeMapper)
		.with_endpoints(endpoints);

	(factory, store)
}

/// Scripted answer for one URL (query ignored).
#[derive(Clone, Debug)]
pub enum FakeRoute {
	/// Connection refused.
	Refuse,
	/// HTTP response.
	Respond {
		/// Status code.
		status: u16,
		/// Response body.
		body: String,
	},
}
impl FakeRoute {
	pub fn json(status: u16, body: impl Into<String>) -> Self {
		Self::Respond { status, body: body.into() }
	}
}

/// Request observed by [`FakeTransport`].
#[derive(Clone, Debug)]
pub struct SeenRequest {
	/// HTTP method.
	pub method: String,
	/// Full request URI.
	pub uri: Url,
	/// `authorization` header, if any.
	pub authorization: Option<String>,
	/// `content-type` header, if any.
	pub content_type: Option<String>,
	/// Request body.
	pub body: String,
}
impl SeenRequest {
	fn capture(request: &HttpRequest) -> Self {
		let header = |name: &str| {
			request.headers().get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
		};

		Self {
			method: request.method().to_string(),
			uri: Url::parse(&request.uri().to_string()).expect("Request URI should parse."),
			authorization: header("authorization"),
			content_type: header("content-type"),
			body: String::from_utf8_lossy(request.body()).into_owned(),
		}
	}

	/// Decoded form body.
	pub fn form(&self) -> HashMap<String, String> {
		url::form_urlencoded::parse(self.body.as_bytes()).into_owned().collect()
	}
}

#[derive(Debug, Default)]
struct FakeState {
	routes: Mutex<HashMap<String, FakeRoute>>,
	seen: Mutex<Vec<SeenRequest>>,
}

/// Transport answering from a route table; unknown URLs refuse the connection.
#[derive(Clone, Debug, Default)]
pub struct FakeTransport(Arc<FakeState>);
impl FakeTransport {
	pub fn route(&self, url: &str, route: FakeRoute) -> &Self {
		self.0.routes.lock().insert(route_key(url), route);

		self
	}

	/// URIs requested so far, in order.
	pub fn seen_uris(&self) -> Vec<Url> {
		self.seen_requests().into_iter().map(|request| request.uri).collect()
	}

	/// Requests sent so far, in order.
	pub fn seen_requests(&self) -> Vec<SeenRequest> {
		self.0.seen.lock().clone()
	}

	fn respond(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError<io::Error>> {
		let key = route_key(&request.uri().to_string());
		let route = self.0.routes.lock().get(&key).cloned();

		self.0.seen.lock().push(SeenRequest::capture(&request));

		match route {
			Some(FakeRoute::Respond { status, body }) => {
				let mut response = HttpResponse::new(body.into_bytes());

				*response.status_mut() =
					StatusCode::from_u16(status).expect("Scripted status should be valid.");

				Ok(response)
			},
			Some(FakeRoute::Refuse) | None =>
				Err(HttpClientError::Io(io::Error::new(ErrorKind::ConnectionRefused, key))),
		}
	}
}
impl HttpTransport for FakeTransport {
	type Handle = FakeHandle;
	type TransportError = io::Error;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		FakeHandle { transport: self.clone(), slot }
	}
}

/// Handle produced by [`FakeTransport`].
#[derive(Debug)]
pub struct FakeHandle {
	transport: FakeTransport,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for FakeHandle {
	type Error = HttpClientError<io::Error>;
	type Future = Ready<Result<HttpResponse, Self::Error>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		self.slot.take();

		let result = self.transport.respond(request);

		if let Ok(response) = &result {
			self.slot.store(ResponseMetadata {
				status: Some(response.status().as_u16()),
				retry_after: None,
			});
		}

		future::ready(result)
	}
}

/// Maps refused connections to unreachable hosts and everything else to network failures.
#[derive(Clone, Copy, Debug, Default)]
pub struct FakeMapper;
impl TransportErrorMapper<io::Error> for FakeMapper {
	fn map_transport_error(
		&self,
		url: &str,
		_meta: Option<&ResponseMetadata>,
		err: HttpClientError<io::Error>,
	) -> Error {
		match err {
			HttpClientError::Io(e) if e.kind() == ErrorKind::ConnectionRefused =>
				TransportError::host_unreachable(url, e).into(),
			HttpClientError::Io(e) => TransportError::Io(e).into(),
			other => TransportError::network(url, other.to_string()).into(),
		}
	}
}

fn route_key(url: &str) -> String {
	let mut url = Url::parse(url).expect("Route URL should parse.");

	url.set_query(None);

	url.to_string()
}
