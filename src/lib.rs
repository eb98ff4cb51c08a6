//! OpenID Connect relying-party flows: session-bound state across the authorization round trip,
//! provider discovery with protocol fallback, and dynamic client registration over pluggable
//! stores and transports.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod consumer;
pub mod context;
pub mod cookie;
pub mod discovery;
pub mod error;
pub mod ext;
pub mod http;
pub mod message;
pub mod obs;
pub mod registration;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::{ConsumerConfig, RequestMethod},
		consumer::{ConsumerFactory, ProviderEndpoints},
		http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
		store::{MemoryStore, SessionStore},
	};

	/// Factory type alias used by reqwest-backed tests.
	pub type ReqwestTestFactory = ConsumerFactory<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Code-flow configuration with request-body client authentication and no request object.
	pub fn test_config() -> ConsumerConfig {
		ConsumerConfig::builder("oidc-test")
			.client_id("client-test")
			.client_secret("secret-test")
			.scope("openid")
			.response_type("code")
			.authz_page("/authz_cb")
			.request_method(RequestMethod::Simple)
			.build()
			.expect("Test consumer configuration should build.")
	}

	/// Provider endpoints rooted at `base` (typically an `httpmock` server URL).
	pub fn test_endpoints(base: &str) -> ProviderEndpoints {
		let join = |path: &str| {
			Url::parse(&format!("{base}{path}")).expect("Test endpoint URL should parse.")
		};

		ProviderEndpoints {
			authorization: Some(join("/authorization")),
			token: Some(join("/token")),
			token_revocation: None,
			user_info: Some(join("/userinfo")),
		}
	}

	/// Constructs a [`ConsumerFactory`] backed by an in-memory store and the reqwest transport.
	pub fn build_reqwest_test_factory(
		config: ConsumerConfig,
		endpoints: ProviderEndpoints,
	) -> (ReqwestTestFactory, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn SessionStore> = store_backend.clone();
		let factory = ConsumerFactory::with_http_client(
			store,
			config,
			test_reqwest_http_client(),
			ReqwestTransportErrorMapper,
		)
		.with_endpoints(endpoints);

		(factory, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::{Mutex as AsyncMutex, MutexGuardArc as AsyncMutexGuardArc};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
