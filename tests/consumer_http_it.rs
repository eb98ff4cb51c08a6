#![cfg(feature = "reqwest")]

mod common;

// std
use std::{collections::HashMap, sync::Arc};
// crates.io
use httpmock::prelude::*;
// self
use common::*;
use oidc_consumer::{
	consumer::{ConsumerFactory, FlowState},
	context::CallbackRequest,
	error::{Error, TransientError},
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	store::{MemoryStore, SessionStore},
};

fn reqwest_factory(
	server: &MockServer,
) -> ConsumerFactory<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	let config = config_builder().build().expect("Configuration should build.");
	let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::default());

	ConsumerFactory::with_http_client(
		store,
		config,
		ReqwestHttpClient::default(),
		ReqwestTransportErrorMapper,
	)
	.with_endpoints(endpoints(&server.base_url()))
}

#[tokio::test]
async fn authorization_code_flow_runs_against_a_live_provider() {
	let server = MockServer::start_async().await;
	let factory = reqwest_factory(&server);
	let mut consumer = factory.consumer();
	let redirect = consumer
		.begin(&CallbackRequest::get("http://rp.example.org/login").expect("URL should parse."), None, None)
		.await
		.expect("Begin should succeed.");
	let pairs: HashMap<_, _> = redirect.query_pairs().into_owned().collect();
	let state = pairs.get("state").cloned().expect("Redirect should carry a state.");

	assert!(redirect.as_str().starts_with(&server.url("/authorization")));

	let mut callback_consumer = factory.consumer();

	callback_consumer
		.parse_authz(
			&CallbackRequest::get(&format!(
				"http://rp.example.org/authz_cb?code=live-code&state={state}"
			))
			.expect("URL should parse."),
		)
		.await
		.expect("Callback should be accepted.");

	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"live-access\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let userinfo_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/userinfo").header("authorization", "Bearer live-access");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"sub\":\"live-user\",\"name\":\"Live User\"}");
		})
		.await;
	let token = callback_consumer.complete().await.expect("Code exchange should succeed.");
	let user_info = callback_consumer.userinfo().await.expect("Userinfo should succeed.");

	token_mock.assert_async().await;
	userinfo_mock.assert_async().await;

	assert_eq!(token.access_token.expose(), "live-access");
	assert_eq!(token.expires_in, Some(3600));
	assert_eq!(user_info.sub, "live-user");
	assert_eq!(user_info.claim_str("name"), Some("Live User"));
	assert_eq!(callback_consumer.flow_state(), &FlowState::UserInfoFetched);
}

#[tokio::test]
async fn provider_failures_map_to_typed_errors() {
	let server = MockServer::start_async().await;
	let factory = reqwest_factory(&server);
	let mut consumer = factory.consumer();
	let redirect = consumer
		.begin(&CallbackRequest::get("http://rp.example.org/login").expect("URL should parse."), None, None)
		.await
		.expect("Begin should succeed.");
	let state = redirect
		.query_pairs()
		.find(|(name, _)| name == "state")
		.map(|(_, value)| value.into_owned())
		.expect("Redirect should carry a state.");

	consumer
		.parse_authz(
			&CallbackRequest::get(&format!("http://rp.example.org/authz_cb?code=c1&state={state}"))
				.expect("URL should parse."),
		)
		.await
		.expect("Callback should be accepted.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(502).header("content-type", "text/plain").body("upstream down");
		})
		.await;
	let err = consumer.complete().await.expect_err("Gateway failures should surface.");

	mock.assert_async().await;

	assert!(matches!(
		err,
		Error::Transient(TransientError::UnexpectedResponse { status: Some(502), .. })
	));
	assert!(err.is_retryable());
}
