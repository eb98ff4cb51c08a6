//! Walks the authorization-code flow against a mock provider: redirect, callback, code
//! redemption, and userinfo, with sessions kept in the in-memory store.

// std
use std::sync::Arc;
// crates.io
use color_eyre::{Result, eyre::eyre};
use httpmock::prelude::*;
use url::Url;
// self
use oidc_consumer::{
	config::{ConsumerConfig, RequestMethod},
	consumer::{ConsumerFactory, ProviderEndpoints},
	context::CallbackRequest,
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	store::{MemoryStore, SessionStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"Bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let userinfo_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/userinfo").header("authorization", "Bearer demo-access");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"sub\":\"demo-user\",\"email\":\"demo@example.org\"}");
		})
		.await;
	let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::default());
	let config = ConsumerConfig::builder("demo-rp")
		.client_id("demo-client")
		.client_secret("demo-secret")
		.scope("openid email")
		.response_type("code")
		.authz_page("/authz_cb")
		.request_method(RequestMethod::Simple)
		.debug(true)
		.build()?;
	let factory = <ConsumerFactory<ReqwestHttpClient, ReqwestTransportErrorMapper>>::new(store, config)
		.with_endpoints(ProviderEndpoints {
			authorization: Some(Url::parse(&server.url("/authorization"))?),
			token: Some(Url::parse(&server.url("/token"))?),
			token_revocation: None,
			user_info: Some(Url::parse(&server.url("/userinfo"))?),
		});
	let mut consumer = factory.consumer();
	let redirect = consumer.begin(&CallbackRequest::get("https://rp.example.org/")?, None, None).await?;
	let cookie = consumer.session_cookie(None)?;

	println!("Redirect the browser to {redirect}.");
	println!("Set-Cookie: {cookie}");

	let state = redirect
		.query_pairs()
		.find(|(name, _)| name == "state")
		.map(|(_, value)| value.into_owned())
		.ok_or_else(|| eyre!("Redirect carries no state."))?;
	let callback = CallbackRequest::get(&format!(
		"https://rp.example.org/authz_cb?code=demo-code&state={state}"
	))?;
	let mut consumer = factory
		.from_cookie(cookie.split(';').next().unwrap_or_default())
		.await?
		.ok_or_else(|| eyre!("Session cookie was not recognized."))?;

	consumer.parse_authz(&callback).await?;

	let token = consumer.complete().await?;
	let user_info = consumer.userinfo().await?;

	println!("Access token: {}.", token.access_token.expose());
	println!("Signed in as {}.", user_info.sub);

	token_mock.assert_async().await;
	userinfo_mock.assert_async().await;

	Ok(())
}
