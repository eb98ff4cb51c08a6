mod common;

// std
use std::{env, fs, path::PathBuf, process, sync::Arc};
// self
use common::*;
use oidc_consumer::{
	consumer::{ConsumerFactory, FlowState},
	context::CallbackRequest,
	error::Error,
	store::{FileStore, SessionStore, StoreKey, StoreValue},
};

fn snapshot_path(label: &str) -> PathBuf {
	env::temp_dir().join(format!("oidc_consumer_it_{label}_{}.json", process::id()))
}

fn file_factory(path: &PathBuf) -> ConsumerFactory<FakeTransport, FakeMapper> {
	let store: Arc<dyn SessionStore> =
		Arc::new(FileStore::open(path).expect("File store should open."));

	ConsumerFactory::with_http_client(
		store,
		config_builder().build().expect("Configuration should build."),
		FakeTransport::default(),
		FakeMapper,
	)
	.with_endpoints(endpoints("https://op.example.org"))
}

#[tokio::test]
async fn sessions_survive_a_store_reopen() {
	let path = snapshot_path("reopen");
	let (state, seed) = {
		let factory = file_factory(&path);
		let mut consumer = factory.consumer();
		let redirect = consumer
			.begin(
				&CallbackRequest::get("https://rp.example.org/login").expect("URL should parse."),
				None,
				None,
			)
			.await
			.expect("Begin should succeed.");
		let state = redirect
			.query_pairs()
			.find(|(name, _)| name == "state")
			.map(|(_, value)| value.into_owned())
			.expect("Redirect should carry a state.");

		(state, consumer.session().seed.clone().expect("Seed should be set."))
	};
	let factory = file_factory(&path);
	let by_seed = factory.from_seed(&seed).await.expect("Seed pointer should survive.");

	assert_eq!(by_seed.session().state.as_deref(), Some(state.as_str()));
	assert_eq!(by_seed.flow_state(), &FlowState::AwaitingCallback);

	let mut consumer = factory.consumer();

	consumer
		.parse_authz(
			&CallbackRequest::get(&format!("https://rp.example.org/authz_cb?code=c1&state={state}"))
				.expect("URL should parse."),
		)
		.await
		.expect("Callback should be accepted after reopen.");

	let reopened = FileStore::open(&path).expect("File store should reopen.");
	let key = StoreKey::session(&state);
	let session = reopened
		.get(&key)
		.await
		.expect("Session should be persisted.")
		.into_session(&key)
		.expect("Entry should hold a session.");

	assert_eq!(session.flow, FlowState::CodeReceived);

	fs::remove_file(&path).expect("Snapshot should be removable.");
}

#[tokio::test]
async fn missing_entries_report_not_found() {
	let path = snapshot_path("missing");
	let store = FileStore::open(&path).expect("File store should open.");
	let err = store
		.get(&StoreKey::seed("absent"))
		.await
		.expect_err("Absent keys should fail.");

	assert!(err.is_not_found());
	assert!(!path.exists());
}

#[tokio::test]
async fn seed_shaped_states_are_unknown_after_reopen() {
	let path = snapshot_path("seed_state");

	FileStore::open(&path)
		.expect("File store should open.")
		.set(StoreKey::seed("x"), StoreValue::Pointer("state-x".into()))
		.await
		.expect("Seed pointer should persist.");

	let factory = file_factory(&path);
	let err = factory
		.consumer()
		.parse_authz(
			&CallbackRequest::get("https://rp.example.org/authz_cb?code=c1&state=seed%3Ax")
				.expect("URL should parse."),
		)
		.await
		.expect_err("A seed entry should not bind a callback.");

	assert!(matches!(err, Error::UnknownState { ref state } if state == "seed:x"));

	let err = factory
		.consumer()
		.restore("seed:x")
		.await
		.expect_err("A seed entry should not restore as a session.");

	assert!(matches!(err, Error::UnknownState { .. }));

	fs::remove_file(&path).expect("Snapshot should be removable.");
}
