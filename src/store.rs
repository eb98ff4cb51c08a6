//! Session store contract and built-in store implementations.
//!
//! The consumer treats the store as a keyed blob store. Keys are session ids (the `state`
//! value) or `seed:<seed>` pointers; values are complete [`Session`] snapshots or the bare
//! state string a seed points at. Stores never interpret values.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, consumer::Session};

const SEED_PREFIX: &str = "seed:";

/// Boxed future returned by [`SessionStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract implemented by session stores.
///
/// No transactional guarantees are required; callers serialize read-modify-write cycles for
/// a single key themselves.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Fetches the value stored under `key`, failing with [`StoreError::KeyNotFound`] when
	/// absent.
	fn get<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, StoreValue>;

	/// Persists or replaces the value stored under `key`.
	fn set(&self, key: StoreKey, value: StoreValue) -> StoreFuture<'_, ()>;
}

/// Key addressing a store entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StoreKey {
	/// Session snapshot keyed by its `state`.
	Session(String),
	/// Pointer entry keyed by the consumer seed (`seed:<seed>`).
	Seed(String),
}
impl StoreKey {
	/// Key for the session identified by `state`.
	///
	/// A `state` carrying the seed prefix addresses the entry its rendered form parses back to,
	/// so every store resolves it the same way before and after a reload.
	pub fn session(state: impl Into<String>) -> Self {
		let state = state.into();

		match state.strip_prefix(SEED_PREFIX) {
			Some(seed) => Self::Seed(seed.to_owned()),
			None => Self::Session(state),
		}
	}

	/// Key for the seed pointer of `seed`.
	pub fn seed(seed: impl Into<String>) -> Self {
		Self::Seed(seed.into())
	}
}
impl Display for StoreKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			StoreKey::Session(state) => f.write_str(state),
			StoreKey::Seed(seed) => write!(f, "{SEED_PREFIX}{seed}"),
		}
	}
}
impl From<StoreKey> for String {
	fn from(value: StoreKey) -> Self {
		value.to_string()
	}
}
impl TryFrom<String> for StoreKey {
	type Error = StoreError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		if value.is_empty() {
			return Err(StoreError::Serialization { message: "Store key cannot be empty".into() });
		}

		Ok(match value.strip_prefix(SEED_PREFIX) {
			Some(seed) => Self::Seed(seed.to_owned()),
			None => Self::Session(value),
		})
	}
}

/// Value stored under a [`StoreKey`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreValue {
	/// Complete session snapshot.
	Session(Box<Session>),
	/// State string a seed entry points at.
	Pointer(String),
}
impl StoreValue {
	/// Returns the session snapshot, failing if the entry is a pointer.
	pub fn into_session(self, key: &StoreKey) -> Result<Session, StoreError> {
		match self {
			StoreValue::Session(session) => Ok(*session),
			StoreValue::Pointer(_) =>
				Err(StoreError::UnexpectedValue { key: key.to_string(), expected: "session".into() }),
		}
	}

	/// Returns the pointed-at state, failing if the entry is a session.
	pub fn into_pointer(self, key: &StoreKey) -> Result<String, StoreError> {
		match self {
			StoreValue::Pointer(state) => Ok(state),
			StoreValue::Session(_) =>
				Err(StoreError::UnexpectedValue { key: key.to_string(), expected: "pointer".into() }),
		}
	}
}

/// Error type produced by [`SessionStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// No entry exists for the key.
	#[error("Key not found: {key}.")]
	KeyNotFound {
		/// Rendered key.
		key: String,
	},
	/// Entry exists but holds the wrong kind of value.
	#[error("Entry {key} does not hold a {expected}.")]
	UnexpectedValue {
		/// Rendered key.
		key: String,
		/// Expected value kind.
		expected: String,
	},
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	/// Returns `true` if the error reports a missing key.
	pub fn is_not_found(&self) -> bool {
		matches!(self, StoreError::KeyNotFound { .. })
	}
}
