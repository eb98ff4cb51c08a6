//! Thread-safe in-memory [`SessionStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{SessionStore, StoreError, StoreFuture, StoreKey, StoreValue},
};

type StoreMap = Arc<RwLock<HashMap<StoreKey, StoreValue>>>;

/// Thread-safe storage backend that keeps entries in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of entries currently held (sessions and seed pointers).
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` if the store holds no entries.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Returns `true` if an entry exists for `key`.
	pub fn contains(&self, key: &StoreKey) -> bool {
		self.0.read().contains_key(key)
	}

	fn get_now(map: StoreMap, key: &StoreKey) -> Result<StoreValue, StoreError> {
		map.read().get(key).cloned().ok_or_else(|| StoreError::KeyNotFound { key: key.to_string() })
	}

	fn set_now(map: StoreMap, key: StoreKey, value: StoreValue) {
		map.write().insert(key, value);
	}
}
impl SessionStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, StoreValue> {
		let map = self.0.clone();

		Box::pin(async move { Self::get_now(map, key) })
	}

	fn set(&self, key: StoreKey, value: StoreValue) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			Self::set_now(map, key, value);

			Ok(())
		})
	}
}
