//! JSON-file [`SessionStore`] so sessions outlive the process that started the flow.

// std
use std::{
	fs,
	io::{BufWriter, ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{SessionStore, StoreError, StoreFuture, StoreKey, StoreValue},
};

type Snapshot = BTreeMap<StoreKey, StoreValue>;

/// Keeps every entry in memory and rewrites the whole snapshot on each `set`.
///
/// The snapshot is a JSON object keyed by the rendered [`StoreKey`]. Writes go to a sibling
/// `.tmp` file that is then renamed over the snapshot.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	entries: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens the snapshot at `path`; a missing or empty file starts an empty store.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| backend("create", parent, e))?;
		}

		let entries = match fs::read(&path) {
			Ok(bytes) if bytes.is_empty() => Snapshot::new(),
			Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("{} is not a session snapshot: {e}", path.display()),
			})?,
			Err(e) if e.kind() == ErrorKind::NotFound => Snapshot::new(),
			Err(e) => return Err(backend("read", &path, e)),
		};

		Ok(Self { path, entries: Arc::new(RwLock::new(entries)) })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn persist(&self, entries: &Snapshot) -> Result<(), StoreError> {
		let tmp = self.path.with_extension("tmp");
		let file = fs::File::create(&tmp).map_err(|e| backend("create", &tmp, e))?;
		let mut writer = BufWriter::new(file);

		serde_json::to_writer_pretty(&mut writer, entries)
			.map_err(|e| StoreError::Serialization { message: e.to_string() })?;

		let file = writer.into_inner().map_err(|e| backend("flush", &tmp, e.into_error()))?;

		file.sync_all().map_err(|e| backend("sync", &tmp, e))?;
		fs::rename(&tmp, &self.path).map_err(|e| backend("replace", &self.path, e))
	}
}
impl SessionStore for FileStore {
	fn get<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, StoreValue> {
		Box::pin(async move {
			self.entries
				.read()
				.get(key)
				.cloned()
				.ok_or_else(|| StoreError::KeyNotFound { key: key.to_string() })
		})
	}

	fn set(&self, key: StoreKey, value: StoreValue) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut entries = self.entries.write();

			entries.insert(key, value);

			self.persist(&entries)
		})
	}
}

fn backend(action: &str, path: &Path, e: std::io::Error) -> StoreError {
	StoreError::Backend { message: format!("failed to {action} {}: {e}", path.display()) }
}
