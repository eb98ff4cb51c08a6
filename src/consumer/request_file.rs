//! Request-object files referenced through `request_uri`.

// std
use std::{
	fs::{self, OpenOptions},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{_prelude::*, consumer::session, error::ConfigError};

const FILE_NAME_LEN: usize = 10;
const MAX_ATTEMPTS: usize = 8;

/// Writes `payload` to a freshly named file under `dir` and returns its path.
///
/// Names are random; a name that already exists is retried with a new one. The create is
/// exclusive, so two writers never share a file.
pub(crate) fn write_request_file(dir: &Path, payload: &str) -> Result<PathBuf> {
	write_with_names(dir, payload, || session::rndstr(FILE_NAME_LEN))
}

fn write_with_names(
	dir: &Path,
	payload: &str,
	mut next_name: impl FnMut() -> String,
) -> Result<PathBuf> {
	for _ in 0..MAX_ATTEMPTS {
		let path = dir.join(next_name());
		let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
			Ok(file) => file,
			Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
			Err(source) =>
				return Err(ConfigError::RequestFile { path: path.display().to_string(), source }.into()),
		};

		fill_or_discard(&path, file, payload)?;

		return Ok(path);
	}

	Err(Error::ResourceExhausted {
		reason: format!(
			"no unused request file name under {} after {MAX_ATTEMPTS} attempts",
			dir.display()
		),
	})
}

/// Writes `payload` through `file`; a partial file at `path` is removed on failure.
fn fill_or_discard(path: &Path, mut file: impl Write, payload: &str) -> Result<()> {
	file.write_all(payload.as_bytes()).and_then(|()| file.flush()).map_err(|source| {
		fs::remove_file(path).ok();

		ConfigError::RequestFile { path: path.display().to_string(), source }.into()
	})
}

/// Renders `path` as the `/`-prefixed file name recorded on the session.
pub(crate) fn request_filename(path: &Path) -> String {
	format!("/{}", path.to_string_lossy().trim_start_matches('/'))
}
