//! Signed session cookies binding a browser to its consumer session.
//!
//! The cookie value is `<load>|<timestamp>|<signature>`, where the signature is an
//! HMAC-SHA256 over load and timestamp keyed by the consumer seed, encoded as unpadded
//! URL-safe base64.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use cookie::{Cookie, SameSite};
use hmac::{Hmac, Mac};
use sha2::Sha256;
// self
use crate::_prelude::*;

type HmacSha256 = Hmac<Sha256>;

const SEPARATOR: char = '|';

/// Failures raised while verifying a session cookie.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CookieError {
	/// Cookie value does not have the `load|timestamp|signature` shape.
	#[error("Cookie `{name}` is malformed.")]
	Malformed {
		/// Cookie name.
		name: String,
	},
	/// Signature does not match the seed.
	#[error("Cookie `{name}` carries an invalid signature.")]
	BadSignature {
		/// Cookie name.
		name: String,
	},
	/// The signing key was rejected by the MAC.
	#[error("Cookie signing key is invalid.")]
	InvalidKey,
}

/// Verified cookie payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookiePayload {
	/// Signed load (the session id).
	pub load: String,
	/// Unix timestamp recorded when the cookie was issued.
	pub timestamp: i64,
}

/// Builds a `Set-Cookie` value carrying `load` signed with `seed`.
pub fn make_cookie(
	name: &str,
	load: &str,
	seed: &str,
	max_age: Option<Duration>,
) -> Result<String, CookieError> {
	let timestamp = OffsetDateTime::now_utc().unix_timestamp().to_string();
	let signature = sign(seed, load, &timestamp)?;
	let mut builder = Cookie::build((name.to_owned(), format!("{load}|{timestamp}|{signature}")))
		.path("/")
		.http_only(true)
		.same_site(SameSite::Lax);

	if let Some(max_age) = max_age {
		builder = builder.max_age(max_age);
	}

	Ok(builder.build().to_string())
}

/// Returns the `|`-separated parts of cookie `name` from a `Cookie` header, unverified.
pub fn cookie_parts(name: &str, header: &str) -> Option<Vec<String>> {
	Cookie::split_parse(header)
		.filter_map(Result::ok)
		.find(|cookie| cookie.name() == name)
		.map(|cookie| cookie.value().split(SEPARATOR).map(str::to_owned).collect())
}

/// Verifies cookie `name` from a `Cookie` header against `seed`.
///
/// Returns `Ok(None)` when the header does not carry the cookie.
pub fn parse_cookie(
	name: &str,
	seed: &str,
	header: &str,
) -> Result<Option<CookiePayload>, CookieError> {
	let Some(parts) = cookie_parts(name, header) else {
		return Ok(None);
	};
	let malformed = || CookieError::Malformed { name: name.to_owned() };
	let [load, timestamp, signature] = parts.as_slice() else {
		return Err(malformed());
	};
	let raw_signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| malformed())?;
	let mut mac = HmacSha256::new_from_slice(seed.as_bytes()).map_err(|_| CookieError::InvalidKey)?;

	mac.update(load.as_bytes());
	mac.update(timestamp.as_bytes());
	mac.verify_slice(&raw_signature)
		.map_err(|_| CookieError::BadSignature { name: name.to_owned() })?;

	let timestamp = timestamp.parse().map_err(|_| malformed())?;

	Ok(Some(CookiePayload { load: load.clone(), timestamp }))
}

fn sign(seed: &str, load: &str, timestamp: &str) -> Result<String, CookieError> {
	let mut mac = HmacSha256::new_from_slice(seed.as_bytes()).map_err(|_| CookieError::InvalidKey)?;

	mac.update(load.as_bytes());
	mac.update(timestamp.as_bytes());

	Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}
