//! Space-delimited scope values as carried by the `scope` parameter.

// std
use std::collections::BTreeSet;
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError};
// self
use crate::_prelude::*;

/// Scope value that cannot be represented on the wire.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ScopeValidationError {
	/// The value consists only of whitespace.
	#[error("Scope value is blank.")]
	Blank,
	/// A single scope token contains whitespace.
	#[error("Scope token `{token}` contains whitespace.")]
	ContainsWhitespace {
		/// Offending token.
		token: String,
	},
}

/// Deduplicated, ordered scope tokens.
///
/// Providers may echo scopes in any order, so equality ignores ordering. Serializes as the
/// space-delimited string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScopeSet(BTreeSet<String>);
impl ScopeSet {
	/// Builds a set from individual tokens.
	pub fn new<I, S>(tokens: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		tokens
			.into_iter()
			.map(Into::into)
			.map(|token: String| {
				if token.is_empty() || token.chars().any(char::is_whitespace) {
					Err(ScopeValidationError::ContainsWhitespace { token })
				} else {
					Ok(token)
				}
			})
			.collect::<Result<_, _>>()
			.map(Self)
	}

	/// Returns `true` if `token` was granted or requested.
	pub fn contains(&self, token: &str) -> bool {
		self.0.contains(token)
	}

	/// Number of distinct tokens.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` if there are no tokens.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Tokens in sorted order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		for (i, token) in self.iter().enumerate() {
			if i > 0 {
				f.write_str(" ")?;
			}

			f.write_str(token)?;
		}

		Ok(())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if !s.is_empty() && s.trim().is_empty() {
			return Err(ScopeValidationError::Blank);
		}

		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.collect_str(self)
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		String::deserialize(deserializer)?.parse().map_err(DeError::custom)
	}
}
