//! Form and JSON payload decoding shared by the standard message layer.

// crates.io
use serde::{
	Deserializer,
	de::{DeserializeOwned, Error as DeError},
};
use serde_json::{Map, Value};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	message::{MessageError, MessageFormat, Parsed},
};

/// Splits a raw payload into a JSON object.
///
/// URL-encoded payloads become string-valued objects; the first occurrence of a repeated
/// parameter wins. A leading `?` is ignored.
pub(crate) fn payload_object(
	raw: &str,
	format: MessageFormat,
) -> Result<Map<String, Value>, MessageError> {
	match format {
		MessageFormat::UrlEncoded => {
			let mut object = Map::new();

			for (name, value) in form_urlencoded::parse(raw.trim_start_matches('?').as_bytes()) {
				object.entry(name.into_owned()).or_insert_with(|| Value::String(value.into_owned()));
			}

			Ok(object)
		},
		MessageFormat::Json => match serde_json::from_str::<Value>(raw)? {
			Value::Object(object) => Ok(object),
			_ => Err(MessageError::NotAnObject),
		},
	}
}

/// Decodes an object into `T`, or into an [`ErrorShape`] when it carries an `error` field.
pub(crate) fn decode<T>(object: Map<String, Value>) -> Result<Parsed<T>, MessageError>
where
	T: DeserializeOwned,
{
	if object.contains_key("error") {
		return Ok(Parsed::Error(decode_value(object)?));
	}

	Ok(Parsed::Message(decode_value(object)?))
}

fn decode_value<T>(object: Map<String, Value>) -> Result<T, MessageError>
where
	T: DeserializeOwned,
{
	Ok(serde_path_to_error::deserialize(Value::Object(object))?)
}

/// Decodes a JSON document body into `T`, naming the offending field on failure.
pub(crate) fn decode_json<T>(raw: &[u8]) -> Result<T, MessageError>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(raw);

	Ok(serde_path_to_error::deserialize(&mut deserializer)?)
}

/// Accepts integers encoded as JSON numbers or as decimal strings (form payloads).
pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	match Option::<Value>::deserialize(deserializer)? {
		None | Some(Value::Null) => Ok(None),
		Some(Value::Number(number)) =>
			number.as_i64().map(Some).ok_or_else(|| DeError::custom("expected an integer")),
		Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
		Some(Value::String(raw)) => raw.trim().parse().map(Some).map_err(DeError::custom),
		Some(other) => Err(DeError::custom(format!("expected an integer, found {other}"))),
	}
}
