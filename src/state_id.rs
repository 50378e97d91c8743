//! Opaque composite identifiers built from string maps.
//!
//! Each pair renders as `base64(key):base64(value)` and pairs are joined with `-`. Neither
//! separator belongs to the standard base64 alphabet, so tokens split unambiguously. Pairs are
//! emitted in key order, making the token independent of the caller's insertion order.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
// self
use crate::_prelude::*;

/// Failures while decoding a composite identifier.
#[derive(Debug, ThisError)]
pub enum StateIdError {
	/// A segment is not a `key:value` pair.
	#[error("State ID segment `{segment}` is not a key:value pair.")]
	MalformedSegment {
		/// Offending segment.
		segment: String,
	},
	/// A key or value is not valid base64.
	#[error("State ID segment `{segment}` is not valid base64.")]
	Base64 {
		/// Offending segment.
		segment: String,
		/// Underlying decoding failure.
		#[source]
		source: base64::DecodeError,
	},
	/// A decoded key or value is not UTF-8.
	#[error("State ID segment `{segment}` is not valid UTF-8.")]
	Utf8 {
		/// Offending segment.
		segment: String,
		/// Underlying conversion failure.
		#[source]
		source: std::string::FromUtf8Error,
	},
}

/// Encodes `values` into an opaque identifier.
pub fn encode_state_id<K, V>(values: impl IntoIterator<Item = (K, V)>) -> String
where
	K: AsRef<str>,
	V: AsRef<str>,
{
	let sorted = values
		.into_iter()
		.map(|(key, value)| (key.as_ref().to_owned(), value.as_ref().to_owned()))
		.collect::<BTreeMap<_, _>>();

	sorted
		.iter()
		.map(|(key, value)| format!("{}:{}", STANDARD.encode(key), STANDARD.encode(value)))
		.collect::<Vec<_>>()
		.join("-")
}

/// Decodes an identifier produced by [`encode_state_id`].
///
/// An empty identifier decodes to an empty map.
pub fn decode_state_id(state_id: &str) -> Result<BTreeMap<String, String>, StateIdError> {
	if state_id.is_empty() {
		return Ok(BTreeMap::new());
	}

	state_id
		.split('-')
		.map(|segment| {
			let (key, value) = segment
				.split_once(':')
				.ok_or_else(|| StateIdError::MalformedSegment { segment: segment.into() })?;

			Ok((decode_part(key)?, decode_part(value)?))
		})
		.collect()
}

fn decode_part(part: &str) -> Result<String, StateIdError> {
	let bytes = STANDARD
		.decode(part)
		.map_err(|source| StateIdError::Base64 { segment: part.into(), source })?;

	String::from_utf8(bytes).map_err(|source| StateIdError::Utf8 { segment: part.into(), source })
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashMap;
	// self
	use super::*;

	#[test]
	fn insertion_order_does_not_change_the_token() {
		let forward = encode_state_id([("a", "1"), ("b", "2"), ("c", "3")]);
		let backward = encode_state_id([("c", "3"), ("b", "2"), ("a", "1")]);

		assert_eq!(forward, backward);
		assert_eq!(forward, "YQ==:MQ==-Yg==:Mg==-Yw==:Mw==");

		let decoded = decode_state_id(&backward).expect("Token should decode.");

		assert_eq!(decoded.get("a").map(String::as_str), Some("1"));
		assert_eq!(decoded.len(), 3);
	}

	#[test]
	fn values_may_contain_separators() {
		let mut values = HashMap::new();

		values.insert("project_id", "5f3a-b:c");
		values.insert("cluster_name", "");

		let decoded = decode_state_id(&encode_state_id(&values)).expect("Token should decode.");

		assert_eq!(decoded["project_id"], "5f3a-b:c");
		assert_eq!(decoded["cluster_name"], "");
	}

	#[test]
	fn malformed_tokens_are_rejected() {
		assert!(matches!(
			decode_state_id("YQ==MQ=="),
			Err(StateIdError::MalformedSegment { .. })
		));
		assert!(matches!(decode_state_id("!!:MQ=="), Err(StateIdError::Base64 { .. })));
		assert!(decode_state_id("").expect("Empty token should decode.").is_empty());
	}
}
