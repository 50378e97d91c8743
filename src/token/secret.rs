//! Bearer token material handed from token sources to the bearer node.

// self
use crate::{_prelude::*, error::TransportError};

/// Access token issued by Atlas, or supplied up front by the operator.
///
/// Debug output never shows the value. The header built by [`TokenSecret::authorization`] is
/// flagged sensitive so HTTP client logging skips it too.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a token string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw token value, for revocation requests and tests.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// `Authorization: Bearer …` value marked sensitive.
	pub fn authorization(&self) -> Result<http::HeaderValue, TransportError> {
		let mut value = http::HeaderValue::try_from(format!("Bearer {}", self.0))
			.map_err(TransportError::request)?;

		value.set_sensitive(true);

		Ok(value)
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "TokenSecret({} bytes)", self.0.len())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn debug_hides_the_value() {
		assert_eq!(format!("{:?}", TokenSecret::new("super-secret")), "TokenSecret(12 bytes)");
	}

	#[test]
	fn authorization_is_sensitive() {
		let value = TokenSecret::new("abc").authorization().expect("ASCII token.");

		assert_eq!(value, "Bearer abc");
		assert!(value.is_sensitive());
	}

	#[test]
	fn control_characters_are_rejected() {
		let err = TokenSecret::new("a\nb").authorization().expect_err("Newline is invalid.");

		assert!(matches!(err, TransportError::Request { .. }));
	}
}
