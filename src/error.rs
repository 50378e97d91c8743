//! Error taxonomy shared by credential resolution, secret retrieval, and the transport chain.

// std
use std::io::ErrorKind;
// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Secret store bootstrap failure, propagated verbatim.
	#[error(transparent)]
	Secret(#[from] SecretError),
	/// Service account token could not be obtained.
	#[error(transparent)]
	Token(#[from] TokenError),
	/// Transport failure after the chain gave up.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The API answered with a non-success status.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Composite identifier could not be decoded.
	#[error(transparent)]
	StateId(#[from] crate::state_id::StateIdError),
}

/// Configuration and validation failures raised while assembling a client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Credentials for the selected method are incomplete.
	#[error("{message}.")]
	IncompleteCredentials {
		/// Human-readable message naming the missing field.
		message: String,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] http::Error),
	/// A configured URL cannot be parsed.
	#[error("The {field} URL is invalid.")]
	InvalidUrl {
		/// Configuration field holding the URL.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The Realm admin API authenticates with the API key pair only.
	#[error("Set `public_key` and `private_key` in order to use the Realm admin API.")]
	RealmRequiresApiKey,
	/// A `{name}` placeholder in an API path has no matching parameter.
	#[error("Path parameter `{name}` is missing.")]
	MissingPathParam {
		/// Placeholder name.
		name: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures while retrieving API keys from AWS Secrets Manager.
#[derive(Debug, ThisError)]
pub enum SecretError {
	/// The static AWS access key pair is missing.
	#[error("AWS session requires both an access key ID and a secret access key.")]
	StaticCredentials,
	/// Assuming the configured role failed.
	#[error("Assuming role `{role_arn}` failed.")]
	AssumeRole {
		/// Role that could not be assumed.
		role_arn: String,
		/// Upstream STS failure.
		#[source]
		source: BoxError,
	},
	/// Reading the secret failed.
	#[error("Reading secret `{secret_name}` failed.")]
	Fetch {
		/// Secret that could not be read.
		secret_name: String,
		/// Upstream Secrets Manager failure.
		#[source]
		source: BoxError,
	},
	/// The secret has no string payload.
	#[error("Secret `{secret_name}` has no string value.")]
	EmptySecret {
		/// Secret that was read.
		secret_name: String,
	},
	/// The secret payload is not the expected JSON object.
	#[error("Secret payload is not valid JSON.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The secret payload lacks one of the API key halves.
	#[error("Secret is missing a value for `{field}`.")]
	MissingField {
		/// JSON key that was empty or absent.
		field: &'static str,
	},
}
impl SecretError {
	/// Wraps an STS failure for `role_arn`.
	pub fn assume_role(
		role_arn: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::AssumeRole { role_arn: role_arn.into(), source: Box::new(src) }
	}

	/// Wraps a Secrets Manager failure for `secret_name`.
	pub fn fetch(
		secret_name: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Fetch { secret_name: secret_name.into(), source: Box::new(src) }
	}
}

/// Failures while acquiring service account tokens.
#[derive(Debug, ThisError)]
pub enum TokenError {
	/// A token or revocation endpoint URL is invalid.
	#[error("Token endpoint URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The client credentials exchange failed.
	#[error("Token request failed: {message}.")]
	Exchange {
		/// Provider- or transport-supplied message.
		message: String,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Revoking the cached token failed.
	#[error("Token revocation failed: {message}.")]
	Revoke {
		/// Provider- or transport-supplied message.
		message: String,
	},
}

/// Heuristic classification of a network-level failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
	/// The attempt timed out.
	Timeout,
	/// Nothing listens on the remote port.
	ConnectionRefused,
	/// The peer reset or aborted the connection.
	ConnectionReset,
	/// The connection closed before a full response arrived.
	ConnectionClosed,
	/// Host name resolution failed.
	Dns,
	/// TLS handshake or certificate verification failed.
	Tls,
	/// Anything else.
	Other,
}
impl NetworkErrorKind {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Timeout => "timeout",
			Self::ConnectionRefused => "connection_refused",
			Self::ConnectionReset => "connection_reset",
			Self::ConnectionClosed => "connection_closed",
			Self::Dns => "dns",
			Self::Tls => "tls",
			Self::Other => "network",
		}
	}

	/// Whether another attempt may succeed.
	pub const fn is_retryable(self) -> bool {
		matches!(self, Self::Timeout | Self::ConnectionReset | Self::ConnectionClosed)
	}

	/// Classifies an error by structured type first, then by its message chain.
	pub fn classify(err: &(dyn std::error::Error + 'static)) -> Self {
		if let Some(err) = err.downcast_ref::<ReqwestError>()
			&& err.is_timeout()
		{
			return Self::Timeout;
		}

		let mut current = Some(err);

		while let Some(err) = current {
			if let Some(io) = err.downcast_ref::<std::io::Error>()
				&& let Some(kind) = Self::from_io_kind(io.kind())
			{
				return kind;
			}

			current = err.source();
		}

		Self::from_message(&chain_text(err))
	}

	fn from_io_kind(kind: ErrorKind) -> Option<Self> {
		match kind {
			ErrorKind::TimedOut => Some(Self::Timeout),
			ErrorKind::ConnectionRefused => Some(Self::ConnectionRefused),
			ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe =>
				Some(Self::ConnectionReset),
			ErrorKind::UnexpectedEof | ErrorKind::NotConnected => Some(Self::ConnectionClosed),
			_ => None,
		}
	}

	fn from_message(text: &str) -> Self {
		const PATTERNS: &[(&str, NetworkErrorKind)] = &[
			("certificate", NetworkErrorKind::Tls),
			("tls", NetworkErrorKind::Tls),
			("ssl", NetworkErrorKind::Tls),
			("no such host", NetworkErrorKind::Dns),
			("dns error", NetworkErrorKind::Dns),
			("failed to lookup address", NetworkErrorKind::Dns),
			("connection refused", NetworkErrorKind::ConnectionRefused),
			("connection reset", NetworkErrorKind::ConnectionReset),
			("broken pipe", NetworkErrorKind::ConnectionReset),
			("connection closed", NetworkErrorKind::ConnectionClosed),
			("unexpected eof", NetworkErrorKind::ConnectionClosed),
			("incomplete message", NetworkErrorKind::ConnectionClosed),
			("timed out", NetworkErrorKind::Timeout),
			("timeout", NetworkErrorKind::Timeout),
		];

		PATTERNS
			.iter()
			.find(|(needle, _)| text.contains(needle))
			.map(|(_, kind)| *kind)
			.unwrap_or(Self::Other)
	}
}
impl Display for NetworkErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Failures surfaced by transport nodes.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Network-level failure (DNS, TCP, TLS, timeouts).
	#[error("Network error ({kind}): {source}.")]
	Network {
		/// Heuristic classification used for retries and logging.
		kind: NetworkErrorKind,
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// The caller's deadline elapsed before the exchange finished.
	#[error("Request deadline exceeded.")]
	DeadlineExceeded,
	/// The request could not be converted for the underlying HTTP client.
	#[error("Request could not be constructed.")]
	Request {
		/// Underlying builder failure.
		#[source]
		source: BoxError,
	},
	/// A digest challenge could not be answered.
	#[error("Digest challenge could not be answered: {reason}.")]
	DigestChallenge {
		/// What was wrong with the challenge.
		reason: String,
	},
	/// Bearer token could not be obtained.
	#[error(transparent)]
	Token(#[from] TokenError),
}
impl TransportError {
	/// Wraps and classifies a network failure.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		let kind = NetworkErrorKind::classify(&src);

		Self::Network { kind, source: Box::new(src) }
	}

	/// Wraps a request construction failure.
	pub fn request(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Request { source: Box::new(src) }
	}

	/// Network classification, when this is a network failure.
	pub fn network_kind(&self) -> Option<NetworkErrorKind> {
		match self {
			Self::Network { kind, .. } => Some(*kind),
			_ => None,
		}
	}

	/// Whether the retry node may attempt the request again.
	pub fn is_retryable(&self) -> bool {
		self.network_kind().is_some_and(NetworkErrorKind::is_retryable)
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_builder() {
			Self::request(e)
		} else {
			Self::network(e)
		}
	}
}

/// Non-success response returned by the API.
#[derive(Debug, ThisError)]
#[error("{method} {path}: HTTP {status}{}{}", code_suffix(.error_code), detail_suffix(.detail))]
pub struct ApiError {
	/// HTTP status code.
	pub status: u16,
	/// HTTP method of the failed call.
	pub method: String,
	/// Resolved request path.
	pub path: String,
	/// Atlas error code, when the body could be decoded.
	pub error_code: Option<String>,
	/// Atlas error detail, when the body could be decoded.
	pub detail: Option<String>,
	/// Raw response body.
	pub body: Vec<u8>,
}

fn code_suffix(code: &Option<String>) -> String {
	code.as_deref().map(|code| format!(" (Error code: \"{code}\")")).unwrap_or_default()
}

fn detail_suffix(detail: &Option<String>) -> String {
	detail.as_deref().map(|detail| format!(" Detail: {detail}")).unwrap_or_default()
}

/// Lower-cased concatenation of an error and all of its sources.
pub(crate) fn chain_text(err: &(dyn std::error::Error + 'static)) -> String {
	let mut text = err.to_string();
	let mut current = err.source();

	while let Some(err) = current {
		text.push_str(": ");
		text.push_str(&err.to_string());

		current = err.source();
	}

	text.to_lowercase()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug)]
	struct Opaque(&'static str);
	impl Display for Opaque {
		fn fmt(&self, f: &mut Formatter) -> FmtResult {
			f.write_str(self.0)
		}
	}
	impl std::error::Error for Opaque {}

	#[test]
	fn io_kinds_classify_structurally() {
		let reset = std::io::Error::new(ErrorKind::ConnectionReset, "reset");
		let refused = std::io::Error::new(ErrorKind::ConnectionRefused, "refused");
		let eof = std::io::Error::new(ErrorKind::UnexpectedEof, "eof");

		assert_eq!(NetworkErrorKind::classify(&reset), NetworkErrorKind::ConnectionReset);
		assert_eq!(NetworkErrorKind::classify(&refused), NetworkErrorKind::ConnectionRefused);
		assert_eq!(NetworkErrorKind::classify(&eof), NetworkErrorKind::ConnectionClosed);
	}

	#[test]
	fn opaque_errors_fall_back_to_message_heuristics() {
		let cases = [
			("dial tcp: lookup api.example: no such host", NetworkErrorKind::Dns),
			("x509: certificate signed by unknown authority", NetworkErrorKind::Tls),
			("read tcp: connection reset by peer", NetworkErrorKind::ConnectionReset),
			("operation timed out", NetworkErrorKind::Timeout),
			("something odd", NetworkErrorKind::Other),
		];

		for (message, expected) in cases {
			assert_eq!(NetworkErrorKind::classify(&Opaque(message)), expected, "{message}");
		}
	}

	#[test]
	fn only_transient_network_errors_are_retryable() {
		let reset = TransportError::network(std::io::Error::new(ErrorKind::ConnectionReset, "x"));
		let refused = TransportError::network(std::io::Error::new(ErrorKind::ConnectionRefused, "x"));

		assert!(reset.is_retryable());
		assert!(!refused.is_retryable());
		assert!(!TransportError::DeadlineExceeded.is_retryable());
		assert!(!TransportError::DigestChallenge { reason: "x".into() }.is_retryable());
	}

	#[test]
	fn api_error_message_includes_code_and_detail() {
		let err = ApiError {
			status: 404,
			method: "GET".into(),
			path: "/api/atlas/v2/groups/x".into(),
			error_code: Some("GROUP_NOT_FOUND".into()),
			detail: Some("No group with ID x exists.".into()),
			body: Vec::new(),
		};

		assert_eq!(
			err.to_string(),
			"GET /api/atlas/v2/groups/x: HTTP 404 (Error code: \"GROUP_NOT_FOUND\") Detail: No group with ID x exists."
		);
	}
}
