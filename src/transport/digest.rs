//! HTTP Digest authentication node (RFC 7616).
//!
//! Requests first go out without credentials. A `401` carrying a `WWW-Authenticate: Digest`
//! challenge is answered once by replaying the request with an `Authorization` header; any
//! other response passes through untouched.

// crates.io
use md5::Md5;
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	error::TransportError,
	transport::{HttpRequest, HttpTransport, TransportFuture, clone_request},
};

const NONCE_COUNT: &str = "00000001";

/// Hash algorithms accepted in a digest challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestAlgorithm {
	/// `MD5`, the default when the challenge names none.
	Md5,
	/// `MD5-sess`.
	Md5Sess,
	/// `SHA-256`.
	Sha256,
	/// `SHA-256-sess`.
	Sha256Sess,
}
impl DigestAlgorithm {
	/// Parses the `algorithm` challenge parameter (case-insensitive).
	pub fn parse(value: &str) -> Option<Self> {
		match value.to_ascii_uppercase().as_str() {
			"MD5" => Some(Self::Md5),
			"MD5-SESS" => Some(Self::Md5Sess),
			"SHA-256" => Some(Self::Sha256),
			"SHA-256-SESS" => Some(Self::Sha256Sess),
			_ => None,
		}
	}

	/// Canonical token echoed in the `Authorization` header.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Md5 => "MD5",
			Self::Md5Sess => "MD5-sess",
			Self::Sha256 => "SHA-256",
			Self::Sha256Sess => "SHA-256-sess",
		}
	}

	fn is_session(self) -> bool {
		matches!(self, Self::Md5Sess | Self::Sha256Sess)
	}

	fn hash(self, data: &str) -> String {
		match self {
			Self::Md5 | Self::Md5Sess => hex(&Md5::digest(data.as_bytes())),
			Self::Sha256 | Self::Sha256Sess => hex(&Sha256::digest(data.as_bytes())),
		}
	}
}

/// Parsed `WWW-Authenticate: Digest` challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestChallenge {
	/// Protection space.
	pub realm: String,
	/// Server nonce.
	pub nonce: String,
	/// Opaque value echoed back verbatim.
	pub opaque: Option<String>,
	/// Hash algorithm.
	pub algorithm: DigestAlgorithm,
	/// Whether the server offered `qop=auth`; `false` selects the legacy RFC 2069 response.
	pub qop_auth: bool,
}
impl DigestChallenge {
	/// Parses a header value, returning `Ok(None)` for non-digest schemes.
	pub fn parse(header: &str) -> Result<Option<Self>, TransportError> {
		let header = header.trim_start();
		let Some((scheme, params)) = header.split_once(char::is_whitespace) else {
			return Ok(None);
		};

		if !scheme.eq_ignore_ascii_case("digest") {
			return Ok(None);
		}

		let params = parse_params(params);
		let param = |name: &str| {
			params.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, v)| v.clone())
		};
		let nonce = param("nonce").ok_or_else(|| challenge_error("nonce is missing"))?;
		let algorithm = match param("algorithm") {
			Some(value) => DigestAlgorithm::parse(&value)
				.ok_or_else(|| challenge_error(format!("algorithm `{value}` is not supported")))?,
			None => DigestAlgorithm::Md5,
		};
		let qop_auth = match param("qop") {
			Some(qop) => {
				if !qop.split(',').any(|token| token.trim().eq_ignore_ascii_case("auth")) {
					return Err(challenge_error(format!("qop `{qop}` is not supported")));
				}

				true
			},
			None => false,
		};

		Ok(Some(Self {
			realm: param("realm").unwrap_or_default(),
			nonce,
			opaque: param("opaque"),
			algorithm,
			qop_auth,
		}))
	}

	/// Builds the `Authorization` header value answering this challenge.
	pub fn authorize(
		&self,
		method: &str,
		uri: &str,
		username: &str,
		password: &str,
		cnonce: &str,
	) -> String {
		let algorithm = self.algorithm;
		let mut ha1 = algorithm.hash(&format!("{username}:{}:{password}", self.realm));

		if algorithm.is_session() {
			ha1 = algorithm.hash(&format!("{ha1}:{}:{cnonce}", self.nonce));
		}

		let ha2 = algorithm.hash(&format!("{method}:{uri}"));
		let response = if self.qop_auth {
			algorithm.hash(&format!("{ha1}:{}:{NONCE_COUNT}:{cnonce}:auth:{ha2}", self.nonce))
		} else {
			algorithm.hash(&format!("{ha1}:{}:{ha2}", self.nonce))
		};
		let mut header = format!(
			"Digest username=\"{username}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", algorithm={}, response=\"{response}\"",
			self.realm,
			self.nonce,
			algorithm.as_str(),
		);

		if let Some(opaque) = &self.opaque {
			header.push_str(&format!(", opaque=\"{opaque}\""));
		}
		if self.qop_auth {
			header.push_str(&format!(", qop=auth, nc={NONCE_COUNT}, cnonce=\"{cnonce}\""));
		}

		header
	}
}

/// Answers digest challenges with an API key pair.
#[derive(Clone)]
pub struct DigestTransport<T> {
	inner: T,
	username: String,
	password: String,
}
impl<T> DigestTransport<T> {
	/// Wraps `inner`, authenticating as `username` (public key) with `password` (private key).
	pub fn new(inner: T, username: impl Into<String>, password: impl Into<String>) -> Self {
		Self { inner, username: username.into(), password: password.into() }
	}
}
impl<T> Debug for DigestTransport<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DigestTransport").field("username", &self.username).finish_non_exhaustive()
	}
}
impl<T> HttpTransport for DigestTransport<T>
where
	T: HttpTransport,
{
	fn round_trip(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let mut replay = clone_request(&request);
			let response = self.inner.round_trip(request).await?;

			if response.status() != http::StatusCode::UNAUTHORIZED {
				return Ok(response);
			}

			let mut challenge = None;
			let mut rejected = None;

			for value in response.headers().get_all(http::header::WWW_AUTHENTICATE) {
				let Ok(value) = value.to_str() else { continue };

				match DigestChallenge::parse(value) {
					Ok(Some(parsed)) => {
						challenge = Some(parsed);

						break;
					},
					Ok(None) => {},
					Err(e) => {
						tracing::debug!(error = %e, "Skipping unusable digest challenge.");

						if rejected.is_none() {
							rejected = Some(e);
						}
					},
				}
			}

			let Some(challenge) = challenge else {
				// Digest was offered, but no challenge can be answered.
				return match rejected {
					Some(e) => Err(e),
					None => Ok(response),
				};
			};
			let uri = replay
				.uri()
				.path_and_query()
				.map(|path| path.as_str().to_owned())
				.unwrap_or_else(|| "/".into());
			let cnonce = format!("{:016x}", rand::random::<u64>());
			let authorization = challenge.authorize(
				replay.method().as_str(),
				&uri,
				&self.username,
				&self.password,
				&cnonce,
			);

			replay.headers_mut().insert(
				http::header::AUTHORIZATION,
				http::HeaderValue::from_str(&authorization).map_err(TransportError::request)?,
			);

			self.inner.round_trip(replay).await
		})
	}
}

fn challenge_error(reason: impl Into<String>) -> TransportError {
	TransportError::DigestChallenge { reason: reason.into() }
}

fn hex(bytes: &[u8]) -> String {
	bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Splits `key=value, key="quoted, value"` pairs.
fn parse_params(input: &str) -> Vec<(String, String)> {
	let mut params = Vec::new();
	let mut rest = input.trim();

	while !rest.is_empty() {
		let Some((key, after)) = rest.split_once('=') else { break };
		let key = key.trim().trim_start_matches(',').trim().to_owned();
		let after = after.trim_start();
		let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
			let mut value = String::new();
			let mut chars = quoted.char_indices();
			let mut end = quoted.len();

			while let Some((i, c)) = chars.next() {
				match c {
					'\\' =>
						if let Some((_, escaped)) = chars.next() {
							value.push(escaped);
						},
					'"' => {
						end = i + 1;

						break;
					},
					c => value.push(c),
				}
			}

			(value, &quoted[end..])
		} else {
			let end = after.find(',').unwrap_or(after.len());

			(after[..end].trim().to_owned(), &after[end..])
		};

		params.push((key, value));

		rest = remaining.trim_start().trim_start_matches(',').trim_start();
	}

	params
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{ScriptedTransport, get, response};

	const RFC_CHALLENGE: &str = "Digest realm=\"testrealm@host.com\", qop=\"auth,auth-int\", nonce=\"dcd98b7102dd2f0e8b11d0f600bfb0c093\", opaque=\"5ccc069c403ebaf9f0171e9517f40e41\"";

	fn challenge_response(header: &str) -> crate::transport::HttpResponse {
		let mut response = response(401);

		response.headers_mut().append(
			http::header::WWW_AUTHENTICATE,
			http::HeaderValue::from_str(header).expect("Challenge should be a valid header."),
		);

		response
	}

	#[test]
	fn parses_quoted_parameters() {
		let challenge = DigestChallenge::parse(RFC_CHALLENGE)
			.expect("Challenge should parse.")
			.expect("Challenge should use the digest scheme.");

		assert_eq!(challenge.realm, "testrealm@host.com");
		assert_eq!(challenge.nonce, "dcd98b7102dd2f0e8b11d0f600bfb0c093");
		assert_eq!(challenge.opaque.as_deref(), Some("5ccc069c403ebaf9f0171e9517f40e41"));
		assert_eq!(challenge.algorithm, DigestAlgorithm::Md5);
		assert!(challenge.qop_auth);
	}

	#[test]
	fn answers_rfc_2617_vector() {
		let challenge = DigestChallenge::parse(RFC_CHALLENGE)
			.expect("Challenge should parse.")
			.expect("Challenge should use the digest scheme.");
		let header =
			challenge.authorize("GET", "/dir/index.html", "Mufasa", "Circle Of Life", "0a4f113b");

		assert!(header.starts_with("Digest username=\"Mufasa\""));
		assert!(header.contains("response=\"6629fae49393a05397450978507c4ef1\""));
		assert!(header.contains("qop=auth, nc=00000001, cnonce=\"0a4f113b\""));
		assert!(header.contains("opaque=\"5ccc069c403ebaf9f0171e9517f40e41\""));
	}

	#[test]
	fn rejects_unsupported_algorithms_and_ignores_other_schemes() {
		let err = DigestChallenge::parse("Digest realm=\"r\", nonce=\"n\", algorithm=SHA-512-256")
			.expect_err("SHA-512-256 is unsupported.");

		assert!(matches!(err, TransportError::DigestChallenge { .. }));
		assert_eq!(DigestChallenge::parse("Basic realm=\"r\"").expect("Basic is skipped."), None);

		let sha = DigestChallenge::parse("digest realm=\"r\", nonce=\"n\", algorithm=sha-256-sess")
			.expect("Challenge should parse.")
			.expect("Scheme match is case-insensitive.");

		assert_eq!(sha.algorithm, DigestAlgorithm::Sha256Sess);
		assert!(!sha.qop_auth);
	}

	#[test]
	fn legacy_challenges_omit_qop_fields() {
		let challenge = DigestChallenge::parse("Digest realm=\"r\", nonce=\"n\"")
			.expect("Challenge should parse.")
			.expect("Challenge should use the digest scheme.");
		let header = challenge.authorize("GET", "/", "u", "p", "c");

		assert!(!header.contains("qop="));
		assert!(!header.contains("cnonce="));
	}

	#[tokio::test]
	async fn replays_once_with_authorization() {
		let scripted = Arc::new(ScriptedTransport::new([
			Ok(challenge_response(RFC_CHALLENGE)),
			Ok(response(200)),
		]));
		let node = DigestTransport::new(Arc::clone(&scripted), "Mufasa", "Circle Of Life");
		let response = node
			.round_trip(get("https://host.com/dir/index.html?x=1"))
			.await
			.expect("Handshake should succeed.");
		let requests = scripted.requests();

		assert_eq!(response.status(), 200);
		assert_eq!(requests.len(), 2);
		assert!(requests[0].headers().get(http::header::AUTHORIZATION).is_none());

		let authorization = requests[1].headers()[http::header::AUTHORIZATION]
			.to_str()
			.expect("Authorization should be ASCII.");

		assert!(authorization.contains("uri=\"/dir/index.html?x=1\""));
	}

	#[tokio::test]
	async fn answers_the_first_supported_challenge() {
		let mut offered = challenge_response("Digest realm=\"r\", nonce=\"n1\", algorithm=SHA-512-256");

		offered.headers_mut().append(
			http::header::WWW_AUTHENTICATE,
			http::HeaderValue::from_static("Digest realm=\"r\", nonce=\"n2\", algorithm=MD5, qop=\"auth\""),
		);

		let scripted = Arc::new(ScriptedTransport::new([Ok(offered), Ok(response(200))]));
		let node = DigestTransport::new(Arc::clone(&scripted), "u", "p");
		let response =
			node.round_trip(get("https://host.com/")).await.expect("MD5 challenge is answerable.");
		let requests = scripted.requests();

		assert_eq!(response.status(), 200);
		assert_eq!(requests.len(), 2);

		let authorization = requests[1].headers()[http::header::AUTHORIZATION]
			.to_str()
			.expect("Authorization should be ASCII.");

		assert!(authorization.contains("nonce=\"n2\""));
		assert!(authorization.contains("algorithm=MD5"));
	}

	#[tokio::test]
	async fn fails_when_no_digest_challenge_is_usable() {
		let scripted = Arc::new(ScriptedTransport::new([Ok(challenge_response(
			"Digest realm=\"r\", nonce=\"n\", algorithm=SHA-512-256",
		))]));
		let node = DigestTransport::new(Arc::clone(&scripted), "u", "p");
		let err = node.round_trip(get("https://host.com/")).await.expect_err("No usable challenge.");

		assert!(matches!(err, TransportError::DigestChallenge { .. }));
		assert_eq!(scripted.attempts(), 1);
	}

	#[tokio::test]
	async fn passes_through_non_challenges() {
		let scripted = Arc::new(ScriptedTransport::new([Ok(response(401)), Ok(response(200))]));
		let node = DigestTransport::new(Arc::clone(&scripted), "u", "p");
		let response = node.round_trip(get("https://host.com/")).await.expect("401 passes through.");

		assert_eq!(response.status(), 401);
		assert_eq!(scripted.attempts(), 1);
	}
}
