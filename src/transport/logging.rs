//! Network logging node.

// self
use crate::{
	_prelude::*,
	error::{NetworkErrorKind, TransportError},
	transport::{HttpRequest, HttpTransport, TransportFuture},
};

/// Human-readable class of an HTTP status code.
pub fn status_class(status: u16) -> &'static str {
	match status {
		200..=299 => "Success",
		300..=399 => "Redirection",
		400..=499 => "Client Error",
		500..=599 => "Server Error",
		_ => "Unknown",
	}
}

/// Operator-facing description of a transport failure.
pub fn failure_class(err: &TransportError) -> &'static str {
	match err {
		TransportError::DeadlineExceeded => "deadline exceeded",
		TransportError::Network { kind, .. } => match kind {
			NetworkErrorKind::Timeout => "timeout",
			NetworkErrorKind::ConnectionRefused => "connection refused",
			NetworkErrorKind::ConnectionReset => "connection reset",
			NetworkErrorKind::ConnectionClosed => "connection closed",
			NetworkErrorKind::Dns => "DNS resolution failure",
			NetworkErrorKind::Tls => "TLS/certificate error",
			NetworkErrorKind::Other => "network error",
		},
		TransportError::Request { .. } => "invalid request",
		TransportError::DigestChallenge { .. } => "digest challenge error",
		TransportError::Token(_) => "token acquisition error",
	}
}

/// Logs method, URL, start time, duration, and outcome of every exchange via [`tracing`].
///
/// Sitting above the retry node, it observes each logical request once; the retry node logs the
/// individual attempts. Disabled, it forwards the inner future unchanged.
#[derive(Clone, Debug)]
pub struct NetworkLoggingTransport<T> {
	inner: T,
	enabled: bool,
}
impl<T> NetworkLoggingTransport<T> {
	/// Wraps `inner`; `enabled = false` makes the node a passthrough.
	pub fn new(inner: T, enabled: bool) -> Self {
		Self { inner, enabled }
	}
}
impl<T> HttpTransport for NetworkLoggingTransport<T>
where
	T: HttpTransport,
{
	fn round_trip(&self, request: HttpRequest) -> TransportFuture<'_> {
		if !self.enabled {
			return self.inner.round_trip(request);
		}

		Box::pin(async move {
			let method = request.method().clone();
			let url = request.uri().to_string();
			let started_at = OffsetDateTime::now_utc();
			let started = Instant::now();

			tracing::debug!(%method, %url, %started_at, "Sending request.");

			let result = self.inner.round_trip(request).await;
			let duration_ms = started.elapsed().as_millis() as u64;

			match &result {
				Ok(response) => {
					let status = response.status().as_u16();
					let class = status_class(status);

					if status == 401 {
						tracing::debug!(
							%method,
							%url,
							status,
							duration_ms,
							"Received an authentication challenge, the expected first step of digest authentication."
						);
					} else if status >= 300 {
						tracing::warn!(%method, %url, status, status_class = class, duration_ms, "Request completed.");
					} else {
						tracing::debug!(%method, %url, status, status_class = class, duration_ms, "Request completed.");
					}
				},
				Err(e) => {
					tracing::error!(
						%method,
						%url,
						%started_at,
						duration_ms,
						failure = failure_class(e),
						error = %e,
						"Request failed."
					);
				},
			}

			result
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{ScriptedTransport, certificate_error, connection_reset, get, response};

	#[test]
	fn status_classes_cover_every_range() {
		assert_eq!(status_class(204), "Success");
		assert_eq!(status_class(302), "Redirection");
		assert_eq!(status_class(401), "Client Error");
		assert_eq!(status_class(503), "Server Error");
		assert_eq!(status_class(99), "Unknown");
	}

	#[test]
	fn failures_are_described_for_operators() {
		assert_eq!(failure_class(&connection_reset()), "connection reset");
		assert_eq!(failure_class(&certificate_error()), "TLS/certificate error");
		assert_eq!(failure_class(&TransportError::DeadlineExceeded), "deadline exceeded");
	}

	#[tokio::test]
	async fn forwards_outcomes_in_both_modes() {
		for enabled in [true, false] {
			let scripted = Arc::new(ScriptedTransport::new([Ok(response(401)), Err(connection_reset())]));
			let node = NetworkLoggingTransport::new(Arc::clone(&scripted), enabled);
			let first = node.round_trip(get("https://example.com/")).await.expect("401 is a response.");

			assert_eq!(first.status(), 401);
			assert!(node.round_trip(get("https://example.com/")).await.is_err());
			assert_eq!(scripted.attempts(), 2);
		}
	}
}
