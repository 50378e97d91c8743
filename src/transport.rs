//! Composable HTTP transport nodes.
//!
//! Every node implements [`HttpTransport`] and wraps an inner node. A fully assembled chain,
//! outermost first, is [`UserAgentTransport`] → [`NetworkLoggingTransport`] →
//! [`RetryTransport`] → authentication ([`DigestTransport`] or [`BearerTransport`]) →
//! [`ReqwestTransport`]. Retries therefore run underneath logging, so every attempt is logged,
//! and above authentication, so every attempt is authenticated afresh.

mod bearer;
mod digest;
mod logging;
mod retry;
mod user_agent;

pub use bearer::*;
pub use digest::*;
pub use logging::*;
pub use retry::*;
pub use user_agent::*;

// self
use crate::{_prelude::*, error::TransportError};

/// Request type flowing through the chain.
pub type HttpRequest = http::Request<Vec<u8>>;
/// Response type flowing through the chain.
pub type HttpResponse = http::Response<Vec<u8>>;

/// Boxed future returned by [`HttpTransport::round_trip`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Uniform "send one request, get one response" capability.
///
/// Non-success HTTP statuses are ordinary responses; only failures to obtain a response at all
/// surface as [`TransportError`]. Dropping the returned future cancels the exchange.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes `request` and resolves to its response.
	fn round_trip(&self, request: HttpRequest) -> TransportFuture<'_>;
}
impl<T> HttpTransport for Arc<T>
where
	T: ?Sized + HttpTransport,
{
	fn round_trip(&self, request: HttpRequest) -> TransportFuture<'_> {
		(**self).round_trip(request)
	}
}
impl<T> HttpTransport for Box<T>
where
	T: ?Sized + HttpTransport,
{
	fn round_trip(&self, request: HttpRequest) -> TransportFuture<'_> {
		(**self).round_trip(request)
	}
}

/// Absolute deadline for one logical request, carried as a request extension.
///
/// The retry node bounds every attempt by it and never sleeps past it; reaching it yields
/// [`TransportError::DeadlineExceeded`], which is never retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestDeadline(pub Instant);
impl RequestDeadline {
	/// Deadline `timeout` from now.
	pub fn after(timeout: Duration) -> Self {
		Self(Instant::now() + timeout)
	}

	/// Time left before the deadline, saturating at zero.
	pub fn remaining(&self) -> Duration {
		self.0.saturating_duration_since(Instant::now())
	}
}

/// Copies method, URI, version, headers, body, and extensions of `request`.
pub fn clone_request(request: &HttpRequest) -> HttpRequest {
	let mut clone = http::Request::new(request.body().clone());

	*clone.method_mut() = request.method().clone();
	*clone.uri_mut() = request.uri().clone();
	*clone.version_mut() = request.version();
	*clone.headers_mut() = request.headers().clone();
	*clone.extensions_mut() = request.extensions().clone();

	clone
}

/// Base node that performs the exchange with [`reqwest`].
///
/// Redirects are not followed; the API answers directly.
#[derive(Clone, Debug)]
pub struct ReqwestTransport(ReqwestClient);
impl ReqwestTransport {
	/// Wraps an existing client.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client with an optional per-exchange timeout.
	pub fn build(timeout: Option<Duration>) -> Result<Self, crate::error::ConfigError> {
		let mut builder = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none());

		if let Some(timeout) = timeout {
			builder = builder.timeout(timeout);
		}

		Ok(Self(builder.build()?))
	}
}
impl HttpTransport for ReqwestTransport {
	fn round_trip(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let response = client.execute(request.try_into()?).await?;
			let status = response.status();
			let version = response.version();
			let headers = response.headers().to_owned();
			let mut response_new = HttpResponse::new(response.bytes().await?.to_vec());

			*response_new.status_mut() = status;
			*response_new.version_mut() = version;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{ScriptedTransport, get, response};

	#[derive(Clone, Debug, PartialEq, Eq)]
	struct Marker(&'static str);

	#[test]
	fn clone_request_keeps_extensions_and_headers() {
		let mut request = get("https://example.com/a?b=c");

		request.headers_mut().insert("x-test", http::HeaderValue::from_static("1"));
		request.extensions_mut().insert(Marker("kept"));

		let clone = clone_request(&request);

		assert_eq!(clone.uri(), request.uri());
		assert_eq!(clone.headers()["x-test"], "1");
		assert_eq!(clone.extensions().get::<Marker>(), Some(&Marker("kept")));
	}

	#[test]
	fn deadline_remaining_saturates() {
		let deadline = RequestDeadline(Instant::now());

		assert_eq!(deadline.remaining(), Duration::ZERO);
		assert!(RequestDeadline::after(Duration::from_secs(60)).remaining() > Duration::ZERO);
	}

	#[tokio::test]
	async fn shared_handles_delegate() {
		let scripted = Arc::new(ScriptedTransport::new([Ok(response(204))]));
		let boxed: Box<dyn HttpTransport> = Box::new(Arc::clone(&scripted));
		let response = boxed.round_trip(get("https://example.com/")).await.expect("Scripted OK.");

		assert_eq!(response.status(), 204);
		assert_eq!(scripted.attempts(), 1);
	}
}
