//! Retry node with exponential backoff for transient network failures.

// self
use crate::{
	_prelude::*,
	error::TransportError,
	obs::{self, StageOutcome},
	transport::{
		HttpRequest, HttpResponse, HttpTransport, RequestDeadline, TransportFuture, clone_request,
	},
};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base backoff delay.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Retries requests that failed with a retryable network error.
///
/// Attempt `n` (0-indexed) that fails is followed by a `delay * 2^n` sleep, up to
/// `max_retries` retries. Responses are never retried, whatever their status; a non-retryable
/// error returns immediately.
#[derive(Clone, Debug)]
pub struct RetryTransport<T> {
	inner: T,
	max_retries: u32,
	delay: Duration,
}
impl<T> RetryTransport<T> {
	/// Wraps `inner` with the given retry budget and base delay.
	pub fn new(inner: T, max_retries: u32, delay: Duration) -> Self {
		Self { inner, max_retries, delay }
	}

	/// Backoff slept after the failed attempt `attempt` (0-indexed).
	pub fn backoff(&self, attempt: u32) -> Duration {
		self.delay.saturating_mul(1_u32.checked_shl(attempt).unwrap_or(u32::MAX))
	}
}
impl<T> RetryTransport<T>
where
	T: HttpTransport,
{
	async fn attempt(
		&self,
		request: HttpRequest,
		deadline: Option<RequestDeadline>,
	) -> Result<HttpResponse, TransportError> {
		match deadline {
			Some(RequestDeadline(at)) => tokio::time::timeout_at(at.into(), self.inner.round_trip(request))
				.await
				.unwrap_or(Err(TransportError::DeadlineExceeded)),
			None => self.inner.round_trip(request).await,
		}
	}
}
impl<T> HttpTransport for RetryTransport<T>
where
	T: HttpTransport,
{
	fn round_trip(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let deadline = request.extensions().get::<RequestDeadline>().copied();
			let mut attempt = 0;

			loop {
				let err = match self.attempt(clone_request(&request), deadline).await {
					Ok(response) => return Ok(response),
					Err(e) => e,
				};

				if !err.is_retryable() || attempt >= self.max_retries {
					return Err(err);
				}

				let backoff = self.backoff(attempt);

				if let Some(deadline) = deadline
					&& deadline.remaining() <= backoff
				{
					tracing::debug!(error = %err, "Retry backoff would outlast the request deadline.");

					return Err(TransportError::DeadlineExceeded);
				}

				obs::record_request_outcome(StageOutcome::Retry);
				tracing::warn!(
					attempt = attempt + 1,
					max_retries = self.max_retries,
					backoff_ms = backoff.as_millis() as u64,
					error = %err,
					"Retrying request after a network error."
				);
				tokio::time::sleep(backoff).await;

				attempt += 1;
			}
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{ScriptedTransport, certificate_error, connection_reset, get, response};

	fn retry(
		outcomes: impl IntoIterator<Item = Result<HttpResponse, TransportError>>,
		delay: Duration,
	) -> (Arc<ScriptedTransport>, RetryTransport<Arc<ScriptedTransport>>) {
		let scripted = Arc::new(ScriptedTransport::new(outcomes));

		(Arc::clone(&scripted), RetryTransport::new(scripted, DEFAULT_MAX_RETRIES, delay))
	}

	#[tokio::test]
	async fn recovers_after_three_network_errors() {
		let (scripted, node) = retry(
			[Err(connection_reset()), Err(connection_reset()), Err(connection_reset()), Ok(response(200))],
			Duration::from_millis(1),
		);
		let response = node.round_trip(get("https://example.com/")).await.expect("Fourth attempt succeeds.");

		assert_eq!(response.status(), 200);
		assert_eq!(scripted.attempts(), 4);
	}

	#[tokio::test]
	async fn exhausts_budget_and_returns_last_error() {
		let (scripted, node) = retry((0..4).map(|_| Err(connection_reset())), Duration::from_millis(1));
		let err = node.round_trip(get("https://example.com/")).await.expect_err("Budget is exhausted.");

		assert!(err.is_retryable());
		assert_eq!(scripted.attempts(), 4);
	}

	#[tokio::test]
	async fn non_retryable_error_short_circuits() {
		let (scripted, node) = retry([Err(certificate_error())], Duration::from_millis(1));
		let err = node.round_trip(get("https://example.com/")).await.expect_err("TLS failure is terminal.");

		assert!(!err.is_retryable());
		assert_eq!(scripted.attempts(), 1);
	}

	#[tokio::test]
	async fn http_statuses_pass_through_unretried() {
		for status in [401, 404, 500, 503] {
			let (scripted, node) = retry([Ok(response(status))], Duration::from_millis(1));
			let response = node.round_trip(get("https://example.com/")).await.expect("Status passes through.");

			assert_eq!(response.status(), status);
			assert_eq!(scripted.attempts(), 1);
		}
	}

	#[tokio::test]
	async fn backoff_grows_exponentially() {
		let delay = Duration::from_millis(10);
		let (_, node) = retry(
			[Err(connection_reset()), Err(connection_reset()), Err(connection_reset()), Ok(response(200))],
			delay,
		);
		let started = Instant::now();

		node.round_trip(get("https://example.com/")).await.expect("Fourth attempt succeeds.");

		assert!(started.elapsed() >= delay * (1 + 2 + 4));
		assert_eq!(node.backoff(0), delay);
		assert_eq!(node.backoff(3), delay * 8);
		assert!(node.backoff(64) >= node.backoff(31));
	}

	#[tokio::test]
	async fn deadline_stops_retries_without_sleeping_past_it() {
		let (scripted, node) = retry((0..4).map(|_| Err(connection_reset())), Duration::from_secs(30));
		let mut request = get("https://example.com/");

		request.extensions_mut().insert(RequestDeadline::after(Duration::from_millis(50)));

		let started = Instant::now();
		let err = node.round_trip(request).await.expect_err("Deadline wins over backoff.");

		assert!(matches!(err, TransportError::DeadlineExceeded));
		assert_eq!(scripted.attempts(), 1);
		assert!(started.elapsed() < Duration::from_secs(5));
	}
}
