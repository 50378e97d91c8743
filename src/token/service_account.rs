//! Service account tokens: client-credentials exchange, lazy refresh, and the single-flight
//! provider that builds the source once per client assembly.

// crates.io
use oauth2::{
	AsyncHttpClient, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError,
	RevocationUrl, StandardRevocableToken, TokenResponse, TokenUrl, basic::BasicClient,
};
// self
use crate::{
	_prelude::*,
	error::{TokenError, TransportError},
	obs::{self, Stage, StageOutcome, StageSpan},
	token::{TokenFuture, TokenSecret, TokenSource},
	transport::{HttpRequest, HttpResponse, HttpTransport},
};

type ServiceAccountClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet, EndpointSet>;

/// Path of the token endpoint relative to the API base URL.
pub const TOKEN_PATH: &str = "api/oauth/token";
/// Path of the revocation endpoint relative to the API base URL.
pub const REVOKE_PATH: &str = "api/oauth/revoke";
/// Tokens expiring within this window are refreshed before use.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct CachedToken {
	secret: TokenSecret,
	expires_at: OffsetDateTime,
}
impl CachedToken {
	fn is_fresh_at(&self, now: OffsetDateTime) -> bool {
		now + REFRESH_MARGIN < self.expires_at
	}
}

/// [`AsyncHttpClient`] adapter that sends token requests through an [`HttpTransport`].
#[derive(Clone)]
struct TransportHttpClient(Arc<dyn HttpTransport>);
impl<'c> AsyncHttpClient<'c> for TransportHttpClient {
	type Error = HttpClientError<TransportError>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move { Ok(self.0.round_trip(request).await.map_err(Box::new)?) })
	}
}

/// Client-credentials token source with lazy, serialized refresh.
///
/// The cached token is reused until it is within [`REFRESH_MARGIN`] of expiry; refreshes are
/// serialized so concurrent callers trigger at most one exchange.
pub struct ServiceAccountTokenSource {
	client: ServiceAccountClient,
	http: TransportHttpClient,
	cached: Mutex<Option<CachedToken>>,
	refresh: AsyncMutex<()>,
}
impl ServiceAccountTokenSource {
	/// Configures a source against `<base_url>/api/oauth/{token,revoke}`.
	///
	/// No request is sent until the first [`TokenSource::token`] call.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		base_url: &str,
		transport: Arc<dyn HttpTransport>,
	) -> Result<Self, TokenError> {
		let base = endpoint_base(base_url)?;
		let token_url = base.join(TOKEN_PATH).map_err(|source| TokenError::InvalidUrl { source })?;
		let revoke_url =
			base.join(REVOKE_PATH).map_err(|source| TokenError::InvalidUrl { source })?;
		let client = BasicClient::new(ClientId::new(client_id.into()))
			.set_client_secret(ClientSecret::new(client_secret.into()))
			.set_token_uri(TokenUrl::from_url(token_url))
			.set_revocation_url(RevocationUrl::from_url(revoke_url));

		Ok(Self {
			client,
			http: TransportHttpClient(transport),
			cached: Mutex::new(None),
			refresh: AsyncMutex::new(()),
		})
	}

	/// Token endpoint in use.
	pub fn token_url(&self) -> &str {
		self.client.token_uri().as_str()
	}

	/// Expiry of the cached token, if one has been fetched.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.cached.lock().as_ref().map(|token| token.expires_at)
	}

	/// Returns the cached token, refreshing it first when it is missing or about to expire.
	pub async fn current(&self) -> Result<TokenSecret, TokenError> {
		if let Some(secret) = self.fresh() {
			return Ok(secret);
		}

		let _refresh = self.refresh.lock().await;

		// Another caller may have refreshed while this one waited.
		if let Some(secret) = self.fresh() {
			return Ok(secret);
		}

		let token = self.exchange().await?;
		let secret = token.secret.clone();

		*self.cached.lock() = Some(token);

		Ok(secret)
	}

	/// Revokes the cached token and clears the cache.
	///
	/// Does nothing when no token has been fetched yet.
	pub async fn revoke(&self) -> Result<(), TokenError> {
		let _refresh = self.refresh.lock().await;
		let Some(token) = self.cached.lock().take() else {
			return Ok(());
		};
		let revocable =
			StandardRevocableToken::AccessToken(oauth2::AccessToken::new(token.secret.expose().into()));

		self.client
			.revoke_token(revocable)
			.map_err(|e| TokenError::Revoke { message: e.to_string() })?
			.request_async(&self.http)
			.await
			.map_err(|e| TokenError::Revoke { message: e.to_string() })
	}

	fn fresh(&self) -> Option<TokenSecret> {
		self.cached
			.lock()
			.as_ref()
			.filter(|token| token.is_fresh_at(OffsetDateTime::now_utc()))
			.map(|token| token.secret.clone())
	}

	async fn exchange(&self) -> Result<CachedToken, TokenError> {
		let span = StageSpan::new(Stage::TokenFetch);

		obs::record_stage_outcome(Stage::TokenFetch, StageOutcome::Attempt);

		let result = span
			.instrument(async {
				let response = self
					.client
					.exchange_client_credentials()
					.request_async(&self.http)
					.await
					.map_err(|e| TokenError::Exchange { message: e.to_string() })?;
				let expires_in = response.expires_in().ok_or(TokenError::MissingExpiresIn)?;
				let expires_in = time::Duration::try_from(expires_in)
					.map_err(|_| TokenError::ExpiresInOutOfRange)?;
				let expires_at = OffsetDateTime::now_utc()
					.checked_add(expires_in)
					.ok_or(TokenError::ExpiresInOutOfRange)?;

				Ok(CachedToken {
					secret: TokenSecret::new(response.access_token().secret().to_owned()),
					expires_at,
				})
			})
			.await;

		match &result {
			Ok(token) => {
				tracing::debug!(expires_at = %token.expires_at, "Service account token refreshed.");
				obs::record_stage_outcome(Stage::TokenFetch, StageOutcome::Success);
			},
			Err(e) => {
				tracing::warn!(error = %e, "Service account token exchange failed.");
				obs::record_stage_outcome(Stage::TokenFetch, StageOutcome::Failure);
			},
		}

		result
	}
}
impl TokenSource for ServiceAccountTokenSource {
	fn token(&self) -> TokenFuture<'_> {
		Box::pin(self.current())
	}
}
impl Debug for ServiceAccountTokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceAccountTokenSource")
			.field("token_url", &self.token_url())
			.field("expires_at", &self.expires_at())
			.finish_non_exhaustive()
	}
}

/// Builds the service account token source at most once.
///
/// The first call configures the source and performs one eager exchange, failing fast on bad
/// credentials. Later calls return the same source without contacting the token endpoint,
/// whatever arguments they pass. Concurrent first callers are serialized, so only one exchange
/// ever happens.
#[derive(Debug, Default)]
pub struct ServiceAccountTokenProvider {
	source: AsyncMutex<Option<Arc<ServiceAccountTokenSource>>>,
}
impl ServiceAccountTokenProvider {
	/// Creates an empty provider.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the shared source, building and warming it on first use.
	pub async fn token_source(
		&self,
		client_id: &str,
		client_secret: &str,
		base_url: &str,
		transport: Arc<dyn HttpTransport>,
	) -> Result<Arc<ServiceAccountTokenSource>, TokenError> {
		let mut slot = self.source.lock().await;

		if let Some(source) = slot.as_ref() {
			return Ok(Arc::clone(source));
		}

		let source = ServiceAccountTokenSource::new(client_id, client_secret, base_url, transport)?;

		source.current().await?;

		let source = Arc::new(source);

		*slot = Some(Arc::clone(&source));

		Ok(source)
	}

	/// Whether a source has been built.
	pub async fn is_initialized(&self) -> bool {
		self.source.lock().await.is_some()
	}

	/// Drops the cached source so the next call builds a fresh one.
	pub async fn reset(&self) {
		*self.source.lock().await = None;
	}
}

fn endpoint_base(base_url: &str) -> Result<Url, TokenError> {
	let mut base = Url::parse(base_url).map_err(|source| TokenError::InvalidUrl { source })?;

	if !base.path().ends_with('/') {
		let path = format!("{}/", base.path());

		base.set_path(&path);
	}

	Ok(base)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::ScriptedTransport;

	fn token_response(token: &str, expires_in: Option<u64>) -> HttpResponse {
		let body = match expires_in {
			Some(expires_in) => format!(
				r#"{{"access_token":"{token}","token_type":"bearer","expires_in":{expires_in}}}"#
			),
			None => format!(r#"{{"access_token":"{token}","token_type":"bearer"}}"#),
		};
		let mut response = HttpResponse::new(body.into_bytes());

		response.headers_mut().insert(
			http::header::CONTENT_TYPE,
			http::HeaderValue::from_static("application/json"),
		);

		response
	}

	fn source(
		outcomes: impl IntoIterator<Item = Result<HttpResponse, TransportError>>,
	) -> (Arc<ScriptedTransport>, ServiceAccountTokenSource) {
		let scripted = Arc::new(ScriptedTransport::new(outcomes));
		let source = ServiceAccountTokenSource::new(
			"client",
			"secret",
			"https://cloud.example.com/base",
			scripted.clone(),
		)
		.expect("Source should build.");

		(scripted, source)
	}

	#[test]
	fn endpoints_extend_the_base_path() {
		let (_, source) = source([]);

		assert_eq!(source.token_url(), "https://cloud.example.com/base/api/oauth/token");
	}

	#[tokio::test]
	async fn caches_until_refresh_margin() {
		let (scripted, source) =
			source([Ok(token_response("first", Some(3600))), Ok(token_response("second", Some(3600)))]);

		assert_eq!(source.current().await.expect("First exchange.").expose(), "first");
		assert_eq!(source.current().await.expect("Cached token.").expose(), "first");
		assert_eq!(scripted.attempts(), 1);

		let request = &scripted.requests()[0];

		assert_eq!(request.method(), http::Method::POST);
		assert!(String::from_utf8_lossy(request.body()).contains("grant_type=client_credentials"));
	}

	#[tokio::test]
	async fn refreshes_tokens_inside_the_margin() {
		let (scripted, source) =
			source([Ok(token_response("short", Some(5))), Ok(token_response("long", Some(3600)))]);

		assert_eq!(source.current().await.expect("First exchange.").expose(), "short");
		assert_eq!(source.current().await.expect("Refreshed token.").expose(), "long");
		assert_eq!(scripted.attempts(), 2);
	}

	#[tokio::test]
	async fn missing_expiry_is_rejected() {
		let (_, source) = source([Ok(token_response("t", None))]);
		let err = source.current().await.expect_err("expires_in is required.");

		assert!(matches!(err, TokenError::MissingExpiresIn));
	}

	#[tokio::test]
	async fn provider_builds_once() {
		let scripted = Arc::new(ScriptedTransport::new([Ok(token_response("t", Some(3600)))]));
		let provider = ServiceAccountTokenProvider::new();
		let first = provider
			.token_source("id", "secret", "https://cloud.example.com/", scripted.clone())
			.await
			.expect("First build.");
		let second = provider
			.token_source("other", "other", "https://other.example.com/", scripted.clone())
			.await
			.expect("Cached build.");

		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(scripted.attempts(), 1);

		provider.reset().await;

		assert!(!provider.is_initialized().await);
	}

	#[tokio::test]
	async fn provider_does_not_cache_failed_builds() {
		let scripted = Arc::new(ScriptedTransport::new([
			Ok(token_response("t", None)),
			Ok(token_response("t", Some(3600))),
		]));
		let provider = ServiceAccountTokenProvider::new();

		assert!(
			provider
				.token_source("id", "secret", "https://cloud.example.com/", scripted.clone())
				.await
				.is_err()
		);
		assert!(!provider.is_initialized().await);
		assert!(
			provider
				.token_source("id", "secret", "https://cloud.example.com/", scripted.clone())
				.await
				.is_ok()
		);
	}
}
