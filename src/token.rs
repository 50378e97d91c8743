//! Bearer token sources for the access-token and service-account methods.

mod secret;
mod service_account;

pub use secret::*;
pub use service_account::*;

// self
use crate::{_prelude::*, error::TokenError};

/// Boxed future returned by [`TokenSource::token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenSecret, TokenError>> + 'a + Send>>;

/// Supplies a currently valid bearer token for each request.
pub trait TokenSource
where
	Self: 'static + Send + Sync,
{
	/// Returns a token valid for at least the refresh margin.
	fn token(&self) -> TokenFuture<'_>;
}
impl<T> TokenSource for Arc<T>
where
	T: ?Sized + TokenSource,
{
	fn token(&self) -> TokenFuture<'_> {
		(**self).token()
	}
}

/// Pre-issued token that is never refreshed.
#[derive(Clone, Debug)]
pub struct StaticTokenSource(TokenSecret);
impl StaticTokenSource {
	/// Wraps a pre-issued token.
	pub fn new(token: impl Into<String>) -> Self {
		Self(TokenSecret::new(token))
	}
}
impl TokenSource for StaticTokenSource {
	fn token(&self) -> TokenFuture<'_> {
		let token = self.0.clone();

		Box::pin(async move { Ok(token) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn static_source_repeats_its_token() {
		let source: Arc<dyn TokenSource> = Arc::new(StaticTokenSource::new("abc"));

		for _ in 0..2 {
			assert_eq!(source.token().await.expect("Static token.").expose(), "abc");
		}
	}
}
