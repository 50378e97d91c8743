//! Bearer authentication node for the access-token and service-account methods.

// self
use crate::{
	_prelude::*,
	token::TokenSource,
	transport::{HttpRequest, HttpTransport, TransportFuture},
};

/// Sets `Authorization: Bearer <token>` on every request.
///
/// The token is looked up per request, so a retried request picks up a refreshed token.
#[derive(Clone)]
pub struct BearerTransport<T> {
	inner: T,
	tokens: Arc<dyn TokenSource>,
}
impl<T> BearerTransport<T> {
	/// Wraps `inner`, authenticating with tokens from `tokens`.
	pub fn new(inner: T, tokens: Arc<dyn TokenSource>) -> Self {
		Self { inner, tokens }
	}
}
impl<T> Debug for BearerTransport<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BearerTransport").finish_non_exhaustive()
	}
}
impl<T> HttpTransport for BearerTransport<T>
where
	T: HttpTransport,
{
	fn round_trip(&self, mut request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let token = self.tokens.token().await?;
			request.headers_mut().insert(http::header::AUTHORIZATION, token.authorization()?);

			self.inner.round_trip(request).await
		})
	}
}
