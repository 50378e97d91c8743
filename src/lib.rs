//! Credential resolution and resilient HTTP transport for the Atlas cloud management API.
//!
//! The crate picks exactly one authentication method out of every configured source, fetches
//! the material it needs (including an AWS Secrets Manager round trip behind an assumed role),
//! and wraps every request in a layered chain: User-Agent augmentation, network logging,
//! retry with exponential backoff, and authentication.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

#[cfg(feature = "aws")] pub mod aws;
pub mod client;
pub mod credentials;
pub mod error;
pub mod obs;
pub mod state_id;
pub mod sts;
pub mod token;
pub mod transport;
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	use crate::{
		error::TransportError,
		transport::{HttpRequest, HttpResponse, HttpTransport, TransportFuture, clone_request},
	};

	/// Fake transport node that replays a scripted queue of outcomes.
	///
	/// Every request it receives is recorded so tests can assert on headers added by the nodes
	/// wrapped around it. Once the script runs dry it answers `200 OK` with an empty body.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		outcomes: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
		seen: Mutex<Vec<HttpRequest>>,
	}
	impl ScriptedTransport {
		/// Creates a transport that replays `outcomes` in order.
		pub fn new(outcomes: impl IntoIterator<Item = Result<HttpResponse, TransportError>>) -> Self {
			Self { outcomes: Mutex::new(outcomes.into_iter().collect()), seen: Default::default() }
		}

		/// Number of round trips observed so far.
		pub fn attempts(&self) -> usize {
			self.seen.lock().len()
		}

		/// Copies of every request observed so far.
		pub fn requests(&self) -> Vec<HttpRequest> {
			self.seen.lock().iter().map(clone_request).collect()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn round_trip(&self, request: HttpRequest) -> TransportFuture<'_> {
			self.seen.lock().push(request);

			let outcome = self.outcomes.lock().pop_front().unwrap_or_else(|| Ok(response(200)));

			Box::pin(async move { outcome })
		}
	}

	/// Builds an empty response with the given status code.
	pub fn response(status: u16) -> HttpResponse {
		let mut response = http::Response::new(Vec::new());

		*response.status_mut() =
			http::StatusCode::from_u16(status).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);

		response
	}

	/// Retryable network failure (`connection reset by peer`).
	pub fn connection_reset() -> TransportError {
		TransportError::network(std::io::Error::new(
			std::io::ErrorKind::ConnectionReset,
			"connection reset by peer",
		))
	}

	/// Terminal network failure (TLS verification).
	pub fn certificate_error() -> TransportError {
		TransportError::network(std::io::Error::other("x509: certificate signed by unknown authority"))
	}

	/// Builds a GET request for `uri`.
	pub fn get(uri: &str) -> HttpRequest {
		let mut request = http::Request::new(Vec::new());

		*request.method_mut() = http::Method::GET;
		*request.uri_mut() = uri.parse().unwrap_or_default();

		request
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::{Duration, Instant},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use oauth2::http;
	pub use parking_lot::Mutex;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::Deserialize;
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2::http;
pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
