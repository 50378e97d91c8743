//! Observability helpers for credential bootstrap and outbound requests.
//!
//! # Feature Flags
//!
//! - Bootstrap stages always run inside a `tracing` span named `atlas_transport.bootstrap`
//!   carrying the `stage` field.
//! - Enable `metrics` to increment `atlas_transport_stage_total` (labeled by `stage` and
//!   `outcome`) and `atlas_transport_request_total` (labeled by `outcome`).

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

// self
use crate::_prelude::*;

/// One-shot bootstrap stages observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Credential precedence resolution and validation.
	Credentials,
	/// AWS assume-role plus Secrets Manager round trip.
	SecretFetch,
	/// Service account token exchange.
	TokenFetch,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Credentials => "credentials",
			Stage::SecretFetch => "secret_fetch",
			Stage::TokenFetch => "token_fetch",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each stage or request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageOutcome {
	/// Entry to the stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Attempt rescheduled after a transient failure.
	Retry,
}
impl StageOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageOutcome::Attempt => "attempt",
			StageOutcome::Success => "success",
			StageOutcome::Failure => "failure",
			StageOutcome::Retry => "retry",
		}
	}
}
impl Display for StageOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
