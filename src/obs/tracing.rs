// crates.io
use tracing::{Instrument, Span, instrument::Instrumented};
// self
use crate::{_prelude::*, obs::Stage};

/// A span wrapping one bootstrap stage.
#[derive(Clone, Debug)]
pub struct StageSpan {
	span: Span,
}
impl StageSpan {
	/// Creates a new span tagged with the provided stage.
	pub fn new(stage: Stage) -> Self {
		Self { span: tracing::info_span!("atlas_transport.bootstrap", stage = stage.as_str()) }
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> StageSpanGuard {
		StageSpanGuard { _guard: self.span.entered() }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}
}

/// RAII guard returned by [`StageSpan::entered`].
pub struct StageSpanGuard {
	_guard: tracing::span::EnteredSpan,
}
impl Debug for StageSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("StageSpanGuard(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn guard_is_debuggable() {
		let guard = StageSpan::new(Stage::Credentials).entered();

		assert_eq!(format!("{guard:?}"), "StageSpanGuard(..)");
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = StageSpan::new(Stage::TokenFetch);
		let value = StageSpan::instrument(&span, async { 42 }).await;

		assert_eq!(value, 42);
	}
}
