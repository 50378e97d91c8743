// self
use crate::obs::{Stage, StageOutcome};

/// Records a bootstrap stage outcome via the global metrics recorder (when enabled).
pub fn record_stage_outcome(stage: Stage, outcome: StageOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"atlas_transport_stage_total",
			"stage" => stage.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (stage, outcome);
	}
}

/// Records the outcome of one logical outbound request (after retries).
pub fn record_request_outcome(outcome: StageOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("atlas_transport_request_total", "outcome" => outcome.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_installed_recorder() {
		record_stage_outcome(Stage::SecretFetch, StageOutcome::Failure);
		record_request_outcome(StageOutcome::Success);
	}
}
