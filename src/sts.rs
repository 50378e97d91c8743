//! STS endpoint and signing region resolution for the assume-role call.
//!
//! Resolution never fails: anything it cannot parse degrades to [`DEFAULT_REGION`], leaving
//! a misconfigured endpoint to surface as an authentication error from STS itself.

// self
use crate::_prelude::*;

/// Region used when nothing more specific is known.
pub const DEFAULT_REGION: &str = "us-east-1";
/// Host of the global STS endpoint.
pub const DEFAULT_STS_HOST: &str = "sts.amazonaws.com";

/// Endpoint URL plus the region its requests must be signed for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StsEndpoint {
	/// Endpoint URL, as configured or synthesized.
	pub url: String,
	/// SigV4 signing region derived from the endpoint host.
	pub signing_region: String,
}

/// Resolves the STS endpoint from an optional explicit URL and a fallback region.
pub fn resolve_sts_endpoint(explicit: &str, fallback_region: &str) -> StsEndpoint {
	let url = if explicit.is_empty() {
		let region = if fallback_region.is_empty() { DEFAULT_REGION } else { fallback_region };

		format!("https://sts.{region}.amazonaws.com/")
	} else {
		explicit.to_owned()
	};
	let signing_region = signing_region_for(&url);

	StsEndpoint { url, signing_region }
}

/// Converts an Atlas region name (`US_EAST_1`) into its AWS form (`us-east-1`).
pub fn mongodb_region_to_aws(region: &str) -> String {
	region.trim().to_ascii_lowercase().replace('_', "-")
}

fn signing_region_for(url: &str) -> String {
	let Ok(parsed) = Url::parse(url) else {
		return DEFAULT_REGION.into();
	};
	let Some(host) = parsed.host_str() else {
		return DEFAULT_REGION.into();
	};

	if host == DEFAULT_STS_HOST {
		return DEFAULT_REGION.into();
	}

	let labels = host.split('.').collect::<Vec<_>>();

	match labels.as_slice() {
		["sts", region, _, _, ..] if !region.is_empty() => (*region).into(),
		_ => DEFAULT_REGION.into(),
	}
}
