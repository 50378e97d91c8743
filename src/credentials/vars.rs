//! Raw credential inputs gathered from one source (provider configuration or environment).

// self
use crate::{
	_prelude::*,
	credentials::{Credentials, Presence},
};

const ACCESS_TOKEN: &[&str] = &["MONGODB_ATLAS_ACCESS_TOKEN"];
const CLIENT_ID: &[&str] = &["MONGODB_ATLAS_CLIENT_ID"];
const CLIENT_SECRET: &[&str] = &["MONGODB_ATLAS_CLIENT_SECRET"];
const PUBLIC_KEY: &[&str] =
	&["MONGODB_ATLAS_PUBLIC_API_KEY", "MONGODB_ATLAS_PUBLIC_KEY", "MCLI_PUBLIC_API_KEY"];
const PRIVATE_KEY: &[&str] =
	&["MONGODB_ATLAS_PRIVATE_API_KEY", "MONGODB_ATLAS_PRIVATE_KEY", "MCLI_PRIVATE_API_KEY"];
const BASE_URL: &[&str] = &["MONGODB_ATLAS_BASE_URL", "MCLI_OPS_MANAGER_URL"];
const REALM_BASE_URL: &[&str] = &["MONGODB_REALM_BASE_URL"];
const ASSUME_ROLE_ARN: &[&str] = &["ASSUME_ROLE_ARN", "TF_VAR_ASSUME_ROLE_ARN"];
const SECRET_NAME: &[&str] = &["SECRET_NAME", "TF_VAR_SECRET_NAME"];
const AWS_REGION: &[&str] = &["AWS_REGION", "TF_VAR_AWS_REGION"];
const AWS_ACCESS_KEY_ID: &[&str] = &["AWS_ACCESS_KEY_ID", "TF_VAR_AWS_ACCESS_KEY_ID"];
const AWS_SECRET_ACCESS_KEY: &[&str] = &["AWS_SECRET_ACCESS_KEY", "TF_VAR_AWS_SECRET_ACCESS_KEY"];
const AWS_SESSION_TOKEN: &[&str] = &["AWS_SESSION_TOKEN", "TF_VAR_AWS_SESSION_TOKEN"];
const STS_ENDPOINT: &[&str] = &["STS_ENDPOINT", "TF_VAR_STS_ENDPOINT"];

/// Descriptor for fetching API keys from AWS Secrets Manager behind an assumed role.
///
/// The descriptor counts as present exactly when `assume_role_arn` is non-empty.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AwsVars {
	/// IAM role to assume before reading the secret.
	pub assume_role_arn: String,
	/// Secret identifier in Secrets Manager.
	pub secret_name: String,
	/// Region hosting the secret.
	pub region: String,
	/// Static access key id used to call STS.
	pub access_key_id: String,
	/// Static secret access key used to call STS.
	pub secret_access_key: String,
	/// Optional session token paired with the static keys.
	pub session_token: String,
	/// Explicit STS endpoint; empty selects the regional default.
	pub endpoint: String,
}
impl Presence for AwsVars {
	fn is_present(&self) -> bool {
		!self.assume_role_arn.is_empty()
	}
}
impl Debug for AwsVars {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AwsVars")
			.field("assume_role_arn", &self.assume_role_arn)
			.field("secret_name", &self.secret_name)
			.field("region", &self.region)
			.field("access_key_id", &self.access_key_id)
			.field("secret_access_key_set", &!self.secret_access_key.is_empty())
			.field("session_token_set", &!self.session_token.is_empty())
			.field("endpoint", &self.endpoint)
			.finish()
	}
}

/// Everything one source may contribute: credential material, endpoints, and the AWS
/// descriptor.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Vars {
	/// Pre-issued bearer token.
	pub access_token: String,
	/// Service account client identifier.
	pub client_id: String,
	/// Service account client secret.
	pub client_secret: String,
	/// API key public half.
	pub public_key: String,
	/// API key private half.
	pub private_key: String,
	/// Primary API base URL.
	pub base_url: String,
	/// Secondary (realm/admin) base URL.
	pub realm_base_url: String,
	/// AWS Secrets Manager descriptor.
	pub aws: AwsVars,
}
impl Vars {
	/// Snapshots the process environment.
	pub fn from_env() -> Self {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Builds a snapshot from an arbitrary name lookup.
	///
	/// For every field the first listed name with a non-empty value wins.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		let first = |names: &[&str]| {
			names
				.iter()
				.filter_map(|&name| lookup(name))
				.find(|value| !value.is_empty())
				.unwrap_or_default()
		};

		Self {
			access_token: first(ACCESS_TOKEN),
			client_id: first(CLIENT_ID),
			client_secret: first(CLIENT_SECRET),
			public_key: first(PUBLIC_KEY),
			private_key: first(PRIVATE_KEY),
			base_url: first(BASE_URL),
			realm_base_url: first(REALM_BASE_URL),
			aws: AwsVars {
				assume_role_arn: first(ASSUME_ROLE_ARN),
				secret_name: first(SECRET_NAME),
				region: first(AWS_REGION),
				access_key_id: first(AWS_ACCESS_KEY_ID),
				secret_access_key: first(AWS_SECRET_ACCESS_KEY),
				session_token: first(AWS_SESSION_TOKEN),
				endpoint: first(STS_ENDPOINT),
			},
		}
	}

	/// Returns the AWS descriptor.
	pub fn aws_vars(&self) -> AwsVars {
		self.aws.clone()
	}

	/// Returns the credential material and endpoints of this source.
	pub fn credentials(&self) -> Credentials {
		Credentials {
			access_token: self.access_token.clone(),
			client_id: self.client_id.clone(),
			client_secret: self.client_secret.clone(),
			public_key: self.public_key.clone(),
			private_key: self.private_key.clone(),
			base_url: self.base_url.clone(),
			realm_base_url: self.realm_base_url.clone(),
		}
	}
}
impl Debug for Vars {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Vars")
			.field("credentials", &self.credentials())
			.field("aws", &self.aws)
			.finish()
	}
}
