//! Credential sets, authentication method precedence, and multi-source resolution.
//!
//! Credentials arrive from two independent [`Vars`] snapshots: explicit provider configuration
//! and the process environment. [`get_credentials`] applies "provider configuration wins"
//! without ever mixing secret material from both sources, optionally replacing the whole set
//! with API keys fetched from AWS Secrets Manager.

mod vars;

pub use vars::*;

// self
use crate::{
	_prelude::*,
	error::{ConfigError, SecretError},
	obs::{self, Stage, StageOutcome, StageSpan},
};

/// Authentication mechanism selected for a process.
///
/// Precedence is total: `AccessToken` > `ServiceAccount` > `Digest` > `Unknown`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AuthMethod {
	/// No credential material is configured.
	#[default]
	Unknown,
	/// Pre-issued bearer token.
	AccessToken,
	/// Client credentials exchanged for cached bearer tokens.
	ServiceAccount,
	/// Programmatic API key pair used for HTTP Digest authentication.
	Digest,
}
impl AuthMethod {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unknown => "unknown",
			Self::AccessToken => "access_token",
			Self::ServiceAccount => "service_account",
			Self::Digest => "digest",
		}
	}

	/// Rank in the precedence order; higher wins.
	pub const fn precedence(self) -> u8 {
		match self {
			Self::Unknown => 0,
			Self::Digest => 1,
			Self::ServiceAccount => 2,
			Self::AccessToken => 3,
		}
	}
}
impl Display for AuthMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Credential material for the selected method only.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ActiveCredentials<'a> {
	/// Nothing configured; requests go out unauthenticated.
	Unknown,
	/// Static bearer token.
	AccessToken(&'a str),
	/// Client credentials pair.
	ServiceAccount {
		/// OAuth client identifier.
		client_id: &'a str,
		/// OAuth client secret.
		client_secret: &'a str,
	},
	/// API key pair.
	Digest {
		/// Public half, used as the digest user name.
		public_key: &'a str,
		/// Private half, used as the digest password.
		private_key: &'a str,
	},
}
impl Debug for ActiveCredentials<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let method = match self {
			Self::Unknown => AuthMethod::Unknown,
			Self::AccessToken(_) => AuthMethod::AccessToken,
			Self::ServiceAccount { .. } => AuthMethod::ServiceAccount,
			Self::Digest { .. } => AuthMethod::Digest,
		};

		f.debug_tuple("ActiveCredentials").field(&method).finish()
	}
}

/// Every possible secret material plus the API endpoints it applies to.
///
/// A set may carry leftovers from lower-precedence methods; those only feed
/// [`Credentials::warnings`] and never reach the active method's requests.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
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
	/// Primary API base URL; empty selects the default.
	pub base_url: String,
	/// Secondary (realm/admin) base URL.
	pub realm_base_url: String,
}
impl Credentials {
	/// Whether a bearer token is configured.
	pub fn has_access_token(&self) -> bool {
		!self.access_token.is_empty()
	}

	/// Whether either half of the service account pair is configured.
	pub fn has_service_account(&self) -> bool {
		!self.client_id.is_empty() || !self.client_secret.is_empty()
	}

	/// Whether either half of the API key pair is configured.
	pub fn has_digest(&self) -> bool {
		!self.public_key.is_empty() || !self.private_key.is_empty()
	}

	/// Selects the authentication method by precedence.
	pub fn auth_method(&self) -> AuthMethod {
		if self.has_access_token() {
			AuthMethod::AccessToken
		} else if self.has_service_account() {
			AuthMethod::ServiceAccount
		} else if self.has_digest() {
			AuthMethod::Digest
		} else {
			AuthMethod::Unknown
		}
	}

	/// Borrows the material of the selected method.
	pub fn active(&self) -> ActiveCredentials<'_> {
		match self.auth_method() {
			AuthMethod::Unknown => ActiveCredentials::Unknown,
			AuthMethod::AccessToken => ActiveCredentials::AccessToken(&self.access_token),
			AuthMethod::ServiceAccount => ActiveCredentials::ServiceAccount {
				client_id: &self.client_id,
				client_secret: &self.client_secret,
			},
			AuthMethod::Digest => ActiveCredentials::Digest {
				public_key: &self.public_key,
				private_key: &self.private_key,
			},
		}
	}

	/// Describes lower-precedence material that the selected method overrides.
	///
	/// Returns an empty string when there is nothing to warn about.
	pub fn warnings(&self) -> String {
		match self.auth_method() {
			AuthMethod::Unknown => "No credentials set".into(),
			AuthMethod::AccessToken => match (self.has_service_account(), self.has_digest()) {
				(true, true) =>
					"Access Token will be used although Service Account and API Keys are also set"
						.into(),
				(true, false) =>
					"Access Token will be used although Service Account is also set".into(),
				(false, true) => "Access Token will be used although API Key is also set".into(),
				(false, false) => String::new(),
			},
			AuthMethod::ServiceAccount if self.has_digest() =>
				"Service Account will be used although API Key is also set".into(),
			AuthMethod::ServiceAccount | AuthMethod::Digest => String::new(),
		}
	}

	/// Describes the first missing field of the selected method.
	///
	/// Returns an empty string when the selected method is complete.
	pub fn errors(&self) -> String {
		match self.auth_method() {
			AuthMethod::ServiceAccount if self.client_id.is_empty() =>
				"Service Account is being used but Client ID is required".into(),
			AuthMethod::ServiceAccount if self.client_secret.is_empty() =>
				"Service Account is being used but Client Secret is required".into(),
			AuthMethod::Digest if self.public_key.is_empty() =>
				"API Key is being used but Public Key is required".into(),
			AuthMethod::Digest if self.private_key.is_empty() =>
				"API Key is being used but Private Key is required".into(),
			_ => String::new(),
		}
	}

	/// Fails with [`ConfigError::IncompleteCredentials`] when [`Credentials::errors`] is
	/// non-empty.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let message = self.errors();

		if message.is_empty() {
			Ok(())
		} else {
			Err(ConfigError::IncompleteCredentials { message })
		}
	}
}
impl Presence for Credentials {
	fn is_present(&self) -> bool {
		self.has_access_token() || self.has_service_account() || self.has_digest()
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("auth_method", &self.auth_method())
			.field("access_token_set", &self.has_access_token())
			.field("client_id", &self.client_id)
			.field("client_secret_set", &!self.client_secret.is_empty())
			.field("public_key", &self.public_key)
			.field("private_key_set", &!self.private_key.is_empty())
			.field("base_url", &self.base_url)
			.field("realm_base_url", &self.realm_base_url)
			.finish()
	}
}

/// Method-specific "is anything configured" check used by [`coalesce`].
pub trait Presence {
	/// Whether this candidate carries usable material.
	fn is_present(&self) -> bool;
}

/// Returns the first present candidate, in argument order.
///
/// Candidates are never merged; the result is one of the inputs or `None`.
pub fn coalesce<'a, T>(candidates: impl IntoIterator<Item = &'a T>) -> Option<&'a T>
where
	T: 'a + ?Sized + Presence,
{
	candidates.into_iter().find(|candidate| candidate.is_present())
}

/// Boxed future returned by [`AwsSecretFetcher::fetch`].
pub type CredentialsFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Credentials, SecretError>> + 'a + Send>>;

/// Retrieves API keys stored behind an AWS assume-role trust chain.
pub trait AwsSecretFetcher
where
	Self: Send + Sync,
{
	/// Fetches credentials described by `vars`.
	fn fetch(&self, vars: AwsVars) -> CredentialsFuture<'_>;
}
impl<F, Fut> AwsSecretFetcher for F
where
	F: Send + Sync + Fn(AwsVars) -> Fut,
	Fut: 'static + Send + Future<Output = Result<Credentials, SecretError>>,
{
	fn fetch(&self, vars: AwsVars) -> CredentialsFuture<'_> {
		Box::pin(self(vars))
	}
}

/// Resolves the credential set from provider configuration and environment snapshots.
///
/// When either source names an assume-role ARN (provider first), `fetcher` runs against that
/// descriptor and its failure is returned as-is. Otherwise the first source carrying any
/// credential material wins as a whole. Base URLs always fall back field by field, and a
/// configured base URL takes precedence over anything the fetched secret carries.
pub async fn get_credentials(
	provider_vars: &Vars,
	env_vars: &Vars,
	fetcher: &(impl ?Sized + AwsSecretFetcher),
) -> Result<Credentials, SecretError> {
	let provider_aws = provider_vars.aws_vars();
	let env_aws = env_vars.aws_vars();
	let mut credentials = match coalesce([&provider_aws, &env_aws]) {
		Some(aws) => fetch_secret(aws.clone(), fetcher).await?,
		None => {
			let provider_credentials = provider_vars.credentials();
			let env_credentials = env_vars.credentials();

			coalesce([&provider_credentials, &env_credentials]).cloned().unwrap_or_default()
		},
	};

	credentials.base_url =
		first_non_empty([&provider_vars.base_url, &env_vars.base_url, &credentials.base_url]);
	credentials.realm_base_url = first_non_empty([
		&provider_vars.realm_base_url,
		&env_vars.realm_base_url,
		&credentials.realm_base_url,
	]);

	Ok(credentials)
}

async fn fetch_secret(
	aws: AwsVars,
	fetcher: &(impl ?Sized + AwsSecretFetcher),
) -> Result<Credentials, SecretError> {
	let span = StageSpan::new(Stage::SecretFetch);

	obs::record_stage_outcome(Stage::SecretFetch, StageOutcome::Attempt);

	let result = span.instrument(fetcher.fetch(aws)).await;

	match &result {
		Ok(_) => obs::record_stage_outcome(Stage::SecretFetch, StageOutcome::Success),
		Err(e) => {
			tracing::error!(error = %e, "Secret manager credential retrieval failed.");
			obs::record_stage_outcome(Stage::SecretFetch, StageOutcome::Failure);
		},
	}

	result
}

fn first_non_empty<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
	values.into_iter().find(|value| !value.is_empty()).cloned().unwrap_or_default()
}
