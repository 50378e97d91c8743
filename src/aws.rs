//! API key retrieval from AWS Secrets Manager behind an assumed IAM role.
//!
//! Static AWS keys authenticate an STS `AssumeRole` call against the resolved STS endpoint; the
//! temporary credentials then read the secret. Retries are disabled at this layer and every
//! failure is returned unchanged.

// crates.io
use aws_config::{
	BehaviorVersion, Region, SdkConfig, retry::RetryConfig, sts::AssumeRoleProvider,
};
use aws_credential_types::{Credentials as AwsCredentials, provider::ProvideCredentials};
// self
use crate::{
	_prelude::*,
	credentials::{AwsSecretFetcher, AwsVars, Credentials, CredentialsFuture},
	error::SecretError,
	sts::{self, DEFAULT_REGION},
};

const SESSION_NAME: &str = "atlas-transport";
const PROVIDER_NAME: &str = "atlas-transport-static";
const VERSION_STAGE: &str = "AWSCURRENT";

#[derive(Deserialize)]
struct SecretPayload {
	#[serde(default)]
	public_key: String,
	#[serde(default)]
	private_key: String,
}

/// [`AwsSecretFetcher`] backed by the AWS SDK.
#[derive(Clone, Copy, Debug, Default)]
pub struct SecretsManagerFetcher;
impl AwsSecretFetcher for SecretsManagerFetcher {
	fn fetch(&self, vars: AwsVars) -> CredentialsFuture<'_> {
		Box::pin(fetch_credentials(vars))
	}
}

/// Assumes the configured role and reads the API key pair stored in the named secret.
pub async fn fetch_credentials(vars: AwsVars) -> Result<Credentials, SecretError> {
	if vars.access_key_id.is_empty() || vars.secret_access_key.is_empty() {
		return Err(SecretError::StaticCredentials);
	}

	let region = match sts::mongodb_region_to_aws(&vars.region) {
		region if region.is_empty() => DEFAULT_REGION.to_owned(),
		region => region,
	};
	let endpoint = sts::resolve_sts_endpoint(&vars.endpoint, &region);
	let session_token = Some(vars.session_token.clone()).filter(|token| !token.is_empty());
	let static_credentials = AwsCredentials::new(
		vars.access_key_id.clone(),
		vars.secret_access_key.clone(),
		session_token,
		None,
		PROVIDER_NAME,
	);
	let sts_config = load_config(endpoint.signing_region.clone())
		.endpoint_url(&endpoint.url)
		.credentials_provider(static_credentials)
		.load()
		.await;
	let role = AssumeRoleProvider::builder(&vars.assume_role_arn)
		.session_name(SESSION_NAME)
		.configure(&sts_config)
		.build()
		.await;

	tracing::debug!(
		role_arn = %vars.assume_role_arn,
		sts_endpoint = %endpoint.url,
		signing_region = %endpoint.signing_region,
		"Assuming role for secret retrieval."
	);

	// Resolve eagerly so a rejected role surfaces as an assume-role failure.
	role.provide_credentials()
		.await
		.map_err(|e| SecretError::assume_role(&vars.assume_role_arn, e))?;

	let secrets_config = load_config(region).credentials_provider(role).load().await;
	let output = secrets_client(&secrets_config)
		.get_secret_value()
		.secret_id(&vars.secret_name)
		.version_stage(VERSION_STAGE)
		.send()
		.await
		.map_err(|e| SecretError::fetch(&vars.secret_name, e))?;
	let payload = output
		.secret_string()
		.ok_or_else(|| SecretError::EmptySecret { secret_name: vars.secret_name.clone() })?;

	decode_secret(payload)
}

/// Decodes a `{"public_key": …, "private_key": …}` payload into a digest credential set.
pub fn decode_secret(payload: &str) -> Result<Credentials, SecretError> {
	let de = &mut serde_json::Deserializer::from_str(payload);
	let secret: SecretPayload =
		serde_path_to_error::deserialize(de).map_err(|source| SecretError::Decode { source })?;

	if secret.public_key.is_empty() {
		return Err(SecretError::MissingField { field: "public_key" });
	}
	if secret.private_key.is_empty() {
		return Err(SecretError::MissingField { field: "private_key" });
	}

	Ok(Credentials {
		public_key: secret.public_key,
		private_key: secret.private_key,
		..Default::default()
	})
}

fn load_config(region: String) -> aws_config::ConfigLoader {
	aws_config::defaults(BehaviorVersion::latest())
		.region(Region::new(region))
		.retry_config(RetryConfig::disabled())
}

fn secrets_client(config: &SdkConfig) -> aws_sdk_secretsmanager::Client {
	aws_sdk_secretsmanager::Client::new(config)
}
