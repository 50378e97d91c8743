//! Client assembly: credential resolution, transport chain construction, and untyped API calls.

// self
use crate::{
	_prelude::*,
	credentials::{self, ActiveCredentials, AuthMethod, AwsSecretFetcher, Credentials, Vars},
	error::{ApiError, ConfigError, TransportError},
	obs::{self, Stage, StageOutcome, StageSpan},
	token::{ServiceAccountTokenProvider, StaticTokenSource},
	transport::{
		BearerTransport, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, DigestTransport, HttpRequest,
		HttpResponse, HttpTransport, NetworkLoggingTransport, ReqwestTransport, RequestDeadline,
		RetryTransport, UserAgentTransport,
	},
};

/// Commercial cloud API base URL.
pub const DEFAULT_BASE_URL: &str = "https://cloud.mongodb.com/";
/// Government cloud API base URL.
pub const GOV_BASE_URL: &str = "https://cloud.mongodbgov.com/";
/// Product token leading every `User-Agent` header.
pub const USER_AGENT_PRODUCT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const REALM_ADMIN_PATH: &str = "api/admin/v3.0/";
const REALM_LOGIN_PATH: &str = "auth/providers/mongodb-cloud/login";

/// `Name/Version` pair appended to the base `User-Agent`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformVersion {
	/// Platform or tool name.
	pub name: String,
	/// Its version.
	pub version: String,
}
impl PlatformVersion {
	/// Creates a new pair.
	pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
		Self { name: name.into(), version: version.into() }
	}
}

/// Realm admin API roots derived from the secondary base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RealmEndpoints {
	/// `<realm base>/api/admin/v3.0/`.
	pub admin_url: Url,
	/// API key login endpoint exchanging the key pair for a Realm session.
	pub login_url: Url,
}

/// Tunables applied when assembling an [`AtlasClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
	/// Retries after the first attempt for transient network errors.
	pub max_retries: u32,
	/// Base backoff; attempt `n` waits `retry_delay * 2^n`.
	pub retry_delay: Duration,
	/// Enables the network logging node.
	pub network_logging: bool,
	/// Enables the User-Agent augmentation node.
	pub user_agent_extra: bool,
	/// Per-attempt timeout enforced by the HTTP client.
	pub request_timeout: Option<Duration>,
	/// Overall deadline per logical request, retries included.
	pub request_deadline: Option<Duration>,
	/// Selects the government cloud when no base URL is configured.
	pub gov_cloud: bool,
	/// Extra `Name/Version` pairs for the base `User-Agent`.
	pub platforms: Vec<PlatformVersion>,
}
impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			max_retries: DEFAULT_MAX_RETRIES,
			retry_delay: DEFAULT_RETRY_DELAY,
			network_logging: true,
			user_agent_extra: true,
			request_timeout: None,
			request_deadline: None,
			gov_cloud: false,
			platforms: Vec::new(),
		}
	}
}
impl ClientConfig {
	/// Overrides the retry budget and base backoff.
	pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
		self.max_retries = max_retries;
		self.retry_delay = retry_delay;

		self
	}

	/// Toggles the network logging node.
	pub fn with_network_logging(mut self, enabled: bool) -> Self {
		self.network_logging = enabled;

		self
	}

	/// Toggles the User-Agent augmentation node.
	pub fn with_user_agent_extra(mut self, enabled: bool) -> Self {
		self.user_agent_extra = enabled;

		self
	}

	/// Sets the per-attempt HTTP timeout.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = Some(timeout);

		self
	}

	/// Sets the overall deadline applied to each logical request.
	pub fn with_request_deadline(mut self, deadline: Duration) -> Self {
		self.request_deadline = Some(deadline);

		self
	}

	/// Targets the government cloud when no base URL is configured.
	pub fn with_gov_cloud(mut self, gov_cloud: bool) -> Self {
		self.gov_cloud = gov_cloud;

		self
	}

	/// Appends a `Name/Version` pair to the base `User-Agent`.
	pub fn with_platform(mut self, platform: PlatformVersion) -> Self {
		self.platforms.push(platform);

		self
	}
}

/// Parameters of an untyped API call.
#[derive(Clone, Debug)]
pub struct ApiCallParams<'a> {
	/// Versioned media type sent as both `Content-Type` and `Accept`.
	pub version_header: &'a str,
	/// Path relative to the base URL; `{name}` placeholders are filled from `path_params`.
	pub relative_path: &'a str,
	/// Placeholder values, percent-encoded on substitution.
	pub path_params: BTreeMap<String, String>,
	/// HTTP method.
	pub method: http::Method,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody {
	detail: Option<String>,
	error_code: Option<String>,
	reason: Option<String>,
}

/// Builder for [`AtlasClient`] from an already resolved credential set.
pub struct ClientBuilder {
	credentials: Credentials,
	config: ClientConfig,
	base_transport: Option<Arc<dyn HttpTransport>>,
	token_provider: Option<Arc<ServiceAccountTokenProvider>>,
}
impl ClientBuilder {
	/// Replaces the default [`ClientConfig`].
	pub fn config(mut self, config: ClientConfig) -> Self {
		self.config = config;

		self
	}

	/// Overrides the innermost transport, which otherwise is a fresh [`ReqwestTransport`].
	pub fn base_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
		self.base_transport = Some(transport);

		self
	}

	/// Shares a service account token provider across clients.
	pub fn token_provider(mut self, provider: Arc<ServiceAccountTokenProvider>) -> Self {
		self.token_provider = Some(provider);

		self
	}

	/// Validates the credentials and assembles the transport chain.
	///
	/// The service account method performs one eager token exchange here.
	pub async fn build(self) -> Result<AtlasClient> {
		let Self { credentials, config, base_transport, token_provider } = self;

		{
			let _span = StageSpan::new(Stage::Credentials).entered();

			obs::record_stage_outcome(Stage::Credentials, StageOutcome::Attempt);

			let warnings = credentials.warnings();

			if !warnings.is_empty() {
				tracing::warn!(auth_method = %credentials.auth_method(), "{warnings}");
			}
			if let Err(e) = credentials.validate() {
				obs::record_stage_outcome(Stage::Credentials, StageOutcome::Failure);

				return Err(e.into());
			}

			obs::record_stage_outcome(Stage::Credentials, StageOutcome::Success);
		}

		let default_base = if config.gov_cloud { GOV_BASE_URL } else { DEFAULT_BASE_URL };
		let base_url = parse_base_url(
			if credentials.base_url.is_empty() { default_base } else { credentials.base_url.as_str() },
			"base",
		)?;
		let realm_base_url =
			if credentials.base_url.is_empty() || credentials.realm_base_url.is_empty() {
				None
			} else {
				Some(parse_base_url(&credentials.realm_base_url, "realm base")?)
			};
		let base: Arc<dyn HttpTransport> = match base_transport {
			Some(transport) => transport,
			None => Arc::new(ReqwestTransport::build(config.request_timeout)?),
		};
		let authenticated: Arc<dyn HttpTransport> = match credentials.active() {
			ActiveCredentials::Unknown => Arc::clone(&base),
			ActiveCredentials::AccessToken(token) => Arc::new(BearerTransport::new(
				Arc::clone(&base),
				Arc::new(StaticTokenSource::new(token)),
			)),
			ActiveCredentials::ServiceAccount { client_id, client_secret } => {
				let provider = token_provider.unwrap_or_default();
				let source = provider
					.token_source(client_id, client_secret, base_url.as_str(), Arc::clone(&base))
					.await?;

				Arc::new(BearerTransport::new(Arc::clone(&base), source))
			},
			ActiveCredentials::Digest { public_key, private_key } =>
				Arc::new(DigestTransport::new(Arc::clone(&base), public_key, private_key)),
		};
		let chain = UserAgentTransport::new(
			NetworkLoggingTransport::new(
				RetryTransport::new(authenticated, config.max_retries, config.retry_delay),
				config.network_logging,
			),
			config.user_agent_extra,
		);
		let user_agent = config.platforms.iter().fold(USER_AGENT_PRODUCT.to_owned(), |acc, p| {
			format!("{acc} {}/{}", p.name, p.version)
		});

		tracing::info!(
			auth_method = %credentials.auth_method(),
			base_url = %base_url,
			"Atlas client assembled."
		);

		Ok(AtlasClient {
			transport: Arc::new(chain),
			auth_method: credentials.auth_method(),
			base_url,
			realm_base_url,
			user_agent,
			request_deadline: config.request_deadline,
		})
	}
}
impl Debug for ClientBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientBuilder")
			.field("credentials", &self.credentials)
			.field("config", &self.config)
			.field("custom_base_transport", &self.base_transport.is_some())
			.field("shared_token_provider", &self.token_provider.is_some())
			.finish()
	}
}

/// Ready-to-use API client wrapping the assembled transport chain.
#[derive(Clone)]
pub struct AtlasClient {
	transport: Arc<dyn HttpTransport>,
	auth_method: AuthMethod,
	base_url: Url,
	realm_base_url: Option<Url>,
	user_agent: String,
	request_deadline: Option<Duration>,
}
impl AtlasClient {
	/// Starts building a client for an already resolved credential set.
	pub fn builder(credentials: Credentials) -> ClientBuilder {
		ClientBuilder {
			credentials,
			config: ClientConfig::default(),
			base_transport: None,
			token_provider: None,
		}
	}

	/// Resolves credentials from both sources and assembles a client.
	pub async fn connect(
		provider_vars: &Vars,
		env_vars: &Vars,
		fetcher: &(impl ?Sized + AwsSecretFetcher),
		config: ClientConfig,
	) -> Result<Self> {
		let credentials = credentials::get_credentials(provider_vars, env_vars, fetcher).await?;

		Self::builder(credentials).config(config).build().await
	}

	/// Authentication method selected at assembly.
	pub fn auth_method(&self) -> AuthMethod {
		self.auth_method
	}

	/// API base URL, always ending with `/`.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Base `User-Agent` set on requests that carry none.
	pub fn user_agent(&self) -> &str {
		&self.user_agent
	}

	/// Realm admin endpoints for clients authenticated with the API key pair.
	///
	/// `None` unless both a custom base URL and a realm base URL are configured, in which case
	/// the Realm SDK defaults apply.
	pub fn realm_endpoints(&self) -> Result<Option<RealmEndpoints>, ConfigError> {
		if self.auth_method != AuthMethod::Digest {
			return Err(ConfigError::RealmRequiresApiKey);
		}

		let Some(base) = &self.realm_base_url else { return Ok(None) };
		let invalid = |source| ConfigError::InvalidUrl { field: "realm base", source };
		let admin_url = base.join(REALM_ADMIN_PATH).map_err(invalid)?;
		let login_url = admin_url.join(REALM_LOGIN_PATH).map_err(invalid)?;

		Ok(Some(RealmEndpoints { admin_url, login_url }))
	}

	/// The assembled chain, for callers that drive requests themselves.
	pub fn transport(&self) -> Arc<dyn HttpTransport> {
		Arc::clone(&self.transport)
	}

	/// Sends `request` through the chain.
	///
	/// Sets the base `User-Agent` and the configured deadline when the request has none.
	pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, TransportError> {
		if !request.headers().contains_key(http::header::USER_AGENT) {
			let value =
				http::HeaderValue::from_str(&self.user_agent).map_err(TransportError::request)?;

			request.headers_mut().insert(http::header::USER_AGENT, value);
		}
		if let Some(deadline) = self.request_deadline
			&& request.extensions().get::<RequestDeadline>().is_none()
		{
			request.extensions_mut().insert(RequestDeadline::after(deadline));
		}

		let result = self.transport.round_trip(request).await;

		obs::record_request_outcome(if result.is_ok() {
			StageOutcome::Success
		} else {
			StageOutcome::Failure
		});

		result
	}

	/// Calls an API path without a typed SDK.
	///
	/// Statuses of `300` and above become [`ApiError`]s decoded from the JSON error body.
	pub async fn call(&self, params: &ApiCallParams<'_>, body: Option<Vec<u8>>) -> Result<HttpResponse> {
		let url = self.resolve_path(params.relative_path, &params.path_params)?;
		let request = http::Request::builder()
			.method(params.method.clone())
			.uri(url.as_str())
			.header(http::header::CONTENT_TYPE, params.version_header)
			.header(http::header::ACCEPT, params.version_header)
			.body(body.unwrap_or_default())
			.map_err(ConfigError::from)?;
		let response = self.send(request).await?;

		if response.status().as_u16() >= 300 {
			return Err(api_error(&params.method, url.path(), &response).into());
		}

		Ok(response)
	}

	fn resolve_path(
		&self,
		relative_path: &str,
		path_params: &BTreeMap<String, String>,
	) -> Result<Url, ConfigError> {
		let (path, query) = match relative_path.split_once('?') {
			Some((path, query)) => (path, Some(query)),
			None => (relative_path, None),
		};
		let mut url = self.base_url.clone();

		{
			let mut segments = url.path_segments_mut().map_err(|_| ConfigError::InvalidUrl {
				field: "base",
				source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
			})?;

			segments.pop_if_empty();

			for segment in path.split('/').filter(|segment| !segment.is_empty()) {
				segments.push(&expand_segment(segment, path_params)?);
			}
		}

		url.set_query(query);

		Ok(url)
	}
}
impl Debug for AtlasClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AtlasClient")
			.field("auth_method", &self.auth_method)
			.field("base_url", &self.base_url.as_str())
			.field("realm_base_url", &self.realm_base_url.as_ref().map(Url::as_str))
			.field("user_agent", &self.user_agent)
			.finish_non_exhaustive()
	}
}

fn parse_base_url(raw: &str, field: &'static str) -> Result<Url, ConfigError> {
	let mut url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { field, source })?;

	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	Ok(url)
}

/// Replaces every `{name}` in `segment` with its parameter value.
fn expand_segment(
	segment: &str,
	path_params: &BTreeMap<String, String>,
) -> Result<String, ConfigError> {
	let mut expanded = String::with_capacity(segment.len());
	let mut rest = segment;

	while let Some(start) = rest.find('{') {
		let Some(len) = rest[start..].find('}') else { break };
		let name = &rest[start + 1..start + len];
		let value = path_params
			.get(name)
			.ok_or_else(|| ConfigError::MissingPathParam { name: name.to_owned() })?;

		expanded.push_str(&rest[..start]);
		expanded.push_str(value);

		rest = &rest[start + len + 1..];
	}

	expanded.push_str(rest);

	Ok(expanded)
}

fn api_error(method: &http::Method, path: &str, response: &HttpResponse) -> ApiError {
	let decoded = serde_json::from_slice::<ApiErrorBody>(response.body()).ok();
	let (error_code, detail) = match decoded {
		Some(body) => (body.error_code, body.detail.or(body.reason)),
		None => (None, None),
	};

	ApiError {
		status: response.status().as_u16(),
		method: method.to_string(),
		path: path.to_owned(),
		error_code,
		detail,
		body: response.body().clone(),
	}
}
