use crate::string_util::StringUtil;
use reqwest::Client;
use std::time::Duration;

/// HTTP client settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientSettings {
    /// Whole-request timeout, including reading the body.
    pub timeout: Duration,
    /// Skip TLS certificate verification.
    pub tls_no_verify: bool,
}

impl HttpClientSettings {
    /// The environment variable name for configuring the HTTP timeout in seconds.
    pub const HTTP_TIMEOUT_ENV: &'static str = "RECIPE_RUNNER_HTTP_TIMEOUT";
    /// The environment variable name for disabling TLS verification.
    pub const TLS_NO_VERIFY_ENV: &'static str = "RECIPE_RUNNER_TLS_NO_VERIFY";

    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
    /// Minimum allowed timeout in seconds.
    pub const MIN_TIMEOUT_SECS: u64 = 30;
    /// Maximum allowed timeout in seconds.
    pub const MAX_TIMEOUT_SECS: u64 = 3600;

    /// Read the settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var(Self::HTTP_TIMEOUT_ENV).ok().as_deref(),
            std::env::var(Self::TLS_NO_VERIFY_ENV).ok().as_deref(),
        )
    }

    /// Build settings from raw variable values.
    ///
    /// The timeout is clamped to `[30, 3600]` seconds and defaults to 600 if
    /// unset or invalid.
    pub fn from_values(timeout: Option<&str>, tls_no_verify: Option<&str>) -> Self {
        let secs = timeout
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(Self::DEFAULT_TIMEOUT_SECS)
            .clamp(Self::MIN_TIMEOUT_SECS, Self::MAX_TIMEOUT_SECS);
        let tls_no_verify = tls_no_verify
            .and_then(StringUtil::convert_to_bool)
            .unwrap_or(false);

        Self {
            timeout: Duration::from_secs(secs),
            tls_no_verify,
        }
    }
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        Self::from_values(None, None)
    }
}

/// HTTP client construction.
pub struct HttpUtil;

impl HttpUtil {
    /// Maximum number of redirects followed by a client.
    pub const MAX_REDIRECTS: usize = 10;

    /// The `User-Agent` sent with every request.
    pub fn user_agent() -> String {
        format!("RecipeRunner/{}", crate::build_constants::Package::VERSION)
    }

    /// Create a `reqwest::Client` following redirects, with the configured
    /// timeout and TLS policy.
    ///
    /// Fails when the TLS backend cannot be initialized, in which case callers
    /// treat the client transport as unavailable.
    pub fn create_http_client(settings: &HttpClientSettings) -> reqwest::Result<Client> {
        Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(settings.tls_no_verify)
            .redirect(reqwest::redirect::Policy::limited(Self::MAX_REDIRECTS))
            .user_agent(Self::user_agent())
            .build()
    }
}
