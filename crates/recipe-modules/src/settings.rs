use recipe_sdk::{HttpClientSettings, StringUtil};

/// Environment variable that forces downloads onto the fallback transport.
pub const DISABLE_HTTP_CLIENT_ENV: &str = "RECIPE_RUNNER_DISABLE_HTTP_CLIENT";

/// Construction-time options for the standard modules.
#[derive(Debug, Clone)]
pub struct ModuleSettings {
    /// Prefer the streaming HTTP client transport for downloads when it is
    /// available.
    pub enable_http_client: bool,
    pub http: HttpClientSettings,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            enable_http_client: true,
            http: HttpClientSettings::default(),
        }
    }
}

impl ModuleSettings {
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var(DISABLE_HTTP_CLIENT_ENV).ok().as_deref(),
            HttpClientSettings::from_env(),
        )
    }

    /// `disable_http_client` is parsed as a boolean string; anything that is
    /// not recognized keeps the client enabled.
    pub fn from_values(disable_http_client: Option<&str>, http: HttpClientSettings) -> Self {
        let disabled = disable_http_client
            .and_then(StringUtil::convert_to_bool)
            .unwrap_or(false);
        Self {
            enable_http_client: !disabled,
            http,
        }
    }

    pub fn without_http_client(mut self) -> Self {
        self.enable_http_client = false;
        self
    }
}
