use dotenv::dotenv;
use std::env;
use std::time::Duration;
use tracing::error;

use crate::error::{Error, Result};
use crate::rate_limit::ResetClock;
use crate::retry::RetryPolicy;

pub const DEFAULT_HOST: &str = "https://api.unsplash.com";
pub const DEFAULT_SEARCH_PATH: &str = "/search/photos";
pub const DEFAULT_TRACK_DOWNLOAD_PATH: &str = "/photos/:id/download";
/// Largest page the API will serve.
pub const DEFAULT_MAX_PER_PAGE: usize = 30;
pub const DEFAULT_LIMIT: usize = 10;

pub const API_KEY_ENV: &str = "UNSPLASH_ACCESS_KEY";
pub const HOST_ENV: &str = "UNSPLASH_API_HOST";

/// Settings for an [`crate::UnsplashSearcher`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme and host, e.g. `https://api.unsplash.com`
    pub host: String,
    pub search_path: String,
    /// Path template; `:id` is replaced with the photo id
    pub track_download_path: String,
    pub api_key: String,
    /// Authorization scheme placed before the key
    pub auth_scheme: String,
    /// Name of the results collection in search responses
    pub results_key: String,
    /// Default total result count
    pub limit: usize,
    /// Starting record offset for searches
    pub offset: usize,
    pub max_per_page: usize,
    /// Per-request transport timeout
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub reset_clock: ResetClock,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            track_download_path: DEFAULT_TRACK_DOWNLOAD_PATH.to_string(),
            api_key: String::new(),
            auth_scheme: "Client-ID".to_string(),
            results_key: "results".to_string(),
            limit: DEFAULT_LIMIT,
            offset: 0,
            max_per_page: DEFAULT_MAX_PER_PAGE,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            reset_clock: ResetClock::default(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Load settings from the environment (and a `.env` file, if any).
    ///
    /// The API key is read from `UNSPLASH_ACCESS_KEY`; `UNSPLASH_API_HOST`
    /// optionally overrides the host.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from any variable source, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = match lookup(API_KEY_ENV) {
            Some(key) if !key.trim().is_empty() => key.trim().to_string(),
            _ => {
                error!("{} not provided or found in environment", API_KEY_ENV);
                return Err(Error::MissingApiKey);
            }
        };

        let mut config = Self {
            api_key,
            ..Self::default()
        };
        if let Some(host) = lookup(HOST_ENV) {
            if !host.trim().is_empty() {
                config.host = host.trim().to_string();
            }
        }
        Ok(config)
    }

    /// Reject values the pagination and retry logic cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(Error::invalid_config("limit", "must be at least 1"));
        }
        if self.max_per_page == 0 {
            return Err(Error::invalid_config("max_per_page", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::invalid_config("retry.max_attempts", "must be at least 1"));
        }
        if self.results_key.is_empty() {
            return Err(Error::invalid_config("results_key", "must not be empty"));
        }
        Ok(())
    }
}

/// Builder for [`ClientConfig`]
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn search_path(mut self, path: impl Into<String>) -> Self {
        self.config.search_path = path.into();
        self
    }

    pub fn track_download_path(mut self, path: impl Into<String>) -> Self {
        self.config.track_download_path = path.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.config.auth_scheme = scheme.into();
        self
    }

    pub fn results_key(mut self, key: impl Into<String>) -> Self {
        self.config.results_key = key.into();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.config.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.config.offset = offset;
        self
    }

    pub fn max_per_page(mut self, max_per_page: usize) -> Self {
        self.config.max_per_page = max_per_page;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.config.retry = RetryPolicy::new(max_attempts, delay);
        self
    }

    pub fn reset_clock(mut self, clock: ResetClock) -> Self {
        self.config.reset_clock = clock;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
