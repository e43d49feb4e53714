use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ShelfError;

pub const DEFAULT_CONFIG_FILE: &str = "shelf-shuffler.json";
pub const DEFAULT_BASE_URL: &str = "https://boardgamegeek.com/xmlapi2";
pub const DEFAULT_USER_AGENT: &str = "ShelfShuffler (Board Game Collection App)";
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;
pub const DEFAULT_CHUNK_SIZE: usize = 20;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub const API_KEY_ENV: &str = "BGG_API_KEY";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first request; total requests are `max_retries + 1`.
    pub max_retries: u32,
    /// Fixed wait between polls.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub base_url: String,
    pub user_agent: String,
    pub api_token: Option<String>,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            api_token: None,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub upstream: UpstreamSettings,
    pub chunk_size: usize,
    pub cache_dir: Option<PathBuf>,
    pub listen: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file and applies defaults plus the environment.
    ///
    /// Without an explicit path a missing `shelf-shuffler.json` simply means
    /// defaults; an explicit path that cannot be read is an error.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ShelfError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ShelfError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ShelfError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ShelfError> {
        let env_token = std::env::var(API_KEY_ENV).ok();
        Self::resolve_with_token(config, env_token)
    }

    pub fn resolve_with_token(
        config: Config,
        env_token: Option<String>,
    ) -> Result<ResolvedConfig, ShelfError> {
        let chunk_size = config.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(ShelfError::ConfigParse(
                "chunk_size must be at least 1".to_string(),
            ));
        }

        let api_token = non_blank(env_token).or_else(|| non_blank(config.api_token));

        let base_url = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let upstream = UpstreamSettings {
            base_url,
            user_agent: config
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            api_token,
            retry: RetryPolicy {
                max_retries: config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                delay: Duration::from_millis(
                    config.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
                ),
            },
            request_timeout: Duration::from_secs(
                config
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        };

        Ok(ResolvedConfig {
            upstream,
            chunk_size,
            cache_dir: config.cache_dir,
            listen: config.listen.unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
