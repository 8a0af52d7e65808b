//! Client configuration from the environment.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::{ApiError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:1337/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the REST API, including the `/api` prefix.
    pub api_url: String,
    pub timeout: Duration,
    /// Where credentials are persisted. In-memory when unset.
    pub credentials_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            credentials_path: None,
        }
    }
}

impl Config {
    /// Read `STRAPI_API_URL`, `STRAPI_TIMEOUT_SECS` and
    /// `STRAPI_CREDENTIALS_PATH`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url: String = try_load(&lookup, "STRAPI_API_URL", DEFAULT_API_URL)?;
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ApiError::Config(format!("STRAPI_API_URL is not an http(s) URL: {api_url}")));
        }
        let timeout_secs: u64 = try_load(&lookup, "STRAPI_TIMEOUT_SECS", &DEFAULT_TIMEOUT_SECS.to_string())?;
        let credentials_path = lookup("STRAPI_CREDENTIALS_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            api_url,
            timeout: Duration::from_secs(timeout_secs),
            credentials_path,
        })
    }
}

fn try_load<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| ApiError::Config(format!("invalid {key} value: {e}")))
}
