//! Environment configuration for the stores and the mirror.

use std::time::Duration;

use bienestar_core::sync::{
    MirrorMode, MirrorOptions, RetryPolicy, DEFAULT_DATABASE, MIRROR_COLLECTION_TIMEOUT_SECS,
};
use bienestar_core::{Error, Result};

pub const SOURCE_URI_ENV: &str = "MONGO_ATLAS_URI";
pub const DESTINATION_URI_ENV: &str = "COSMOSDB_URI";
pub const DATABASE_ENV: &str = "BIENESTAR_DATABASE";
pub const MIRROR_MODE_ENV: &str = "MIRROR_MODE";
pub const MIRROR_COLLECTION_TIMEOUT_ENV: &str = "MIRROR_COLLECTION_TIMEOUT_SECS";
pub const MIRROR_MAX_ATTEMPTS_ENV: &str = "MIRROR_MAX_ATTEMPTS";
pub const MIRROR_INTERVAL_ENV: &str = "MIRROR_INTERVAL_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub source_uri: Option<String>,
    pub destination_uri: Option<String>,
    pub database: String,
    pub mode: MirrorMode,
    pub collection_timeout_secs: u64,
    pub max_attempts: u32,
    /// Background mirror period for the server. `None` disables the loop.
    pub interval_secs: Option<u64>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source_uri: None,
            destination_uri: None,
            database: DEFAULT_DATABASE.to_string(),
            mode: MirrorMode::default(),
            collection_timeout_secs: MIRROR_COLLECTION_TIMEOUT_SECS,
            max_attempts: RetryPolicy::default().max_attempts,
            interval_secs: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} must be a positive integer, got '{}'", key, raw))),
    }
}

/// Settings come from the process environment only. Deployments that kept
/// them in a `.env` file must export them before starting.
fn missing_variable(key: &str) -> Error {
    Error::Config(format!(
        "{} is not set; export it in the environment (a .env file is not read)",
        key
    ))
}

impl MirrorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads every setting through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));
        let defaults = Self::default();

        let mode = match get(MIRROR_MODE_ENV) {
            Some(raw) => raw.parse::<MirrorMode>().map_err(Error::Config)?,
            None => defaults.mode,
        };
        let collection_timeout_secs =
            parse_number::<u64>(MIRROR_COLLECTION_TIMEOUT_ENV, get(MIRROR_COLLECTION_TIMEOUT_ENV))?
                .unwrap_or(defaults.collection_timeout_secs);
        let max_attempts = parse_number::<u32>(MIRROR_MAX_ATTEMPTS_ENV, get(MIRROR_MAX_ATTEMPTS_ENV))?
            .unwrap_or(defaults.max_attempts);
        let interval_secs = parse_number::<u64>(MIRROR_INTERVAL_ENV, get(MIRROR_INTERVAL_ENV))?;

        if collection_timeout_secs == 0 {
            return Err(Error::Config(format!(
                "{} must be greater than zero",
                MIRROR_COLLECTION_TIMEOUT_ENV
            )));
        }
        if interval_secs == Some(0) {
            return Err(Error::Config(format!(
                "{} must be greater than zero",
                MIRROR_INTERVAL_ENV
            )));
        }

        Ok(Self {
            source_uri: get(SOURCE_URI_ENV),
            destination_uri: get(DESTINATION_URI_ENV),
            database: get(DATABASE_ENV).unwrap_or(defaults.database),
            mode,
            collection_timeout_secs,
            max_attempts: max_attempts.max(1),
            interval_secs,
        })
    }

    pub fn require_source_uri(&self) -> Result<&str> {
        self.source_uri
            .as_deref()
            .ok_or_else(|| missing_variable(SOURCE_URI_ENV))
    }

    pub fn require_destination_uri(&self) -> Result<&str> {
        self.destination_uri
            .as_deref()
            .ok_or_else(|| missing_variable(DESTINATION_URI_ENV))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            ..RetryPolicy::default()
        }
    }

    pub fn mirror_options(&self) -> MirrorOptions {
        MirrorOptions {
            mode: self.mode,
            retry: self.retry_policy(),
            collection_timeout: Duration::from_secs(self.collection_timeout_secs),
        }
    }
}
