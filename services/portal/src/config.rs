//! services/portal/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use crate::adapters::firebase::FirebaseSettings;
use kids_learning_core::catalog::DEFAULT_PAGE_SIZE;
use kids_learning_core::{CachePolicy, PortalSettings};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which remote services back the portal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Firebase,
    /// Everything held in process memory; nothing survives a restart.
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firebase" => Ok(BackendKind::Firebase),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("'{}' is not one of firebase, memory", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub backend: BackendKind,
    /// Present whenever `backend` is `Firebase`.
    pub firebase: Option<FirebaseSettings>,
    pub lesson_page_size: usize,
    pub cache_ttl: Option<Duration>,
    pub cache_generation: u64,
    pub max_upload_bytes: usize,
    pub allowed_origin: String,
    /// Clients unseen for this long lose their portal.
    pub client_idle_timeout: Duration,
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = parse_var::<SocketAddr>("BIND_ADDRESS", &bind_address_str)?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin =
            lookup("ALLOWED_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(raw) => parse_var::<usize>("MAX_UPLOAD_BYTES", &raw)?,
            None => 10 * 1024 * 1024,
        };

        let client_idle_secs = match lookup("CLIENT_IDLE_SECS") {
            Some(raw) => parse_var::<u64>("CLIENT_IDLE_SECS", &raw)?,
            None => 30 * 60,
        };
        if client_idle_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "CLIENT_IDLE_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        // --- Backend Selection ---
        let backend = match lookup("PORTAL_BACKEND") {
            Some(raw) => parse_var::<BackendKind>("PORTAL_BACKEND", &raw)?,
            None => BackendKind::Firebase,
        };

        let firebase = match backend {
            BackendKind::Firebase => {
                let required = |name: &str| {
                    lookup(name)
                        .filter(|value| !value.trim().is_empty())
                        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
                };
                Some(FirebaseSettings {
                    api_key: required("FIREBASE_API_KEY")?,
                    project_id: required("FIREBASE_PROJECT_ID")?,
                    storage_bucket: required("FIREBASE_STORAGE_BUCKET")?,
                })
            }
            BackendKind::Memory => None,
        };

        // --- Catalog and Cache Settings ---
        let lesson_page_size = match lookup("LESSON_PAGE_SIZE") {
            Some(raw) => parse_var::<usize>("LESSON_PAGE_SIZE", &raw)?,
            None => DEFAULT_PAGE_SIZE,
        };
        if lesson_page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "LESSON_PAGE_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let cache_ttl = lookup("CACHE_TTL_SECS")
            .map(|raw| parse_var::<u64>("CACHE_TTL_SECS", &raw))
            .transpose()?
            .map(Duration::from_secs);

        let cache_generation = match lookup("CACHE_GENERATION") {
            Some(raw) => parse_var::<u64>("CACHE_GENERATION", &raw)?,
            None => 0,
        };

        Ok(Self {
            bind_address,
            log_level,
            backend,
            firebase,
            lesson_page_size,
            cache_ttl,
            cache_generation,
            max_upload_bytes,
            allowed_origin,
            client_idle_timeout: Duration::from_secs(client_idle_secs),
        })
    }

    /// The settings every client's `Portal` is built with.
    pub fn portal_settings(&self) -> PortalSettings {
        PortalSettings {
            cache_policy: CachePolicy {
                ttl: self.cache_ttl,
                generation: self.cache_generation,
            },
            page_size: self.lesson_page_size,
            ..PortalSettings::default()
        }
    }
}
