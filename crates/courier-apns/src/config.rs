//! APNs settings.
//!
//! Loaded in three layers, later layers winning:
//! 1. Compiled defaults ([`ApnsSettings::default`])
//! 2. A JSON file (`~/.courier/apns.json` unless a path is given); a missing
//!    file is not an error
//! 3. `COURIER_APNS_*` environment variables, e.g. `COURIER_APNS_TEAM_ID`

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use courier_core::SystemClock;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::credentials::Credentials;
use crate::dispatcher::{DEFAULT_MAX_CONCURRENCY, Dispatcher, DispatcherOptions};
use crate::token::DEFAULT_TOKEN_TTL;
use crate::transport::{DEFAULT_REQUEST_TIMEOUT, HttpTransport};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "COURIER_APNS_";

/// Errors loading settings or building a dispatcher from them.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A layer failed to parse or a value had the wrong type.
    #[error("failed to load APNs settings: {0}")]
    Load(#[from] Box<figment::Error>),
    /// Neither `private_key` nor `key_path` is set.
    #[error("no APNs private key configured (set private_key or key_path)")]
    MissingKey,
    /// The key file could not be read.
    #[error("failed to read APNs key at {path}: {reason}")]
    KeyRead {
        /// Key file path.
        path: String,
        /// Error description.
        reason: String,
    },
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// APNs connection and credential settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApnsSettings {
    /// Apple Developer Team ID.
    pub team_id: String,
    /// Auth key ID.
    pub key_id: String,
    /// App bundle identifier.
    pub bundle_id: String,
    /// Use the sandbox host.
    pub sandbox: bool,
    /// Path to the `.p8` key file. `~/` is expanded.
    pub key_path: Option<String>,
    /// Inline PEM key; takes precedence over `key_path`.
    pub private_key: Option<String>,
    /// Base URL override (proxies, tests).
    pub endpoint: Option<String>,
    /// Per-request timeout in seconds; 0 means the default.
    pub request_timeout_secs: u64,
    /// Maximum requests in flight per batch.
    pub max_concurrency: usize,
    /// Provider token reuse window in seconds; 0 mints per batch.
    pub token_ttl_secs: u64,
    /// Speak HTTP/2 without ALPN negotiation.
    pub http2_prior_knowledge: bool,
}

impl Default for ApnsSettings {
    fn default() -> Self {
        Self {
            team_id: String::new(),
            key_id: String::new(),
            bundle_id: String::new(),
            sandbox: false,
            key_path: None,
            private_key: None,
            endpoint: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            token_ttl_secs: DEFAULT_TOKEN_TTL.as_secs(),
            http2_prior_knowledge: true,
        }
    }
}

impl fmt::Debug for ApnsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApnsSettings")
            .field("team_id", &self.team_id)
            .field("key_id", &self.key_id)
            .field("bundle_id", &self.bundle_id)
            .field("sandbox", &self.sandbox)
            .field("key_path", &self.key_path)
            .field("endpoint", &self.endpoint)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_concurrency", &self.max_concurrency)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("http2_prior_knowledge", &self.http2_prior_knowledge)
            .finish_non_exhaustive()
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/root".to_string()))
}

/// Default settings file: `~/.courier/apns.json`.
pub fn settings_path() -> PathBuf {
    home_dir().join(".courier").join("apns.json")
}

/// The layered provider stack for `path`.
pub fn figment(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(ApnsSettings::default()))
        .merge(Json::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
}

/// Load settings from the default path.
pub fn load_settings() -> Result<ApnsSettings, ConfigError> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` plus environment overrides.
pub fn load_settings_from_path(path: &Path) -> Result<ApnsSettings, ConfigError> {
    debug!(?path, "loading APNs settings");
    let settings: ApnsSettings = figment(path).extract().map_err(Box::new)?;
    Ok(settings)
}

impl ApnsSettings {
    /// `key_path` with a leading `~/` expanded.
    pub fn resolved_key_path(&self) -> Option<PathBuf> {
        let path = self.key_path.as_deref()?;
        Some(match path.strip_prefix("~/") {
            Some(rest) => home_dir().join(rest),
            None => PathBuf::from(path),
        })
    }

    /// The PEM key, inline or read from disk.
    pub fn private_key_pem(&self) -> Result<String, ConfigError> {
        if let Some(pem) = self.private_key.as_deref().filter(|p| !p.trim().is_empty()) {
            return Ok(pem.to_string());
        }
        let path = self.resolved_key_path().ok_or(ConfigError::MissingKey)?;
        std::fs::read_to_string(&path).map_err(|e| ConfigError::KeyRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Credentials for the dispatcher.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Ok(Credentials {
            team_id: self.team_id.clone(),
            key_id: self.key_id.clone(),
            private_key: self.private_key_pem()?,
            bundle_id: self.bundle_id.clone(),
            sandbox: self.sandbox,
        })
    }

    /// Per-request timeout. `0` falls back to [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn request_timeout(&self) -> Duration {
        match self.request_timeout_secs {
            0 => DEFAULT_REQUEST_TIMEOUT,
            secs => Duration::from_secs(secs),
        }
    }

    /// Dispatcher tuning derived from these settings, on the system clock.
    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            endpoint: self.endpoint.clone(),
            max_concurrency: self.max_concurrency,
            token_ttl: Duration::from_secs(self.token_ttl_secs),
            clock: Arc::new(SystemClock),
        }
    }
}

impl Dispatcher {
    /// Build a dispatcher with a `reqwest` transport from settings.
    pub fn from_settings(settings: &ApnsSettings) -> Result<Self, ConfigError> {
        let credentials = settings.credentials()?;
        let transport = HttpTransport::new(settings.request_timeout(), settings.http2_prior_knowledge)?;

        info!(
            team_id = %settings.team_id,
            key_id = %settings.key_id,
            bundle_id = %settings.bundle_id,
            sandbox = settings.sandbox,
            "APNs dispatcher initialized"
        );

        Ok(Self::with_options(
            credentials,
            Arc::new(transport),
            settings.dispatcher_options(),
        ))
    }
}
