//! Client configuration.
//!
//! `ClientConfig` is read from a JSON file, then selected fields can be
//! overridden from the environment. The only secrets kept here are the
//! optional backend bearer token and AI key.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::{EngineSettings, DEFAULT_REMOTE_TIMEOUT};
use crate::queue::DEFAULT_MAX_REJECTIONS;
use crate::util::{normalize_base_url, normalize_text_option};

pub const ENV_API_URL: &str = "CHRONI_API_URL";
pub const ENV_API_TOKEN: &str = "CHRONI_API_TOKEN";
pub const ENV_PROBE_URL: &str = "CHRONI_PROBE_URL";
pub const ENV_AI_URL: &str = "CHRONI_AI_URL";
pub const ENV_AI_API_KEY: &str = "CHRONI_AI_API_KEY";
pub const ENV_OWNER_ID: &str = "CHRONI_OWNER_ID";

#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Journal backend; absent means local-only mode
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Sent as a bearer token on every backend request
    #[serde(default)]
    pub api_token: Option<String>,
    /// Reachability probe target; defaults to `api_base_url`
    #[serde(default)]
    pub probe_url: Option<String>,
    /// Account that owns new records
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub ai_base_url: Option<String>,
    #[serde(default)]
    pub ai_api_key: Option<String>,
    #[serde(default)]
    pub ai_model: Option<String>,
    #[serde(default)]
    pub remote_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_rejections: Option<u32>,
    /// Background resync period; absent disables periodic resync
    #[serde(default)]
    pub resync_interval_secs: Option<u64>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("probe_url", &self.probe_url)
            .field("owner_id", &self.owner_id)
            .field("ai_base_url", &self.ai_base_url)
            .field(
                "ai_api_key",
                &self.ai_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("ai_model", &self.ai_model)
            .field("remote_timeout_secs", &self.remote_timeout_secs)
            .field("max_rejections", &self.max_rejections)
            .field("resync_interval_secs", &self.resync_interval_secs)
            .finish()
    }
}

impl ClientConfig {
    /// Load from `path`. A missing file yields the default (local-only) config.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(error) => return Err(error.into()),
        };
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_str(contents)
            .map_err(|error| Error::Config(format!("invalid config file: {error}")))?;
        config.normalized()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `CHRONI_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (environment in production).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let overrides = [
            (ENV_API_URL, &mut self.api_base_url),
            (ENV_API_TOKEN, &mut self.api_token),
            (ENV_PROBE_URL, &mut self.probe_url),
            (ENV_AI_URL, &mut self.ai_base_url),
            (ENV_AI_API_KEY, &mut self.ai_api_key),
            (ENV_OWNER_ID, &mut self.owner_id),
        ];
        for (key, field) in overrides {
            if let Some(value) = normalize_text_option(lookup(key)) {
                *field = Some(value);
            }
        }
        self.normalized()
    }

    /// Trim values, drop empties and validate URLs.
    pub fn normalized(self) -> Result<Self> {
        Ok(Self {
            api_base_url: normalize_url_field(self.api_base_url, "api_base_url")?,
            api_token: normalize_text_option(self.api_token),
            probe_url: normalize_url_field(self.probe_url, "probe_url")?,
            owner_id: normalize_text_option(self.owner_id),
            ai_base_url: normalize_url_field(self.ai_base_url, "ai_base_url")?,
            ai_api_key: normalize_text_option(self.ai_api_key),
            ai_model: normalize_text_option(self.ai_model),
            remote_timeout_secs: self.remote_timeout_secs.filter(|secs| *secs > 0),
            max_rejections: self.max_rejections.filter(|max| *max > 0),
            resync_interval_secs: self.resync_interval_secs.filter(|secs| *secs > 0),
        })
    }

    /// True when a journal backend is configured.
    pub const fn has_remote(&self) -> bool {
        self.api_base_url.is_some()
    }

    /// Where the reachability probe should point.
    pub fn probe_base_url(&self) -> Option<&str> {
        self.probe_url.as_deref().or(self.api_base_url.as_deref())
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        self.resync_interval_secs.map(Duration::from_secs)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            remote_timeout: self
                .remote_timeout_secs
                .map_or(DEFAULT_REMOTE_TIMEOUT, Duration::from_secs),
            max_rejections: self.max_rejections.unwrap_or(DEFAULT_MAX_REJECTIONS),
            owner_id: self.owner_id.clone(),
        }
    }
}

fn normalize_url_field(raw: Option<String>, field: &str) -> Result<Option<String>> {
    let Some(value) = normalize_text_option(raw) else {
        return Ok(None);
    };
    normalize_base_url(&value)
        .map(Some)
        .ok_or_else(|| Error::Config(format!("'{field}' must include http:// or https://")))
}
