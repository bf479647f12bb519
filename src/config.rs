use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::host::Locale;
use crate::recording::RecorderConfig;
use crate::submission::SubmissionConfig;

/// Default config file, extension resolved by the `config` crate
pub const DEFAULT_CONFIG_PATH: &str = "config/kyc-capture";

/// Environment overrides look like `KYC__STORAGE__API_KEY`
pub const ENV_PREFIX: &str = "KYC";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "kyc-capture".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub recording_duration_secs: u64,
    pub video_content_type: String,
    /// Frames per second of the synthetic camera
    pub frame_rate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            recording_duration_secs: 10,
            video_content_type: "video/webm".to_string(),
            frame_rate: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL of the remote service; empty selects the in-memory service
    pub url: String,
    pub api_key: String,
    pub table: String,
    pub video_bucket: String,
    pub document_bucket: String,
    pub signed_url_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            table: "submissions".to_string(),
            video_bucket: "videos".to_string(),
            document_bucket: "passports".to_string(),
            signed_url_ttl_secs: 31_536_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// `/api/notify` endpoint the orchestrator posts to
    pub relay_url: Option<String>,
    /// Bot token used by the relay endpoint itself
    pub telegram_bot_token: Option<String>,
    pub admin_chat_id: Option<String>,
    pub default_locale: Locale,
    pub nats_url: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            telegram_bot_token: None,
            admin_chat_id: None,
            default_locale: Locale::Ru,
            nats_url: None,
        }
    }
}

impl Config {
    /// Load from `path` (optional file) layered with `KYC__*` variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn recorder(&self) -> RecorderConfig {
        RecorderConfig {
            duration: Duration::from_secs(self.capture.recording_duration_secs),
            content_type: self.capture.video_content_type.clone(),
        }
    }

    pub fn submission(&self) -> SubmissionConfig {
        SubmissionConfig {
            video_bucket: self.storage.video_bucket.clone(),
            document_bucket: self.storage.document_bucket.clone(),
            signed_url_ttl: Duration::from_secs(self.storage.signed_url_ttl_secs),
            admin_chat_id: self
                .notify
                .admin_chat_id
                .clone()
                .filter(|id| !id.trim().is_empty()),
        }
    }
}
