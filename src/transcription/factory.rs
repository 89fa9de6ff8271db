//! # Provider Factory
//!
//! The only bridge between configuration and the transcription core.
//!
//! Construction happens in two steps:
//! 1. [`ProviderFactory::resolve`] checks a [`ProviderConfig`] and turns it
//!    into a [`ProviderPlan`]. Pure, no I/O.
//! 2. [`ProviderFactory::build`] performs the one-time construction (model
//!    download and load, or HTTP client setup).
//!
//! Neither step keeps global state, so the factory can be invoked again with
//! any valid configuration.

use crate::config::ProviderConfig;
use crate::device::{DeviceManager, DevicePreference};
use crate::transcription::local::LocalWhisperProvider;
use crate::transcription::model::ModelSize;
use crate::transcription::provider::TranscriptionProvider;
use crate::transcription::remote::{RemoteApiProvider, DEFAULT_TIMEOUT_SECS};
use std::sync::Arc;
use std::time::Duration;

/// Provider type selecting the in-process Whisper model.
pub const LOCAL_PROVIDER: &str = "local";

/// Provider type selecting the remote transcription API.
pub const API_PROVIDER: &str = "api";

/// Unrecognized or incomplete provider configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("provider type is not set (expected \"local\" or \"api\")")]
    MissingProviderType,
    #[error("unknown provider type: {0}")]
    UnknownProviderType(String),
    #[error("provider \"{provider}\" requires field `{field}`")]
    MissingField {
        provider: &'static str,
        field: &'static str,
    },
    #[error("provider \"{provider}\" does not accept field `{field}`")]
    UnexpectedField {
        provider: &'static str,
        field: &'static str,
    },
    #[error("invalid model size: {0}")]
    InvalidModelSize(String),
    #[error("invalid device: {0}")]
    InvalidDevice(String),
    #[error("invalid api url \"{0}\": must start with http:// or https://")]
    InvalidUrl(String),
    #[error("timeout_secs must be greater than 0")]
    InvalidTimeout,
    #[error("failed to load local model: {0}")]
    ModelLoad(String),
    #[error("failed to create http client: {0}")]
    HttpClient(String),
}

/// A validated description of the provider to build.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderPlan {
    Local {
        model_size: ModelSize,
        device: DevicePreference,
    },
    Api {
        api_key: String,
        url: String,
        model: Option<String>,
        timeout: Duration,
    },
}

pub struct ProviderFactory;

impl ProviderFactory {
    /// Resolve and build in one go.
    pub async fn create(
        config: &ProviderConfig,
    ) -> Result<Arc<dyn TranscriptionProvider>, ConfigurationError> {
        let plan = Self::resolve(config)?;
        Self::build(plan).await
    }

    /// Validate `config` and pick the provider variant.
    ///
    /// Exactly the fields required by the type must be present: a local
    /// provider rejects `api_key`/`url`, an api provider rejects
    /// `model_size`.
    pub fn resolve(config: &ProviderConfig) -> Result<ProviderPlan, ConfigurationError> {
        let kind = config
            .kind
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigurationError::MissingProviderType)?;

        match kind {
            LOCAL_PROVIDER => {
                reject_field(LOCAL_PROVIDER, "api_key", &config.api_key)?;
                reject_field(LOCAL_PROVIDER, "url", &config.url)?;
                reject_field(LOCAL_PROVIDER, "model", &config.model)?;
                let model_size = require_field(LOCAL_PROVIDER, "model_size", &config.model_size)?;
                let model_size = model_size
                    .parse::<ModelSize>()
                    .map_err(|_| ConfigurationError::InvalidModelSize(model_size.to_string()))?;
                let device = match config.device.as_deref() {
                    Some(device) => device
                        .parse::<DevicePreference>()
                        .map_err(|_| ConfigurationError::InvalidDevice(device.to_string()))?,
                    None => DevicePreference::default(),
                };
                Ok(ProviderPlan::Local { model_size, device })
            }
            API_PROVIDER => {
                reject_field(API_PROVIDER, "model_size", &config.model_size)?;
                reject_field(API_PROVIDER, "device", &config.device)?;
                let api_key = require_field(API_PROVIDER, "api_key", &config.api_key)?;
                let url = require_field(API_PROVIDER, "url", &config.url)?.trim();
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ConfigurationError::InvalidUrl(url.to_string()));
                }
                let timeout_secs = config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
                if timeout_secs == 0 {
                    return Err(ConfigurationError::InvalidTimeout);
                }
                Ok(ProviderPlan::Api {
                    api_key: api_key.to_string(),
                    url: url.to_string(),
                    model: config.model.clone(),
                    timeout: Duration::from_secs(timeout_secs),
                })
            }
            other => Err(ConfigurationError::UnknownProviderType(other.to_string())),
        }
    }

    /// Construct the provider described by `plan`.
    pub async fn build(
        plan: ProviderPlan,
    ) -> Result<Arc<dyn TranscriptionProvider>, ConfigurationError> {
        match plan {
            ProviderPlan::Local { model_size, device } => {
                let device = DeviceManager::get_device(device);
                let provider = LocalWhisperProvider::load(model_size, device)
                    .await
                    .map_err(|e| ConfigurationError::ModelLoad(format!("{:#}", e)))?;
                Ok(Arc::new(provider))
            }
            ProviderPlan::Api {
                api_key,
                url,
                model,
                timeout,
            } => Ok(Arc::new(Self::build_remote(api_key, url, model, timeout)?)),
        }
    }

    fn build_remote(
        api_key: String,
        url: String,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<RemoteApiProvider, ConfigurationError> {
        RemoteApiProvider::new(api_key, url, model, timeout)
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))
    }
}

fn require_field<'a>(
    provider: &'static str,
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, ConfigurationError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigurationError::MissingField { provider, field })
}

fn reject_field(
    provider: &'static str,
    field: &'static str,
    value: &Option<String>,
) -> Result<(), ConfigurationError> {
    match value {
        Some(_) => Err(ConfigurationError::UnexpectedField { provider, field }),
        None => Ok(()),
    }
}
