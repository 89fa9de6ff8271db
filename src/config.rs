//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - A configuration file (TOML, YAML or JSON) named by `CONFIG_PATH`,
//!   or `config.*` in the working directory
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_PROVIDER__API_KEY`, ...)
//! 3. Configuration file
//! 4. Default values (defined in the Default impl)
//!
//! The `provider` section has no defaults: which backend to run is always an
//! explicit decision.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    pub staging: StagingConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP server settings.
///
/// ## Fields:
/// - `host`: Address to bind (`0.0.0.0` accepts connections from anywhere)
/// - `port`: TCP port for the transcription API
/// - `name`: Instance name, used in logs and the default log file name
/// - `max_upload_bytes`: Largest accepted audio upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub max_upload_bytes: usize,
}

/// Which transcription backend to build, and how.
///
/// `type` selects the variant: `"local"` needs `model_size` (and optionally
/// `device`); `"api"` needs `api_key` and `url` (and optionally `model` and
/// `timeout_secs`). The factory enforces this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Where uploads are staged before a provider reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    pub directory: PathBuf,
}

/// Log output settings.
///
/// `RUST_LOG` overrides `level` when set. With `file` or `directory` set,
/// logs are also appended to `<directory>/<file>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Prometheus exposition settings. No metrics server without a port.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_port: Option<u16>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                name: "transcriber".to_string(),
                max_upload_bytes: 50 * 1024 * 1024,
            },
            provider: ProviderConfig::default(),
            staging: StagingConfig {
                directory: env::temp_dir(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                directory: None,
                file: None,
            },
            metrics: MetricsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, file and environment.
    ///
    /// ## Environment Variable Examples:
    /// - `CONFIG_PATH=/etc/transcriber/whisper.yml`: Configuration file
    /// - `APP_PROVIDER__TYPE=api`: Select the remote provider
    /// - `APP_METRICS__PROMETHEUS_PORT=9100`: Enable metrics exposition
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let file_source = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => config::File::with_name(&path).required(true),
            Err(_) => config::File::with_name("config").required(false),
        };

        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Provider fields are checked by the provider factory, not here.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if self.staging.directory.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Staging directory cannot be empty"));
        }

        match self.metrics.prometheus_port {
            Some(0) => return Err(anyhow::anyhow!("Prometheus port cannot be 0")),
            Some(port) if port == self.server.port => {
                return Err(anyhow::anyhow!(
                    "Prometheus port {} collides with the server port",
                    port
                ))
            }
            _ => {}
        }

        Ok(())
    }

    /// Full path of the log file, if file logging is enabled.
    ///
    /// A directory without a file name logs to `model_<server.name>.log`.
    pub fn log_file_path(&self) -> Option<PathBuf> {
        let file = match (&self.logging.file, &self.logging.directory) {
            (Some(file), _) => file.clone(),
            (None, Some(_)) => format!("model_{}.log", self.server.name),
            (None, None) => return None,
        };

        Some(match &self.logging.directory {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        })
    }
}
