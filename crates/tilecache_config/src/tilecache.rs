use serde::Deserialize;
use tracing::info;

use crate::validation::{ConfigReport, validate};
use crate::{CacheConfig, ServerConfig, UpstreamConfig};

/// Environment prefix for overrides, e.g. `TILECACHE_UPSTREAM__URL`.
const ENV_PREFIX: &str = "TILECACHE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to read config: {0}")]
    Read(#[from] config::ConfigError),

    #[error("invalid config in '{file}':\n{report}")]
    Invalid { file: String, report: String },
}

// =======================================================
// TILECACHE CONFIG — main config
// =======================================================
#[derive(Debug, Default, Deserialize)]
pub struct TilecacheConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    // Flat layout: { "address", "cache_dir", "api_keys" }.
    // When present these win over the sectioned values.
    #[serde(default)]
    address: Option<String>,

    #[serde(default)]
    cache_dir: Option<String>,

    #[serde(default)]
    api_keys: Option<Vec<String>>,
}

impl TilecacheConfig {
    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn upstream(&self) -> &UpstreamConfig {
        &self.upstream
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    /// Validate the configuration and return a report of warnings and errors.
    pub fn validate(&self) -> ConfigReport {
        validate(self)
    }

    /// Reads `file_name` (format from its extension) plus `TILECACHE_*`
    /// environment overrides, and fills defaults. No validation.
    pub fn from_file(file_name: &str) -> Result<Self, config::ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::with_name(file_name))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("upstream.api_keys")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: TilecacheConfig = built.try_deserialize()?;
        cfg.apply_defaults();
        Ok(cfg)
    }

    /// [`from_file`](Self::from_file) followed by validation. Errors in the
    /// report make loading fail; warnings are logged.
    pub fn load(file_name: &str) -> Result<Self, ConfigLoadError> {
        let cfg = Self::from_file(file_name)?;
        let report = cfg.validate();
        if report.has_errors() {
            return Err(ConfigLoadError::Invalid {
                file: file_name.to_string(),
                report: report.format(),
            });
        }
        for warning in report.warnings() {
            tracing::warn!(
                target: "tilecache::config",
                file = %file_name,
                section = warning.section,
                "{}",
                warning.message
            );
        }
        Ok(cfg)
    }

    pub(crate) fn apply_defaults(&mut self) {
        if let Some(address) = self.address.take() {
            self.server.listen = address;
        }
        if let Some(dir) = self.cache_dir.take() {
            self.cache.dir = dir;
        }
        if let Some(keys) = self.api_keys.take() {
            self.upstream.api_keys = keys;
        }

        self.server.apply_defaults_from(&ServerConfig::default());
        self.upstream.apply_defaults_from(&UpstreamConfig::default());
        self.cache.apply_defaults_from(&CacheConfig::default());
    }

    /// Logs the effective configuration. API keys are never printed.
    pub fn log_summary(&self) {
        info!(
            target: "tilecache::config",
            listen = %self.server.listen,
            worker_connections = self.server.worker_connections,
            header_read_timeout_secs = self.server.header_read_timeout_secs,
            keepalive = self.server.keepalive,
            "[server]"
        );
        info!(
            target: "tilecache::config",
            url = %self.upstream.url,
            key_param = %self.upstream.key_param,
            api_keys = self.upstream.api_keys.len(),
            connect_timeout_secs = self.upstream.connect_timeout_secs,
            timeout_secs = self.upstream.timeout_secs,
            "[upstream]"
        );
        info!(
            target: "tilecache::config",
            dir = self.cache.dir().unwrap_or("<memory>"),
            read_connections = self.cache.read_connections,
            "[cache]"
        );
    }
}
