use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue_store: QueueStoreConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub chat_source: ChatSourceConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub disable: bool,
    #[serde(default)]
    pub additional_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Connection + retry/TTL tuning for the session & pending-queue store (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStoreConfig {
    pub url: String,
    /// Key namespace prefix; omitted (empty) by default (§4.4).
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_store_retries")]
    pub retries: u32,
    #[serde(default = "default_store_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_scan_count")]
    pub scan_count: u32,
    #[serde(default = "default_mget_batch")]
    pub mget_batch: usize,
}

fn default_namespace() -> String {
    String::new()
}
fn default_session_ttl_secs() -> u64 {
    3600
}
fn default_store_retries() -> u32 {
    3
}
fn default_store_backoff_base_ms() -> u64 {
    120
}
fn default_scan_count() -> u32 {
    512
}
fn default_mget_batch() -> usize {
    512
}

impl Default for QueueStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            namespace: default_namespace(),
            session_ttl_secs: default_session_ttl_secs(),
            retries: default_store_retries(),
            backoff_base_ms: default_store_backoff_base_ms(),
            scan_count: default_scan_count(),
            mget_batch: default_mget_batch(),
        }
    }
}

/// Tunables for the extraction pipeline (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// `K` in §4.1: Stage B triggers iff Stage A validation errors are below this.
    #[serde(default = "default_ai_threshold")]
    pub max_exceptions_for_ai_extraction: u32,
    #[serde(default = "default_extractor_retries")]
    pub extractor_retries: u32,
    #[serde(default = "default_extractor_backoff_base_ms")]
    pub extractor_backoff_base_ms: u64,
    #[serde(default = "default_extractor_attempt_cap_secs")]
    pub extractor_attempt_cap_secs: u64,
    #[serde(default)]
    pub extractor_endpoint: Option<String>,
    #[serde(default)]
    pub extractor_model: Option<String>,
}

fn default_ai_threshold() -> u32 {
    3
}
fn default_extractor_retries() -> u32 {
    2
}
fn default_extractor_backoff_base_ms() -> u64 {
    750
}
fn default_extractor_attempt_cap_secs() -> u64 {
    30
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_exceptions_for_ai_extraction: default_ai_threshold(),
            extractor_retries: default_extractor_retries(),
            extractor_backoff_base_ms: default_extractor_backoff_base_ms(),
            extractor_attempt_cap_secs: default_extractor_attempt_cap_secs(),
            extractor_endpoint: None,
            extractor_model: None,
        }
    }
}

/// Credentials for the chat-source adapter. The adapter itself is out of scope (§1); this
/// struct only captures the placeholders the core's configuration layer must thread
/// through to it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatSourceConfig {
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub source_secret: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
    /// Rotation strategy: "daily", "hourly", or "never".
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
    #[serde(default = "default_max_files")]
    pub max_files: u32,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

fn default_logging_enabled() -> bool {
    true
}
fn default_log_directory() -> String {
    "logs".to_string()
}
fn default_log_file_prefix() -> String {
    "signal-relay-server".to_string()
}
fn default_log_rotation() -> String {
    "daily".to_string()
}
fn default_max_files() -> u32 {
    30
}
fn default_max_age_days() -> u32 {
    90
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            directory: default_log_directory(),
            file_prefix: default_log_file_prefix(),
            rotation: default_log_rotation(),
            max_files: default_max_files(),
            max_age_days: default_max_age_days(),
        }
    }
}

impl Config {
    /// Load config from layered TOML files.
    ///
    /// Loads, in order (later overrides earlier):
    /// 1. `{base_name}.toml` (required)
    /// 2. `{base_name}.{CONFIG_ENV}.toml` (optional, only if `CONFIG_ENV` is set)
    /// 3. `{base_name}.local.toml` (optional, for personal overrides, git-ignored)
    pub fn from_file<P: AsRef<Path>>(base_name: P) -> Result<Self> {
        let base_path = base_name.as_ref();
        let base_str = base_path.to_str().context("invalid base path")?;

        let mut builder =
            config::Config::builder().add_source(config::File::with_name(base_str));

        if let Ok(env) = std::env::var("CONFIG_ENV") {
            let env_config = format!("{}.{}", base_str, env);
            builder = builder.add_source(config::File::with_name(&env_config).required(false));
        }

        let local_config = format!("{}.local", base_str);
        builder = builder.add_source(config::File::with_name(&local_config).required(false));

        let config = builder.build().context("failed to build configuration")?;
        config
            .try_deserialize()
            .context("failed to deserialize configuration")
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors.additional_origins.clone()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://signal_relay.db?mode=rwc".to_string(),
            },
            queue_store: QueueStoreConfig::default(),
            extraction: ExtractionConfig::default(),
            chat_source: ChatSourceConfig::default(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.queue_store.session_ttl_secs, 3600);
        assert_eq!(config.extraction.max_exceptions_for_ai_extraction, 3);
    }

    #[test]
    fn test_server_address() {
        let config = Config::default();
        assert_eq!(config.server_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_toml_serialization_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[queue_store]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
    }

    #[test]
    fn test_partial_toml_deserialization_uses_defaults() {
        let toml_str = r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
url = "sqlite://custom.db"

[queue_store]
url = "redis://localhost:6379"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.url, "sqlite://custom.db");
        assert_eq!(config.queue_store.session_ttl_secs, 3600);
        assert_eq!(config.queue_store.retries, 3);
        assert_eq!(config.extraction.max_exceptions_for_ai_extraction, 3);
    }
}
