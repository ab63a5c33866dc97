use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::chain::DEFAULT_API_TIMEOUT_MS;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub metrics: MetricsConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Chain runner limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest allowed nesting of goto side trips, bodies and child chains
    pub max_nesting_depth: usize,

    /// Applied to chains without their own `maxExecutionTimeMs`
    pub default_max_execution_time_ms: Option<u64>,

    /// Wall-clock limit for code steps
    pub code_timeout_ms: u64,

    /// Default timeout for api_call steps without `timeoutMs`
    pub http_timeout_ms: u64,

    /// Persist the record after every step transition, not only at pause and finish
    pub persist_every_transition: bool,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ModelPricing {
    pub prompt_cents_per_1k: f64,
    pub completion_cents_per_1k: f64,
}

/// OpenAI-compatible provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,

    /// When absent, prompt steps use the offline echo invoker
    pub api_key: Option<String>,

    pub default_model: String,

    pub request_timeout_secs: u64,

    pub pricing: HashMap<String, ModelPricing>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConnectionConfig {
    pub url: String,
    #[serde(default)]
    pub writable: bool,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Named connections addressable by database steps
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connections: HashMap<String, DatabaseConnectionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub tick_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 16,
            default_max_execution_time_ms: None,
            code_timeout_ms: 5_000,
            http_timeout_ms: DEFAULT_API_TIMEOUT_MS,
            persist_every_transition: true,
        }
    }
}

impl EngineConfig {
    pub fn code_timeout(&self) -> Duration {
        Duration::from_millis(self.code_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            default_model: "gpt-4o-mini".to_string(),
            request_timeout_secs: 120,
            pricing: HashMap::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: 1,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.engine.max_nesting_depth, 16);
        assert_eq!(config.engine.code_timeout(), Duration::from_secs(5));
        assert!(config.llm.api_key.is_none());
        assert!(config.database.connections.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [engine]
                code_timeout_ms = 250

                [llm.pricing.gpt-4o-mini]
                prompt_cents_per_1k = 0.015
                completion_cents_per_1k = 0.06

                [database.connections.analytics]
                url = "postgres://localhost/analytics"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.engine.code_timeout_ms, 250);
        assert_eq!(config.engine.http_timeout_ms, 30_000);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.llm.pricing.contains_key("gpt-4o-mini"));

        let analytics = &config.database.connections["analytics"];
        assert!(!analytics.writable);
        assert_eq!(analytics.max_connections, 5);
    }
}
