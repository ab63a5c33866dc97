//! Layered application configuration

mod app_config;

pub use app_config::{
    AppConfig, DatabaseConfig, DatabaseConnectionConfig, EngineConfig, LlmConfig, LogFormat,
    LoggingConfig, MetricsConfig, ModelPricing, SchedulerConfig, ServerConfig,
};
