use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

const CONFIG_DIR: &str = "config";
const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOCK_TTL_MS: u64 = 5_000;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;
const DEFAULT_EVENT_PAYLOAD_MAX_BYTES: usize = 256 * 1024;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_lock_ttl_ms() -> u64 {
    DEFAULT_LOCK_TTL_MS
}

fn default_retry_max_attempts() -> u32 {
    DEFAULT_RETRY_MAX_ATTEMPTS
}

fn default_retry_max_delay_ms() -> u64 {
    DEFAULT_RETRY_MAX_DELAY_MS
}

fn default_event_payload_max_bytes() -> usize {
    DEFAULT_EVENT_PAYLOAD_MAX_BYTES
}

fn default_consumer_group() -> String {
    "inventory-core".to_string()
}

fn default_event_stream_prefix() -> String {
    "order".to_string()
}

fn default_product_stream_prefix() -> String {
    "product".to_string()
}

fn default_catalog_consumer_group() -> String {
    "inventory-core-catalog".to_string()
}

/// Application configuration, layered from defaults, config files and environment
/// variables (see `load_config`).
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL (sea-orm: postgres://, sqlite://, ...)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Redis connection URL, backs the Lock Service, the event streams, and
    /// the processed-event dedup records.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format
    #[serde(default)]
    pub log_json: bool,

    /// Default TTL (ms) for per-SKU locks
    #[serde(default = "default_lock_ttl_ms")]
    #[validate(range(min = 100, max = 60_000))]
    pub lock_ttl_ms: u64,

    /// Prefix for order-lifecycle stream keys, e.g. "order" -> "order.created"
    #[serde(default = "default_event_stream_prefix")]
    pub event_stream_prefix: String,

    /// Redis consumer-group name joined by the order-event consumer
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Prefix for product-catalog stream keys, e.g. "product" -> "product.created"
    #[serde(default = "default_product_stream_prefix")]
    pub product_stream_prefix: String,

    /// Redis consumer-group name joined by the product-catalog consumer
    #[serde(default = "default_catalog_consumer_group")]
    pub catalog_consumer_group: String,

    /// Default attempt count for the retry-with-backoff use-case wrapper
    #[serde(default = "default_retry_max_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub retry_max_attempts: u32,

    /// Cap on exponential backoff delay (ms) for the retry wrapper
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Maximum serialised event payload size in bytes before publish is rejected
    #[serde(default = "default_event_payload_max_bytes")]
    pub event_payload_max_bytes: usize,
}

fn default_database_url() -> String {
    "sqlite://inventory.db?mode=rwc".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

impl AppConfig {
    /// Build a configuration directly, bypassing file/env layering. Used by tests.
    #[allow(clippy::too_many_arguments)]
    pub fn new(database_url: String, redis_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            redis_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            lock_ttl_ms: default_lock_ttl_ms(),
            event_stream_prefix: default_event_stream_prefix(),
            consumer_group: default_consumer_group(),
            product_stream_prefix: default_product_stream_prefix(),
            catalog_consumer_group: default_catalog_consumer_group(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            event_payload_max_bytes: default_event_payload_max_bytes(),
        }
    }

    pub fn order_stream_key(&self, suffix: &str) -> String {
        format!("{}.{}", self.event_stream_prefix, suffix)
    }

    pub fn inventory_stream_key(&self) -> String {
        "inventory.events".to_string()
    }

    pub fn lock_key(&self, sku: &str) -> String {
        format!("inventory:lock:{}", sku)
    }
}

#[derive(Error, Debug)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Initializes the global tracing subscriber.
///
/// Honours `RUST_LOG` if set, otherwise derives a directive from `level`.
/// When `APP__OTEL_ENABLED` or `OTEL_EXPORTER_OTLP_ENDPOINT` is set, traces
/// are additionally exported via OTLP.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("inventory_core={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive.clone());

    let otel_enabled = env::var("APP__OTEL_ENABLED")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
        || env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();

    if otel_enabled {
        use opentelemetry::KeyValue;
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::{trace as sdktrace, Resource};

        let endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:4317".to_string());
        let service_name =
            env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "inventory-core".to_string());

        let resource = Resource::new(vec![KeyValue::new("service.name", service_name)]);
        let tracer = match opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
            .with_trace_config(sdktrace::config().with_resource(resource))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
        {
            Ok(tracer) => tracer,
            Err(err) => {
                error!("failed to install OTLP pipeline: {}", err);
                if json {
                    let _ = fmt().with_env_filter(filter_directive).json().try_init();
                } else {
                    let _ = fmt().with_env_filter(filter_directive).try_init();
                }
                return;
            }
        };

        let base = tracing_subscriber::registry()
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .with(EnvFilter::new(filter_directive));

        if json {
            let _ = base.with(fmt::layer().json()).try_init();
        } else {
            let _ = base.with(fmt::layer()).try_init();
        }
    } else if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. `config/default.toml`
/// 3. `config/{RUN_ENV}.toml`
/// 4. `config/docker.toml` if `DOCKER` is set
/// 5. Environment variables (`APP__*`, double-underscore separated)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .set_default("database_url", default_database_url())?
        .set_default("redis_url", default_redis_url())?
        .set_default("host", default_host())?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("lock_ttl_ms", DEFAULT_LOCK_TTL_MS as i64)?
        .set_default("event_stream_prefix", "order")?
        .set_default("consumer_group", "inventory-core")?
        .set_default("product_stream_prefix", "product")?
        .set_default("catalog_consumer_group", "inventory-core-catalog")?
        .set_default("retry_max_attempts", DEFAULT_RETRY_MAX_ATTEMPTS as i64)?
        .set_default("retry_max_delay_ms", DEFAULT_RETRY_MAX_DELAY_MS as i64)?
        .set_default(
            "event_payload_max_bytes",
            DEFAULT_EVENT_PAYLOAD_MAX_BYTES as i64,
        )?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let builder = if env::var("DOCKER").is_ok() {
        info!("docker environment detected");
        builder.add_source(File::with_name(&format!("{}/docker", CONFIG_DIR)).required(false))
    } else {
        builder
    };

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite://inventory.db?mode=memory".into(),
            "redis://127.0.0.1:6379".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        )
    }

    #[test]
    fn lock_key_matches_convention() {
        let cfg = base_config();
        assert_eq!(cfg.lock_key("ABC-1"), "inventory:lock:ABC-1");
    }

    #[test]
    fn validation_rejects_out_of_range_lock_ttl() {
        let mut cfg = base_config();
        cfg.lock_ttl_ms = 50;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_config_validates() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
    }
}
