//! Configuration for the herald service.

use std::{collections::HashMap, path::Path, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use herald_core::Subscriber;
use herald_delivery::{ClientConfig, EngineConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const CONFIG_FILE: &str = "herald.toml";
const ENV_PREFIX: &str = "HERALD_";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed `HERALD_`, nested keys split on `__`
///    (e.g. `HERALD_DELIVERY__WORKER_COUNT=8`)
/// 2. Configuration file (`herald.toml`)
/// 3. Built-in defaults
///
/// # Example
///
/// ```no_run
/// use herald_dispatch::Config;
///
/// let config = Config::load().expect("failed to load configuration");
/// println!("{} delivery workers", config.delivery.worker_count);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool and queue.
    #[serde(default)]
    pub delivery: DeliverySettings,

    /// Outbound HTTP client.
    #[serde(default)]
    pub client: ClientSettings,

    /// Retry schedule.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Subscribers seeding the in-memory registry.
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,

    /// Integration name to its configuration table.
    ///
    /// Each table is handed to the integration as is; only `enabled` is
    /// common to all of them.
    #[serde(default)]
    pub integrations: HashMap<String, Value>,

    /// Log filter directives.
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

/// Worker pool and queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Number of concurrent delivery workers.
    pub worker_count: usize,
    /// Maximum number of queued tasks.
    pub queue_capacity: usize,
    /// Seconds allowed for draining the queue at shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            worker_count: herald_delivery::DEFAULT_WORKER_COUNT,
            queue_capacity: herald_delivery::DEFAULT_QUEUE_CAPACITY,
            shutdown_timeout_secs: 30,
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Seconds allowed to establish a connection.
    pub connect_timeout_secs: u64,
    /// Seconds allowed for the response.
    pub read_timeout_secs: u64,
    /// User agent for outbound requests.
    pub user_agent: String,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            connect_timeout_secs: client.connect_timeout.as_secs(),
            read_timeout_secs: client.read_timeout.as_secs(),
            user_agent: client.user_agent,
            verify_tls: client.verify_tls,
        }
    }
}

/// Retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per task, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any retry delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Random extra delay as a fraction of the computed delay.
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: duration_millis(policy.base_delay),
            max_delay_ms: duration_millis(policy.max_delay),
            jitter_factor: policy.jitter_factor,
        }
    }
}

impl Config {
    /// Loads configuration from defaults, `herald.toml`, and `HERALD_`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Fails if a source cannot be parsed or the result does not validate.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Like [`Config::load`] with an explicit configuration file.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Fails if a source cannot be parsed or the result does not validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::from_figment(&figment)
    }

    /// Extracts and validates configuration from a prepared figment.
    ///
    /// # Errors
    ///
    /// Fails if extraction fails or the result does not validate.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that would make the engine unusable.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        if self.delivery.worker_count == 0 {
            anyhow::bail!("delivery.worker_count must be greater than 0");
        }

        if self.delivery.queue_capacity == 0 {
            anyhow::bail!("delivery.queue_capacity must be greater than 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be greater than 0");
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            anyhow::bail!("retry.base_delay_ms cannot exceed retry.max_delay_ms");
        }

        if !(0.0..1.0).contains(&self.retry.jitter_factor) {
            anyhow::bail!("retry.jitter_factor must be in [0.0, 1.0)");
        }

        for subscriber in &self.subscribers {
            herald_core::models::validate_post_url(&subscriber.post_url)
                .with_context(|| format!("invalid subscriber {}", subscriber.post_url))?;
        }

        Ok(())
    }

    /// HTTP client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_secs(self.client.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.client.read_timeout_secs),
            user_agent: self.client.user_agent.clone(),
            verify_tls: self.client.verify_tls,
        }
    }

    /// Retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter_factor: self.retry.jitter_factor,
        }
    }

    /// Delivery engine configuration.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            worker_count: self.delivery.worker_count,
            queue_capacity: self.delivery.queue_capacity,
            shutdown_timeout: Duration::from_secs(self.delivery.shutdown_timeout_secs),
            client_config: self.to_client_config(),
            retry_policy: self.to_retry_policy(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delivery: DeliverySettings::default(),
            client: ClientSettings::default(),
            retry: RetrySettings::default(),
            subscribers: Vec::new(),
            integrations: HashMap::new(),
            rust_log: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info,herald=debug".to_string()
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.delivery.worker_count, 4);
        assert_eq!(config.delivery.queue_capacity, 1024);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert_eq!(config.client.connect_timeout_secs, 10);
        assert_eq!(config.client.read_timeout_secs, 30);
    }

    #[test]
    fn invalid_config_validation_fails() {
        let mut config = Config::default();
        config.delivery.worker_count = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.delivery.queue_capacity = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.retry.base_delay_ms = 60_000;
        assert!(config.validate().is_err());

        config = Config::default();
        config.retry.jitter_factor = 1.0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.subscribers.push(Subscriber {
            post_url: "ftp://files.example/drop".to_string(),
            event_filter: Default::default(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn conversions_carry_settings() {
        let mut config = Config::default();
        config.delivery.shutdown_timeout_secs = 5;
        config.client.read_timeout_secs = 12;
        config.retry.base_delay_ms = 250;

        let engine = config.to_engine_config();
        assert_eq!(engine.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(engine.client_config.read_timeout, Duration::from_secs(12));
        assert_eq!(engine.retry_policy.base_delay, Duration::from_millis(250));
        assert_eq!(engine.retry_policy, config.to_retry_policy());
    }
}
