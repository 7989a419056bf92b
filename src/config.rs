use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// PostgreSQL settings; in-memory stores are used when absent
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Number of parallel workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Attempts per job, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Job starts allowed per window
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
    /// Idle workers re-check the queue at this interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Claim lease; renewed at a third of this while a job runs. Another
    /// worker may take the job over once it lapses.
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,
}

fn default_concurrency() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_rate_limit_max() -> u32 {
    100
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_lease_ms() -> u64 {
    30_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            lease_ms: default_lease_ms(),
        }
    }
}

impl QueueConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    /// How often a running job's lease is extended
    pub fn lease_renewal(&self) -> Duration {
        Duration::from_millis((self.lease_ms / 3).max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Per-provider quote timeout
    #[serde(default = "default_quote_timeout_ms")]
    pub quote_timeout_ms: u64,
    /// Stop waiting for slow providers once this elapses and a quote is in hand.
    /// Unset: wait for every provider up to its own timeout.
    #[serde(default)]
    pub overall_deadline_ms: Option<u64>,
    /// Providers in priority order (earlier wins ties)
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

fn default_quote_timeout_ms() -> u64 {
    2000
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            quote_timeout_ms: default_quote_timeout_ms(),
            overall_deadline_ms: None,
            providers: default_providers(),
        }
    }
}

impl RoutingConfig {
    pub fn quote_timeout(&self) -> Duration {
        Duration::from_millis(self.quote_timeout_ms)
    }

    pub fn overall_deadline(&self) -> Option<Duration> {
        self.overall_deadline_ms.map(Duration::from_millis)
    }
}

/// Simulated liquidity source
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub venue_id: String,
    pub base_price: Decimal,
    /// Quoted price is base_price × uniform(band_low, band_high)
    pub band_low: Decimal,
    pub band_high: Decimal,
    pub fee: Decimal,
    pub liquidity_min: Decimal,
    pub liquidity_max: Decimal,
    #[serde(default = "default_quote_latency_min_ms")]
    pub latency_min_ms: u64,
    #[serde(default = "default_quote_latency_max_ms")]
    pub latency_max_ms: u64,
}

fn default_quote_latency_min_ms() -> u64 {
    150
}

fn default_quote_latency_max_ms() -> u64 {
    250
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            venue_id: "raydium".to_string(),
            base_price: dec!(100),
            band_low: dec!(0.98),
            band_high: dec!(1.02),
            fee: dec!(0.003),
            liquidity_min: dec!(1_000_000),
            liquidity_max: dec!(1_500_000),
            latency_min_ms: default_quote_latency_min_ms(),
            latency_max_ms: default_quote_latency_max_ms(),
        },
        ProviderConfig {
            venue_id: "meteora".to_string(),
            base_price: dec!(100),
            band_low: dec!(0.97),
            band_high: dec!(1.02),
            fee: dec!(0.002),
            liquidity_min: dec!(800_000),
            liquidity_max: dec!(1_400_000),
            latency_min_ms: default_quote_latency_min_ms(),
            latency_max_ms: default_quote_latency_max_ms(),
        },
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Probability a submission lands (0.0-1.0)
    #[serde(default = "default_success_probability")]
    pub success_probability: f64,
    #[serde(default = "default_execution_latency_min_ms")]
    pub latency_min_ms: u64,
    #[serde(default = "default_execution_latency_max_ms")]
    pub latency_max_ms: u64,
    /// Executed price moves at most this fraction away from the expected price
    #[serde(default = "default_price_band")]
    pub price_band: Decimal,
    /// Venues accepting submissions; defaults to the configured providers
    #[serde(default)]
    pub venues: Vec<String>,
}

fn default_success_probability() -> f64 {
    0.95
}

fn default_execution_latency_min_ms() -> u64 {
    2000
}

fn default_execution_latency_max_ms() -> u64 {
    3000
}

fn default_price_band() -> Decimal {
    dec!(0.02)
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            success_probability: default_success_probability(),
            latency_min_ms: default_execution_latency_min_ms(),
            latency_max_ms: default_execution_latency_max_ms(),
            price_band: default_price_band(),
            venues: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rotated log files
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("queue.concurrency", default_concurrency() as i64)?
            .set_default("queue.max_attempts", default_max_attempts() as i64)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DEXFLOW_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (DEXFLOW__QUEUE__CONCURRENCY, etc.)
            .add_source(
                Environment::with_prefix("DEXFLOW")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Venues the execution engine accepts
    pub fn execution_venues(&self) -> Vec<String> {
        if self.execution.venues.is_empty() {
            self.routing
                .providers
                .iter()
                .map(|p| p.venue_id.clone())
                .collect()
        } else {
            self.execution.venues.clone()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Queue
        if self.queue.concurrency == 0 {
            errors.push("queue.concurrency must be at least 1".to_string());
        }
        if self.queue.max_attempts == 0 {
            errors.push("queue.max_attempts must be at least 1".to_string());
        }
        if self.queue.rate_limit_max == 0 {
            errors.push("queue.rate_limit_max must be at least 1".to_string());
        }
        if self.queue.lease_ms == 0 {
            errors.push("queue.lease_ms must be positive".to_string());
        }
        if self.queue.rate_limit_window_ms == 0 {
            errors.push("queue.rate_limit_window_ms must be positive".to_string());
        }

        // Routing
        if self.routing.providers.is_empty() {
            errors.push("routing.providers must list at least one provider".to_string());
        }
        if self.routing.quote_timeout_ms == 0 {
            errors.push("routing.quote_timeout_ms must be positive".to_string());
        }

        let mut seen = HashSet::new();
        for provider in &self.routing.providers {
            let id = provider.venue_id.as_str();
            if id.trim().is_empty() {
                errors.push("provider venue_id cannot be empty".to_string());
            }
            if !seen.insert(id) {
                errors.push(format!("duplicate provider venue_id: {}", id));
            }
            if provider.base_price <= Decimal::ZERO {
                errors.push(format!("{}: base_price must be positive", id));
            }
            if provider.band_low <= Decimal::ZERO || provider.band_low > provider.band_high {
                errors.push(format!("{}: price band must satisfy 0 < low <= high", id));
            }
            if provider.fee < Decimal::ZERO || provider.fee >= Decimal::ONE {
                errors.push(format!("{}: fee must be in [0, 1)", id));
            }
            if provider.liquidity_min < Decimal::ZERO
                || provider.liquidity_min > provider.liquidity_max
            {
                errors.push(format!("{}: liquidity range is invalid", id));
            }
            if provider.latency_min_ms > provider.latency_max_ms {
                errors.push(format!("{}: latency_min_ms exceeds latency_max_ms", id));
            }
        }

        // Execution
        if !(0.0..=1.0).contains(&self.execution.success_probability) {
            errors.push("execution.success_probability must be between 0 and 1".to_string());
        }
        if self.execution.latency_min_ms > self.execution.latency_max_ms {
            errors.push("execution.latency_min_ms exceeds latency_max_ms".to_string());
        }
        if self.execution.price_band < Decimal::ZERO || self.execution.price_band >= Decimal::ONE {
            errors.push("execution.price_band must be in [0, 1)".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
