//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use loyalty_engine::ReconcilerConfig;
use std::env;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ops API server configuration
    pub api: ApiConfig,

    /// Accrual service connection
    pub accrual: AccrualConfig,

    /// Reconciler timing
    pub reconciler: ReconcilerConfig,

    /// Postgres URL; `None` runs on the in-memory store
    pub database_url: Option<String>,

    /// Logging setup
    pub log: LogConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Ops API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Accrual service connection.
#[derive(Debug, Clone)]
pub struct AccrualConfig {
    /// Base URL, always with a scheme
    pub base_url: String,
    /// Deadline for one request
    pub request_timeout: Duration,
}

/// Logging setup.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

const DEFAULT_RUN_ADDRESS: &str = "0.0.0.0:8081";
const DEFAULT_ACCRUAL_ADDRESS: &str = "http://localhost:8080";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_RATE_LIMIT_COOLDOWN_SECS: u64 = 60;
const DEFAULT_MAX_RATE_LIMIT_COOLDOWN_SECS: u64 = 3600;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
const DEFAULT_LOG_LEVEL: &str = "loyaltyd=info,loyalty_engine=info";

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> DaemonResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = Self::load_environment(&lookup)?;
        let api = Self::load_api_config(&lookup)?;
        let accrual = Self::load_accrual_config(&lookup)?;
        let reconciler = Self::load_reconciler_config(&lookup)?;
        let log = Self::load_log_config(&lookup)?;
        let database_url = lookup("DATABASE_URI").filter(|v| !v.trim().is_empty());

        Ok(Self {
            api,
            accrual,
            reconciler,
            database_url,
            log,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            accrual: AccrualConfig {
                base_url: DEFAULT_ACCRUAL_ADDRESS.to_string(),
                request_timeout: Duration::from_millis(1000),
            },
            reconciler: ReconcilerConfig {
                poll_interval: Duration::from_millis(20),
                rate_limit_cooldown: Duration::from_secs(1),
                max_rate_limit_cooldown: Duration::from_secs(5),
            },
            database_url: None,
            log: LogConfig {
                level: DEFAULT_LOG_LEVEL.to_string(),
                format: LogFormat::Text,
            },
            environment: Environment::Test,
        }
    }

    /// Which store backend this configuration selects.
    pub fn store_backend(&self) -> &'static str {
        if self.database_url.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }

    /// `host:port` for the ops API listener.
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    fn load_environment<F: Fn(&str) -> Option<String>>(lookup: &F) -> DaemonResult<Environment> {
        let env_str = lookup("LOYALTY_ENV").unwrap_or_else(|| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid LOYALTY_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config<F: Fn(&str) -> Option<String>>(lookup: &F) -> DaemonResult<ApiConfig> {
        let raw = lookup("RUN_ADDRESS").unwrap_or_else(|| DEFAULT_RUN_ADDRESS.to_string());
        parse_run_address(&raw)
    }

    fn load_accrual_config<F: Fn(&str) -> Option<String>>(
        lookup: &F,
    ) -> DaemonResult<AccrualConfig> {
        let raw =
            lookup("ACCRUAL_SYSTEM_ADDRESS").unwrap_or_else(|| DEFAULT_ACCRUAL_ADDRESS.to_string());
        let base_url = normalize_base_url(&raw)?;
        let timeout_ms = Self::load_positive_u64(
            lookup,
            "LOYALTY_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?;

        Ok(AccrualConfig {
            base_url,
            request_timeout: Duration::from_millis(timeout_ms),
        })
    }

    fn load_reconciler_config<F: Fn(&str) -> Option<String>>(
        lookup: &F,
    ) -> DaemonResult<ReconcilerConfig> {
        let poll_ms =
            Self::load_positive_u64(lookup, "LOYALTY_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        let cooldown_secs = Self::load_positive_u64(
            lookup,
            "LOYALTY_RATE_LIMIT_COOLDOWN_SECS",
            DEFAULT_RATE_LIMIT_COOLDOWN_SECS,
        )?;
        let max_cooldown_secs = Self::load_positive_u64(
            lookup,
            "LOYALTY_MAX_RATE_LIMIT_COOLDOWN_SECS",
            DEFAULT_MAX_RATE_LIMIT_COOLDOWN_SECS,
        )?;

        Ok(ReconcilerConfig {
            poll_interval: Duration::from_millis(poll_ms),
            rate_limit_cooldown: Duration::from_secs(cooldown_secs),
            max_rate_limit_cooldown: Duration::from_secs(max_cooldown_secs),
        })
    }

    fn load_log_config<F: Fn(&str) -> Option<String>>(lookup: &F) -> DaemonResult<LogConfig> {
        let level = lookup("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        let format = lookup("LOYALTY_LOG_FORMAT").map(|v| v.to_lowercase());
        let format = match format.as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(DaemonError::Config(format!(
                    "Invalid LOYALTY_LOG_FORMAT: {}. Expected: text, json",
                    other
                )))
            },
        };

        Ok(LogConfig { level, format })
    }

    fn load_positive_u64<F: Fn(&str) -> Option<String>>(
        lookup: &F,
        key: &str,
        default: u64,
    ) -> DaemonResult<u64> {
        let value = match lookup(key) {
            Some(val) => val
                .trim()
                .parse::<u64>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val)))?,
            None => default,
        };
        if value == 0 {
            return Err(DaemonError::Config(format!("{} must be positive", key)));
        }
        Ok(value)
    }
}

/// Split `host:port`; an empty host (`:8081`) binds all interfaces.
fn parse_run_address(raw: &str) -> DaemonResult<ApiConfig> {
    let raw = raw.trim();
    let (host, port_str) = raw
        .rsplit_once(':')
        .ok_or_else(|| DaemonError::Config(format!("Invalid RUN_ADDRESS: {}", raw)))?;

    let port = port_str
        .parse::<u16>()
        .map_err(|_| DaemonError::Config(format!("Invalid RUN_ADDRESS port: {}", raw)))?;
    let host = if host.is_empty() { "0.0.0.0" } else { host };

    Ok(ApiConfig {
        host: host.to_string(),
        port,
    })
}

/// Accept `http(s)://host:port`, bare `host:port` or `:port`.
fn normalize_base_url(raw: &str) -> DaemonResult<String> {
    let raw = raw.trim().trim_end_matches('/');
    if raw.is_empty() {
        return Err(DaemonError::Config("ACCRUAL_SYSTEM_ADDRESS is empty".to_string()));
    }

    let url = if raw.contains("://") {
        raw.to_string()
    } else if raw.starts_with(':') {
        format!("http://localhost{}", raw)
    } else {
        format!("http://{}", raw)
    };

    Ok(url)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8081,
            },
            accrual: AccrualConfig {
                base_url: DEFAULT_ACCRUAL_ADDRESS.to_string(),
                request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            },
            reconciler: ReconcilerConfig::default(),
            database_url: None,
            log: LogConfig {
                level: DEFAULT_LOG_LEVEL.to_string(),
                format: LogFormat::Text,
            },
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
