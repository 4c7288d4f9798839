//! # Application State
//!
//! Shared state for the Axum application: the sync core, the caller-level
//! retry policy for premium mirroring, the optional database pool, and the
//! optional Prometheus handle.

use std::sync::Arc;
use std::time::Duration;

use escrow_ledger::{HttpLedgerClient, LedgerAdapter, LedgerConfig, LedgerError, MockLedger};
use escrow_store::{ActionRecordStore, MemoryActionStore, PgActionStore};
use escrow_sync::{EscrowChainSync, RetryPolicy, DEFAULT_CLAIM_LEASE};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use thiserror::Error;

/// Which ledger adapter the service mirrors to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    /// [`HttpLedgerClient`] configured from `LEDGER_API_*`.
    Http,
    /// In-process [`MockLedger`]; development only.
    Mock,
    /// No ledger; premium operations answer 503.
    Disabled,
}

impl LedgerMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "mock" => Some(Self::Mock),
            "disabled" | "off" | "none" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Log output format of the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Invalid service configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Postgres connection URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub ledger_mode: LedgerMode,
    pub log_format: LogFormat,
    /// Retry policy applied to premium mirroring requests.
    pub retry: RetryPolicy,
    /// How long a `LEDGER_PENDING` claim is honoured before takeover.
    pub claim_lease: Duration,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("ledger_mode", &self.ledger_mode)
            .field("log_format", &self.log_format)
            .field("retry", &self.retry)
            .field("claim_lease", &self.claim_lease)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: None,
            ledger_mode: LedgerMode::Disabled,
            log_format: LogFormat::Text,
            retry: RetryPolicy::default(),
            claim_lease: DEFAULT_CLAIM_LEASE,
        }
    }
}

impl AppConfig {
    /// Build configuration from the process environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PORT` | `8080` |
    /// | `DATABASE_URL` | unset (in-memory store) |
    /// | `LEDGER_MODE` | `http` when `LEDGER_API_URL` is set, else `disabled` |
    /// | `LOG_FORMAT` | `text` |
    /// | `LEDGER_SYNC_MAX_ATTEMPTS` | `3` |
    /// | `LEDGER_SYNC_BASE_DELAY_MS` | `200` |
    /// | `LEDGER_CLAIM_LEASE_SECS` | `300` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = parse_var(&var, "PORT")?.unwrap_or(defaults.port);

        let ledger_mode = match var("LEDGER_MODE") {
            Some(raw) => LedgerMode::parse(&raw).ok_or(ConfigError::InvalidValue {
                var: "LEDGER_MODE",
                value: raw,
            })?,
            None if var("LEDGER_API_URL").is_some() => LedgerMode::Http,
            None => LedgerMode::Disabled,
        };

        let log_format = match var("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("text") | Some("pretty") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        let retry = RetryPolicy::new(
            parse_var(&var, "LEDGER_SYNC_MAX_ATTEMPTS")?.unwrap_or(defaults.retry.max_attempts),
            parse_var::<u64>(&var, "LEDGER_SYNC_BASE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.base_delay),
        );

        let claim_lease = parse_var::<u64>(&var, "LEDGER_CLAIM_LEASE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.claim_lease);

        Ok(Self {
            port,
            database_url: var("DATABASE_URL"),
            ledger_mode,
            log_format,
            retry,
            claim_lease,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    var(key)
        .map(|raw| {
            raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: key,
                value: raw.clone(),
            })
        })
        .transpose()
}

/// Construct the ledger adapter selected by `mode`.
pub fn build_ledger(mode: LedgerMode) -> Result<Option<Arc<dyn LedgerAdapter>>, LedgerError> {
    let ledger: Arc<dyn LedgerAdapter> = match mode {
        LedgerMode::Http => Arc::new(HttpLedgerClient::new(LedgerConfig::from_env()?)?),
        LedgerMode::Mock => {
            tracing::warn!("LEDGER_MODE=mock: ledger hashes are simulated");
            Arc::new(MockLedger::new())
        }
        LedgerMode::Disabled => return Ok(None),
    };
    Ok(Some(ledger))
}

/// Postgres-backed store when a pool is available, in-memory otherwise.
pub fn build_store(pool: Option<&PgPool>) -> Arc<dyn ActionRecordStore> {
    match pool {
        Some(pool) => Arc::new(PgActionStore::new(pool.clone())),
        None => Arc::new(MemoryActionStore::new()),
    }
}

/// The sync core over `store`, with the configured claim lease.
pub fn build_sync(
    store: Arc<dyn ActionRecordStore>,
    ledger: Option<Arc<dyn LedgerAdapter>>,
    config: &AppConfig,
) -> EscrowChainSync {
    let sync = match ledger {
        Some(ledger) => EscrowChainSync::new(store, ledger),
        None => EscrowChainSync::without_ledger(store),
    };
    sync.with_claim_lease(config.claim_lease)
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub sync: EscrowChainSync,
    /// Retry policy for premium mirroring.
    pub retry: RetryPolicy,
    /// Present when `DATABASE_URL` is configured; checked by readiness.
    pub db_pool: Option<PgPool>,
    /// Present when the binary installed the Prometheus recorder.
    pub prometheus: Option<PrometheusHandle>,
    pub config: AppConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sync", &self.sync)
            .field("retry", &self.retry)
            .field("db_pool", &self.db_pool.is_some())
            .field("prometheus", &self.prometheus.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl AppState {
    pub fn new(sync: EscrowChainSync, config: AppConfig) -> Self {
        Self {
            sync,
            retry: config.retry,
            db_pool: None,
            prometheus: None,
            config,
        }
    }

    /// In-memory store with the given ledger. Used by tests and local runs.
    pub fn in_memory(ledger: Option<Arc<dyn LedgerAdapter>>) -> Self {
        let config = AppConfig::default();
        let sync = build_sync(build_store(None), ledger, &config);
        Self::new(sync, config)
    }

    pub fn with_db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
