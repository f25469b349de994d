//! Application settings, read from `settings.toml` (or the file named by
//! `SPENDRECON_CONFIG`) and overridden by `SPENDRECON_*` variables, e.g.
//! `SPENDRECON_APP__LEVEL=debug`.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use engine::{
    Account, BatchConfig, CommissionParams, DEFAULT_COMMISSION_BASE, DEFAULT_COMMISSION_RATE,
    DEFAULT_MAX_RETRIES, DEFAULT_OUTSIDE_REGION_LOCATION_IDS, DateRange, FetchPolicy, Schedule,
};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "settings";
const ENV_PREFIX: &str = "SPENDRECON";

/// How results are printed to stdout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Output {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
    pub output: Output,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: Output::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Service {
    /// Reports endpoint; the production one when unset.
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
    /// `Accept-Language` of diagnostics; `ru` when unset.
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccountEntry {
    pub login: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Batch {
    pub pacing_ms: u64,
    /// Concurrent accounts; sequential when unset.
    pub workers: Option<usize>,
}

impl Default for Batch {
    fn default() -> Self {
        Self {
            pacing_ms: 500,
            workers: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Fetch {
    pub max_retries: Option<u32>,
    pub default_retry_secs: u64,
    pub max_elapsed_secs: Option<u64>,
}

impl Default for Fetch {
    fn default() -> Self {
        Self {
            max_retries: Some(DEFAULT_MAX_RETRIES),
            default_retry_secs: 60,
            max_elapsed_secs: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Reconcile {
    pub enabled: bool,
    pub range: String,
    pub commission_rate: f64,
    pub commission_base: f64,
    pub outside_region_location_ids: Vec<u32>,
}

impl Default for Reconcile {
    fn default() -> Self {
        Self {
            enabled: true,
            range: "LAST_MONTH".to_string(),
            commission_rate: DEFAULT_COMMISSION_RATE,
            commission_base: DEFAULT_COMMISSION_BASE,
            outside_region_location_ids: DEFAULT_OUTSIDE_REGION_LOCATION_IDS.to_vec(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub service: Service,
    pub accounts: Vec<AccountEntry>,
    pub batch: Batch,
    pub fetch: Fetch,
    pub reconcile: Reconcile,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let path = std::env::var(format!("{ENV_PREFIX}_CONFIG"))
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.accounts
            .iter()
            .map(|entry| Account::new(entry.login.as_str(), entry.token.as_str()))
            .collect()
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            pacing: Duration::from_millis(self.batch.pacing_ms),
            schedule: match self.batch.workers {
                Some(workers) => Schedule::Pool { workers },
                None => Schedule::Sequential,
            },
        }
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_retries: self.fetch.max_retries,
            default_retry_delay: Duration::from_secs(self.fetch.default_retry_secs),
            max_elapsed: self.fetch.max_elapsed_secs.map(Duration::from_secs),
        }
    }

    pub fn range(&self) -> Result<DateRange, ConfigError> {
        self.reconcile
            .range
            .parse()
            .map_err(|err: String| ConfigError::Message(format!("reconcile.range: {err}")))
    }

    pub fn commission(&self) -> Result<CommissionParams, ConfigError> {
        CommissionParams::new(
            self.reconcile.commission_rate,
            self.reconcile.commission_base,
            self.reconcile.outside_region_location_ids.clone(),
        )
        .map_err(|err| ConfigError::Message(err.to_string()))
    }
}
