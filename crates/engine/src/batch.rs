//! Runs a per-account unit of work over a list of accounts.
//!
//! Accounts start in caller order with a fixed pacing delay between two
//! starts. In [`Schedule::Sequential`] one account runs at a time; in
//! [`Schedule::Pool`] up to `workers` accounts run concurrently. Either
//! way the results come back in caller order, one per account: a failing
//! or panicking account is recorded, never dropped.

use std::{future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    Account, EngineError,
    aggregate::tally_cost,
    events::FetchEvent,
    fetcher::{FailureReason, ReportFetcher, ReportOutcome},
    spec::ReportSpec,
    transport::ReportTransport,
};

/// Pause between two account starts.
pub const DEFAULT_PACING: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Schedule {
    #[default]
    Sequential,
    /// Bounded worker pool; `workers` must be at least 1.
    Pool { workers: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    pub pacing: Duration,
    pub schedule: Schedule,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pacing: DEFAULT_PACING,
            schedule: Schedule::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendStatus {
    /// The report had rows.
    Reported,
    /// The report was generated and had no rows: a verified zero.
    Empty,
    /// The fetch failed; the cost is a degraded zero.
    Failed(FailureReason),
}

/// Spend of one account for one query.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpendResult {
    pub login: String,
    pub cost: f64,
    pub status: SpendStatus,
}

impl SpendResult {
    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.status {
            SpendStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Result of one account's unit of work.
pub trait AccountReport: Send + 'static {
    /// Result recorded for an account whose unit of work never completed.
    fn lost(login: &str, reason: FailureReason) -> Self;

    fn has_failures(&self) -> bool;
}

impl AccountReport for SpendResult {
    fn lost(login: &str, reason: FailureReason) -> Self {
        Self {
            login: login.to_string(),
            cost: 0.0,
            status: SpendStatus::Failed(reason),
        }
    }

    fn has_failures(&self) -> bool {
        self.failure().is_some()
    }
}

impl<T: ReportTransport> ReportFetcher<T> {
    /// Fetches `spec` for `account` and sums its cost column. A failed fetch
    /// yields a zero cost with a [`SpendStatus::Failed`] status.
    pub async fn fetch_spend(&self, account: &Account, spec: &ReportSpec) -> SpendResult {
        let login = account.login.clone();
        match self.fetch(&account.credential, &account.login, spec).await {
            ReportOutcome::Success(text) => {
                let tally = tally_cost(&text);
                if tally.skipped > 0 {
                    self.sink().emit(FetchEvent::CostCellsSkipped {
                        login: login.clone(),
                        skipped: tally.skipped,
                    });
                }
                SpendResult {
                    login,
                    cost: tally.total,
                    status: SpendStatus::Reported,
                }
            }
            ReportOutcome::Empty => SpendResult {
                login,
                cost: 0.0,
                status: SpendStatus::Empty,
            },
            ReportOutcome::Failed(reason) => SpendResult::lost(&login, reason),
        }
    }
}

pub struct BatchRunner<T> {
    fetcher: Arc<ReportFetcher<T>>,
    config: BatchConfig,
}

impl<T: ReportTransport + 'static> BatchRunner<T> {
    pub fn new(fetcher: ReportFetcher<T>, config: BatchConfig) -> Result<Self, EngineError> {
        if let Schedule::Pool { workers: 0 } = config.schedule {
            return Err(EngineError::InvalidSchedule(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        Ok(Self {
            fetcher: Arc::new(fetcher),
            config,
        })
    }

    pub fn fetcher(&self) -> &ReportFetcher<T> {
        &self.fetcher
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Fetches `spec` once per account.
    pub async fn run_all(&self, accounts: &[Account], spec: &ReportSpec) -> Vec<SpendResult> {
        let spec = Arc::new(spec.clone());
        self.run(accounts, move |fetcher, account| {
            let spec = Arc::clone(&spec);
            async move { fetcher.fetch_spend(&account, &spec).await }
        })
        .await
    }

    /// Runs `job` once per account and returns the results in caller order.
    pub async fn run<R, F, Fut>(&self, accounts: &[Account], job: F) -> Vec<R>
    where
        R: AccountReport,
        F: Fn(Arc<ReportFetcher<T>>, Account) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        match self.config.schedule {
            Schedule::Sequential => self.run_sequential(accounts, job).await,
            Schedule::Pool { workers } => self.run_pool(accounts, workers, job).await,
        }
    }

    async fn run_sequential<R, F, Fut>(&self, accounts: &[Account], job: F) -> Vec<R>
    where
        R: AccountReport,
        F: Fn(Arc<ReportFetcher<T>>, Account) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let mut results = Vec::with_capacity(accounts.len());
        for (index, account) in accounts.iter().enumerate() {
            if index > 0 {
                self.pace().await;
            }
            self.started(account, index, accounts.len());
            let handle = tokio::spawn(job(Arc::clone(&self.fetcher), account.clone()));
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => self.aborted(account, err.to_string()),
            };
            self.finished(account, &result);
            results.push(result);
        }
        results
    }

    async fn run_pool<R, F, Fut>(&self, accounts: &[Account], workers: usize, job: F) -> Vec<R>
    where
        R: AccountReport,
        F: Fn(Arc<ReportFetcher<T>>, Account) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let job = Arc::new(job);
        let permits = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for (index, account) in accounts.iter().enumerate() {
            if index > 0 {
                self.pace().await;
            }
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            self.started(account, index, accounts.len());
            let fetcher = Arc::clone(&self.fetcher);
            let job = Arc::clone(&job);
            let account = account.clone();
            tasks.spawn(async move {
                let _permit = permit;
                (index, job(fetcher, account).await)
            });
        }

        let mut slots: Vec<Option<R>> = accounts.iter().map(|_| None).collect();
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    self.finished(&accounts[index], &result);
                    slots[index] = Some(result);
                }
                Err(err) => errors.push(err.to_string()),
            }
        }

        // A failed task carries no index: attribute its error to the first
        // account left without a result.
        let mut errors = errors.into_iter();
        slots
            .into_iter()
            .zip(accounts)
            .map(|(slot, account)| {
                slot.unwrap_or_else(|| {
                    let detail = errors
                        .next()
                        .unwrap_or_else(|| "worker did not report".to_string());
                    let result = self.aborted(account, detail);
                    self.finished(account, &result);
                    result
                })
            })
            .collect()
    }

    fn aborted<R: AccountReport>(&self, account: &Account, detail: String) -> R {
        self.fetcher.sink().emit(FetchEvent::WorkerAborted {
            login: account.login.clone(),
            detail: detail.clone(),
        });
        R::lost(&account.login, FailureReason::Aborted(detail))
    }

    /// Waits for the pacing delay, returning early on cancellation.
    async fn pace(&self) {
        let delay = self.config.pacing;
        if delay.is_zero() {
            return;
        }
        self.fetcher.sink().emit(FetchEvent::Paced { delay });
        tokio::select! {
            biased;
            _ = self.fetcher.cancellation().cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    fn started(&self, account: &Account, index: usize, total: usize) {
        self.fetcher.sink().emit(FetchEvent::AccountStarted {
            login: account.login.clone(),
            position: index + 1,
            total,
        });
    }

    fn finished<R: AccountReport>(&self, account: &Account, result: &R) {
        self.fetcher.sink().emit(FetchEvent::AccountFinished {
            login: account.login.clone(),
            failed: result.has_failures(),
        });
    }
}
