//! Commission reconciliation.
//!
//! For every account three spend queries are fetched: the total, the
//! search spend and the ad network spend outside the home region. The last
//! two are excluded from the commission base:
//!
//! ```text
//! excluded_sum        = search_spend + rsy_outside_rf_spend
//! commission_base_sum = total_spend - excluded_sum
//! commission_sum      = commission_base_sum * (1 + commission_rate / commission_base)
//! ```
//!
//! Values are not clamped: inconsistent inputs can yield a negative base.

use std::sync::Arc;

use serde::Serialize;

use crate::{
    Account, EngineError,
    batch::{AccountReport, BatchRunner, SpendStatus},
    fetcher::{FailureReason, ReportFetcher},
    spec::{AdNetworkType, DateRange, SpendQuery},
    transport::ReportTransport,
};

pub const DEFAULT_COMMISSION_RATE: f64 = 0.03;
pub const DEFAULT_COMMISSION_BASE: f64 = 0.97;
/// Locations of presence outside the home region.
pub const DEFAULT_OUTSIDE_REGION_LOCATION_IDS: [u32; 7] = [166, 111, 183, 241, 10002, 10003, 138];

#[derive(Clone, Debug, PartialEq)]
pub struct CommissionParams {
    commission_rate: f64,
    commission_base: f64,
    outside_region_location_ids: Vec<u32>,
}

impl CommissionParams {
    pub fn new(
        commission_rate: f64,
        commission_base: f64,
        outside_region_location_ids: Vec<u32>,
    ) -> Result<Self, EngineError> {
        if !commission_rate.is_finite() {
            return Err(EngineError::InvalidCommission(format!(
                "rate must be finite, got {commission_rate}"
            )));
        }
        if !commission_base.is_finite() || commission_base <= 0.0 {
            return Err(EngineError::InvalidCommission(format!(
                "base must be positive, got {commission_base}"
            )));
        }
        Ok(Self {
            commission_rate,
            commission_base,
            outside_region_location_ids,
        })
    }

    pub fn commission_rate(&self) -> f64 {
        self.commission_rate
    }

    pub fn commission_base(&self) -> f64 {
        self.commission_base
    }

    pub fn outside_region_location_ids(&self) -> &[u32] {
        &self.outside_region_location_ids
    }

    pub fn multiplier(&self) -> f64 {
        1.0 + self.commission_rate / self.commission_base
    }
}

impl Default for CommissionParams {
    fn default() -> Self {
        Self {
            commission_rate: DEFAULT_COMMISSION_RATE,
            commission_base: DEFAULT_COMMISSION_BASE,
            outside_region_location_ids: DEFAULT_OUTSIDE_REGION_LOCATION_IDS.to_vec(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendCategory {
    Total,
    Search,
    NetworkOutsideRegion,
}

impl SpendCategory {
    pub const ALL: [SpendCategory; 3] = [Self::Total, Self::Search, Self::NetworkOutsideRegion];

    pub fn query(self, outside_region_location_ids: &[u32]) -> SpendQuery {
        match self {
            Self::Total => SpendQuery::total(),
            Self::Search => SpendQuery::network(AdNetworkType::Search),
            Self::NetworkOutsideRegion => SpendQuery::network(AdNetworkType::AdNetwork)
                .in_locations(outside_region_location_ids.iter().copied()),
        }
    }
}

/// A sub-query whose fetch failed and was counted as zero.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DegradedQuery {
    pub category: SpendCategory,
    pub reason: FailureReason,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReconciliationResult {
    pub login: String,
    pub total_spend: f64,
    pub search_spend: f64,
    pub rsy_outside_rf_spend: f64,
    pub excluded_sum: f64,
    pub commission_base_sum: f64,
    pub commission_sum: f64,
    /// Empty when every figure comes from a successful fetch.
    pub degraded: Vec<DegradedQuery>,
}

impl ReconciliationResult {
    pub fn compute(
        login: &str,
        total_spend: f64,
        search_spend: f64,
        rsy_outside_rf_spend: f64,
        params: &CommissionParams,
    ) -> Self {
        let excluded_sum = search_spend + rsy_outside_rf_spend;
        let commission_base_sum = total_spend - excluded_sum;
        Self {
            login: login.to_string(),
            total_spend,
            search_spend,
            rsy_outside_rf_spend,
            excluded_sum,
            commission_base_sum,
            commission_sum: commission_base_sum * params.multiplier(),
            degraded: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }
}

impl AccountReport for ReconciliationResult {
    fn lost(login: &str, reason: FailureReason) -> Self {
        let mut result = Self::compute(login, 0.0, 0.0, 0.0, &CommissionParams::default());
        result.degraded = SpendCategory::ALL
            .into_iter()
            .map(|category| DegradedQuery {
                category,
                reason: reason.clone(),
            })
            .collect();
        result
    }

    fn has_failures(&self) -> bool {
        !self.is_complete()
    }
}

pub struct ReconciliationEngine<T> {
    runner: BatchRunner<T>,
}

impl<T: ReportTransport + 'static> ReconciliationEngine<T> {
    pub fn new(runner: BatchRunner<T>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &BatchRunner<T> {
        &self.runner
    }

    /// One result per account, in caller order.
    pub async fn reconcile(
        &self,
        accounts: &[Account],
        range: DateRange,
        params: &CommissionParams,
    ) -> Vec<ReconciliationResult> {
        let params = Arc::new(params.clone());
        self.runner
            .run(accounts, move |fetcher, account| {
                let params = Arc::clone(&params);
                async move { reconcile_account(&fetcher, &account, range, &params).await }
            })
            .await
    }
}

/// The three sub-fetches of one account run one after the other, so each
/// figure is attributed to its account whatever the schedule.
async fn reconcile_account<T: ReportTransport>(
    fetcher: &ReportFetcher<T>,
    account: &Account,
    range: DateRange,
    params: &CommissionParams,
) -> ReconciliationResult {
    let mut costs = [0.0; 3];
    let mut degraded = Vec::new();
    for (cost, category) in costs.iter_mut().zip(SpendCategory::ALL) {
        let spec = category
            .query(params.outside_region_location_ids())
            .to_spec(range);
        let spend = fetcher.fetch_spend(account, &spec).await;
        if let SpendStatus::Failed(reason) = spend.status {
            degraded.push(DegradedQuery { category, reason });
        }
        *cost = spend.cost;
    }

    let [total, search, outside] = costs;
    let mut result = ReconciliationResult::compute(&account.login, total, search, outside, params);
    result.degraded = degraded;
    result
}
