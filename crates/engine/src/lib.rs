//! Asynchronous spend report acquisition and commission reconciliation.
//!
//! The pieces, leaf first:
//!
//! - [`ReportSpec`] describes one report request;
//! - [`ReportFetcher`] drives the queued/processing polling protocol of the
//!   reporting service to a terminal [`ReportOutcome`];
//! - [`sum_cost`] turns a TSV payload into a spend figure;
//! - [`BatchRunner`] runs a unit of work over many accounts with pacing;
//! - [`ReconciliationEngine`] derives the commission of each account.
//!
//! Network access goes through the [`ReportTransport`] trait, so the whole
//! engine can run against a scripted transport.

pub use account::{Account, Credential};
pub use aggregate::{SpendTally, sum_cost, tally_cost};
pub use batch::{
    AccountReport, BatchConfig, BatchRunner, DEFAULT_PACING, Schedule, SpendResult, SpendStatus,
};
pub use error::{EngineError, TransportError};
pub use events::{EventSink, FetchEvent, NoopSink, TracingSink};
pub use fetcher::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, FailureReason, FetchPolicy, ReportFetcher,
    ReportOutcome,
};
pub use reconcile::{
    CommissionParams, DEFAULT_COMMISSION_BASE, DEFAULT_COMMISSION_RATE,
    DEFAULT_OUTSIDE_REGION_LOCATION_IDS, DegradedQuery, ReconciliationEngine,
    ReconciliationResult, SpendCategory,
};
pub use spec::{AdNetworkType, DateRange, ReportSpec, ReportSpecBuilder, SpendQuery};
pub use tokio_util::sync::CancellationToken;
pub use transport::{ReportResponse, ReportStatus, ReportTransport};

mod account;
mod aggregate;
mod batch;
mod error;
mod events;
mod fetcher;
mod reconcile;
pub mod spec;
#[cfg(test)]
mod testing;
mod transport;
