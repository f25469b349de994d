//! Progress events emitted by the fetcher and the batch runner.
//!
//! The engine never writes to the console: it reports through an
//! [`EventSink`]. [`TracingSink`] forwards events to `tracing` and is what
//! the engine uses unless told otherwise.

use std::time::Duration;

use crate::{fetcher::FailureReason, transport::ReportStatus};

#[derive(Clone, Debug, PartialEq)]
pub enum FetchEvent {
    /// A request is about to go on the wire.
    RequestSent {
        login: String,
        report: String,
        attempt: u32,
    },
    ResponseReceived {
        login: String,
        status: ReportStatus,
        request_id: Option<String>,
    },
    /// The report is queued or processing; the same request will be sent
    /// again after `delay`.
    RetryScheduled {
        login: String,
        delay: Duration,
        attempt: u32,
    },
    Succeeded {
        login: String,
        bytes: usize,
    },
    Empty {
        login: String,
    },
    Failed {
        login: String,
        reason: FailureReason,
        /// Server diagnostic body, when there is one.
        detail: Option<String>,
    },
    /// Cost cells that could not be parsed were ignored.
    CostCellsSkipped {
        login: String,
        skipped: usize,
    },
    AccountStarted {
        login: String,
        position: usize,
        total: usize,
    },
    AccountFinished {
        login: String,
        failed: bool,
    },
    /// The unit of work of an account panicked or was cancelled.
    WorkerAborted {
        login: String,
        detail: String,
    },
    Paced {
        delay: Duration,
    },
}

/// Receives [`FetchEvent`]s. Implementations must be cheap and must not
/// block: they are called inline from the fetch loop.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: FetchEvent);
}

/// Forwards every event to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: FetchEvent) {
        match event {
            FetchEvent::RequestSent {
                login,
                report,
                attempt,
            } => tracing::debug!("Requesting report {report} for {login} (attempt {attempt})"),
            FetchEvent::ResponseReceived {
                login,
                status,
                request_id,
            } => tracing::debug!(
                request_id = request_id.as_deref().unwrap_or("-"),
                "Report response for {login}: {status:?}"
            ),
            FetchEvent::RetryScheduled {
                login,
                delay,
                attempt,
            } => tracing::info!(
                attempt,
                "Report for {login} is being generated offline, retrying in {}s",
                delay.as_secs()
            ),
            FetchEvent::Succeeded { login, bytes } => {
                tracing::info!("Report for {login} created ({bytes} bytes)")
            }
            FetchEvent::Empty { login } => tracing::info!("Report for {login} is empty"),
            FetchEvent::Failed {
                login,
                reason,
                detail,
            } => tracing::warn!(
                detail = detail.as_deref().unwrap_or("-"),
                "Report for {login} failed: {reason}"
            ),
            FetchEvent::CostCellsSkipped { login, skipped } => {
                tracing::warn!("Skipped {skipped} malformed cost cells for {login}")
            }
            FetchEvent::AccountStarted {
                login,
                position,
                total,
            } => tracing::info!("Processing {login} ({position}/{total})"),
            FetchEvent::AccountFinished { login, failed } => {
                if failed {
                    tracing::warn!("Finished {login} with failures");
                } else {
                    tracing::debug!("Finished {login}");
                }
            }
            FetchEvent::WorkerAborted { login, detail } => {
                tracing::error!("Worker for {login} aborted: {detail}")
            }
            FetchEvent::Paced { delay } => tracing::trace!("Pacing for {delay:?}"),
        }
    }
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: FetchEvent) {}
}
