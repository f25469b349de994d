//! The report polling state machine.
//!
//! ```text
//! Pending ──Ready──────────────▶ Succeeded (Success | Empty)
//!    │  ──BadRequest/5xx/other─▶ Failed
//!    └─Queued/Processing─▶ Retrying ──retryIn──▶ Pending
//! ```
//!
//! Every entry into `Pending` is exactly one call to the transport. The only
//! suspension point is the retry wait, which races the cancellation token;
//! a request already on the wire is always allowed to complete.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    Credential, TransportError,
    events::{EventSink, FetchEvent, TracingSink},
    spec::ReportSpec,
    transport::{ReportResponse, ReportStatus, ReportTransport},
};

/// Wait applied when a pending response carries no `retryIn` header.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_RETRIES: u32 = 30;

/// Why a fetch ended without a report.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    #[error("malformed request or report queue limit reached")]
    BadRequest,
    #[error("server failed to generate the report")]
    ServerError,
    #[error("report generation exceeded the server time limit, narrow the request")]
    Timeout,
    #[error("{0}")]
    ConnectionError(String),
    #[error("unexpected status {0}")]
    Unexpected(u16),
    #[error("report still pending after {attempts} attempts")]
    RetryExhausted { attempts: u32 },
    #[error("report not ready before the fetch deadline")]
    DeadlineExceeded,
    #[error("cancelled")]
    Cancelled,
    /// The unit of work running the fetch died before reporting.
    #[error("worker aborted: {0}")]
    Aborted(String),
}

/// Terminal result of one fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportOutcome {
    Success(String),
    /// The report was generated and has no rows.
    Empty,
    Failed(FailureReason),
}

impl ReportOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Bounds on the polling loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Maximum number of waits before giving up; `None` polls forever.
    pub max_retries: Option<u32>,
    pub default_retry_delay: Duration,
    /// Wall-clock ceiling across all attempts of one fetch.
    pub max_elapsed: Option<Duration>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_retries: Some(DEFAULT_MAX_RETRIES),
            default_retry_delay: DEFAULT_RETRY_DELAY,
            max_elapsed: None,
        }
    }
}

/// Drives one report request to a terminal [`ReportOutcome`].
pub struct ReportFetcher<T> {
    transport: T,
    policy: FetchPolicy,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl<T: ReportTransport> ReportFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            policy: FetchPolicy::default(),
            sink: Arc::new(TracingSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Cancelling `token` stops every fetch of this fetcher at its next
    /// suspension point.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    pub(crate) fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn fetch(
        &self,
        credential: &Credential,
        login: &str,
        spec: &ReportSpec,
    ) -> ReportOutcome {
        let request = spec.to_request();
        let started = Instant::now();
        let mut retries = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return self.fail(login, FailureReason::Cancelled, None);
            }

            self.sink.emit(FetchEvent::RequestSent {
                login: login.to_string(),
                report: spec.name().to_string(),
                attempt: retries + 1,
            });
            let response = match self.transport.send(credential, login, &request).await {
                Ok(response) => response,
                Err(TransportError::InvalidRequest(detail)) => {
                    return self.fail(login, FailureReason::BadRequest, Some(detail));
                }
                Err(err) => {
                    let reason = FailureReason::ConnectionError(err.to_string());
                    return self.fail(login, reason, None);
                }
            };
            self.sink.emit(FetchEvent::ResponseReceived {
                login: login.to_string(),
                status: response.status,
                request_id: response.request_id.clone(),
            });

            let ReportResponse {
                status,
                body,
                retry_in,
                ..
            } = response;
            let reason = match status {
                ReportStatus::Ready => return self.succeed(login, body),
                ReportStatus::Queued | ReportStatus::Processing => {
                    let delay = retry_in.unwrap_or(self.policy.default_retry_delay);
                    if let Some(reason) = self.retry_denied(retries, started, delay) {
                        return self.fail(login, reason, None);
                    }
                    retries += 1;
                    self.sink.emit(FetchEvent::RetryScheduled {
                        login: login.to_string(),
                        delay,
                        attempt: retries,
                    });
                    let cancelled = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => true,
                        _ = tokio::time::sleep(delay) => false,
                    };
                    if cancelled {
                        return self.fail(login, FailureReason::Cancelled, None);
                    }
                    continue;
                }
                ReportStatus::BadRequest => FailureReason::BadRequest,
                ReportStatus::ServerError => FailureReason::ServerError,
                ReportStatus::GenerationTimeout => FailureReason::Timeout,
                ReportStatus::Other(code) => FailureReason::Unexpected(code),
            };
            return self.fail(login, reason, Some(body));
        }
    }

    fn retry_denied(
        &self,
        retries: u32,
        started: Instant,
        delay: Duration,
    ) -> Option<FailureReason> {
        if self.policy.max_retries.is_some_and(|max| retries >= max) {
            return Some(FailureReason::RetryExhausted {
                attempts: retries + 1,
            });
        }
        if self
            .policy
            .max_elapsed
            .is_some_and(|limit| started.elapsed() + delay > limit)
        {
            return Some(FailureReason::DeadlineExceeded);
        }
        None
    }

    fn succeed(&self, login: &str, body: String) -> ReportOutcome {
        if body.trim().is_empty() {
            self.sink.emit(FetchEvent::Empty {
                login: login.to_string(),
            });
            return ReportOutcome::Empty;
        }
        self.sink.emit(FetchEvent::Succeeded {
            login: login.to_string(),
            bytes: body.len(),
        });
        ReportOutcome::Success(body)
    }

    fn fail(&self, login: &str, reason: FailureReason, body: Option<String>) -> ReportOutcome {
        self.sink.emit(FetchEvent::Failed {
            login: login.to_string(),
            reason: reason.clone(),
            detail: body.filter(|b| !b.is_empty()),
        });
        ReportOutcome::Failed(reason)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use api_types::report::ReportRequest;

    use super::*;
    use crate::{
        TransportError,
        spec::{DateRange, SpendQuery},
        events::NoopSink,
        testing::{FnTransport, RecordingSink, ScriptedTransport, pending, ready},
    };

    fn spec() -> ReportSpec {
        SpendQuery::total().to_spec(DateRange::Last3Days)
    }

    fn fetcher(
        transport: ScriptedTransport,
    ) -> (ReportFetcher<ScriptedTransport>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let fetcher = ReportFetcher::new(transport).with_sink(sink.clone());
        (fetcher, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn two_pending_then_ready_waits_twice() {
        let transport = ScriptedTransport::new([
            Ok(pending(ReportStatus::Queued, 1)),
            Ok(pending(ReportStatus::Processing, 1)),
            Ok(ready("42.0")),
        ]);
        let (fetcher, sink) = fetcher(transport.clone());

        let start = Instant::now();
        let outcome = fetcher.fetch(&"token".into(), "client-1", &spec()).await;

        assert_eq!(outcome, ReportOutcome::Success("42.0".to_string()));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(transport.calls(), 3);
        assert_eq!(
            sink.retry_delays(),
            vec![Duration::from_secs(1), Duration::from_secs(1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn identical_request_is_resent() {
        let transport = ScriptedTransport::new([
            Ok(pending(ReportStatus::Queued, 1)),
            Ok(ready("1")),
        ]);
        let (fetcher, _) = fetcher(transport.clone());

        fetcher.fetch(&"token".into(), "client-1", &spec()).await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(requests[0], spec().to_request());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_retry_header_uses_default_delay() {
        let transport = ScriptedTransport::new([
            Ok(ReportResponse::new(ReportStatus::Queued, "")),
            Ok(ready("5")),
        ]);
        let (fetcher, sink) = fetcher(transport);

        let start = Instant::now();
        let outcome = fetcher.fetch(&"token".into(), "client-1", &spec()).await;

        assert_eq!(outcome, ReportOutcome::Success("5".to_string()));
        assert_eq!(start.elapsed(), DEFAULT_RETRY_DELAY);
        assert_eq!(sink.retry_delays(), vec![DEFAULT_RETRY_DELAY]);
    }

    #[tokio::test]
    async fn bad_request_fails_without_retry() {
        let transport = ScriptedTransport::new([Ok(ReportResponse::new(
            ReportStatus::BadRequest,
            r#"{"error":{"error_code":"4000"}}"#,
        ))]);
        let (fetcher, sink) = fetcher(transport.clone());

        let outcome = fetcher.fetch(&"token".into(), "client-1", &spec()).await;

        assert_eq!(outcome, ReportOutcome::Failed(FailureReason::BadRequest));
        assert_eq!(transport.calls(), 1);
        assert!(sink.retry_delays().is_empty());
        assert!(sink.events().iter().any(|e| matches!(
            e,
            FetchEvent::Failed { detail: Some(d), .. } if d.contains("4000")
        )));
    }

    #[tokio::test]
    async fn terminal_statuses_map_to_failures() {
        let cases = [
            (ReportStatus::ServerError, FailureReason::ServerError),
            (ReportStatus::GenerationTimeout, FailureReason::Timeout),
            (ReportStatus::Other(418), FailureReason::Unexpected(418)),
        ];
        for (status, reason) in cases {
            let transport = ScriptedTransport::new([Ok(ReportResponse::new(status, "{}"))]);
            let (fetcher, _) = fetcher(transport.clone());
            let outcome = fetcher.fetch(&"token".into(), "client-1", &spec()).await;
            assert_eq!(outcome, ReportOutcome::Failed(reason));
            assert_eq!(transport.calls(), 1);
        }
    }

    #[tokio::test]
    async fn transport_error_is_connection_error() {
        let transport = ScriptedTransport::new([Err(TransportError::Connection(
            "refused".to_string(),
        ))]);
        let (fetcher, _) = fetcher(transport);

        let outcome = fetcher.fetch(&"token".into(), "client-1", &spec()).await;

        assert_eq!(
            outcome,
            ReportOutcome::Failed(FailureReason::ConnectionError(
                "connection error: refused".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn empty_body_is_empty_outcome() {
        let transport = ScriptedTransport::new([Ok(ready(""))]);
        let (fetcher, _) = fetcher(transport);

        let outcome = fetcher.fetch(&"token".into(), "client-1", &spec()).await;

        assert_eq!(outcome, ReportOutcome::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_ceiling_is_enforced() {
        let transport = ScriptedTransport::repeating(pending(ReportStatus::Queued, 1));
        let (fetcher, sink) = fetcher(transport.clone());
        let fetcher = fetcher.with_policy(FetchPolicy {
            max_retries: Some(2),
            ..FetchPolicy::default()
        });

        let outcome = fetcher.fetch(&"token".into(), "client-1", &spec()).await;

        assert_eq!(
            outcome,
            ReportOutcome::Failed(FailureReason::RetryExhausted { attempts: 3 })
        );
        assert_eq!(transport.calls(), 3);
        assert_eq!(sink.retry_delays().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_polling() {
        let transport = ScriptedTransport::repeating(pending(ReportStatus::Processing, 10));
        let (fetcher, _) = fetcher(transport.clone());
        let fetcher = fetcher.with_policy(FetchPolicy {
            max_retries: None,
            max_elapsed: Some(Duration::from_secs(25)),
            ..FetchPolicy::default()
        });

        let start = Instant::now();
        let outcome = fetcher.fetch(&"token".into(), "client-1", &spec()).await;

        assert_eq!(outcome, ReportOutcome::Failed(FailureReason::DeadlineExceeded));
        assert_eq!(transport.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn cancelled_before_send_makes_no_call() {
        let transport = ScriptedTransport::new([Ok(ready("1"))]);
        let token = CancellationToken::new();
        let (fetcher, _) = fetcher(transport.clone());
        let fetcher = fetcher.with_cancellation(token.clone());
        token.cancel();

        let outcome = fetcher.fetch(&"token".into(), "client-1", &spec()).await;

        assert_eq!(outcome, ReportOutcome::Failed(FailureReason::Cancelled));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_retry_wait() {
        let transport = ScriptedTransport::repeating(pending(ReportStatus::Queued, 3600));
        let token = CancellationToken::new();
        let (fetcher, _) = fetcher(transport.clone());
        let fetcher = fetcher.with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            token.cancel();
        });
        let start = Instant::now();
        let outcome = fetcher.fetch(&"token".into(), "client-1", &spec()).await;
        canceller.await.unwrap();

        assert_eq!(outcome, ReportOutcome::Failed(FailureReason::Cancelled));
        assert_eq!(transport.calls(), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unencodable_request_is_bad_request() {
        let transport = ScriptedTransport::new([Err(TransportError::InvalidRequest(
            "invalid token".to_string(),
        ))]);
        let (fetcher, sink) = fetcher(transport);

        let outcome = fetcher.fetch(&"bad\ntoken".into(), "client-1", &spec()).await;

        assert!(outcome.is_failed());
        assert_eq!(outcome, ReportOutcome::Failed(FailureReason::BadRequest));
        assert!(sink.events().iter().any(|e| matches!(
            e,
            FetchEvent::Failed { detail: Some(d), .. } if d == "invalid token"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn request_on_the_wire_completes_despite_cancellation() {
        let transport = FnTransport::new(|_: &str, _: &ReportRequest| Ok(ready("9")))
            .with_latency(Duration::from_secs(5));
        let token = CancellationToken::new();
        let fetcher = ReportFetcher::new(transport)
            .with_sink(Arc::new(NoopSink))
            .with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });
        let start = Instant::now();
        let outcome = fetcher.fetch(&"token".into(), "client-1", &spec()).await;
        canceller.await.unwrap();

        assert_eq!(outcome, ReportOutcome::Success("9".to_string()));
        assert!(!outcome.is_failed());
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }
}
