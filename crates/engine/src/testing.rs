//! Deterministic transports and sinks shared by the unit tests.

use std::{
    collections::VecDeque,
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use api_types::report::ReportRequest;

use crate::{
    Credential, TransportError,
    events::{EventSink, FetchEvent},
    transport::{ReportResponse, ReportStatus, ReportTransport},
};

pub(crate) fn ready(body: &str) -> ReportResponse {
    ReportResponse::new(ReportStatus::Ready, body).request_id("req-ready")
}

pub(crate) fn pending(status: ReportStatus, retry_secs: u64) -> ReportResponse {
    ReportResponse::new(status, "").retry_in(Duration::from_secs(retry_secs))
}

type Reply = Result<ReportResponse, TransportError>;

#[derive(Default)]
struct Script {
    replies: VecDeque<Reply>,
    repeat: Option<Reply>,
    requests: Vec<ReportRequest>,
}

/// Replays a fixed sequence of replies, whatever the login.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub(crate) fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        let script = Script {
            replies: replies.into_iter().collect(),
            ..Script::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    /// Answers every call with `reply`.
    pub(crate) fn repeating(reply: ReportResponse) -> Self {
        let script = Script {
            repeat: Some(Ok(reply)),
            ..Script::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }

    pub(crate) fn requests(&self) -> Vec<ReportRequest> {
        self.script.lock().unwrap().requests.clone()
    }
}

impl ReportTransport for ScriptedTransport {
    fn send(
        &self,
        _credential: &Credential,
        _login: &str,
        request: &ReportRequest,
    ) -> impl Future<Output = Reply> + Send {
        let reply = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(request.clone());
            match script.replies.pop_front() {
                Some(reply) => reply,
                None => script
                    .repeat
                    .clone()
                    .unwrap_or_else(|| Err(TransportError::Connection("script exhausted".into()))),
            }
        };
        async move { reply }
    }
}

/// Computes each reply from the login and the request, after `latency`.
pub(crate) struct FnTransport<F> {
    reply: F,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl<F> FnTransport<F>
where
    F: Fn(&str, &ReportRequest) -> Reply + Send + Sync,
{
    pub(crate) fn new(reply: F) -> Self {
        Self {
            reply,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl<F> ReportTransport for FnTransport<F>
where
    F: Fn(&str, &ReportRequest) -> Reply + Send + Sync,
{
    fn send(
        &self,
        _credential: &Credential,
        login: &str,
        request: &ReportRequest,
    ) -> impl Future<Output = Reply> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = (self.reply)(login, request);
        async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            reply
        }
    }
}

/// Keeps every event for later inspection.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<FetchEvent>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<FetchEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn retry_delays(&self) -> Vec<Duration> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                FetchEvent::RetryScheduled { delay, .. } => Some(delay),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn started_logins(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                FetchEvent::AccountStarted { login, .. } => Some(login),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: FetchEvent) {
        self.events.lock().unwrap().push(event);
    }
}
