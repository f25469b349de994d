//! The seam between the engine and the remote reporting endpoint.
//!
//! The engine never speaks HTTP: it hands a [`ReportRequest`] to a
//! [`ReportTransport`] and gets back a [`ReportResponse`] whose status is a
//! closed [`ReportStatus`].

use std::{future::Future, sync::Arc, time::Duration};

use api_types::report::ReportRequest;

use crate::{Credential, TransportError};

/// Status of a report call, as interpreted from the HTTP status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportStatus {
    /// 200: the report is in the body.
    Ready,
    /// 201: the report was queued for offline generation.
    Queued,
    /// 202: the report is being generated offline.
    Processing,
    /// 400 or 429: malformed request or report queue limit reached.
    BadRequest,
    /// 500: generation failed on the server.
    ServerError,
    /// 502: generation exceeded the server time limit.
    GenerationTimeout,
    Other(u16),
}

impl ReportStatus {
    pub fn from_code(code: u16) -> Self {
        match code {
            200 => Self::Ready,
            201 => Self::Queued,
            202 => Self::Processing,
            400 | 429 => Self::BadRequest,
            500 => Self::ServerError,
            502 => Self::GenerationTimeout,
            other => Self::Other(other),
        }
    }

    /// `true` for the two "try again later" statuses.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }
}

/// One response of the reporting endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportResponse {
    pub status: ReportStatus,
    /// TSV text on success, JSON diagnostic otherwise.
    pub body: String,
    /// Server-suggested wait before polling again (`retryIn` header).
    pub retry_in: Option<Duration>,
    /// Correlation id (`RequestId` header).
    pub request_id: Option<String>,
}

impl ReportResponse {
    pub fn new(status: ReportStatus, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_in: None,
            request_id: None,
        }
    }

    pub fn retry_in(mut self, delay: Duration) -> Self {
        self.retry_in = Some(delay);
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Sends one report request.
///
/// Implementations perform exactly one network call per invocation and must
/// not retry on their own: polling is driven by the [`ReportFetcher`].
///
///  [`ReportFetcher`]: crate::ReportFetcher
pub trait ReportTransport: Send + Sync {
    fn send(
        &self,
        credential: &Credential,
        login: &str,
        request: &ReportRequest,
    ) -> impl Future<Output = Result<ReportResponse, TransportError>> + Send;
}

impl<T: ReportTransport> ReportTransport for Arc<T> {
    fn send(
        &self,
        credential: &Credential,
        login: &str,
        request: &ReportRequest,
    ) -> impl Future<Output = Result<ReportResponse, TransportError>> + Send {
        (**self).send(credential, login, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_codes() {
        assert_eq!(ReportStatus::from_code(200), ReportStatus::Ready);
        assert_eq!(ReportStatus::from_code(201), ReportStatus::Queued);
        assert_eq!(ReportStatus::from_code(202), ReportStatus::Processing);
        assert_eq!(ReportStatus::from_code(400), ReportStatus::BadRequest);
        assert_eq!(ReportStatus::from_code(429), ReportStatus::BadRequest);
        assert_eq!(ReportStatus::from_code(500), ReportStatus::ServerError);
        assert_eq!(ReportStatus::from_code(502), ReportStatus::GenerationTimeout);
        assert_eq!(ReportStatus::from_code(503), ReportStatus::Other(503));
    }

    #[test]
    fn only_queued_and_processing_are_pending() {
        assert!(ReportStatus::Queued.is_pending());
        assert!(ReportStatus::Processing.is_pending());
        assert!(!ReportStatus::Ready.is_pending());
        assert!(!ReportStatus::Other(204).is_pending());
    }
}
