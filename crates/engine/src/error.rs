//! The module contains the errors the engine can return.
//!
//! Fetch failures are not errors: they are reported as
//! [`ReportOutcome::Failed`] values so that a batch never aborts on one
//! account. The errors here cover invalid parameters and what a transport
//! reports when the remote service could not be reached.
//!
//!  [`ReportOutcome::Failed`]: super::fetcher::ReportOutcome::Failed
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug, PartialEq)]
pub enum EngineError {
    #[error("Invalid commission: {0}")]
    InvalidCommission(String),
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
}

/// Error returned by a [`ReportTransport`] when no status code could be
/// obtained from the remote service.
///
///  [`ReportTransport`]: super::transport::ReportTransport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
