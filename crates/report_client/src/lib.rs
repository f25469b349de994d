//! HTTP transport for the reporting service.
//!
//! The client is a thin adapter: one `POST` per call, no retries. Polling
//! and backoff live in [`engine::ReportFetcher`].

use std::time::Duration;

use api_types::report::{ErrorResponse, ReportRequest};
use engine::{Credential, ReportResponse, ReportStatus, ReportTransport, TransportError};
use reqwest::{
    Client, Url,
    header::{self, HeaderMap, HeaderName, HeaderValue},
};

pub const DEFAULT_REPORTS_URL: &str = "https://api.direct.yandex.com/json/v5/reports";
const DEFAULT_LANGUAGE: &str = "ru";

const CLIENT_LOGIN: &str = "client-login";
const RETRY_IN: &str = "retryin";
const REQUEST_ID: &str = "requestid";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid header value: {0}")]
    InvalidHeader(String),
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone, Debug)]
pub struct ReportClient {
    http: Client,
    url: Url,
}

impl ReportClient {
    pub fn builder() -> ReportClientBuilder {
        ReportClientBuilder::default()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn authorization(credential: &Credential) -> Result<HeaderValue, TransportError> {
        let mut auth = HeaderValue::try_from(format!("Bearer {}", credential.expose()))
            .map_err(|err| TransportError::InvalidRequest(format!("invalid token: {err}")))?;
        auth.set_sensitive(true);
        Ok(auth)
    }
}

impl ReportTransport for ReportClient {
    async fn send(
        &self,
        credential: &Credential,
        login: &str,
        request: &ReportRequest,
    ) -> Result<ReportResponse, TransportError> {
        let login_header = HeaderValue::try_from(login)
            .map_err(|err| TransportError::InvalidRequest(format!("invalid login: {err}")))?;

        tracing::debug!("POST {} for {login}", self.url);
        let res = self
            .http
            .post(self.url.clone())
            .header(header::AUTHORIZATION, Self::authorization(credential)?)
            .header(CLIENT_LOGIN, login_header)
            .json(request)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = ReportStatus::from_code(res.status().as_u16());
        let retry_in = retry_in(res.headers());
        let request_id = res
            .headers()
            .get(REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = res
            .text()
            .await
            .map_err(|err| TransportError::InvalidResponse(err.to_string()))?;

        if !matches!(status, ReportStatus::Ready) && !status.is_pending() {
            if let Ok(diagnostic) = serde_json::from_str::<ErrorResponse>(&body) {
                tracing::debug!(
                    code = diagnostic.error.error_code.as_deref().unwrap_or("-"),
                    "{login}: {}",
                    diagnostic.error.error_detail.as_deref().unwrap_or("no detail")
                );
            }
        }

        Ok(ReportResponse {
            status,
            body,
            retry_in,
            request_id,
        })
    }
}

fn map_send_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else {
        TransportError::Connection(err.to_string())
    }
}

/// `retryIn` is a whole number of seconds. Anything else is ignored and
/// the fetcher falls back to its default delay.
fn retry_in(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_IN)?;
    match raw.to_str().ok().and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(secs) => Some(Duration::from_secs(secs)),
        None => {
            tracing::warn!("ignoring malformed retryIn header: {raw:?}");
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct ReportClientBuilder {
    url: Option<String>,
    language: Option<String>,
    timeout: Option<Duration>,
}

impl ReportClientBuilder {
    pub fn url(mut self, url: &str) -> ReportClientBuilder {
        self.url = Some(url.to_string());
        self
    }

    pub fn language(mut self, language: &str) -> ReportClientBuilder {
        self.language = Some(language.to_string());
        self
    }

    /// Per-request timeout. Offline reports are polled, so this only bounds
    /// a single call.
    pub fn timeout(mut self, timeout: Duration) -> ReportClientBuilder {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ReportClient, ClientError> {
        let url = self.url.as_deref().unwrap_or(DEFAULT_REPORTS_URL);
        let url = Url::parse(url).map_err(|err| ClientError::InvalidUrl(format!("{url}: {err}")))?;

        let language = self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::try_from(language)
                .map_err(|err| ClientError::InvalidHeader(err.to_string()))?,
        );
        // Report body only: no title row, no column names, no totals row,
        // money in currency units rather than micros.
        for (name, value) in [
            ("skipreportheader", "true"),
            ("skipcolumnheader", "true"),
            ("skipreportsummary", "true"),
            ("returnmoneyinmicros", "false"),
        ] {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        let mut http = Client::builder().default_headers(headers);
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }

        tracing::info!("Initializing report client for {url}");
        Ok(ReportClient {
            http: http.build()?,
            url,
        })
    }
}
