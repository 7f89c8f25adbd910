//! Request/response logging hooks.
//!
//! The client reports every stage of a call to a `Logger` and never looks at
//! what the logger does. `TracingLogger` forwards to `tracing`; `NoopLogger`
//! discards.

use url::Url;

use crate::error::NetworkError;
use crate::http::HttpMethod;

/// Longest body prefix, in bytes, included in a preview.
pub const PREVIEW_LIMIT: usize = 1024;

pub trait Logger: Send + Sync {
    fn log_request(
        &self,
        method: HttpMethod,
        url: &Url,
        headers: &[(String, String)],
        body: Option<&[u8]>,
    );

    fn log_response(&self, status: u16, url: &Url, body_size: usize, preview: &str);

    fn log_error(&self, error: &NetworkError);
}

/// Lossy UTF-8 rendering of at most `PREVIEW_LIMIT` bytes of `body`.
pub fn preview(body: &[u8]) -> String {
    if body.len() <= PREVIEW_LIMIT {
        return String::from_utf8_lossy(body).into_owned();
    }
    let mut text = String::from_utf8_lossy(&body[..PREVIEW_LIMIT]).into_owned();
    text.push_str("...(truncated)");
    text
}

/// Emits `tracing` events under the `endpoint_core` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log_request(
        &self,
        method: HttpMethod,
        url: &Url,
        headers: &[(String, String)],
        body: Option<&[u8]>,
    ) {
        // Header values can carry credentials; only names are logged.
        let names: Vec<&str> = headers.iter().map(|(name, _)| name.as_str()).collect();
        tracing::debug!(
            %method,
            %url,
            headers = ?names,
            body = %body.map(preview).unwrap_or_default(),
            "sending request"
        );
    }

    fn log_response(&self, status: u16, url: &Url, body_size: usize, preview: &str) {
        tracing::debug!(status, %url, body_size, preview, "received response");
    }

    fn log_error(&self, error: &NetworkError) {
        tracing::warn!(%error, retryable = error.is_retryable(), "request failed");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log_request(&self, _: HttpMethod, _: &Url, _: &[(String, String)], _: Option<&[u8]>) {}

    fn log_response(&self, _: u16, _: &Url, _: usize, _: &str) {}

    fn log_error(&self, _: &NetworkError) {}
}
