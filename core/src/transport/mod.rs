//! The transport collaborator.
//!
//! # Design
//! The client never speaks HTTP itself. A `Transport` turns a
//! `SessionConfiguration` into a reusable `Session`, and the session performs
//! the three kinds of call the client needs: a buffered request/response, a
//! download streamed into a temporary file, and an upload streamed from a
//! file. Progress is reported as raw byte counts; turning those into
//! fractions is the client's job.
//!
//! `ReqwestTransport` is the production implementation. Tests substitute
//! their own `Transport` to observe wire requests without a network.

mod reqwest_session;
#[cfg(test)]
pub(crate) mod stub;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempPath;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};
use crate::session::SessionConfiguration;

pub use reqwest_session::{ReqwestSession, ReqwestTransport};

/// Byte-count callback: `(transferred, expected_total)`.
pub type ProgressHandler = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// A finished download, still sitting in a temporary location.
///
/// Dropping the value deletes the temporary file.
#[derive(Debug)]
pub struct DownloadedFile {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub location: TempPath,
}

/// A live transport session, reusable across calls.
#[async_trait]
pub trait Session: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    async fn download(
        &self,
        request: HttpRequest,
        progress: ProgressHandler,
    ) -> Result<DownloadedFile, TransportError>;

    async fn upload(
        &self,
        request: HttpRequest,
        source: &Path,
        progress: ProgressHandler,
    ) -> Result<HttpResponse, TransportError>;
}

/// Constructs sessions from configuration values.
pub trait Transport: Send + Sync {
    fn make_session(
        &self,
        configuration: &SessionConfiguration,
    ) -> Result<Arc<dyn Session>, TransportError>;
}
