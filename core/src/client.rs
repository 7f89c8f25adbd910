//! The client execution engine.
//!
//! # Design
//! `Client` turns a typed `Request` into a result in three steps that are
//! also public on their own: `build_request` resolves the descriptor into an
//! `HttpRequest` without I/O, the transport session performs the call, and
//! `parse_response` classifies the status and decodes the body. `execute`
//! strings those together; `download` and `upload` do the same on a spawned
//! task and report progress through a `Transfer`.
//!
//! The configuration is immutable and the session cache is the only shared
//! mutable state, so a `Client` is cheap to clone and safe to use from many
//! tasks at once. Nothing is retried here.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::TempPath;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::SessionCache;
use crate::config::ClientConfig;
use crate::error::{validate_status, NetworkError, Result, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::logger::{preview, Logger};
use crate::progress::{ProgressSender, Transfer};
use crate::request::{is_empty_marker, Request};
use crate::session::SessionProvider;
use crate::transport::{ReqwestTransport, Transport};

#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ClientConfig,
    sessions: SessionCache,
}

impl Client {
    /// A client backed by `reqwest`.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sessions: SessionCache::new(transport),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.inner.sessions
    }

    /// Resolve `request` into a wire request. Performs no I/O.
    ///
    /// Headers are layered: JSON content negotiation first, then the
    /// client's defaults, then the request's own, each overwriting
    /// identical names.
    pub fn build_request<R, B, Q, P>(&self, request: &Request<R, B, Q, P>) -> Result<HttpRequest>
    where
        B: Serialize + 'static,
        Q: Serialize + 'static,
    {
        let config = self.config();
        let codec = config.codec();

        let query = match request.query() {
            Some(query) if !is_empty_marker::<Q>() => {
                codec.encode_query(query).map_err(|err| self.report(err))?
            }
            _ => Vec::new(),
        };

        let base = request
            .base_url()
            .map(|base| base.trim_end_matches('/'))
            .unwrap_or(config.base_url());
        let mut url = join(base, request.path())?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut wire = HttpRequest::new(request.method(), url);
        wire.set_header("Content-Type", "application/json");
        wire.set_header("Accept", "application/json");
        for (name, value) in config.default_headers() {
            wire.set_header(name, value);
        }
        for (name, value) in request.headers().unwrap_or_default() {
            wire.set_header(name, value);
        }

        if let Some(body) = request.body() {
            if !is_empty_marker::<B>() {
                wire.body = Some(codec.encode(body).map_err(|err| self.report(err))?);
            }
        }
        Ok(wire)
    }

    /// Validate `response`'s status and decode its body as `R`.
    ///
    /// Error statuses are returned without touching the body.
    pub fn parse_response<R>(&self, response: &HttpResponse) -> Result<R>
    where
        R: DeserializeOwned + 'static,
    {
        validate_status(response.status)?;
        if is_empty_marker::<R>() {
            return self.config().codec().decode(b"null");
        }
        self.config().codec().decode(&response.body)
    }

    /// Perform `request` and decode the response.
    ///
    /// Dropping the returned future cancels the transport call.
    pub async fn execute<R, B, Q, P>(&self, request: &Request<R, B, Q, P>) -> Result<R>
    where
        R: DeserializeOwned + 'static,
        B: Serialize + 'static,
        Q: Serialize + 'static,
        P: SessionProvider,
    {
        let wire = self.build_request(request)?;
        let session = self
            .sessions()
            .acquire(request.session())
            .await
            .map_err(|err| self.report(err))?;

        let logger = self.logger();
        logger.log_request(wire.method, &wire.url, &wire.headers, wire.body.as_deref());
        let url = wire.url.clone();
        let response = session
            .send(wire)
            .await
            .map_err(|err| self.report(err.into()))?;
        logger.log_response(response.status, &url, response.body.len(), &preview(&response.body));

        self.parse_response(&response)
            .map_err(|err| self.report(err))
    }

    /// Like `execute`, but resolves to a `Cancelled` transport error as soon
    /// as `cancel` fires.
    pub async fn execute_cancellable<R, B, Q, P>(
        &self,
        request: &Request<R, B, Q, P>,
        cancel: &CancellationToken,
    ) -> Result<R>
    where
        R: DeserializeOwned + 'static,
        B: Serialize + 'static,
        Q: Serialize + 'static,
        P: SessionProvider,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.report(NetworkError::cancelled())),
            result = self.execute(request) => result,
        }
    }

    /// Download `request`'s response body to `destination`.
    ///
    /// The body is streamed into a temporary file and moved into place only
    /// after a 2xx status, replacing any existing file. If the transfer
    /// fails or is dropped, the destination is left untouched. Must be called
    /// inside a Tokio runtime.
    pub fn download<R, B, Q, P>(
        &self,
        request: &Request<R, B, Q, P>,
        destination: impl Into<PathBuf>,
    ) -> Transfer<PathBuf>
    where
        B: Serialize + 'static,
        Q: Serialize + 'static,
        P: SessionProvider + Clone + 'static,
    {
        let wire = self.build_request(request);
        let provider = request.session().clone();
        let destination = destination.into();
        let client = self.clone();
        Transfer::spawn(move |events| async move {
            let outcome = client.run_download(wire, &provider, destination, &events).await;
            events.finish(outcome).await;
        })
    }

    /// Upload the file at `source` as the body of `request` and decode the
    /// response as `R`.
    ///
    /// The descriptor's own body, if any, is not sent. Must be called inside
    /// a Tokio runtime.
    pub fn upload<R, B, Q, P>(
        &self,
        request: &Request<R, B, Q, P>,
        source: impl Into<PathBuf>,
    ) -> Transfer<R>
    where
        R: DeserializeOwned + Send + 'static,
        B: Serialize + 'static,
        Q: Serialize + 'static,
        P: SessionProvider + Clone + 'static,
    {
        let wire = self.build_request(request).map(|mut wire| {
            wire.body = None;
            wire
        });
        let provider = request.session().clone();
        let source = source.into();
        let client = self.clone();
        Transfer::spawn(move |events| async move {
            let outcome = client.run_upload(wire, &provider, &source, &events).await;
            events.finish(outcome).await;
        })
    }

    async fn run_download<P: SessionProvider>(
        &self,
        wire: Result<HttpRequest>,
        provider: &P,
        destination: PathBuf,
        events: &Arc<ProgressSender<PathBuf>>,
    ) -> Result<PathBuf> {
        let wire = wire?;
        let session = self
            .sessions()
            .acquire(provider)
            .await
            .map_err(|err| self.report(err))?;

        let logger = self.logger();
        logger.log_request(wire.method, &wire.url, &wire.headers, None);
        let url = wire.url.clone();
        let downloaded = session
            .download(wire, events.observer())
            .await
            .map_err(|err| self.report(err.into()))?;
        let size = tokio::fs::metadata(&downloaded.location)
            .await
            .map(|meta| meta.len() as usize)
            .unwrap_or_default();
        logger.log_response(downloaded.status, &url, size, "");

        validate_status(downloaded.status).map_err(|err| self.report(err))?;
        relocate(downloaded.location, &destination)
            .await
            .map_err(|err| self.report(TransportError::from(err).into()))?;
        Ok(destination)
    }

    async fn run_upload<R, P>(
        &self,
        wire: Result<HttpRequest>,
        provider: &P,
        source: &Path,
        events: &Arc<ProgressSender<R>>,
    ) -> Result<R>
    where
        R: DeserializeOwned + Send + 'static,
        P: SessionProvider,
    {
        let wire = wire?;
        let session = self
            .sessions()
            .acquire(provider)
            .await
            .map_err(|err| self.report(err))?;

        let logger = self.logger();
        logger.log_request(wire.method, &wire.url, &wire.headers, None);
        let url = wire.url.clone();
        let response = session
            .upload(wire, source, events.observer())
            .await
            .map_err(|err| self.report(err.into()))?;
        logger.log_response(response.status, &url, response.body.len(), &preview(&response.body));

        self.parse_response(&response)
            .map_err(|err| self.report(err))
    }

    fn logger(&self) -> &dyn Logger {
        self.config().logger()
    }

    fn report(&self, err: NetworkError) -> NetworkError {
        self.logger().log_error(&err);
        err
    }
}

fn join(base: &str, path: &str) -> Result<Url> {
    let joined = if path.is_empty() || path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    };
    Url::parse(&joined).map_err(|err| NetworkError::InvalidUrl(format!("{joined}: {err}")))
}

/// Move a finished download to `destination`, replacing what is there.
async fn relocate(download: TempPath, destination: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    if tokio::fs::rename(&download, destination).await.is_ok() {
        let _ = download.keep();
        return Ok(());
    }

    // Different filesystem: stage a copy next to the destination, then rename.
    let directory = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let staged = tempfile::NamedTempFile::new_in(directory)?.into_temp_path();
    tokio::fs::copy(&download, &staged).await?;
    tokio::fs::rename(&staged, destination).await?;
    let _ = staged.keep();
    Ok(())
}
