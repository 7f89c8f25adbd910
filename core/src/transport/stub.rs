//! In-memory transport for unit tests.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{DownloadedFile, ProgressHandler, Session, Transport};
use crate::error::{TransportError, TransportErrorKind};
use crate::http::{HttpRequest, HttpResponse};
use crate::session::SessionConfiguration;

#[derive(Default)]
struct StubState {
    requests: Mutex<Vec<HttpRequest>>,
    replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    configurations: Mutex<Vec<SessionConfiguration>>,
    sessions_created: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

/// Records every wire request and answers from a queue of canned replies.
#[derive(Clone, Default)]
pub(crate) struct StubTransport {
    state: Arc<StubState>,
}

impl StubTransport {
    pub(crate) fn reply(&self, status: u16, body: &str) {
        self.state.replies.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from(body.to_string()),
        }));
    }

    pub(crate) fn reply_bytes(&self, status: u16, body: Vec<u8>) {
        self.state.replies.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            headers: Vec::new(),
            body: Bytes::from(body),
        }));
    }

    pub(crate) fn fail(&self, kind: TransportErrorKind, message: &str) {
        self.state
            .replies
            .lock()
            .unwrap()
            .push_back(Err(TransportError::new(kind, message)));
    }

    /// Hold every later `send` reply back for `delay`.
    pub(crate) fn delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub(crate) fn configurations(&self) -> Vec<SessionConfiguration> {
        self.state.configurations.lock().unwrap().clone()
    }

    pub(crate) fn sessions_created(&self) -> usize {
        self.state.sessions_created.load(Ordering::SeqCst)
    }
}

impl Transport for StubTransport {
    fn make_session(
        &self,
        configuration: &SessionConfiguration,
    ) -> Result<Arc<dyn Session>, TransportError> {
        // Widen the window in which racing creators could collide.
        std::thread::sleep(Duration::from_millis(5));
        self.state.sessions_created.fetch_add(1, Ordering::SeqCst);
        self.state
            .configurations
            .lock()
            .unwrap()
            .push(configuration.clone());
        Ok(Arc::new(StubSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct StubSession {
    state: Arc<StubState>,
}

impl StubSession {
    fn next_reply(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.state.requests.lock().unwrap().push(request);
        self.state
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new(TransportErrorKind::Other, "no stub reply")))
    }
}

#[async_trait]
impl Session for StubSession {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let delay = *self.state.delay.lock().unwrap();
        let reply = self.next_reply(request);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }

    async fn download(
        &self,
        request: HttpRequest,
        progress: ProgressHandler,
    ) -> Result<DownloadedFile, TransportError> {
        let response = self.next_reply(request)?;
        let total = response.body.len() as u64;
        // Unknown totals must never reach the consumer.
        progress(0, None);
        progress(0, Some(0));

        let mut file = tempfile::NamedTempFile::new()?;
        for chunk in response.body.chunks(256) {
            file.write_all(chunk)?;
            let written = file.as_file().metadata()?.len();
            progress(written, Some(total));
        }
        Ok(DownloadedFile {
            status: response.status,
            headers: response.headers,
            location: file.into_temp_path(),
        })
    }

    async fn upload(
        &self,
        request: HttpRequest,
        source: &Path,
        progress: ProgressHandler,
    ) -> Result<HttpResponse, TransportError> {
        let total = std::fs::metadata(source)?.len();
        progress(total / 2, Some(total));
        progress(total, Some(total));
        self.next_reply(request)
    }
}
