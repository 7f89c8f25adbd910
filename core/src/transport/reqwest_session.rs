//! `reqwest`-backed transport.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH};
use reqwest::{Body, Method};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use super::{DownloadedFile, ProgressHandler, Session, Transport};
use crate::error::{TransportError, TransportErrorKind};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::session::{SessionConfiguration, SessionKind};

/// Builds one `reqwest::Client` per session configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransport;

impl Transport for ReqwestTransport {
    fn make_session(
        &self,
        configuration: &SessionConfiguration,
    ) -> Result<Arc<dyn Session>, TransportError> {
        let mut builder = reqwest::Client::builder().cookie_store(configuration.persist_cookies);
        if let Some(timeout) = configuration.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(user_agent) = &configuration.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if let SessionKind::Background { .. } = configuration.kind {
            builder = builder.tcp_keepalive(Duration::from_secs(60));
        }
        let client = builder.build().map_err(transport_error)?;
        Ok(Arc::new(ReqwestSession {
            client,
            timeout: configuration.timeout,
        }))
    }
}

/// A session wrapping one `reqwest::Client` and its connection pool.
///
/// The overall `timeout` bounds `send` only. Downloads and uploads may run
/// as long as the body keeps flowing.
#[derive(Debug)]
pub struct ReqwestSession {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl ReqwestSession {
    fn prepare(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method(request.method), request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }
}

#[async_trait]
impl Session for ReqwestSession {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.prepare(request);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await.map_err(transport_error)?;
        collect(response).await
    }

    async fn download(
        &self,
        request: HttpRequest,
        progress: ProgressHandler,
    ) -> Result<DownloadedFile, TransportError> {
        let response = self.prepare(request).send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = header_pairs(response.headers());
        let expected = response.content_length();

        let (file, location) = tempfile::NamedTempFile::new()?.into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let mut received = 0u64;
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(transport_error)?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            progress(received, expected);
        }
        file.flush().await?;

        Ok(DownloadedFile {
            status,
            headers,
            location,
        })
    }

    async fn upload(
        &self,
        request: HttpRequest,
        source: &Path,
        progress: ProgressHandler,
    ) -> Result<HttpResponse, TransportError> {
        let file = tokio::fs::File::open(source).await?;
        let total = file.metadata().await?.len();

        let mut sent = 0u64;
        let chunks = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                progress(sent, Some(total));
            }
            chunk
        });

        let response = self
            .prepare(request)
            .header(CONTENT_LENGTH, total)
            .body(Body::wrap_stream(chunks))
            .send()
            .await
            .map_err(transport_error)?;
        collect(response).await
    }
}

async fn collect(response: reqwest::Response) -> Result<HttpResponse, TransportError> {
    let status = response.status().as_u16();
    let headers = header_pairs(response.headers());
    let body = response.bytes().await.map_err(transport_error)?;
    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}

// Non-UTF-8 header values are dropped.
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

fn transport_error(err: reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_body() || err.is_decode() {
        TransportErrorKind::Io
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, err.to_string())
}
