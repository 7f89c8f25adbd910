//! Typed HTTP endpoints and the engine that executes them.
//!
//! # Overview
//! Every endpoint is a `Request<R, B, Q, P>` value whose type fixes the
//! response it decodes to, the body and query it sends, and the session it
//! runs on. A `Client` resolves that descriptor against client-wide
//! configuration, runs it on a cached transport session, classifies the
//! status, and decodes the payload. Uploads and downloads run on their own
//! task and report progress through a `Transfer` stream.
//!
//! # Design
//! - `Client::build_request` and `Client::parse_response` are pure; only the
//!   transport `Session` does I/O, so both halves test without a network.
//! - Sessions are cached per session-provider identifier and built exactly
//!   once, even under concurrent first use.
//! - Errors form one closed enum, `NetworkError`. Nothing retries; callers
//!   can consult `NetworkError::is_retryable`.
//! - The client is configured once and passed around explicitly; there is
//!   no global instance.

pub mod cache;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod progress;
pub mod request;
pub mod session;
pub mod transport;

pub use cache::SessionCache;
pub use client::Client;
pub use codec::{DateStrategy, JsonCodec, KeyStrategy};
pub use config::{ClientConfig, ClientConfigBuilder, ClientSettings};
pub use error::{classify, NetworkError, Result, TransportError, TransportErrorKind};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use progress::{ProgressEvent, Transfer};
pub use request::{Empty, Request};
pub use session::{
    BackgroundSession, CustomSession, DefaultSession, EphemeralSession, SessionConfiguration,
    SessionKind, SessionProvider,
};
pub use transport::{DownloadedFile, ProgressHandler, ReqwestTransport, Session, Transport};
