//! Typed request descriptors.
//!
//! # Design
//! A `Request<R, B, Q, P>` fixes, at compile time, what an endpoint returns
//! (`R`), what it sends (`B`), how it is queried (`Q`) and which session it
//! runs on (`P`). Unused slots default to `Empty` / `DefaultSession`, so a
//! plain GET is just `Request::<User>::get("/users/1")`. Builder methods that
//! set a body, query or session change the corresponding type parameter.
//!
//! `Empty` as a body or query means "nothing to send" and is never
//! serialized. As a response type it means "ignore the body".

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::http::HttpMethod;
use crate::session::DefaultSession;

/// Marker for an absent body, query or response payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Empty;

impl<'de> Deserialize<'de> for Empty {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(Empty)
    }
}

pub(crate) fn is_empty_marker<T: 'static>() -> bool {
    TypeId::of::<T>() == TypeId::of::<Empty>()
}

/// Declarative description of one endpoint call.
pub struct Request<R, B = Empty, Q = Empty, P = DefaultSession> {
    path: String,
    method: HttpMethod,
    body: Option<B>,
    query: Option<Q>,
    headers: Option<Vec<(String, String)>>,
    base_url: Option<String>,
    session: P,
    response: PhantomData<fn() -> R>,
}

impl<R> Request<R> {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: None,
            query: None,
            headers: None,
            base_url: None,
            session: DefaultSession,
            response: PhantomData,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }
}

impl<R, B, Q, P> Request<R, B, Q, P> {
    pub fn with_body<B2>(self, body: B2) -> Request<R, B2, Q, P> {
        Request {
            path: self.path,
            method: self.method,
            body: Some(body),
            query: self.query,
            headers: self.headers,
            base_url: self.base_url,
            session: self.session,
            response: PhantomData,
        }
    }

    pub fn with_query<Q2>(self, query: Q2) -> Request<R, B, Q2, P> {
        Request {
            path: self.path,
            method: self.method,
            body: self.body,
            query: Some(query),
            headers: self.headers,
            base_url: self.base_url,
            session: self.session,
            response: PhantomData,
        }
    }

    pub fn with_session<P2>(self, session: P2) -> Request<R, B, Q, P2> {
        Request {
            path: self.path,
            method: self.method,
            body: self.body,
            query: self.query,
            headers: self.headers,
            base_url: self.base_url,
            session,
            response: PhantomData,
        }
    }

    /// Add a request-specific header; a repeated name replaces the earlier value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        let headers = self.headers.get_or_insert_with(Vec::new);
        match headers.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = value,
            None => headers.push((name, value)),
        }
        self
    }

    /// Send this call to `base_url` instead of the client's base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn body(&self) -> Option<&B> {
        self.body.as_ref()
    }

    pub fn query(&self) -> Option<&Q> {
        self.query.as_ref()
    }

    pub fn headers(&self) -> Option<&[(String, String)]> {
        self.headers.as_deref()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn session(&self) -> &P {
        &self.session
    }
}

impl<R, B: Clone, Q: Clone, P: Clone> Clone for Request<R, B, Q, P> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            method: self.method,
            body: self.body.clone(),
            query: self.query.clone(),
            headers: self.headers.clone(),
            base_url: self.base_url.clone(),
            session: self.session.clone(),
            response: PhantomData,
        }
    }
}

impl<R, B: fmt::Debug, Q: fmt::Debug, P: fmt::Debug> fmt::Debug for Request<R, B, Q, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("body", &self.body)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .field("response", &std::any::type_name::<R>())
            .finish()
    }
}
