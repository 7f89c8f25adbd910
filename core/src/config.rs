//! Client-wide configuration.
//!
//! # Design
//! Everything here is fixed when the client is built and shared read-only by
//! every call. `ClientSettings` is the serializable subset, so a host can
//! keep it in a JSON file; the logger is always supplied in code.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::codec::{DateStrategy, JsonCodec, KeyStrategy};
use crate::error::Result;
use crate::logger::{Logger, TracingLogger};

/// Serializable part of a `ClientConfig`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    pub base_url: String,
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub key_strategy: KeyStrategy,
    #[serde(default)]
    pub date_strategy: DateStrategy,
}

#[derive(Clone)]
pub struct ClientConfig {
    base_url: String,
    default_headers: Vec<(String, String)>,
    codec: JsonCodec,
    logger: Arc<dyn Logger>,
}

impl ClientConfig {
    pub fn builder(base_url: &str) -> ClientConfigBuilder {
        ClientConfigBuilder {
            base_url: base_url.to_string(),
            default_headers: Vec::new(),
            key_strategy: KeyStrategy::default(),
            date_strategy: DateStrategy::default(),
            logger: Arc::new(TracingLogger),
        }
    }

    /// Build a config from loaded settings, rejecting an invalid date pattern.
    pub fn from_settings(settings: ClientSettings) -> Result<Self> {
        settings.date_strategy.validate()?;
        let mut builder = Self::builder(&settings.base_url)
            .key_strategy(settings.key_strategy)
            .date_strategy(settings.date_strategy);
        for (name, value) in settings.default_headers {
            builder = builder.default_header(name, value);
        }
        Ok(builder.build())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_headers(&self) -> &[(String, String)] {
        &self.default_headers
    }

    pub fn codec(&self) -> &JsonCodec {
        &self.codec
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

pub struct ClientConfigBuilder {
    base_url: String,
    default_headers: Vec<(String, String)>,
    key_strategy: KeyStrategy,
    date_strategy: DateStrategy,
    logger: Arc<dyn Logger>,
}

impl ClientConfigBuilder {
    /// Header sent with every request unless the request sets the same name.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        match self.default_headers.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = value,
            None => self.default_headers.push((name, value)),
        }
        self
    }

    pub fn key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn date_strategy(mut self, strategy: DateStrategy) -> Self {
        self.date_strategy = strategy;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            default_headers: self.default_headers,
            codec: JsonCodec::new(self.key_strategy, self.date_strategy),
            logger: self.logger,
        }
    }
}
