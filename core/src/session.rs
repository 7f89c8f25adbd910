//! Session providers: where a request's transport session comes from.
//!
//! # Design
//! A provider is two things: a stable identifier and a way to produce a
//! `SessionConfiguration`. The client caches one live session per identifier,
//! so two providers with the same identifier are interchangeable and compare
//! equal regardless of how they were built.

use std::hash::{Hash, Hasher};
use std::time::Duration;

use uuid::Uuid;

pub const DEFAULT_SESSION_ID: &str = "default";
pub const EPHEMERAL_SESSION_ID: &str = "ephemeral";

/// What kind of transport session a configuration describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKind {
    Default,
    /// No cookie or cache persistence.
    Ephemeral,
    /// Tagged so the transfer can continue outside the current process.
    Background { identifier: String },
}

/// Knobs a transport reads when constructing a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfiguration {
    pub kind: SessionKind,
    /// Limit on a whole plain request, body included. Downloads and uploads
    /// are not subject to it, only to `connect_timeout`.
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub persist_cookies: bool,
    pub user_agent: Option<String>,
}

impl SessionConfiguration {
    pub fn default_config() -> Self {
        Self {
            kind: SessionKind::Default,
            timeout: Some(Duration::from_secs(60)),
            connect_timeout: Some(Duration::from_secs(30)),
            persist_cookies: true,
            user_agent: None,
        }
    }

    pub fn ephemeral() -> Self {
        Self {
            kind: SessionKind::Ephemeral,
            persist_cookies: false,
            ..Self::default_config()
        }
    }

    /// Background transfers are long-lived, so there is no overall timeout.
    pub fn background(identifier: &str) -> Self {
        Self {
            kind: SessionKind::Background {
                identifier: identifier.to_string(),
            },
            timeout: None,
            ..Self::default_config()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }
}

impl Default for SessionConfiguration {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Supplies the identity and configuration of a transport session.
pub trait SessionProvider: Send + Sync {
    /// Stable key for session reuse.
    fn identifier(&self) -> &str;

    fn configuration(&self) -> SessionConfiguration;
}

/// The shared, persistent session used when a request names none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DefaultSession;

impl SessionProvider for DefaultSession {
    fn identifier(&self) -> &str {
        DEFAULT_SESSION_ID
    }

    fn configuration(&self) -> SessionConfiguration {
        SessionConfiguration::default_config()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EphemeralSession;

impl SessionProvider for EphemeralSession {
    fn identifier(&self) -> &str {
        EPHEMERAL_SESSION_ID
    }

    fn configuration(&self) -> SessionConfiguration {
        SessionConfiguration::ephemeral()
    }
}

/// Session for out-of-process transfers, keyed by a caller-chosen identifier.
#[derive(Debug, Clone)]
pub struct BackgroundSession {
    identifier: String,
}

impl BackgroundSession {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }

    /// A provider with a fresh random identifier.
    pub fn unique() -> Self {
        Self::new(format!("background-{}", Uuid::new_v4()))
    }
}

impl SessionProvider for BackgroundSession {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn configuration(&self) -> SessionConfiguration {
        SessionConfiguration::background(&self.identifier)
    }
}

impl PartialEq for BackgroundSession {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for BackgroundSession {}

impl Hash for BackgroundSession {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

/// Arbitrary identifier plus caller-supplied configuration.
#[derive(Debug, Clone)]
pub struct CustomSession {
    identifier: String,
    configuration: SessionConfiguration,
}

impl CustomSession {
    pub fn new(identifier: impl Into<String>, configuration: SessionConfiguration) -> Self {
        Self {
            identifier: identifier.into(),
            configuration,
        }
    }
}

impl SessionProvider for CustomSession {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn configuration(&self) -> SessionConfiguration {
        self.configuration.clone()
    }
}

// Configuration is deliberately ignored: identity alone decides reuse.
impl PartialEq for CustomSession {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for CustomSession {}

impl Hash for CustomSession {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}
