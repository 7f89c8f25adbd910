//! Live transport sessions, one per session-provider identifier.
//!
//! # Design
//! Lookups take a shared read lock. A miss upgrades to the write lock,
//! re-checks, and constructs the session while still holding it, so a
//! session is built at most once per identifier and no reader can see a
//! half-built entry. Creation is serialized across the whole cache, which is
//! fine because it happens once per identifier. Entries live until
//! explicitly invalidated.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::Result;
use crate::session::SessionProvider;
use crate::transport::{Session, Transport};

pub struct SessionCache {
    transport: Arc<dyn Transport>,
    sessions: RwLock<HashMap<String, Arc<dyn Session>>>,
}

impl SessionCache {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the session for `provider`'s identifier, creating it on first use.
    pub async fn acquire<P>(&self, provider: &P) -> Result<Arc<dyn Session>>
    where
        P: SessionProvider + ?Sized,
    {
        let identifier = provider.identifier();
        if let Some(session) = self.sessions.read().await.get(identifier) {
            return Ok(Arc::clone(session));
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(identifier) {
            return Ok(Arc::clone(session));
        }
        let session = self.transport.make_session(&provider.configuration())?;
        tracing::debug!(identifier, "created transport session");
        sessions.insert(identifier.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Drop the cached session for `identifier`. In-flight calls holding it
    /// keep it alive; the next `acquire` builds a fresh one.
    pub async fn invalidate(&self, identifier: &str) -> bool {
        self.sessions.write().await.remove(identifier).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache").finish_non_exhaustive()
    }
}
