//! SSE session registry
//!
//! Maps session ids to the transport of the stream that minted them. Only
//! the HTTP dispatcher mutates it; every POST reads it.

use crate::error::DispatchError;
use crate::mcp::sse_transport::SseTransport;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque session token handed to the client in the `endpoint` event
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Live SSE sessions keyed by id
///
/// Safe to share across the multi-threaded runtime; insert, lookup and
/// removal are each atomic with respect to one another.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SseTransport>>,
}

pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `transport` under its own session id
    ///
    /// A live entry is never replaced; inserting an id that is already
    /// registered fails with `SessionConflict`.
    pub fn insert(&self, transport: Arc<SseTransport>) -> Result<(), DispatchError> {
        match self.sessions.entry(transport.session_id().clone()) {
            Entry::Occupied(entry) => {
                Err(DispatchError::SessionConflict(entry.key().to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(transport);
                Ok(())
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SseTransport>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<SseTransport>> {
        self.sessions
            .remove(session_id)
            .map(|(_, transport)| transport)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
