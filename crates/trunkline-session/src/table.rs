//! The session table: the root session plus every child session.
//!
//! One table per connection. The root session is created with the table
//! and lives as long as it; child sessions are created and destroyed by
//! host code (typically a target-attachment domain) while the
//! connection is up.
//!
//! # Concurrency note
//!
//! `SessionTable` is NOT synchronized by itself; it is a plain map. The
//! dispatcher owns exactly one table and wraps it in its own lock, and
//! keeping the locking at that single call site avoids double-locking
//! here.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use rand::Rng;

use trunkline_protocol::SessionId;

use crate::{EventSink, ProtocolSession, TableError};

/// All sessions multiplexed over one connection.
pub struct SessionTable {
    /// The root session. Always present, never appears in the map.
    root: Arc<ProtocolSession>,

    /// Child sessions, keyed by their generated identities.
    sessions: HashMap<SessionId, Arc<ProtocolSession>>,

    /// The sink handed to every session this table creates.
    sink: Weak<dyn EventSink>,
}

impl SessionTable {
    /// A fresh table whose root session emits through `sink`.
    pub fn new(sink: Weak<dyn EventSink>) -> Self {
        Self {
            root: Arc::new(ProtocolSession::new(None, sink.clone())),
            sessions: HashMap::new(),
            sink,
        }
    }

    /// The root session.
    pub fn root(&self) -> &Arc<ProtocolSession> {
        &self.root
    }

    /// Creates and registers a child session with a fresh identity.
    pub fn create(&mut self) -> Arc<ProtocolSession> {
        let mut id = SessionId::new(generate_session_id());
        // 128 random bits against a handful of live sessions: a
        // collision will not happen, and the loop costs one lookup.
        while self.sessions.contains_key(&id) {
            id = SessionId::new(generate_session_id());
        }

        let session = Arc::new(ProtocolSession::new(Some(id.clone()), self.sink.clone()));
        self.sessions.insert(id.clone(), session.clone());

        tracing::info!(session_id = %id, "session created");
        session
    }

    /// Resolves a wire `sessionId` to its session. `None` (the field was
    /// absent on the wire) means the root session.
    ///
    /// # Errors
    /// Returns [`TableError::SessionNotFound`] for an id this table
    /// never issued or has already removed.
    pub fn resolve(
        &self,
        session_id: Option<&SessionId>,
    ) -> Result<&Arc<ProtocolSession>, TableError> {
        match session_id {
            None => Ok(&self.root),
            Some(id) => self
                .sessions
                .get(id)
                .ok_or_else(|| TableError::SessionNotFound(id.clone())),
        }
    }

    /// Unregisters a child session, returning it if it was present.
    ///
    /// Removal is separate from disposal on purpose: the caller
    /// unregisters FIRST, so no new work can route to the session, and
    /// disposes afterwards.
    pub fn remove(&mut self, session_id: &SessionId) -> Option<Arc<ProtocolSession>> {
        let removed = self.sessions.remove(session_id);
        if removed.is_some() {
            tracing::info!(%session_id, "session removed");
        }
        removed
    }

    /// Empties the child map, handing back everything it held. Used at
    /// connection teardown, when every session is disposed together.
    pub fn drain_children(&mut self) -> Vec<Arc<ProtocolSession>> {
        self.sessions.drain().map(|(_, session)| session).collect()
    }

    /// Number of child sessions. The root is not counted.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// `true` if no child sessions exist.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl std::fmt::Debug for SessionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTable")
            .field("children", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

/// Generates a random 32-character hex identity (128 bits).
///
/// Identities are routing labels: the peer echoes one back on each
/// request it wants handled by that session. 128 bits keeps them unique
/// without coordination.
///
/// `{:02x}` formats each byte as two lowercase hex characters, so byte
/// 0x0A becomes "0a" and 0xFF becomes "ff".
fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EmitError;

    use serde_json::Value;

    // -- Helpers ----------------------------------------------------------

    /// A sink that accepts everything silently.
    struct NullSink;

    impl EventSink for NullSink {
        fn emit(
            &self,
            _session_id: Option<&SessionId>,
            _event: &str,
            _params: Option<Value>,
        ) -> Result<(), EmitError> {
            Ok(())
        }
    }

    /// A table plus the strong sink reference keeping it emittable.
    fn table() -> (SessionTable, Arc<dyn EventSink>) {
        let sink: Arc<dyn EventSink> = Arc::new(NullSink);
        let table = SessionTable::new(Arc::downgrade(&sink));
        (table, sink)
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[test]
    fn test_create_returns_session_with_32_hex_char_id() {
        let (mut table, _sink) = table();

        let session = table.create();
        let id = session.session_id().expect("child sessions have ids");

        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_create_issues_unique_ids() {
        let (mut table, _sink) = table();

        let first = table.create();
        let second = table.create();

        assert_ne!(first.session_id(), second.session_id());
        assert_eq!(table.len(), 2);
    }

    // =====================================================================
    // resolve()
    // =====================================================================

    #[test]
    fn test_resolve_none_returns_root() {
        let (table, _sink) = table();

        let session = table.resolve(None).unwrap();

        assert!(session.session_id().is_none());
        assert!(Arc::ptr_eq(session, table.root()));
    }

    #[test]
    fn test_resolve_known_id_returns_that_session() {
        let (mut table, _sink) = table();
        let created = table.create();
        let id = created.session_id().unwrap().clone();

        let resolved = table.resolve(Some(&id)).unwrap();

        assert!(Arc::ptr_eq(resolved, &created));
    }

    #[test]
    fn test_resolve_unknown_id_returns_not_found_text() {
        let (table, _sink) = table();

        let err = table
            .resolve(Some(&SessionId::new("deadbeef")))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "ERROR: cannot find session with id \"deadbeef\""
        );
    }

    // =====================================================================
    // remove() / drain_children()
    // =====================================================================

    #[test]
    fn test_remove_unregisters_session() {
        let (mut table, _sink) = table();
        let id = table.create().session_id().unwrap().clone();

        let removed = table.remove(&id);

        assert!(removed.is_some());
        assert!(table.resolve(Some(&id)).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_unknown_id_returns_none() {
        let (mut table, _sink) = table();

        assert!(table.remove(&SessionId::new("deadbeef")).is_none());
    }

    #[test]
    fn test_drain_children_empties_table_but_keeps_root() {
        let (mut table, _sink) = table();
        table.create();
        table.create();

        let drained = table.drain_children();

        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());
        // The root is untouched by draining.
        assert!(table.resolve(None).is_ok());
    }
}
