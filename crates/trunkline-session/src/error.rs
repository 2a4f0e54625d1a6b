//! Error types for the session layer.
//!
//! Several of these Display texts are part of the wire protocol: they
//! travel to peers inside error envelopes, and client libraries match on
//! them. Changing the wording of [`SessionError`] or [`EmitError`]
//! variants is a protocol change, not a cosmetic one.

use trunkline_protocol::SessionId;

/// A failure inside a domain handler.
///
/// Handlers raise `MethodNotFound` for method names they do not
/// implement; the session layer turns that into the wire-visible
/// "does not implement method" text with the domain filled in.
/// `Failed` carries any other handler-level failure as plain text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The handler has no method by this name.
    #[error("unknown method \"{0}\"")]
    MethodNotFound(String),

    /// The method ran and failed.
    #[error("{0}")]
    Failed(String),
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_owned())
    }
}

/// Errors a [`ProtocolSession`](crate::ProtocolSession) raises when
/// dispatching a call or emitting an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No handler is registered for the domain.
    #[error("Domain \"{0}\" does not exist")]
    DomainNotFound(String),

    /// The domain's handler does not implement the method.
    #[error("Handler for domain \"{domain}\" does not implement method \"{method}\"")]
    MethodNotImplemented { domain: String, method: String },

    /// The session was disposed; it can no longer dispatch or emit.
    #[error("Session has been disposed.")]
    Disposed,

    /// The handler itself failed. Passed through unchanged, so the
    /// handler's own message reaches the peer.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Event emission failed downstream of the session.
    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// Errors raised by an [`EventSink`](crate::EventSink) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    /// The event is not declared in the registry.
    #[error("ERROR: event '{0}' is not supported")]
    Unsupported(String),

    /// The event params do not match the declared shape.
    #[error("ERROR: failed to emit event '{event}': {detail}")]
    InvalidParams { event: String, detail: String },

    /// The connection behind the sink is gone.
    #[error("connection is closed")]
    Closed,
}

/// The aggregate outcome of disposing a session whose handlers failed.
///
/// Disposal never short-circuits: every handler's `dispose` runs to
/// completion and every failure is collected here, keyed by domain.
#[derive(Debug, thiserror::Error)]
#[error("{} handler(s) failed to dispose", .failures.len())]
pub struct DisposeError {
    failures: Vec<(String, HandlerError)>,
}

impl DisposeError {
    pub(crate) fn new(failures: Vec<(String, HandlerError)>) -> Self {
        Self { failures }
    }

    /// The failures, one `(domain, error)` pair per handler that failed.
    pub fn failures(&self) -> &[(String, HandlerError)] {
        &self.failures
    }
}

/// Errors from the session table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// No session is registered under this id.
    #[error("ERROR: cannot find session with id \"{0}\"")]
    SessionNotFound(SessionId),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // The exact texts below are matched by client libraries. These tests
    // exist to make editing them a deliberate act.

    #[test]
    fn test_domain_not_found_text() {
        let err = SessionError::DomainNotFound("Network".into());
        assert_eq!(err.to_string(), "Domain \"Network\" does not exist");
    }

    #[test]
    fn test_method_not_implemented_text() {
        let err = SessionError::MethodNotImplemented {
            domain: "Page".into(),
            method: "navigate".into(),
        };
        assert_eq!(
            err.to_string(),
            "Handler for domain \"Page\" does not implement method \"navigate\""
        );
    }

    #[test]
    fn test_disposed_text_ends_with_period() {
        assert_eq!(SessionError::Disposed.to_string(), "Session has been disposed.");
    }

    #[test]
    fn test_emit_unsupported_text() {
        let err = EmitError::Unsupported("Page.crashed".into());
        assert_eq!(err.to_string(), "ERROR: event 'Page.crashed' is not supported");
    }

    #[test]
    fn test_handler_failure_passes_through_transparently() {
        // The handler's own message must reach the peer unchanged, with
        // no "handler error:" style prefix added on the way.
        let err = SessionError::from(HandlerError::Failed("no such frame".into()));
        assert_eq!(err.to_string(), "no such frame");
    }

    #[test]
    fn test_dispose_error_counts_failures() {
        let err = DisposeError::new(vec![
            ("Page".into(), HandlerError::Failed("boom".into())),
            ("Network".into(), HandlerError::Failed("bang".into())),
        ]);
        assert_eq!(err.to_string(), "2 handler(s) failed to dispose");
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_table_session_not_found_text() {
        let err = TableError::SessionNotFound(SessionId::new("deadbeef"));
        assert_eq!(
            err.to_string(),
            "ERROR: cannot find session with id \"deadbeef\""
        );
    }
}
