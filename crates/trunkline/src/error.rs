//! Unified error types for the Trunkline dispatcher.
//!
//! [`DispatchError`] covers everything that can go wrong while handling one
//! inbound message. Most variants are wire-visible: their `Display` text is
//! sent verbatim to the peer in the `error.message` field of the failure
//! envelope, so the exact strings are part of the protocol and must not be
//! reworded casually.

use trunkline_session::{DisposeError, SessionError, TableError};
use trunkline_transport::TransportError;

/// Everything that can fail while dispatching a single protocol message.
///
/// Wire-visible variants carry the `ERROR: ` prefix in their `Display`
/// output; [`AlreadyAttached`](DispatchError::AlreadyAttached) is the one
/// variant that is only ever seen by the host, never by the peer.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The payload was not valid JSON (or not a JSON object).
    #[error("ERROR: failed to parse protocol message: {0}")]
    Parse(#[from] serde_json::Error),

    /// The message named a session this dispatcher does not know.
    #[error(transparent)]
    SessionNotFound(#[from] TableError),

    /// The message had no usable `id` (absent, zero, or not an integer).
    #[error("ERROR: every message must have an 'id' parameter")]
    MissingId,

    /// The message had no usable `method` (absent or not a string).
    #[error("ERROR: every message must have a 'method' parameter")]
    MissingMethod,

    /// The method is not `domain.method`, or the registry has no entry for it.
    #[error("ERROR: method '{0}' is not supported")]
    MethodNotSupported(String),

    /// The params failed validation; the handler was never invoked.
    #[error("ERROR: failed to call method '{method}': {detail}")]
    InvalidParams { method: String, detail: String },

    /// The handler's return value failed validation against the returns scheme.
    #[error("ERROR: failed to dispatch method '{method}' result: {detail}")]
    InvalidResult { method: String, detail: String },

    /// The session layer rejected the call (unknown domain, disposed, ...).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// `run` was called a second time on the same dispatcher.
    #[error("dispatcher is already attached to a connection")]
    AlreadyAttached,
}

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `trunkline` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TrunklineError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A dispatch-level error (parse, routing, validation).
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A session-level error (unknown domain, disposed session).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// One or more handlers failed to dispose cleanly.
    #[error(transparent)]
    Dispose(#[from] DisposeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use trunkline_protocol::SessionId;

    // Wire-visible Display texts; peers match on these strings.

    #[test]
    fn test_missing_id_display_exact_text() {
        assert_eq!(
            DispatchError::MissingId.to_string(),
            "ERROR: every message must have an 'id' parameter"
        );
    }

    #[test]
    fn test_missing_method_display_exact_text() {
        assert_eq!(
            DispatchError::MissingMethod.to_string(),
            "ERROR: every message must have a 'method' parameter"
        );
    }

    #[test]
    fn test_method_not_supported_display_includes_full_method() {
        let err = DispatchError::MethodNotSupported("Page.navigate".into());
        assert_eq!(err.to_string(), "ERROR: method 'Page.navigate' is not supported");
    }

    #[test]
    fn test_invalid_params_display_names_method_and_detail() {
        let err = DispatchError::InvalidParams {
            method: "Network.getCookies".into(),
            detail: "expected string, got number at 'urls[0]'".into(),
        };
        assert_eq!(
            err.to_string(),
            "ERROR: failed to call method 'Network.getCookies': \
             expected string, got number at 'urls[0]'"
        );
    }

    #[test]
    fn test_invalid_result_display_names_method_and_detail() {
        let err = DispatchError::InvalidResult {
            method: "Echo.say".into(),
            detail: "expected no value, got number".into(),
        };
        assert_eq!(
            err.to_string(),
            "ERROR: failed to dispatch method 'Echo.say' result: \
             expected no value, got number"
        );
    }

    #[test]
    fn test_session_not_found_is_transparent() {
        let err: DispatchError = TableError::SessionNotFound(SessionId::new("f00d")).into();
        assert_eq!(err.to_string(), "ERROR: cannot find session with id \"f00d\"");
    }

    // From conversions into the top-level wrapper.

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let top: TrunklineError = err.into();
        assert!(matches!(top, TrunklineError::Transport(_)));
        assert!(top.to_string().contains("gone"));
    }

    #[test]
    fn test_from_dispatch_error() {
        let top: TrunklineError = DispatchError::MissingId.into();
        assert!(matches!(top, TrunklineError::Dispatch(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::DomainNotFound("Page".into());
        let top: TrunklineError = err.into();
        assert!(matches!(top, TrunklineError::Session(_)));
        assert_eq!(top.to_string(), "Domain \"Page\" does not exist");
    }
}
