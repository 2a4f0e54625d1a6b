//! The outbound event seam between sessions and the connection.

use serde_json::Value;
use trunkline_protocol::SessionId;

use crate::EmitError;

/// Where a session's events go.
///
/// Implemented by the dispatcher. A sink checks the event against the
/// registry, wraps it in an event envelope stamped with `session_id`,
/// and queues it for the connection.
///
/// `emit` is synchronous on purpose: sessions call it while holding
/// their emitter slot locked (that is what makes "no events after
/// dispose" airtight), so an implementation must only do cheap,
/// non-blocking work: look up, check, serialize, enqueue.
///
/// Sessions hold their sink as `Weak<dyn EventSink>`. The dispatcher
/// owns the sessions, so a strong reference back would cycle and leak
/// both sides.
pub trait EventSink: Send + Sync {
    fn emit(
        &self,
        session_id: Option<&SessionId>,
        event: &str,
        params: Option<Value>,
    ) -> Result<(), EmitError>;
}
