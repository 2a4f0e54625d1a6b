//! The protocol session: one routing context on a shared connection.
//!
//! A session owns a set of domain handlers and a reference to the sink
//! its events flow out through. The root session (no id) exists for the
//! whole life of a connection; child sessions come and go as the host
//! creates and destroys them.
//!
//! A session has exactly two states:
//!
//! ```text
//!   ┌──────┐      dispose()      ┌──────────┐
//!   │ Live │ ──────────────────→ │ Disposed │
//!   └──────┘                     └──────────┘
//!   dispatch: routed             dispatch: Domain "..." does not exist
//!   emit:     delivered          emit:     Session has been disposed.
//! ```
//!
//! Disposal drains the handlers, so a late dispatch falls into the
//! ordinary unknown-domain path. Emission is different: it checks the
//! emitter slot under its lock, which is what makes "no events after
//! dispose" hold even while other tasks are mid-emit.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::Mutex;

use trunkline_protocol::SessionId;

use crate::{DisposeError, DomainHandler, EventSink, HandlerError, SessionError};

/// One protocol session: a handler table plus an outbound event slot.
///
/// Shared as `Arc<ProtocolSession>`; all methods take `&self` and
/// synchronize internally, so handlers are free to hold a clone and call
/// back into their own session (to emit events, for instance) while a
/// dispatch is in flight.
pub struct ProtocolSession {
    /// `None` for the root session. Stamped on every envelope this
    /// session's traffic produces.
    session_id: Option<SessionId>,

    /// Registered handlers, keyed by domain name.
    handlers: Mutex<HashMap<String, Arc<dyn DomainHandler>>>,

    /// Where events go while the session is live. `None` once disposed.
    ///
    /// Weak, not Arc: the sink (the dispatcher) owns this session, and a
    /// strong reference back would keep both alive forever.
    emitter: Mutex<Option<Weak<dyn EventSink>>>,
}

impl ProtocolSession {
    pub fn new(session_id: Option<SessionId>, sink: Weak<dyn EventSink>) -> Self {
        Self {
            session_id,
            handlers: Mutex::new(HashMap::new()),
            emitter: Mutex::new(Some(sink)),
        }
    }

    /// This session's id, `None` for the root session.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Registers `handler` for `domain`. Registering a domain again
    /// replaces the previous handler without disposing it; swapping
    /// handlers mid-flight is the host's responsibility to sequence.
    pub async fn register_handler(
        &self,
        domain: impl Into<String>,
        handler: Arc<dyn DomainHandler>,
    ) {
        let domain = domain.into();
        tracing::debug!(session = self.log_label(), %domain, "handler registered");
        self.handlers.lock().await.insert(domain, handler);
    }

    /// Routes one already-validated call to the domain's handler.
    ///
    /// The handler runs outside the handler-table lock, so a slow method
    /// never blocks registration or other dispatches on this session.
    pub async fn dispatch(
        &self,
        domain: &str,
        method: &str,
        params: Value,
    ) -> Result<Option<Value>, SessionError> {
        let handler = {
            let handlers = self.handlers.lock().await;
            handlers
                .get(domain)
                .cloned()
                .ok_or_else(|| SessionError::DomainNotFound(domain.to_owned()))?
        };

        match handler.invoke(method, params).await {
            Ok(result) => Ok(result),
            Err(HandlerError::MethodNotFound(method)) => {
                Err(SessionError::MethodNotImplemented {
                    domain: domain.to_owned(),
                    method,
                })
            }
            Err(failure) => Err(failure.into()),
        }
    }

    /// Emits `event` (a qualified `"Domain.event"` name) through the
    /// session's sink, stamped with this session's id.
    ///
    /// The emitter slot stays locked across the delegated emit. A
    /// concurrent `dispose` must wait for in-flight emissions to finish
    /// and no emission can start after the slot is cleared.
    ///
    /// Failures surface to the CALLER, not to the peer: a handler that
    /// emits an undeclared event is a host bug, and turning it into a
    /// wire envelope would mislabel it as the peer's problem.
    pub async fn emit_event(
        &self,
        event: &str,
        params: Option<Value>,
    ) -> Result<(), SessionError> {
        let emitter = self.emitter.lock().await;
        let slot = emitter.as_ref().ok_or(SessionError::Disposed)?;
        let sink = slot.upgrade().ok_or(crate::EmitError::Closed)?;
        sink.emit(self.session_id.as_ref(), event, params)?;
        Ok(())
    }

    /// Tears the session down: every handler's `dispose` runs, all of
    /// them, regardless of individual failures, and afterwards the
    /// emitter slot is cleared so no further events can leave.
    ///
    /// Handlers can still emit DURING disposal (their teardown may want
    /// to announce itself); the slot is only cleared once all of them
    /// have finished. Failures are joined into one [`DisposeError`]
    /// naming each failed domain.
    ///
    /// Disposing an already-disposed session is an `Ok` no-op.
    pub async fn dispose(&self) -> Result<(), DisposeError> {
        let drained: Vec<(String, Arc<dyn DomainHandler>)> = {
            let mut handlers = self.handlers.lock().await;
            handlers.drain().collect()
        };

        let outcomes = join_all(drained.into_iter().map(|(domain, handler)| async move {
            let outcome = handler.dispose().await;
            (domain, outcome)
        }))
        .await;

        *self.emitter.lock().await = None;

        let failures: Vec<(String, HandlerError)> = outcomes
            .into_iter()
            .filter_map(|(domain, outcome)| outcome.err().map(|err| (domain, err)))
            .collect();

        tracing::debug!(
            session = self.log_label(),
            failed = failures.len(),
            "session disposed"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DisposeError::new(failures))
        }
    }

    fn log_label(&self) -> &str {
        self.session_id
            .as_ref()
            .map(SessionId::as_str)
            .unwrap_or("root")
    }
}

impl std::fmt::Debug for ProtocolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolSession")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EmitError;

    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    // -- Helpers ----------------------------------------------------------

    /// A sink that records every event it receives.
    #[derive(Default)]
    struct RecordingSink {
        events: std::sync::Mutex<Vec<(Option<String>, String, Option<Value>)>>,
    }

    impl EventSink for RecordingSink {
        fn emit(
            &self,
            session_id: Option<&SessionId>,
            event: &str,
            params: Option<Value>,
        ) -> Result<(), EmitError> {
            self.events.lock().unwrap().push((
                session_id.map(|id| id.as_str().to_owned()),
                event.to_owned(),
                params,
            ));
            Ok(())
        }
    }

    /// A handler with three fixed methods and a dispose flag:
    ///   "ping"  → produces a value
    ///   "mute"  → produces nothing
    ///   "fail"  → fails with a handler error
    struct TestHandler {
        disposed: Arc<AtomicBool>,
        fail_dispose: bool,
    }

    impl TestHandler {
        fn new() -> (Arc<Self>, Arc<AtomicBool>) {
            let flag = Arc::new(AtomicBool::new(false));
            let handler = Arc::new(Self {
                disposed: flag.clone(),
                fail_dispose: false,
            });
            (handler, flag)
        }

        fn failing_dispose() -> Arc<Self> {
            Arc::new(Self {
                disposed: Arc::new(AtomicBool::new(false)),
                fail_dispose: true,
            })
        }
    }

    #[async_trait]
    impl DomainHandler for TestHandler {
        async fn invoke(
            &self,
            method: &str,
            _params: Value,
        ) -> Result<Option<Value>, HandlerError> {
            match method {
                "ping" => Ok(Some(json!({ "pong": true }))),
                "mute" => Ok(None),
                "fail" => Err(HandlerError::Failed("no such frame".into())),
                other => Err(HandlerError::MethodNotFound(other.to_owned())),
            }
        }

        async fn dispose(&self) -> Result<(), HandlerError> {
            self.disposed.store(true, Ordering::SeqCst);
            if self.fail_dispose {
                Err("teardown failed".into())
            } else {
                Ok(())
            }
        }
    }

    /// A live session wired to a recording sink. The sink must be kept
    /// alive by the caller; the session only holds it weakly.
    fn session_with_sink(id: Option<&str>) -> (ProtocolSession, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let dynamic: Arc<dyn EventSink> = sink.clone();
        let session = ProtocolSession::new(
            id.map(SessionId::new),
            Arc::downgrade(&dynamic),
        );
        (session, sink)
    }

    // =====================================================================
    // dispatch()
    // =====================================================================

    #[tokio::test]
    async fn test_dispatch_routes_to_registered_handler() {
        let (session, _sink) = session_with_sink(None);
        let (handler, _) = TestHandler::new();
        session.register_handler("Echo", handler).await;

        let result = session.dispatch("Echo", "ping", json!({})).await.unwrap();

        assert_eq!(result, Some(json!({ "pong": true })));
    }

    #[tokio::test]
    async fn test_dispatch_method_without_result_returns_none() {
        let (session, _sink) = session_with_sink(None);
        let (handler, _) = TestHandler::new();
        session.register_handler("Echo", handler).await;

        let result = session.dispatch("Echo", "mute", json!({})).await.unwrap();

        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_domain_says_does_not_exist() {
        let (session, _sink) = session_with_sink(None);

        let err = session.dispatch("Page", "navigate", json!({})).await.unwrap_err();

        assert_eq!(err.to_string(), "Domain \"Page\" does not exist");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method_names_domain_and_method() {
        let (session, _sink) = session_with_sink(None);
        let (handler, _) = TestHandler::new();
        session.register_handler("Echo", handler).await;

        let err = session.dispatch("Echo", "shout", json!({})).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Handler for domain \"Echo\" does not implement method \"shout\""
        );
    }

    #[tokio::test]
    async fn test_dispatch_handler_failure_passes_through_unchanged() {
        let (session, _sink) = session_with_sink(None);
        let (handler, _) = TestHandler::new();
        session.register_handler("Echo", handler).await;

        let err = session.dispatch("Echo", "fail", json!({})).await.unwrap_err();

        // The peer sees the handler's own words, nothing prepended.
        assert_eq!(err.to_string(), "no such frame");
    }

    #[tokio::test]
    async fn test_register_handler_again_replaces_previous() {
        let (session, _sink) = session_with_sink(None);
        let (first, _) = TestHandler::new();
        session.register_handler("Echo", first).await;

        // A handler with no methods at all.
        struct Empty;
        #[async_trait]
        impl DomainHandler for Empty {
            async fn invoke(
                &self,
                method: &str,
                _params: Value,
            ) -> Result<Option<Value>, HandlerError> {
                Err(HandlerError::MethodNotFound(method.to_owned()))
            }
            async fn dispose(&self) -> Result<(), HandlerError> {
                Ok(())
            }
        }
        session.register_handler("Echo", Arc::new(Empty)).await;

        // "ping" existed on the first handler; the replacement wins.
        let err = session.dispatch("Echo", "ping", json!({})).await.unwrap_err();
        assert!(matches!(err, SessionError::MethodNotImplemented { .. }));
    }

    // =====================================================================
    // emit_event()
    // =====================================================================

    #[tokio::test]
    async fn test_emit_event_reaches_sink_with_session_id() {
        let (session, sink) = session_with_sink(Some("4f2a"));

        session
            .emit_event("Echo.said", Some(json!({ "text": "hi" })))
            .await
            .unwrap();

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let (session_id, event, params) = &events[0];
        assert_eq!(session_id.as_deref(), Some("4f2a"));
        assert_eq!(event, "Echo.said");
        assert_eq!(params.as_ref().unwrap()["text"], "hi");
    }

    #[tokio::test]
    async fn test_emit_event_from_root_session_has_no_id() {
        let (session, sink) = session_with_sink(None);

        session.emit_event("Browser.attached", None).await.unwrap();

        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].0, None);
    }

    #[tokio::test]
    async fn test_emit_event_after_dispose_returns_disposed() {
        let (session, _sink) = session_with_sink(Some("4f2a"));
        session.dispose().await.unwrap();

        let err = session.emit_event("Echo.said", None).await.unwrap_err();

        assert_eq!(err.to_string(), "Session has been disposed.");
    }

    #[tokio::test]
    async fn test_emit_event_with_dead_sink_returns_closed() {
        // The dispatcher dropped while the session is still held
        // somewhere; the weak reference no longer upgrades.
        let session = {
            let sink: Arc<dyn EventSink> = Arc::new(RecordingSink::default());
            let session = ProtocolSession::new(None, Arc::downgrade(&sink));
            drop(sink);
            session
        };

        let err = session.emit_event("Echo.said", None).await.unwrap_err();

        assert!(matches!(err, SessionError::Emit(EmitError::Closed)));
    }

    // =====================================================================
    // dispose()
    // =====================================================================

    #[tokio::test]
    async fn test_dispose_runs_every_handler() {
        let (session, _sink) = session_with_sink(None);
        let (first, first_flag) = TestHandler::new();
        let (second, second_flag) = TestHandler::new();
        session.register_handler("Page", first).await;
        session.register_handler("Network", second).await;

        session.dispose().await.unwrap();

        assert!(first_flag.load(Ordering::SeqCst));
        assert!(second_flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dispose_collects_failures_without_skipping_anyone() {
        // One handler fails to dispose. The other must still be torn
        // down, and the failure must name the right domain.
        let (session, _sink) = session_with_sink(None);
        let (healthy, healthy_flag) = TestHandler::new();
        session.register_handler("Page", healthy).await;
        session.register_handler("Network", TestHandler::failing_dispose()).await;

        let err = session.dispose().await.unwrap_err();

        assert!(healthy_flag.load(Ordering::SeqCst));
        assert_eq!(err.failures().len(), 1);
        assert_eq!(err.failures()[0].0, "Network");
    }

    #[tokio::test]
    async fn test_dispose_twice_is_a_noop() {
        let (session, _sink) = session_with_sink(None);
        let (handler, _) = TestHandler::new();
        session.register_handler("Page", handler).await;

        session.dispose().await.unwrap();
        // Nothing left to tear down; an idempotent Ok.
        session.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_after_dispose_finds_no_domains() {
        let (session, _sink) = session_with_sink(None);
        let (handler, _) = TestHandler::new();
        session.register_handler("Echo", handler).await;
        session.dispose().await.unwrap();

        // Handlers were drained, so this is the ordinary unknown-domain
        // path rather than a dedicated disposed error.
        let err = session.dispatch("Echo", "ping", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Domain \"Echo\" does not exist");
    }
}
