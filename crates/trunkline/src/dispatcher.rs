//! The dispatcher: one connection's worth of protocol state.
//!
//! A [`Dispatcher`] owns the session table for a single connection and
//! drives every message through the same pipeline:
//!
//! ```text
//!   peer ──text──▶ run() loop ──spawn──▶ dispatch_message
//!                     ▲                        │ resolve session, validate,
//!                     │                        ▼ invoke handler
//!                outbound queue ◀── envelope / event
//! ```
//!
//! Each inbound message is handled on its own task, so a slow method does
//! not hold up the messages behind it, and responses go out in completion
//! order rather than arrival order. Peers correlate by `id`, not by
//! position.
//!
//! The dispatcher is also the [`EventSink`] its sessions emit through:
//! events and responses funnel into one outbound queue and leave the
//! connection in queue order.

use std::sync::{Arc, Weak};

use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use futures_util::future::join_all;

use trunkline_protocol::{
    ErrorObject, EventMessage, MessageId, Registry, Response, Scheme, SchemeMismatch,
    SchemeValidator, SessionId, Validator,
};
use trunkline_session::{
    DisposeError, EmitError, EventSink, ProtocolSession, SessionTable,
};
use trunkline_transport::{Connection, TransportError};

use crate::error::{DispatchError, TrunklineError};

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Configures and builds a [`Dispatcher`].
///
/// The registry is mandatory (a dispatcher with no declared methods would
/// answer every call with "not supported"); the validator defaults to the
/// strict [`SchemeValidator`].
pub struct DispatcherBuilder {
    registry: Arc<dyn Registry>,
    validator: Arc<dyn Validator>,
}

impl DispatcherBuilder {
    /// Swaps in a custom validation engine.
    pub fn validator(mut self, validator: impl Validator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn build(self) -> Dispatcher {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        // The session table holds a weak reference back to the inner core
        // (its EventSink), so the core must be constructed cyclically.
        let inner = Arc::new_cyclic(|weak: &Weak<DispatcherInner>| {
            let sink: Weak<dyn EventSink> = weak.clone();
            let sessions = SessionTable::new(sink);
            let root = Arc::clone(sessions.root());
            DispatcherInner {
                registry: self.registry,
                validator: self.validator,
                root,
                sessions: Mutex::new(sessions),
                outbound_tx,
                outbound_rx: Mutex::new(Some(outbound_rx)),
            }
        });

        Dispatcher { inner }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Routes protocol messages between one connection and its sessions.
///
/// Cheap to clone: clones share the same session table and outbound
/// queue. Handlers typically capture a clone so they can create and
/// destroy sessions from inside a method call.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Starts building a dispatcher over `registry`.
    pub fn builder(registry: impl Registry) -> DispatcherBuilder {
        DispatcherBuilder {
            registry: Arc::new(registry),
            validator: Arc::new(SchemeValidator),
        }
    }

    /// The root session. Always live while the dispatcher exists; its
    /// traffic carries no `sessionId` on the wire.
    pub fn root_session(&self) -> Arc<ProtocolSession> {
        Arc::clone(&self.inner.root)
    }

    /// Creates a child session with a fresh identity and registers it for
    /// routing. The caller hands the returned session's id to the peer
    /// out-of-band (typically in a method result).
    pub async fn create_session(&self) -> Arc<ProtocolSession> {
        let mut sessions = self.inner.sessions.lock().await;
        sessions.create()
    }

    /// Destroys a session: unregisters it FIRST, so no new message can
    /// route to it, then disposes it. Handler teardown failures propagate
    /// to the caller; the session is unreachable either way.
    ///
    /// Destroying the root session just disposes it (it is never in the
    /// routing table). Destroying a session twice is a no-op.
    pub async fn destroy_session(&self, session: &ProtocolSession) -> Result<(), DisposeError> {
        if let Some(id) = session.session_id() {
            let mut sessions = self.inner.sessions.lock().await;
            sessions.remove(id);
        }
        session.dispose().await
    }

    /// Drives `connection` until the peer disconnects or the transport
    /// fails, then disposes every session.
    ///
    /// One call per dispatcher: the dispatcher's lifetime is the
    /// connection's lifetime, and a second `run` fails with
    /// [`DispatchError::AlreadyAttached`]. To stop serving early, drop or
    /// abort the future; teardown of sessions then falls to the host.
    pub async fn run<C>(&self, connection: C) -> Result<(), TrunklineError>
    where
        C: Connection<Error = TransportError>,
    {
        let mut outbound = {
            let mut slot = self.inner.outbound_rx.lock().await;
            slot.take().ok_or(DispatchError::AlreadyAttached)?
        };

        let conn_id = connection.id();
        tracing::debug!(%conn_id, "dispatcher attached");

        // --- Step 1: Message loop ---
        //
        // Two sources, one task. Inbound messages are spawned off
        // immediately; outbound envelopes are sent inline, so a parked
        // recv never delays a send.
        let result = loop {
            tokio::select! {
                inbound = connection.recv() => match inbound {
                    Ok(Some(payload)) => {
                        let inner = Arc::clone(&self.inner);
                        tokio::spawn(async move {
                            inner.dispatch_message(&payload).await;
                        });
                    }
                    Ok(None) => {
                        tracing::debug!(%conn_id, "peer closed the connection");
                        break Ok(());
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "transport failed");
                        break Err(e);
                    }
                },
                outgoing = outbound.recv() => match outgoing {
                    Some(text) => {
                        if let Err(e) = connection.send(text.as_bytes()).await {
                            tracing::debug!(%conn_id, error = %e, "send failed");
                            break Err(e);
                        }
                    }
                    // The sender lives in the inner core, which `self`
                    // keeps alive, so the queue cannot end first.
                    None => break Ok(()),
                },
            }
        };

        // --- Step 2: Teardown ---
        //
        // Every session goes down with the connection, children and root
        // alike. Registered handlers would otherwise never hear about the
        // disconnect.
        self.inner.dispose_all_sessions().await;

        if let Err(e) = connection.close().await {
            tracing::debug!(%conn_id, error = %e, "close failed");
        }
        tracing::debug!(%conn_id, "dispatcher detached");

        // Dropping `outbound` here: anything still queued, or enqueued by
        // in-flight handlers from now on, is logged and discarded.
        result.map_err(TrunklineError::from)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// DispatcherInner: the shared core
// ---------------------------------------------------------------------------

struct DispatcherInner {
    registry: Arc<dyn Registry>,
    validator: Arc<dyn Validator>,

    /// The root session, cloned out of the table so access needs no lock.
    root: Arc<ProtocolSession>,

    /// The routing table. Locked briefly for resolution and
    /// create/remove; never held across a handler call.
    sessions: Mutex<SessionTable>,

    /// Serialized envelopes and events on their way to the peer.
    outbound_tx: UnboundedSender<String>,

    /// The receiving end, waiting for `run` to claim it. `None` after.
    outbound_rx: Mutex<Option<UnboundedReceiver<String>>>,
}

impl DispatcherInner {
    /// Handles one raw inbound message end to end. Always produces
    /// exactly one response envelope, however malformed the input.
    async fn dispatch_message(&self, payload: &[u8]) {
        let mut data: Value = match serde_json::from_slice(payload) {
            Ok(data) => data,
            Err(e) => {
                let error = DispatchError::Parse(e);
                tracing::warn!(error = %error, "dropping unparseable message");
                // Nothing to echo: the envelope is addressed to no call.
                self.enqueue(Response::failure(None, None, ErrorObject::from_error(&error)));
                return;
            }
        };

        // Field recovery is lenient on purpose. A request missing its
        // method must still produce an error response that echoes the id
        // and sessionId it DID carry.
        let id = data.get("id").and_then(Value::as_u64).map(MessageId);
        let session_id = data
            .get("sessionId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(SessionId::new);
        let method = data.get("method").and_then(Value::as_str).map(str::to_owned);
        let params = data.get_mut("params").map(Value::take);

        let outcome = self
            .handle_request(id, session_id.as_ref(), method.as_deref(), params)
            .await;

        let response = match outcome {
            Ok(result) => Response::success(id, session_id, result),
            Err(error) => {
                tracing::debug!(method = method.as_deref().unwrap_or(""), error = %error, "request failed");
                Response::failure(id, session_id, ErrorObject::from_error(&error))
            }
        };
        self.enqueue(response);
    }

    /// The dispatch pipeline proper. Any `Err` becomes the failure
    /// envelope for this request.
    async fn handle_request(
        &self,
        id: Option<MessageId>,
        session_id: Option<&SessionId>,
        method: Option<&str>,
        params: Option<Value>,
    ) -> Result<Option<Value>, DispatchError> {
        // Session resolution comes before the id and method checks: a
        // message for a dead session is answered as such even when it is
        // missing everything else.
        let session = {
            let sessions = self.sessions.lock().await;
            Arc::clone(sessions.resolve(session_id)?)
        };

        // An id of 0 counts as missing. The response id field still
        // echoes what actually arrived.
        if !id.is_some_and(|id| id.0 != 0) {
            return Err(DispatchError::MissingId);
        }
        let method = match method {
            Some(method) if !method.is_empty() => method,
            _ => return Err(DispatchError::MissingMethod),
        };

        // "Domain.method", split at the first dot. Dotless names cannot
        // exist in any registry, so they fall out here as unsupported.
        let (domain, name) = method
            .split_once('.')
            .ok_or_else(|| DispatchError::MethodNotSupported(method.to_owned()))?;
        let descriptor = self
            .registry
            .method(domain, name)
            .ok_or_else(|| DispatchError::MethodNotSupported(method.to_owned()))?;

        // Params are validated before the handler sees them. Absent and
        // null both read as the empty object.
        let params = match params {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(value) => value,
        };
        let empty = Scheme::empty_object();
        let params_scheme = descriptor.params.as_ref().unwrap_or(&empty);
        self.validator
            .validate(params_scheme, &params)
            .map_err(|mismatch| DispatchError::InvalidParams {
                method: method.to_owned(),
                detail: mismatch.to_string(),
            })?;

        let result = session.dispatch(domain, name, params).await?;

        // Results are validated before the peer sees them. A declared
        // returns scheme must match (absence reads as null); with no
        // scheme declared, producing anything but null is itself the
        // mismatch.
        let mismatch = match (descriptor.returns.as_ref(), result.as_ref()) {
            (Some(scheme), Some(value)) => self.validator.validate(scheme, value).err(),
            (Some(scheme), None) => self.validator.validate(scheme, &Value::Null).err(),
            (None, Some(value)) if !value.is_null() => {
                Some(SchemeMismatch::unexpected_value(value))
            }
            _ => None,
        };
        if let Some(mismatch) = mismatch {
            return Err(DispatchError::InvalidResult {
                method: method.to_owned(),
                detail: mismatch.to_string(),
            });
        }

        Ok(result)
    }

    /// Disposes every session this dispatcher ever created, concurrently.
    /// Failures are logged, not propagated: teardown continues past them.
    async fn dispose_all_sessions(&self) {
        let sessions = {
            let mut table = self.sessions.lock().await;
            let mut all = table.drain_children();
            all.push(Arc::clone(table.root()));
            all
        };

        let outcomes = join_all(sessions.iter().map(|session| session.dispose())).await;
        for (session, outcome) in sessions.iter().zip(outcomes) {
            if let Err(e) = outcome {
                let label = session
                    .session_id()
                    .map(SessionId::as_str)
                    .unwrap_or("root");
                tracing::warn!(session = label, error = %e, "session failed to dispose cleanly");
            }
        }
    }

    /// Queues one envelope for the connection. If the run loop is gone
    /// there is no peer left to care, so the envelope is dropped.
    fn enqueue(&self, response: Response) {
        match serde_json::to_string(&response) {
            Ok(text) => {
                if self.outbound_tx.send(text).is_err() {
                    tracing::debug!("connection is gone, dropping response");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize response"),
        }
    }
}

/// Events funnel through the same outbound queue as responses.
///
/// Emission is synchronous: the registry lookup and validation are pure
/// lookups, and queueing is non-blocking. Sessions call this while
/// holding their emitter lock, which is what serializes emission against
/// disposal.
impl EventSink for DispatcherInner {
    fn emit(
        &self,
        session_id: Option<&SessionId>,
        event: &str,
        params: Option<Value>,
    ) -> Result<(), EmitError> {
        let Some((domain, name)) = event.split_once('.') else {
            return Err(EmitError::Unsupported(event.to_owned()));
        };
        let Some(scheme) = self.registry.event(domain, name) else {
            return Err(EmitError::Unsupported(event.to_owned()));
        };

        // Same leniency as params on the way in: an event without params
        // is validated as the empty object but serialized without the key.
        let empty = Value::Object(Map::new());
        self.validator
            .validate(scheme, params.as_ref().unwrap_or(&empty))
            .map_err(|mismatch| EmitError::InvalidParams {
                event: event.to_owned(),
                detail: mismatch.to_string(),
            })?;

        let message = EventMessage::new(event, params, session_id.cloned());
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, event, "failed to serialize event");
                return Ok(());
            }
        };
        self.outbound_tx.send(text).map_err(|_| EmitError::Closed)
    }
}
