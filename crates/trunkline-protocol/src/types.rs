//! Core wire types for Trunkline's protocol.
//!
//! This module defines every JSON shape that travels over a connection:
//! requests arriving from the peer, responses and events going back out.
//! Field names and optionality are load-bearing. Peers pattern-match on the
//! exact JSON, so changing a `rename` or a `skip_serializing_if` here
//! changes the protocol.

// Serde is Rust's standard serialization framework. The two key traits:
//   - `Serialize`:   "I can be turned INTO JSON"
//   - `Deserialize`: "I can be created FROM JSON"
// The `derive` macro auto-generates these implementations for our types.
use serde::{Deserialize, Serialize};

// `Value` is serde_json's dynamically typed JSON tree. Method parameters and
// results are opaque at this layer (only schemes know their shape), so they
// stay as `Value` until a handler interprets them.
use serde_json::Value;

// `fmt` for implementing Display (human-readable printing).
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The caller-chosen identifier of a request.
///
/// This is a "newtype wrapper": a named struct around a primitive `u64`.
/// The wrapper means you cannot hand a raw counter to a function expecting
/// a request id, and signatures like `fn respond(id: MessageId)` document
/// themselves.
///
/// The peer picks the id and we echo it back verbatim in the response, which
/// is the only thing that lets the peer match responses to pending calls on
/// a connection where replies arrive out of order.
///
/// `#[serde(transparent)]` serializes this as the inner number, so
/// `MessageId(42)` becomes `42` in JSON, not `{"0":42}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

/// Display lets us use `{}` in format strings and logging.
impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identifier of a protocol session multiplexed over one connection.
///
/// Same newtype pattern as `MessageId`, around a `String` this time.
/// Session ids are generated server-side as 32 hex characters and handed to
/// the peer, who includes one in each request it wants routed to that
/// session. The root session has no id at all: on the wire its traffic
/// simply omits the `sessionId` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Request: peer → dispatcher
// ---------------------------------------------------------------------------

/// One method call from the peer.
///
/// ```json
/// { "id": 1, "sessionId": "4f2a...", "method": "Network.getCookies", "params": {} }
/// ```
///
/// Every field is an `Option` on purpose: the dispatcher, not the type
/// system, enforces which fields a valid request needs, because a request
/// missing its `method` must still produce a well-addressed error response
/// rather than a deserialization failure. Typed construction is for the
/// sending side (clients and tests); the receiving side reads fields
/// leniently out of the raw JSON.
///
/// `#[serde(rename = "sessionId")]` maps the Rust snake_case field onto the
/// camelCase wire name. `skip_serializing_if` omits absent fields entirely
/// instead of writing `"sessionId": null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Request {
    /// Caller-chosen id, echoed back in the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    /// Target session. Absent means the root session.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// Qualified method name, `"Domain.method"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Method arguments. Absent is treated as the empty object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// A request addressed to the root session.
    pub fn call(id: MessageId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Some(id),
            session_id: None,
            method: Some(method.into()),
            params: Some(params),
        }
    }

    /// Routes the request to a specific session instead of the root.
    pub fn on_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

// ---------------------------------------------------------------------------
// Response: dispatcher → peer, one per request
// ---------------------------------------------------------------------------

/// The reply to one request: either a result or an error, never both.
///
/// Success:
/// ```json
/// { "id": 1, "sessionId": "4f2a...", "result": { "cookies": [] } }
/// ```
/// Failure:
/// ```json
/// { "id": 1, "error": { "message": "...", "data": "..." } }
/// ```
///
/// A root-session response has no `sessionId` key. A success whose method
/// produced no value has no `result` key, while a method that explicitly
/// produced JSON `null` serializes as `"result": null`. That distinction is
/// exactly `Option<Value>`: `None` is omitted, `Some(Value::Null)` is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// A success envelope echoing the request's addressing fields.
    pub fn success(
        id: Option<MessageId>,
        session_id: Option<SessionId>,
        result: Option<Value>,
    ) -> Self {
        Self {
            id,
            session_id,
            result,
            error: None,
        }
    }

    /// A failure envelope. `id` and `session_id` are whatever could be
    /// recovered from the request, possibly nothing.
    pub fn failure(
        id: Option<MessageId>,
        session_id: Option<SessionId>,
        error: ErrorObject,
    ) -> Self {
        Self {
            id,
            session_id,
            result: None,
            error: Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorObject: the payload of a failure response
// ---------------------------------------------------------------------------

/// What went wrong, in two layers of detail.
///
/// `message` is the one-line human-readable description that clients show
/// or match on. `data` carries the full debug rendering of the underlying
/// error, wrapped causes included, for people reading logs on the peer
/// side. Clients treat `data` as opaque diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl ErrorObject {
    /// Builds both layers from any error type: `message` from `Display`,
    /// `data` from `Debug`.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self {
            message: err.to_string(),
            data: Some(format!("{err:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// EventMessage: dispatcher → peer, unsolicited
// ---------------------------------------------------------------------------

/// A server-initiated notification, not tied to any request.
///
/// ```json
/// { "method": "Network.requestWillBeSent", "params": { ... }, "sessionId": "4f2a..." }
/// ```
///
/// Events carry no `id`: nothing acknowledges them and nothing is matched
/// against them. The absence of `id` is also how peers tell events apart
/// from responses on a shared connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Qualified event name, `"Domain.event"`.
    pub method: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl EventMessage {
    pub fn new(
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Self {
        Self {
            method: method.into(),
            params,
            session_id,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
