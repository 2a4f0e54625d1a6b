//! # Trunkline
//!
//! Session-multiplexed RPC dispatcher for JSON protocols in the
//! DevTools style.
//!
//! One connection carries many sessions; each session owns domain
//! handlers; the dispatcher validates every message against a declared
//! registry before any handler runs and every result before the peer
//! sees it. Hosts implement [`DomainHandler`](prelude::DomainHandler)
//! for their domains and hand the dispatcher a connection.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use serde_json::{json, Value};
//! use trunkline::prelude::*;
//!
//! struct EchoHandler;
//!
//! #[async_trait]
//! impl DomainHandler for EchoHandler {
//!     async fn invoke(&self, method: &str, params: Value) -> Result<Option<Value>, HandlerError> {
//!         match method {
//!             "say" => Ok(Some(json!({ "text": params["text"].clone() }))),
//!             other => Err(HandlerError::MethodNotFound(other.to_owned())),
//!         }
//!     }
//!
//!     async fn dispose(&self) -> Result<(), HandlerError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn serve(connection: trunkline::prelude::ChannelConnection) -> Result<(), TrunklineError> {
//! let registry = StaticRegistry::new().define(
//!     "Echo",
//!     DomainSchema::new().method(
//!         "say",
//!         MethodDescriptor::new()
//!             .params(Scheme::object([("text", Scheme::String)]))
//!             .returns(Scheme::object([("text", Scheme::String)])),
//!     ),
//! );
//!
//! let dispatcher = Dispatcher::builder(registry).build();
//! dispatcher
//!     .root_session()
//!     .register_handler("Echo", Arc::new(EchoHandler))
//!     .await;
//! dispatcher.run(connection).await?;
//! # Ok(())
//! # }
//! ```

mod dispatcher;
mod error;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{DispatchError, TrunklineError};

/// Everything a host needs to declare a protocol surface, implement its
/// handlers, and serve a connection.
pub mod prelude {
    pub use crate::dispatcher::{Dispatcher, DispatcherBuilder};
    pub use crate::error::{DispatchError, TrunklineError};

    pub use trunkline_protocol::{
        DomainSchema, ErrorObject, EventMessage, MessageId, MethodDescriptor, Registry,
        Request, Response, Scheme, SchemeMismatch, SchemeValidator, SessionId,
        StaticRegistry, Validator,
    };
    pub use trunkline_session::{
        async_trait, DisposeError, DomainHandler, EmitError, EventSink, HandlerError,
        ProtocolSession, SessionError, SessionTable, TableError,
    };
    pub use trunkline_transport::{
        ChannelConnection, Connection, ConnectionId, Transport, TransportError,
        WebSocketConnection, WebSocketTransport,
    };
}
