//! Protocol sessions for Trunkline.
//!
//! This crate handles the routing contexts multiplexed over one
//! connection:
//!
//! 1. **Handlers** ([`DomainHandler`] trait), the hook where host
//!    functionality plugs in, one implementation per domain
//! 2. **Sessions** ([`ProtocolSession`]), each owning its handlers and
//!    an outbound event slot
//! 3. **The table** ([`SessionTable`]), the root session plus every
//!    child session, keyed by generated identities
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatcher (above)  ← resolves sessions, validates params, routes calls
//!     ↕
//! Session Layer (this crate)  ← handler tables, event slots, disposal
//!     ↕
//! Protocol Layer (below)  ← provides SessionId and the envelope types
//! ```

mod error;
mod handler;
mod session;
mod sink;
mod table;

pub use error::{DisposeError, EmitError, HandlerError, SessionError, TableError};
pub use handler::DomainHandler;
pub use session::ProtocolSession;
pub use sink::EventSink;
pub use table::SessionTable;

// Re-exported so hosts writing handlers do not need their own
// async-trait dependency line.
pub use async_trait::async_trait;
