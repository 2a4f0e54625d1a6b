//! Wire protocol for Trunkline.
//!
//! This crate defines the "language" that peers and the dispatcher speak:
//!
//! - **Types** ([`Request`], [`Response`], [`EventMessage`], [`ErrorObject`]),
//!   the JSON envelopes that travel on the wire.
//! - **Schemes** ([`Scheme`], [`Validator`], [`SchemeValidator`]), the
//!   shapes that params and results are checked against.
//! - **Registry** ([`Registry`], [`StaticRegistry`]), the table of every
//!   method and event the protocol surface declares.
//! - **Errors** ([`SchemeMismatch`]), what a failed check looks like.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the
//! dispatcher (routing and sessions). It knows nothing about connections
//! or handlers; it only knows what valid messages look like.
//!
//! ```text
//! Transport (bytes) → Protocol (envelopes, schemes) → Dispatcher (routing)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod error;
mod registry;
mod scheme;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

// `pub use` flattens the public API to the crate root: users write
// `use trunkline_protocol::Scheme`, not `::scheme::Scheme`.

pub use error::SchemeMismatch;
pub use registry::{DomainSchema, MethodDescriptor, Registry, StaticRegistry};
pub use scheme::{Scheme, SchemeValidator, Validator};
pub use types::{EventMessage, ErrorObject, MessageId, Request, Response, SessionId};
