//! The domain handler hook: where host functionality plugs in.
//!
//! Trunkline routes calls and checks shapes; it implements no domain of
//! its own. Hosts implement [`DomainHandler`] once per domain ("Page",
//! "Network", ...) and register the implementations on a session. From
//! then on every `Domain.method` call addressed to that session lands in
//! the matching handler's [`invoke`](DomainHandler::invoke).
//!
//! # Why `#[async_trait]`?
//!
//! Handlers are stored as `Arc<dyn DomainHandler>` in a map keyed by
//! domain name, so the trait must be object-safe. Native async trait
//! methods are not object-safe; the `async_trait` macro boxes the
//! returned futures to get us there.

use async_trait::async_trait;
use serde_json::Value;

use crate::HandlerError;

/// One domain's worth of methods, plus its teardown.
///
/// `dispose` is a required method on purpose. Every handler owns
/// something conceptually (subscriptions, child resources, observers),
/// and a handler with nothing to release says so explicitly by returning
/// `Ok(())`. Forgetting teardown is a compile error, not a runtime
/// surprise during session shutdown.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use trunkline_session::{DomainHandler, HandlerError};
///
/// struct EchoHandler;
///
/// #[async_trait]
/// impl DomainHandler for EchoHandler {
///     async fn invoke(
///         &self,
///         method: &str,
///         params: Value,
///     ) -> Result<Option<Value>, HandlerError> {
///         match method {
///             "say" => Ok(Some(json!({ "text": params["text"] }))),
///             other => Err(HandlerError::MethodNotFound(other.to_owned())),
///         }
///     }
///
///     async fn dispose(&self) -> Result<(), HandlerError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait DomainHandler: Send + Sync {
    /// Runs `method` with already-validated `params`.
    ///
    /// Returns `Ok(Some(result))` for methods that produce a value and
    /// `Ok(None)` for methods that do not. A method name the handler
    /// does not know is `Err(HandlerError::MethodNotFound)`; the session
    /// adds domain context to that error before it reaches the wire.
    async fn invoke(&self, method: &str, params: Value)
        -> Result<Option<Value>, HandlerError>;

    /// Releases whatever the handler holds. Called once per
    /// registration when the owning session is disposed.
    async fn dispose(&self) -> Result<(), HandlerError>;
}
