//! The capability table: which methods and events exist at all.
//!
//! The dispatcher consults the registry before it touches any handler. A
//! method not present here is unreachable no matter what handlers a
//! session has registered, and an event not present here cannot be
//! emitted. This makes the protocol surface an explicit, inspectable
//! table built once at startup rather than whatever happens to be
//! implemented somewhere.

use std::collections::HashMap;
use std::sync::Arc;

use crate::scheme::Scheme;

// ---------------------------------------------------------------------------
// MethodDescriptor
// ---------------------------------------------------------------------------

/// What the registry knows about one method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodDescriptor {
    /// The shape of the parameters. `None` means the method accepts only
    /// the empty object.
    pub params: Option<Scheme>,

    /// The shape of the result. `None` means the method must not produce
    /// a value (other than JSON `null`).
    pub returns: Option<Scheme>,
}

impl MethodDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, scheme: Scheme) -> Self {
        self.params = Some(scheme);
        self
    }

    pub fn returns(mut self, scheme: Scheme) -> Self {
        self.returns = Some(scheme);
        self
    }
}

// ---------------------------------------------------------------------------
// Registry: the lookup seam
// ---------------------------------------------------------------------------

/// Lookup of declared methods and events by `(domain, name)`.
///
/// Names arrive already split: the dispatcher separates `"Page.navigate"`
/// into `("Page", "navigate")` at its first dot before asking.
pub trait Registry: Send + Sync + 'static {
    fn method(&self, domain: &str, method: &str) -> Option<&MethodDescriptor>;

    fn event(&self, domain: &str, event: &str) -> Option<&Scheme>;
}

/// One registry, shared by every dispatcher on the host.
impl<R: Registry + ?Sized> Registry for Arc<R> {
    fn method(&self, domain: &str, method: &str) -> Option<&MethodDescriptor> {
        (**self).method(domain, method)
    }

    fn event(&self, domain: &str, event: &str) -> Option<&Scheme> {
        (**self).event(domain, event)
    }
}

// ---------------------------------------------------------------------------
// StaticRegistry: the default table
// ---------------------------------------------------------------------------

/// The methods and events of one domain, built with chained calls:
///
/// ```
/// use trunkline_protocol::{DomainSchema, MethodDescriptor, Scheme};
///
/// let network = DomainSchema::new()
///     .method(
///         "getCookies",
///         MethodDescriptor::new()
///             .returns(Scheme::object([("cookies", Scheme::array(Scheme::Any))])),
///     )
///     .event("requestWillBeSent", Scheme::object([("url", Scheme::String)]));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DomainSchema {
    methods: HashMap<String, MethodDescriptor>,
    events: HashMap<String, Scheme>,
}

impl DomainSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a method. Declaring the same name again replaces the
    /// earlier descriptor.
    pub fn method(mut self, name: impl Into<String>, descriptor: MethodDescriptor) -> Self {
        self.methods.insert(name.into(), descriptor);
        self
    }

    /// Declares an event and the shape of its params.
    pub fn event(mut self, name: impl Into<String>, params: Scheme) -> Self {
        self.events.insert(name.into(), params);
        self
    }
}

/// A registry built once from [`DomainSchema`] declarations and immutable
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    domains: HashMap<String, DomainSchema>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a domain. Defining the same domain again replaces it whole.
    pub fn define(mut self, domain: impl Into<String>, schema: DomainSchema) -> Self {
        self.domains.insert(domain.into(), schema);
        self
    }
}

impl Registry for StaticRegistry {
    fn method(&self, domain: &str, method: &str) -> Option<&MethodDescriptor> {
        self.domains.get(domain)?.methods.get(method)
    }

    fn event(&self, domain: &str, event: &str) -> Option<&Scheme> {
        self.domains.get(domain)?.events.get(event)
    }
}

// =========================================================================
// Tests
// =========================================================================
