//! Structural schemes for method parameters, results, and event payloads.
//!
//! A [`Scheme`] describes the shape a JSON value must have, the dispatcher
//! checks inbound params and outbound results against it before any handler
//! or peer sees them. Schemes are declared once, at registry-building time:
//!
//! ```
//! use trunkline_protocol::Scheme;
//!
//! let cookie = Scheme::object([
//!     ("name", Scheme::String),
//!     ("value", Scheme::String),
//!     ("secure", Scheme::optional(Scheme::Boolean)),
//! ]);
//! let returns = Scheme::object([("cookies", Scheme::array(cookie))]);
//! ```
//!
//! The checking engine itself sits behind the [`Validator`] trait so hosts
//! can swap in their own (for instance one that tolerates unknown
//! properties during rollout). [`SchemeValidator`] is the default engine.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::Value;

use crate::error::{json_kind, SchemeMismatch};

// ---------------------------------------------------------------------------
// Scheme: the shape language
// ---------------------------------------------------------------------------

/// The shape a JSON value is required to have.
///
/// `Optional` and `Nullable` are deliberately distinct: `Optional` says an
/// object property may be absent, `Nullable` says a present value may be
/// JSON `null`. An explicit `null` does not satisfy a plain `Optional`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheme {
    /// Accepts any JSON value.
    Any,
    /// A JSON string.
    String,
    /// A JSON number (integer or float).
    Number,
    /// A JSON boolean.
    Boolean,
    /// A string drawn from a fixed set of options.
    Enum(Vec<String>),
    /// The inner shape, or JSON `null`.
    Nullable(Box<Scheme>),
    /// An object property that may be absent entirely.
    Optional(Box<Scheme>),
    /// An array whose every element matches the inner shape.
    Array(Box<Scheme>),
    /// An object with exactly the declared properties. Undeclared
    /// properties are rejected; declared non-optional ones are required.
    Object(BTreeMap<String, Scheme>),
}

impl Scheme {
    /// An object scheme from `(name, shape)` pairs.
    pub fn object<K, I>(properties: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Scheme)>,
    {
        Self::Object(
            properties
                .into_iter()
                .map(|(name, scheme)| (name.into(), scheme))
                .collect(),
        )
    }

    /// The scheme of a method that takes or returns nothing: an object
    /// with no properties.
    pub fn empty_object() -> Self {
        Self::Object(BTreeMap::new())
    }

    pub fn array(element: Scheme) -> Self {
        Self::Array(Box::new(element))
    }

    pub fn optional(inner: Scheme) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn nullable(inner: Scheme) -> Self {
        Self::Nullable(Box::new(inner))
    }

    /// An enum scheme from its allowed string options.
    pub fn one_of<S, I>(options: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        Self::Enum(options.into_iter().map(Into::into).collect())
    }

    /// One line describing what this scheme expects, used in mismatch
    /// messages ("expected string or null, got number").
    fn describe(&self) -> String {
        match self {
            Scheme::Any => "any value".into(),
            Scheme::String => "string".into(),
            Scheme::Number => "number".into(),
            Scheme::Boolean => "boolean".into(),
            Scheme::Enum(options) => format!("one of [{}]", options.join(", ")),
            Scheme::Nullable(inner) => format!("{} or null", inner.describe()),
            // Optionality is about presence, not shape.
            Scheme::Optional(inner) => inner.describe(),
            Scheme::Array(_) => "array".into(),
            Scheme::Object(_) => "object".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validator: the checking seam
// ---------------------------------------------------------------------------

/// Checks a JSON value against a scheme.
///
/// The dispatcher calls this in exactly two places: on a request's params
/// before the handler runs, and on a handler's result before the response
/// is sent. Implementations must be cheap to call and must not block.
pub trait Validator: Send + Sync + 'static {
    fn validate(&self, scheme: &Scheme, value: &Value) -> Result<(), SchemeMismatch>;
}

/// The default engine: a strict recursive walk.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemeValidator;

impl Validator for SchemeValidator {
    fn validate(&self, scheme: &Scheme, value: &Value) -> Result<(), SchemeMismatch> {
        let mut path = String::new();
        check(scheme, value, &mut path)
    }
}

/// The recursive walk. `path` tracks where in the value we are, in
/// `cookies[0].name` notation, so mismatch messages point at the exact
/// offending spot. Segments are pushed on the way down and truncated on
/// the way back up; an error returns immediately with the path it carries.
fn check(scheme: &Scheme, value: &Value, path: &mut String) -> Result<(), SchemeMismatch> {
    match scheme {
        Scheme::Any => Ok(()),

        Scheme::String if value.is_string() => Ok(()),
        Scheme::Number if value.is_number() => Ok(()),
        Scheme::Boolean if value.is_boolean() => Ok(()),

        Scheme::Enum(options) => match value.as_str() {
            Some(s) if options.iter().any(|option| option == s) => Ok(()),
            _ => Err(SchemeMismatch::new(scheme.describe(), json_kind_or_text(value), path.as_str())),
        },

        Scheme::Nullable(inner) => {
            if value.is_null() {
                Ok(())
            } else {
                check(inner, value, path)
            }
        }

        // A bare Optional outside an object position just means the value,
        // if we got this far, must match the inner shape. Absence is
        // handled where objects walk their properties.
        Scheme::Optional(inner) => check(inner, value, path),

        Scheme::Array(element) => {
            let Some(items) = value.as_array() else {
                return Err(SchemeMismatch::new("array", json_kind(value), path.as_str()));
            };
            for (index, item) in items.iter().enumerate() {
                let depth = path.len();
                let _ = write!(path, "[{index}]");
                check(element, item, path)?;
                path.truncate(depth);
            }
            Ok(())
        }

        Scheme::Object(properties) => {
            let Some(map) = value.as_object() else {
                return Err(SchemeMismatch::new("object", json_kind(value), path.as_str()));
            };
            // Undeclared properties first: a typoed option name should
            // surface as "no property", not as a missing sibling.
            for key in map.keys() {
                if !properties.contains_key(key) {
                    let depth = path.len();
                    push_key(path, key);
                    let err = SchemeMismatch::new(
                        format!("no property '{key}'"),
                        json_kind(&map[key]),
                        path.as_str(),
                    );
                    path.truncate(depth);
                    return Err(err);
                }
            }
            for (key, property) in properties {
                let depth = path.len();
                push_key(path, key);
                match map.get(key) {
                    Some(present) => {
                        let shape = match property {
                            Scheme::Optional(inner) => inner,
                            other => other,
                        };
                        check(shape, present, path)?;
                    }
                    None if matches!(property, Scheme::Optional(_)) => {}
                    None => {
                        let err = SchemeMismatch::new(
                            property.describe(),
                            "missing property",
                            path.as_str(),
                        );
                        path.truncate(depth);
                        return Err(err);
                    }
                }
                path.truncate(depth);
            }
            Ok(())
        }

        // The primitive guards above fell through: wrong kind.
        _ => Err(SchemeMismatch::new(scheme.describe(), json_kind(value), path.as_str())),
    }
}

fn push_key(path: &mut String, key: &str) {
    if !path.is_empty() {
        path.push('.');
    }
    path.push_str(key);
}

/// For enums the offending STRING matters, not just its kind: show the
/// actual text when the value is a string of the wrong content.
fn json_kind_or_text(value: &Value) -> String {
    match value.as_str() {
        Some(s) => format!("'{s}'"),
        None => json_kind(value).into(),
    }
}

// =========================================================================
// Tests
// =========================================================================
