//! Error detail for scheme validation.
//!
//! Each crate in Trunkline defines its own error types. The protocol
//! crate has exactly one: the mismatch a validator produces when a JSON
//! value does not fit its scheme. Everything else that can go wrong
//! (unknown methods, dead sessions, transport failures) belongs to the
//! layers above.

use serde_json::Value;

/// One scheme violation: what was expected, what was found, and where.
///
/// `#[derive(thiserror::Error)]` auto-generates the `std::error::Error`
/// implementation; the `#[error(...)]` attribute renders the single line
/// that ends up inside wire error envelopes, for example:
///
/// ```text
/// expected string, got number at 'cookies[1].name'
/// ```
///
/// A top-level mismatch has no location suffix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, got {found}{}", path_suffix(.path))]
pub struct SchemeMismatch {
    expected: String,
    found: String,
    path: String,
}

impl SchemeMismatch {
    pub fn new(
        expected: impl Into<String>,
        found: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            expected: expected.into(),
            found: found.into(),
            path: path.into(),
        }
    }

    /// The violation of producing any value at all where none was
    /// declared. Raised for the result of a method with no returns
    /// shape.
    pub fn unexpected_value(value: &Value) -> Self {
        Self::new("no value", json_kind(value), "")
    }

    /// Where in the checked value the mismatch sits, in
    /// `cookies[1].name` notation. Empty for a top-level mismatch.
    pub fn path(&self) -> &str {
        &self.path
    }
}

fn path_suffix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" at '{path}'")
    }
}

/// The JSON kind of a value, as mismatch messages name it.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =========================================================================
// Tests
// =========================================================================
