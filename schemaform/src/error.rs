//! Error types

use std::any::Any;

use thiserror::Error;

/// Errors surfaced by the engine's public entry points.
#[derive(Debug, Error)]
pub enum FormError {
    /// The schema is malformed. Raised at construction, never deferred.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A form definition could not be parsed.
    #[error("Failed to parse form definition: {0}")]
    Parse(#[from] serde_json::Error),

    /// A mutation named a model key the schema does not declare.
    #[error("Field '{0}' is not declared in the schema")]
    UnknownField(String),
}

impl FormError {
    /// Creates a new unknown field error.
    pub fn unknown_field(key: impl Into<String>) -> Self {
        Self::UnknownField(key.into())
    }
}

/// A malformed schema entry, detected while building the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Both `groups` and `fields` were given.
    #[error("Schema declares both `groups` and `fields`; use exactly one")]
    ConflictingLayout,

    /// Neither `groups` nor `fields` was given.
    #[error("Schema declares neither `groups` nor `fields`")]
    MissingLayout,

    /// A value-bearing field has no model key.
    #[error("Field #{index} of type '{kind}' has no model key")]
    MissingModel { index: usize, kind: String },

    /// Two fields share one model key.
    #[error("Model key '{key}' is declared more than once")]
    DuplicateModel { key: String },

    /// A field references a rule the registry does not know.
    #[error("Field '{field}' uses unknown rule '{rule}'")]
    UnknownRule { field: String, rule: String },

    /// A rule rejected its configuration.
    #[error("Field '{field}' has invalid config for rule '{rule}': {reason}")]
    InvalidRuleConfig {
        field: String,
        rule: String,
        reason: String,
    },
}

impl SchemaError {
    /// Creates a new unknown rule error.
    pub fn unknown_rule(field: impl Into<String>, rule: impl Into<String>) -> Self {
        Self::UnknownRule {
            field: field.into(),
            rule: rule.into(),
        }
    }

    /// Creates a new invalid rule config error.
    pub fn invalid_rule_config(
        field: impl Into<String>,
        rule: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRuleConfig {
            field: field.into(),
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

/// A rule that could not produce a verdict.
///
/// Faults never reach the caller of a mutation. The evaluator records them as
/// a failed rule carrying the fault text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuleFault {
    /// Fault message
    pub message: String,
}

impl RuleFault {
    /// Create a new rule fault
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for RuleFault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for RuleFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Extract a human-readable message from a panic payload.
pub fn extract_panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
