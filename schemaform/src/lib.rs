//! Schema-driven form validation.
//!
//! A [`FormEngine`] is built from a [`FormSchema`] (flat fields or
//! presentation groups) and a shared [`Model`]. It keeps one
//! [`FieldValidationState`] per value-bearing field, coalesces value mutations
//! into validation passes, and emits `validate` / `valid` / `invalid` /
//! `submit` / `reset` events.
//!
//! # Example
//!
//! ```
//! use schemaform::prelude::*;
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let definition = FormDefinition::from_json(r#"{
//!     "model": { "email": "" },
//!     "schema": { "fields": [
//!         { "type": "input", "model": "email", "rules": { "required": true, "email": true } },
//!         { "type": "submit" }
//!     ] }
//! }"#).unwrap();
//!
//! let mut form = FormEngine::from_definition(definition, RuleRegistry::builtin()).unwrap();
//! assert!(!form.submit().await.is_submitted());
//!
//! form.report_value("email", json!("ada@example.com")).unwrap();
//! assert!(form.submit().await.is_submitted());
//! # });
//! ```

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod lifecycle;
pub mod model;
pub mod renderer;
pub mod rules;
pub mod scheduler;
pub mod schema;
pub mod state;
pub mod wakeup;

pub use config::{FormConfig, VerdictEvents};
pub use engine::{FormBuilder, FormEngine, FormId};
pub use error::{FormError, RuleFault, SchemaError};
pub use events::{FormEvent, ListenerId, ResetEvent, SubmitEvent};
pub use lifecycle::{InvalidField, LifecycleState, SubmitOutcome};
pub use model::Model;
pub use renderer::{FieldRenderer, FieldView};
pub use rules::{RuleDef, RuleRegistry};
pub use schema::{FieldGroup, FieldKind, FieldSchema, FormDefinition, FormSchema};
pub use state::{FieldValidationState, RuleOutcome, RuleResult, Validity};

pub mod prelude {
    pub use crate::config::{FormConfig, VerdictEvents};
    pub use crate::engine::FormEngine;
    pub use crate::events::FormEvent;
    pub use crate::lifecycle::SubmitOutcome;
    pub use crate::model::Model;
    pub use crate::renderer::{FieldRenderer, FieldView};
    pub use crate::rules::RuleRegistry;
    pub use crate::schema::{FieldGroup, FieldKind, FieldSchema, FormDefinition, FormSchema};
}
