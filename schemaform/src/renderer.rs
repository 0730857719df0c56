//! Field renderer collaborator.

use serde_json::Value;

use crate::schema::{FieldKind, FieldSchema};
use crate::state::FieldValidationState;

/// Everything a renderer needs to draw one schema entry.
#[derive(Debug, Clone)]
pub struct FieldView<'a> {
    /// Position in the flattened field list.
    pub index: usize,
    pub schema: &'a FieldSchema,
    /// Index of the containing group, for grouped schemas.
    pub group: Option<usize>,
    pub legend: Option<&'a str>,
    /// Current model value. `None` for buttons and unset keys.
    pub value: Option<Value>,
    /// Snapshot of the field's state. `None` for buttons.
    pub state: Option<FieldValidationState>,
}

impl FieldView<'_> {
    pub fn kind(&self) -> &FieldKind {
        &self.schema.kind
    }

    pub fn key(&self) -> Option<&str> {
        self.schema.model.as_deref()
    }

    /// Label, falling back to the model key.
    pub fn label(&self) -> Option<&str> {
        self.schema.label.as_deref().or_else(|| self.key())
    }

    /// Messages of the failing rules, in rule-name order.
    pub fn errors(&self) -> Vec<&str> {
        self.state
            .as_ref()
            .and_then(|s| s.result.as_ref())
            .map(|r| {
                r.iter()
                    .filter(|(_, o)| o.invalid)
                    .filter_map(|(_, o)| o.message.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Draws schema entries. The engine calls it once per entry in declared order.
///
/// Renderers observe values and state; they report edits back through
/// `FormEngine::report_value` and never decide validity.
pub trait FieldRenderer {
    type Output;

    fn render(&self, view: FieldView<'_>) -> Self::Output;
}

impl<R: FieldRenderer + ?Sized> FieldRenderer for &R {
    type Output = R::Output;

    fn render(&self, view: FieldView<'_>) -> Self::Output {
        (**self).render(view)
    }
}
