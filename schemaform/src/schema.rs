//! Declarative form schema.
//!
//! A schema lists fields either flat (`fields`) or in presentation groups
//! (`groups`). Declared order is the flattened traversal order and is what
//! `first_invalid_field_index` refers to.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::FormConfig;
use crate::error::{FormError, SchemaError};

/// Renderer kind of a schema entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldKind {
    Input,
    Textarea,
    Select,
    RadioGroup,
    Checkbox,
    CheckboxGroup,
    Switch,
    Rate,
    Upload,
    /// Submit button. Presentation only.
    Submit,
    /// Reset button. Presentation only.
    Reset,
    /// Any renderer the engine does not know by name.
    Custom(String),
}

impl FieldKind {
    /// Name used in schema documents.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Input => "input",
            Self::Textarea => "textarea",
            Self::Select => "select",
            Self::RadioGroup => "radio-group",
            Self::Checkbox => "checkbox",
            Self::CheckboxGroup => "checkbox-group",
            Self::Switch => "switch",
            Self::Rate => "rate",
            Self::Upload => "upload",
            Self::Submit => "submit",
            Self::Reset => "reset",
            Self::Custom(name) => name,
        }
    }

    /// Buttons carry no value and never take part in validation.
    pub fn is_button(&self) -> bool {
        matches!(self, Self::Submit | Self::Reset)
    }
}

impl From<String> for FieldKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "input" => Self::Input,
            "textarea" => Self::Textarea,
            "select" => Self::Select,
            "radio-group" => Self::RadioGroup,
            "checkbox" => Self::Checkbox,
            "checkbox-group" => Self::CheckboxGroup,
            "switch" => Self::Switch,
            "rate" => Self::Rate,
            "upload" => Self::Upload,
            "submit" => Self::Submit,
            "reset" => Self::Reset,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for FieldKind {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<FieldKind> for String {
    fn from(kind: FieldKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One schema entry.
///
/// # Example
///
/// ```
/// use schemaform::schema::{FieldKind, FieldSchema};
///
/// let field = FieldSchema::new(FieldKind::Input)
///     .with_model("username")
///     .with_label("Username")
///     .with_rule("required", true)
///     .with_rule("min", 3)
///     .with_message("min", "At least three characters");
///
/// assert!(field.is_required());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Renderer kind.
    #[serde(rename = "type")]
    pub kind: FieldKind,

    /// Model key. Required for every non-button kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Renderer-specific options. Opaque to the engine.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,

    /// Rule name → rule config.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<String, Value>,

    /// Rule name → message overriding the rule's default.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub messages: BTreeMap<String, String>,
}

impl FieldSchema {
    /// Creates an entry of the given kind with no model key and no rules.
    pub fn new(kind: impl Into<FieldKind>) -> Self {
        Self {
            kind: kind.into(),
            model: None,
            label: None,
            props: Map::new(),
            rules: BTreeMap::new(),
            messages: BTreeMap::new(),
        }
    }

    /// Sets the model key.
    pub fn with_model(mut self, key: impl Into<String>) -> Self {
        self.model = Some(key.into());
        self
    }

    /// Sets the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Adds a renderer prop.
    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Adds a rule.
    pub fn with_rule(mut self, name: impl Into<String>, config: impl Into<Value>) -> Self {
        self.rules.insert(name.into(), config.into());
        self
    }

    /// Adds a message override for a rule.
    pub fn with_message(mut self, rule: impl Into<String>, message: impl Into<String>) -> Self {
        self.messages.insert(rule.into(), message.into());
        self
    }

    /// Whether the entry carries a truthy `required` rule.
    pub fn is_required(&self) -> bool {
        self.rules.get("required").is_some_and(is_truthy)
    }
}

/// A presentation group. Has no effect on validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGroup {
    /// Group heading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,

    /// Fields in declared order.
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl FieldGroup {
    /// Creates a group without a legend.
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self {
            legend: None,
            fields,
        }
    }

    /// Sets the legend.
    pub fn with_legend(mut self, legend: impl Into<String>) -> Self {
        self.legend = Some(legend.into());
        self
    }
}

/// Form schema, grouped or flat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<FieldGroup>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldSchema>>,
}

impl FormSchema {
    /// Creates a flat schema.
    pub fn flat(fields: Vec<FieldSchema>) -> Self {
        Self {
            groups: None,
            fields: Some(fields),
        }
    }

    /// Creates a grouped schema.
    pub fn grouped(groups: Vec<FieldGroup>) -> Self {
        Self {
            groups: Some(groups),
            fields: None,
        }
    }

    /// Flattens the schema in declared order, pairing each entry with the
    /// index of its group (if grouped).
    ///
    /// Checks the layout and model keys. Rule names are checked later against
    /// a registry.
    pub fn flatten(&self) -> Result<Vec<(Option<usize>, FieldSchema)>, SchemaError> {
        let flat: Vec<(Option<usize>, FieldSchema)> = match (&self.groups, &self.fields) {
            (Some(_), Some(_)) => return Err(SchemaError::ConflictingLayout),
            (None, None) => return Err(SchemaError::MissingLayout),
            (Some(groups), None) => groups
                .iter()
                .enumerate()
                .flat_map(|(g, group)| group.fields.iter().map(move |f| (Some(g), f.clone())))
                .collect(),
            (None, Some(fields)) => fields.iter().map(|f| (None, f.clone())).collect(),
        };

        let mut seen = HashSet::new();
        for (index, (_, field)) in flat.iter().enumerate() {
            if field.kind.is_button() {
                continue;
            }
            match &field.model {
                None => {
                    return Err(SchemaError::MissingModel {
                        index,
                        kind: field.kind.to_string(),
                    });
                }
                Some(key) if key.is_empty() => {
                    return Err(SchemaError::MissingModel {
                        index,
                        kind: field.kind.to_string(),
                    });
                }
                Some(key) => {
                    if !seen.insert(key.as_str()) {
                        return Err(SchemaError::DuplicateModel { key: key.clone() });
                    }
                }
            }
        }

        Ok(flat)
    }
}

/// Construction input: model, schema, and optional settings in one document.
///
/// ```
/// use schemaform::schema::FormDefinition;
///
/// let def = FormDefinition::from_json(r#"{
///     "model": { "x": "" },
///     "schema": { "fields": [ { "type": "input", "model": "x", "rules": { "required": true } } ] }
/// }"#).unwrap();
/// assert_eq!(def.model.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    /// Submit target carried on the submit event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Initial model values.
    #[serde(default)]
    pub model: Map<String, Value>,

    pub schema: FormSchema,

    #[serde(default)]
    pub config: FormConfig,
}

impl FormDefinition {
    /// Parses a definition from JSON text.
    pub fn from_json(text: &str) -> Result<Self, FormError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// JSON truthiness, used for boolean-ish rule configs.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
