//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-form engine configuration.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use schemaform::config::{FormConfig, VerdictEvents};
///
/// let config = FormConfig::default()
///     .with_verdict_events(VerdictEvents::OnSubmit)
///     .with_rule_timeout(Duration::from_secs(2));
/// assert!(config.validate_on_create);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Schedule a pass over every field when the engine is built.
    ///
    /// Default: true
    pub validate_on_create: bool,

    /// Schedule a fresh pass over every field after a reset.
    ///
    /// Default: true
    pub revalidate_on_reset: bool,

    /// When `valid` / `invalid` are emitted.
    ///
    /// Default: every pass
    pub verdict_events: VerdictEvents,

    /// Upper bound on a single rule evaluation. Exceeding it is a fault.
    ///
    /// Requires a tokio runtime with the time driver enabled.
    /// Default: none
    #[serde(rename = "rule_timeout_ms", with = "millis")]
    pub rule_timeout: Option<Duration>,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            validate_on_create: true,
            revalidate_on_reset: true,
            verdict_events: VerdictEvents::default(),
            rule_timeout: None,
        }
    }
}

impl FormConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the engine validates right after construction.
    pub fn with_validate_on_create(mut self, enabled: bool) -> Self {
        self.validate_on_create = enabled;
        self
    }

    /// Sets whether the engine revalidates after a reset.
    pub fn with_revalidate_on_reset(mut self, enabled: bool) -> Self {
        self.revalidate_on_reset = enabled;
        self
    }

    /// Sets the verdict event policy.
    pub fn with_verdict_events(mut self, policy: VerdictEvents) -> Self {
        self.verdict_events = policy;
        self
    }

    /// Sets the per-rule timeout.
    pub fn with_rule_timeout(mut self, timeout: Duration) -> Self {
        self.rule_timeout = Some(timeout);
        self
    }
}

/// Which passes emit the `valid` / `invalid` verdict events.
///
/// `validate` is emitted after every pass regardless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictEvents {
    /// Every completed pass emits exactly one verdict.
    #[default]
    EveryPass,

    /// Only submit passes emit a verdict.
    OnSubmit,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
