//! Rule evaluation for one field.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{self, join_all};
use log::{trace, warn};
use serde_json::Value;

use crate::error::{RuleFault, SchemaError, extract_panic_message};
use crate::rules::{BoundFn, BoxFuture, RuleRegistry, RuleVerdict, is_empty};
use crate::schema::FieldSchema;
use crate::state::{RuleOutcome, RuleResult};

#[derive(Debug)]
struct BoundRule {
    name: String,
    config: Value,
    message: String,
    func: BoundFn,
}

/// A field's rules resolved against a registry.
///
/// Built once at construction; cheap to clone into a pass.
#[derive(Debug, Clone)]
pub struct FieldRules {
    rules: Arc<[BoundRule]>,
    required: bool,
}

impl FieldRules {
    /// Resolve every rule of `field`, checking names and configs.
    pub(crate) fn bind(
        key: &str,
        field: &FieldSchema,
        registry: &RuleRegistry,
    ) -> Result<Self, SchemaError> {
        let mut rules = Vec::with_capacity(field.rules.len());
        for (name, config) in &field.rules {
            let def = registry
                .get(name)
                .ok_or_else(|| SchemaError::unknown_rule(key, name))?;
            let func = def
                .bind(config)
                .map_err(|reason| SchemaError::invalid_rule_config(key, name, reason))?;
            let message = field
                .messages
                .get(name)
                .cloned()
                .unwrap_or_else(|| def.message().to_string());
            rules.push(BoundRule {
                name: name.clone(),
                config: config.clone(),
                message,
                func,
            });
        }

        Ok(Self {
            rules: rules.into(),
            required: field.is_required(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Rule names in evaluation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }
}

/// Runs a field's rules and collects a [`RuleResult`].
///
/// All rules of a field are started together and the result is complete only
/// once every one of them has finished. Faults, panics and timeouts are
/// recorded as failures carrying the fault text; they never escape.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator {
    timeout: Option<Duration>,
}

impl RuleEvaluator {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Evaluate every rule of one field against `value`.
    pub async fn evaluate(&self, key: &str, rules: &FieldRules, value: &Value) -> RuleResult {
        // Empty optional fields only answer to `required`.
        let skip_optional = !rules.required && is_empty(value);

        let pending = rules.rules.iter().map(|rule| {
            let verdict: BoxFuture<'static, RuleVerdict> =
                if skip_optional && rule.name != "required" {
                    future::ready(Ok(true)).boxed()
                } else {
                    self.start(rule, value)
                };
            async move { (rule, verdict.await) }
        });

        join_all(pending)
            .await
            .into_iter()
            .map(|(rule, verdict)| {
                let outcome = match verdict {
                    Ok(true) => RuleOutcome::passed(),
                    Ok(false) => RuleOutcome::failed(Some(rule.message.clone())),
                    Err(fault) => {
                        warn!("Rule '{}' on field '{}' faulted: {}", rule.name, key, fault);
                        RuleOutcome::failed(Some(fault.message))
                    }
                };
                trace!("Field '{}' rule '{}' invalid={}", key, rule.name, outcome.invalid);
                (rule.name.clone(), outcome)
            })
            .collect()
    }

    /// Start one rule, turning panics and timeouts into faults.
    fn start(&self, rule: &BoundRule, value: &Value) -> BoxFuture<'static, RuleVerdict> {
        let config = &rule.config;
        let fut = match &rule.func {
            BoundFn::Sync(f) => {
                let verdict = catch_unwind(AssertUnwindSafe(|| f(value, config)))
                    .unwrap_or_else(|panic| Err(panicked(&panic)));
                return future::ready(verdict).boxed();
            }
            BoundFn::Ready(f) => {
                let verdict = catch_unwind(AssertUnwindSafe(|| f(value)))
                    .unwrap_or_else(|panic| Err(panicked(&panic)));
                return future::ready(verdict).boxed();
            }
            BoundFn::Async(f) => {
                match catch_unwind(AssertUnwindSafe(|| f(value.clone(), config.clone()))) {
                    Ok(fut) => AssertUnwindSafe(fut)
                        .catch_unwind()
                        .map(|res| res.unwrap_or_else(|panic| Err(panicked(&panic))))
                        .boxed(),
                    Err(panic) => return future::ready(Err(panicked(&panic))).boxed(),
                }
            }
        };

        match self.timeout {
            Some(limit) => async move {
                tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                    Err(RuleFault::new(format!(
                        "timed out after {}ms",
                        limit.as_millis()
                    )))
                })
            }
            .boxed(),
            None => fut,
        }
    }
}

fn panicked(panic: &Box<dyn std::any::Any + Send>) -> RuleFault {
    RuleFault::new(format!("panicked: {}", extract_panic_message(panic)))
}
