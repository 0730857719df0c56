//! Rule registry and built-in rules.
//!
//! A rule is a closure over `(value, config)`. Synchronous rules return their
//! verdict directly; asynchronous rules return a boxed future, for checks that
//! need an external source (remote uniqueness lookups and the like).
//!
//! # Example
//!
//! ```
//! use schemaform::rules::RuleRegistry;
//!
//! let rules = RuleRegistry::builtin()
//!     .rule("even", |v, _| v.as_i64().is_some_and(|n| n % 2 == 0), "Must be even")
//!     .rule_async(
//!         "available",
//!         |v, _| async move { v.as_str() != Some("taken") },
//!         "Already taken",
//!     );
//!
//! assert!(rules.contains("required"));
//! assert!(rules.contains("available"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::error::RuleFault;
use crate::schema::is_truthy;

/// Type alias for boxed futures used in async rules.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `Ok(true)` passes, `Ok(false)` fails, `Err` is a fault (also a failure).
pub type RuleVerdict = Result<bool, RuleFault>;

type SyncRule = Arc<dyn Fn(&Value, &Value) -> RuleVerdict + Send + Sync>;
type AsyncRule = Arc<dyn Fn(Value, Value) -> BoxFuture<'static, RuleVerdict> + Send + Sync>;
type ReadyRule = Arc<dyn Fn(&Value) -> RuleVerdict + Send + Sync>;
type PrepareRule = Arc<dyn Fn(&Value) -> Result<ReadyRule, String> + Send + Sync>;
type ConfigCheck = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
enum RuleFn {
    Sync(SyncRule),
    Async(AsyncRule),
    Prepared(PrepareRule),
}

/// A rule with its config applied, ready to evaluate.
#[derive(Clone)]
pub(crate) enum BoundFn {
    /// Called with `(value, config)`.
    Sync(SyncRule),
    /// Called with owned `(value, config)`.
    Async(AsyncRule),
    /// Config already folded in at bind time.
    Ready(ReadyRule),
}

impl fmt::Debug for BoundFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sync(_) => "Sync",
            Self::Async(_) => "Async",
            Self::Ready(_) => "Ready",
        })
    }
}

/// A named rule's behaviour: evaluator, default message, config check.
#[derive(Clone)]
pub struct RuleDef {
    func: RuleFn,
    message: String,
    check: Option<ConfigCheck>,
}

impl RuleDef {
    /// A synchronous, fallible rule.
    pub fn sync<F>(f: F, message: impl Into<String>) -> Self
    where
        F: Fn(&Value, &Value) -> RuleVerdict + Send + Sync + 'static,
    {
        Self {
            func: RuleFn::Sync(Arc::new(f)),
            message: message.into(),
            check: None,
        }
    }

    /// An asynchronous, fallible rule.
    pub fn deferred<F, Fut>(f: F, message: impl Into<String>) -> Self
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RuleVerdict> + Send + 'static,
    {
        let func: AsyncRule = Arc::new(
            move |value: Value, config: Value| -> BoxFuture<'static, RuleVerdict> {
                Box::pin(f(value, config))
            },
        );
        Self {
            func: RuleFn::Async(func),
            message: message.into(),
            check: None,
        }
    }

    /// A synchronous rule whose config is compiled once, when the engine is
    /// built.
    ///
    /// `prepare` rejects a bad config with a reason, or returns the predicate
    /// used for every evaluation of that field.
    pub fn prepared<F, R>(prepare: F, message: impl Into<String>) -> Self
    where
        F: Fn(&Value) -> Result<R, String> + Send + Sync + 'static,
        R: Fn(&Value) -> RuleVerdict + Send + Sync + 'static,
    {
        let prepare: PrepareRule =
            Arc::new(move |config: &Value| -> Result<ReadyRule, String> {
                let ready: ReadyRule = Arc::new(prepare(config)?);
                Ok(ready)
            });
        Self {
            func: RuleFn::Prepared(prepare),
            message: message.into(),
            check: None,
        }
    }

    /// Reject bad configs when the engine is built.
    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.check = Some(Arc::new(check));
        self
    }

    /// Default failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_async(&self) -> bool {
        matches!(self.func, RuleFn::Async(_))
    }

    /// Check `config` and apply it. Runs once per field, at construction.
    pub(crate) fn bind(&self, config: &Value) -> Result<BoundFn, String> {
        if let Some(check) = &self.check {
            check(config)?;
        }
        Ok(match &self.func {
            RuleFn::Sync(f) => BoundFn::Sync(Arc::clone(f)),
            RuleFn::Async(f) => BoundFn::Async(Arc::clone(f)),
            RuleFn::Prepared(prepare) => BoundFn::Ready(prepare(config)?),
        })
    }
}

impl fmt::Debug for RuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDef")
            .field("async", &self.is_async())
            .field("message", &self.message)
            .finish()
    }
}

/// Rule name → definition.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, RuleDef>,
}

impl RuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in rules.
    pub fn builtin() -> Self {
        Self::new()
            .define(
                "required",
                RuleDef::sync(
                    |v, c| Ok(!is_truthy(c) || !is_empty(v)),
                    "This field is required",
                )
                .with_check(expect_bool),
            )
            .define(
                "min",
                RuleDef::sync(|v, c| Ok(measure("min", v)? >= bound(c)?), "Value is too small")
                    .with_check(expect_number),
            )
            .define(
                "max",
                RuleDef::sync(|v, c| Ok(measure("max", v)? <= bound(c)?), "Value is too large")
                    .with_check(expect_number),
            )
            .define(
                "len",
                RuleDef::sync(len, "Value has the wrong length").with_check(expect_count),
            )
            .define(
                "pattern",
                RuleDef::prepared(pattern, "Value does not match the expected format"),
            )
            .define(
                "email",
                RuleDef::sync(email, "Please enter a valid email address").with_check(expect_bool),
            )
            .define(
                "type",
                RuleDef::sync(
                    |v, c| Ok(json_type(v) == c.as_str().unwrap_or_default()),
                    "Value has the wrong type",
                )
                .with_check(expect_type_name),
            )
    }

    /// Add or replace a rule.
    pub fn define(mut self, name: impl Into<String>, def: RuleDef) -> Self {
        self.rules.insert(name.into(), def);
        self
    }

    /// Add a synchronous predicate rule.
    pub fn rule<F>(self, name: impl Into<String>, f: F, message: impl Into<String>) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.define(name, RuleDef::sync(move |v, c| Ok(f(v, c)), message))
    }

    /// Add an asynchronous predicate rule.
    pub fn rule_async<F, Fut>(
        self,
        name: impl Into<String>,
        f: F,
        message: impl Into<String>,
    ) -> Self
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.define(
            name,
            RuleDef::deferred(
                move |v, c| {
                    let fut = f(v, c);
                    async move { Ok::<_, RuleFault>(fut.await) }
                },
                message,
            ),
        )
    }

    pub fn get(&self, name: &str) -> Option<&RuleDef> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.names())
            .finish()
    }
}

/// Whether a value counts as "not filled in".
///
/// Null, blank strings, `false`, zero, and empty arrays/objects are empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n == 0.0),
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Size of a value for min/max: char count, numeric value, or element count.
fn measure(rule: &str, value: &Value) -> Result<f64, RuleFault> {
    match value {
        Value::String(s) => Ok(s.chars().count() as f64),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| RuleFault::new(format!("{rule}: number out of range"))),
        Value::Array(a) => Ok(a.len() as f64),
        other => Err(RuleFault::new(format!(
            "{rule} does not apply to {}",
            json_type(other)
        ))),
    }
}

fn bound(config: &Value) -> Result<f64, RuleFault> {
    config
        .as_f64()
        .ok_or_else(|| RuleFault::new("rule config is not a number"))
}

fn len(value: &Value, config: &Value) -> RuleVerdict {
    let expected = config
        .as_u64()
        .ok_or_else(|| RuleFault::new("len config is not a count"))?;
    let actual = match value {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        other => {
            return Err(RuleFault::new(format!(
                "len does not apply to {}",
                json_type(other)
            )));
        }
    };
    Ok(actual as u64 == expected)
}

fn pattern(config: &Value) -> Result<impl Fn(&Value) -> RuleVerdict + use<>, String> {
    let source = config
        .as_str()
        .ok_or_else(|| format!("expected a regex string, got {config}"))?;
    let re = Regex::new(source).map_err(|e| e.to_string())?;
    Ok(move |value: &Value| match value {
        Value::String(s) => Ok(re.is_match(s)),
        Value::Number(n) => Ok(re.is_match(&n.to_string())),
        other => Err(RuleFault::new(format!(
            "pattern does not apply to {}",
            json_type(other)
        ))),
    })
}

fn email(value: &Value, config: &Value) -> RuleVerdict {
    if !is_truthy(config) {
        return Ok(true);
    }
    match value.as_str() {
        Some(s) => Ok(email_address::EmailAddress::is_valid(s)),
        None => Ok(false),
    }
}

fn expect_bool(config: &Value) -> Result<(), String> {
    if config.is_boolean() {
        Ok(())
    } else {
        Err(format!("expected a boolean, got {config}"))
    }
}

fn expect_number(config: &Value) -> Result<(), String> {
    if config.is_number() {
        Ok(())
    } else {
        Err(format!("expected a number, got {config}"))
    }
}

fn expect_count(config: &Value) -> Result<(), String> {
    if config.is_u64() {
        Ok(())
    } else {
        Err(format!("expected a non-negative integer, got {config}"))
    }
}

fn expect_type_name(config: &Value) -> Result<(), String> {
    match config.as_str() {
        Some("string" | "number" | "boolean" | "array" | "object") => Ok(()),
        _ => Err(format!("expected a JSON type name, got {config}")),
    }
}
