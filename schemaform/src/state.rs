//! Per-field validation state and the live validity mapping.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Verdict of one rule within a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub invalid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RuleOutcome {
    /// A passing rule.
    pub fn passed() -> Self {
        Self::default()
    }

    /// A failing rule.
    pub fn failed(message: Option<String>) -> Self {
        Self {
            invalid: true,
            message,
        }
    }
}

/// Rule name → outcome for one field, produced fresh by each pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RuleResult(BTreeMap<String, RuleOutcome>);

impl RuleResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rule: impl Into<String>, outcome: RuleOutcome) {
        self.0.insert(rule.into(), outcome);
    }

    pub fn get(&self, rule: &str) -> Option<&RuleOutcome> {
        self.0.get(rule)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RuleOutcome)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when no rule failed.
    pub fn is_valid(&self) -> bool {
        self.0.values().all(|o| !o.invalid)
    }

    /// Names of failing rules, in rule-name order.
    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|(_, o)| o.invalid).map(|(k, _)| k)
    }

    /// Message of the first failing rule that has one.
    pub fn first_message(&self) -> Option<&str> {
        self.0
            .values()
            .filter(|o| o.invalid)
            .find_map(|o| o.message.as_deref())
    }
}

impl FromIterator<(String, RuleOutcome)> for RuleResult {
    fn from_iter<I: IntoIterator<Item = (String, RuleOutcome)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Validation record for one field.
///
/// `valid == None && result == None` is the untouched state: no pass has
/// completed since construction or the last reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldValidationState {
    /// Value touched since construction or the last reset.
    pub dirty: bool,
    pub valid: Option<bool>,
    pub result: Option<RuleResult>,
    /// A pass covering this field is in flight.
    pub pending: bool,
}

impl FieldValidationState {
    pub fn is_untouched(&self) -> bool {
        self.valid.is_none() && self.result.is_none()
    }

    pub fn is_valid(&self) -> bool {
        self.valid == Some(true)
    }

    pub fn is_invalid(&self) -> bool {
        self.valid == Some(false)
    }

    /// Replace the result with a completed pass.
    pub(crate) fn settle(&mut self, result: RuleResult) {
        self.valid = Some(result.is_valid());
        self.result = Some(result);
        self.pending = false;
    }
}

#[derive(Debug)]
struct ValidityInner {
    keys: Vec<String>,
    index: HashMap<String, usize>,
    states: Vec<FieldValidationState>,
}

/// Live mapping of field key → [`FieldValidationState`], in declared order.
///
/// Every clone shares storage with the engine, so a handle received in an
/// event observes later passes in place. [`Validity::ptr_eq`] is the identity
/// check.
#[derive(Debug, Clone)]
pub struct Validity {
    inner: Arc<RwLock<ValidityInner>>,
}

impl Validity {
    /// One untouched entry per key.
    pub(crate) fn new(keys: Vec<String>) -> Self {
        let index = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();
        let states = vec![FieldValidationState::default(); keys.len()];
        Self {
            inner: Arc::new(RwLock::new(ValidityInner {
                keys,
                index,
                states,
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ValidityInner> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ValidityInner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get a copy of one field's state.
    pub fn get(&self, key: &str) -> Option<FieldValidationState> {
        let inner = self.read();
        inner.index.get(key).map(|&i| inner.states[i].clone())
    }

    /// Field keys in declared order.
    pub fn keys(&self) -> Vec<String> {
        self.read().keys.clone()
    }

    pub fn len(&self) -> usize {
        self.read().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().keys.is_empty()
    }

    /// Copy of every entry in declared order.
    pub fn snapshot(&self) -> Vec<(String, FieldValidationState)> {
        let inner = self.read();
        inner
            .keys
            .iter()
            .cloned()
            .zip(inner.states.iter().cloned())
            .collect()
    }

    /// Whether two handles are the same mapping.
    pub fn ptr_eq(&self, other: &Validity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Fold over states in declared order without copying them.
    pub(crate) fn fold<B>(
        &self,
        init: B,
        f: impl FnMut(B, (usize, &FieldValidationState)) -> B,
    ) -> B {
        self.read().states.iter().enumerate().fold(init, f)
    }

    pub(crate) fn update<R>(
        &self,
        slot: usize,
        f: impl FnOnce(&mut FieldValidationState) -> R,
    ) -> Option<R> {
        self.write().states.get_mut(slot).map(f)
    }

    pub(crate) fn update_all(&self, f: impl FnMut(&mut FieldValidationState)) {
        self.write().states.iter_mut().for_each(f);
    }
}

impl Serialize for Validity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let inner = self.read();
        let mut map = serializer.serialize_map(Some(inner.keys.len()))?;
        for (key, state) in inner.keys.iter().zip(&inner.states) {
            map.serialize_entry(key, state)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(message: &str) -> RuleOutcome {
        RuleOutcome::failed(Some(message.to_string()))
    }

    #[test]
    fn test_new_entries_are_untouched() {
        let validity = Validity::new(vec!["a".to_string(), "b".to_string()]);
        let a = validity.get("a").unwrap();
        assert!(a.is_untouched());
        assert!(!a.dirty);
        assert!(validity.get("missing").is_none());
    }

    #[test]
    fn test_settle_replaces_result() {
        let mut state = FieldValidationState::default();
        let mut first = RuleResult::new();
        first.insert("required", failing("required"));
        first.insert("min", failing("too short"));
        state.settle(first);
        assert!(state.is_invalid());

        let mut second = RuleResult::new();
        second.insert("required", RuleOutcome::passed());
        state.settle(second);
        assert!(state.is_valid());
        assert_eq!(state.result.as_ref().unwrap().len(), 1);
        assert!(state.result.unwrap().get("min").is_none());
    }

    #[test]
    fn test_first_message_skips_passing_rules() {
        let result: RuleResult = [
            ("a".to_string(), RuleOutcome::passed()),
            ("b".to_string(), RuleOutcome::failed(None)),
            ("c".to_string(), failing("c failed")),
        ]
        .into_iter()
        .collect();

        assert_eq!(result.first_message(), Some("c failed"));
        assert_eq!(result.failed().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_serialize_in_declared_order() {
        let validity = Validity::new(vec!["z".to_string(), "a".to_string()]);
        validity.update(0, |s| s.dirty = true);

        let json = serde_json::to_string(&validity).unwrap();
        assert!(json.starts_with(r#"{"z":{"dirty":true"#));
        assert!(json.find("\"z\"").unwrap() < json.find("\"a\"").unwrap());
    }
}
