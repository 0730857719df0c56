//! Shared model handle.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};

use crate::wakeup::{FlushNotifier, NotifierSlot};

#[derive(Debug, Default)]
struct ModelInner {
    values: HashMap<String, Value>,
    /// Keys written through `set` since the engine last looked.
    journal: Vec<String>,
}

/// Field values, owned by the host and observed by the engine.
///
/// `Model` is a cheap-to-clone handle: every clone sees the same values. Writes
/// through [`Model::set`] are journaled and picked up by the engine at its next
/// scheduling boundary, exactly as if they had gone through
/// `FormEngine::report_value`.
///
/// # Example
///
/// ```
/// use schemaform::model::Model;
/// use serde_json::json;
///
/// let model = Model::new();
/// let shared = model.clone();
/// shared.set("name", json!("Ada"));
/// assert_eq!(model.get("name"), Some(json!("Ada")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Model {
    inner: Arc<RwLock<ModelInner>>,
    notifier: NotifierSlot,
}

impl Model {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a model from a JSON object
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self::from_iter(values)
    }

    fn read(&self) -> RwLockReadGuard<'_, ModelInner> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ModelInner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get a clone of a value
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().values.get(key).cloned()
    }

    /// Whether a key holds a value
    pub fn contains(&self, key: &str) -> bool {
        self.read().values.contains_key(key)
    }

    /// Set a value and record the write for the engine
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        {
            let mut inner = self.write();
            inner.values.insert(key.clone(), value.into());
            inner.journal.push(key);
        }
        self.notifier.notify();
    }

    /// Copy of every value
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.read().values.clone()
    }

    /// Whether two handles share the same storage
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Write without journaling. Used for baseline restoration.
    pub(crate) fn write_untracked(&self, key: &str, value: Value) {
        self.write().values.insert(key.to_string(), value);
    }

    pub(crate) fn remove_untracked(&self, key: &str) -> Option<Value> {
        self.write().values.remove(key)
    }

    /// Take the journaled keys, oldest first.
    pub(crate) fn take_journal(&self) -> Vec<String> {
        std::mem::take(&mut self.write().journal)
    }

    pub(crate) fn install_notifier(&self, notifier: FlushNotifier) {
        self.notifier.install(notifier);
    }
}

impl FromIterator<(String, Value)> for Model {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let model = Self::new();
        model.write().values.extend(iter);
        model
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_set_is_journaled() {
        let model = Model::new();
        model.set("a", 1);
        model.set("b", 2);
        model.set("a", 3);

        assert_eq!(model.take_journal(), vec!["a", "b", "a"]);
        assert!(model.take_journal().is_empty());
        assert_eq!(model.get("a"), Some(json!(3)));
    }

    #[test]
    fn test_untracked_write_skips_journal() {
        let model: Model = [("a".to_string(), json!("x"))].into_iter().collect();
        model.write_untracked("a", json!("y"));

        assert!(model.take_journal().is_empty());
        assert_eq!(model.get("a"), Some(json!("y")));
    }

    #[test]
    fn test_clones_share_storage() {
        let model = Model::new();
        let other = model.clone();
        assert!(model.ptr_eq(&other));
        assert!(!model.ptr_eq(&Model::new()));
    }
}
