//! The form engine.

use std::collections::HashMap;
use std::fmt;

use log::{debug, info, trace};
use serde_json::Value;
use uuid::Uuid;

use crate::aggregate::FormAggregator;
use crate::config::{FormConfig, VerdictEvents};
use crate::error::FormError;
use crate::evaluator::{FieldRules, RuleEvaluator};
use crate::events::{EventDispatcher, FormEvent, ListenerId};
use crate::lifecycle::{InvalidField, Lifecycle, LifecycleState};
use crate::model::Model;
use crate::renderer::{FieldRenderer, FieldView};
use crate::rules::RuleRegistry;
use crate::scheduler::{Flush, FlushKind, FlushOutcome, ValidationScheduler};
use crate::schema::{FieldGroup, FieldSchema, FormDefinition, FormSchema};
use crate::state::Validity;
use crate::wakeup::FlushNotifier;

/// Unique identifier for a form engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormId(Uuid);

impl FormId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for FormId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value-bearing field: model key, position, bound rules.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) key: String,
    pub(crate) field: usize,
    pub(crate) rules: FieldRules,
}

/// Builder for [`FormEngine`].
///
/// # Example
///
/// ```
/// use schemaform::prelude::*;
/// use serde_json::json;
///
/// let schema = FormSchema::flat(vec![
///     FieldSchema::new(FieldKind::Input).with_model("x").with_rule("required", true),
/// ]);
/// let model: Model = [("x".to_string(), json!(""))].into_iter().collect();
///
/// let engine = FormEngine::builder(schema)
///     .model(model)
///     .config(FormConfig::default().with_verdict_events(VerdictEvents::OnSubmit))
///     .action("/signup")
///     .build()
///     .unwrap();
///
/// assert!(engine.validity().get("x").unwrap().is_untouched());
/// ```
#[derive(Debug)]
pub struct FormBuilder {
    schema: FormSchema,
    model: Model,
    config: FormConfig,
    registry: RuleRegistry,
    action: Option<String>,
}

impl FormBuilder {
    /// Use a shared model. Defaults to an empty one.
    pub fn model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    pub fn config(mut self, config: FormConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a rule registry. Defaults to [`RuleRegistry::builtin`].
    pub fn rules(mut self, registry: RuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Submit target carried on the submit event.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Check the schema, bind rules and create one untouched state per field.
    pub fn build(self) -> Result<FormEngine, FormError> {
        let flat = self.schema.flatten()?;

        let mut fields = Vec::with_capacity(flat.len());
        let mut field_groups = Vec::with_capacity(flat.len());
        let mut slots = Vec::new();
        for (index, (group, field)) in flat.into_iter().enumerate() {
            if !field.kind.is_button()
                && let Some(key) = &field.model
            {
                let rules = FieldRules::bind(key, &field, &self.registry)?;
                slots.push(Slot {
                    key: key.clone(),
                    field: index,
                    rules,
                });
            }
            field_groups.push(group);
            fields.push(field);
        }

        let validity = Validity::new(slots.iter().map(|s| s.key.clone()).collect());
        let aggregator = FormAggregator::new(
            validity,
            slots.iter().map(|s| s.field).collect(),
            slots.iter().map(|s| !s.rules.is_empty()).collect(),
        );
        let slot_index = slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.key.clone(), i))
            .collect();

        // Writes made before the engine existed are not mutations.
        let _ = self.model.take_journal();

        let id = FormId::new();
        let mut engine = FormEngine {
            id,
            evaluator: RuleEvaluator::new(self.config.rule_timeout),
            config: self.config,
            action: self.action,
            schema: self.schema,
            fields,
            field_groups,
            slots,
            slot_index,
            baseline: self.model.snapshot(),
            model: self.model,
            scheduler: ValidationScheduler::new(),
            aggregator,
            dispatcher: EventDispatcher::new(),
            lifecycle: Lifecycle::new(id),
        };

        info!(
            "Form {} built: {} field(s), {} validated",
            id,
            engine.fields.len(),
            engine.slots.len()
        );

        if engine.config.validate_on_create {
            engine.request_validation();
        }

        Ok(engine)
    }
}

/// Schema-driven validation engine for one form.
///
/// The engine owns the per-field state table and drives passes through the
/// scheduler. It never runs a pass on its own: mutations schedule one, and
/// the host runs it by awaiting [`FormEngine::settle`] (or the
/// [`begin_flush`](FormEngine::begin_flush) /
/// [`complete_flush`](FormEngine::complete_flush) pair).
///
/// # Example
///
/// ```
/// use schemaform::prelude::*;
/// use serde_json::json;
///
/// # futures::executor::block_on(async {
/// let schema = FormSchema::flat(vec![
///     FieldSchema::new(FieldKind::Input).with_model("x").with_rule("required", true),
/// ]);
/// let model: Model = [("x".to_string(), json!(""))].into_iter().collect();
/// let mut form = FormEngine::new(schema, model).unwrap();
///
/// form.settle().await;
/// assert!(form.invalid());
/// assert_eq!(form.first_invalid_field_index(), Some(0));
///
/// form.report_value("x", "a").unwrap();
/// form.settle().await;
/// assert!(form.valid());
/// assert!(form.dirty());
///
/// form.reset();
/// assert!(!form.dirty());
/// assert!(form.validity().get("x").unwrap().valid.is_none());
/// # });
/// ```
pub struct FormEngine {
    pub(crate) id: FormId,
    pub(crate) config: FormConfig,
    pub(crate) action: Option<String>,
    pub(crate) schema: FormSchema,
    pub(crate) fields: Vec<FieldSchema>,
    pub(crate) field_groups: Vec<Option<usize>>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) slot_index: HashMap<String, usize>,
    pub(crate) model: Model,
    pub(crate) baseline: HashMap<String, Value>,
    pub(crate) evaluator: RuleEvaluator,
    pub(crate) scheduler: ValidationScheduler,
    pub(crate) aggregator: FormAggregator,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) lifecycle: Lifecycle,
}

impl FormEngine {
    /// Start building an engine for `schema`.
    pub fn builder(schema: FormSchema) -> FormBuilder {
        FormBuilder {
            schema,
            model: Model::new(),
            config: FormConfig::default(),
            registry: RuleRegistry::builtin(),
            action: None,
        }
    }

    /// Engine with built-in rules and default config.
    pub fn new(schema: FormSchema, model: Model) -> Result<Self, FormError> {
        Self::builder(schema).model(model).build()
    }

    /// Engine from a parsed definition document.
    pub fn from_definition(
        definition: FormDefinition,
        registry: RuleRegistry,
    ) -> Result<Self, FormError> {
        let mut builder = Self::builder(definition.schema)
            .model(Model::from_map(definition.model))
            .config(definition.config)
            .rules(registry);
        if let Some(action) = definition.action {
            builder = builder.action(action);
        }
        builder.build()
    }

    // -------------------------------------------------------------------------
    // Read surface
    // -------------------------------------------------------------------------

    pub fn id(&self) -> FormId {
        self.id
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Flattened schema entries in declared order, buttons included.
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Presentation groups, if the schema is grouped.
    pub fn groups(&self) -> Option<&[FieldGroup]> {
        self.schema.groups.as_deref()
    }

    /// The live validity mapping. Every call returns the same mapping.
    pub fn validity(&self) -> Validity {
        self.aggregator.validity().clone()
    }

    pub fn dirty(&self) -> bool {
        self.aggregator.dirty()
    }

    pub fn valid(&self) -> bool {
        self.aggregator.valid()
    }

    pub fn invalid(&self) -> bool {
        self.aggregator.invalid()
    }

    /// Index into [`fields`](Self::fields) of the first failing field.
    pub fn first_invalid_field_index(&self) -> Option<usize> {
        self.aggregator.first_invalid_field_index()
    }

    /// Index and key of the first failing field, for focus or scrolling.
    pub fn first_invalid_field(&self) -> Option<InvalidField> {
        self.aggregator.first_invalid_slot().map(|slot| InvalidField {
            index: self.slots[slot].field,
            key: self.slots[slot].key.clone(),
        })
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// The shared model handle.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Nothing pending, scheduled or in flight.
    ///
    /// Writes made directly through [`Model::set`] are only seen at the next
    /// scheduling boundary.
    pub fn is_settled(&self) -> bool {
        self.scheduler.is_quiescent()
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&FormEvent) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    pub fn subscribe_channel(&mut self) -> tokio::sync::mpsc::UnboundedReceiver<FormEvent> {
        self.dispatcher.subscribe_channel()
    }

    /// Signal `notifier` whenever a flush becomes scheduled, including writes
    /// through the model handle.
    pub fn install_wakeup(&self, notifier: FlushNotifier) {
        self.model.install_notifier(notifier.clone());
        self.scheduler.install_notifier(notifier);
    }

    // -------------------------------------------------------------------------
    // Mutations and flushes
    // -------------------------------------------------------------------------

    /// Write a field value and schedule its revalidation.
    ///
    /// The field is dirty immediately; its result lands with the next flush.
    pub fn report_value(&mut self, key: &str, value: impl Into<Value>) -> Result<(), FormError> {
        if !self.slot_index.contains_key(key) {
            return Err(FormError::unknown_field(key));
        }
        self.model.set(key, value);
        self.sync_model();
        Ok(())
    }

    /// Schedule a pass over every field without dirtying any.
    pub fn request_validation(&mut self) {
        self.sync_model();
        self.schedule((0..self.slots.len()).collect());
    }

    /// Take the scheduled work as a detached pass.
    ///
    /// Returns `None` when nothing runnable is pending. Fields of a pass still
    /// in flight are left for a later one. A flush, or its outcome, dropped
    /// without reaching [`complete_flush`](Self::complete_flush) hands its
    /// fields back, and the next boundary schedules them again.
    pub fn begin_flush(&mut self) -> Option<Flush> {
        self.sync_model();
        let (generation, slots) = self.scheduler.take()?;
        self.aggregator.mark_pending(&slots);
        trace!("Form {}: flush of {} field(s)", self.id, slots.len());
        Some(self.build_flush(generation, FlushKind::Scheduled, &slots))
    }

    /// Apply a finished pass and emit its events.
    ///
    /// Returns false if the pass was superseded by a reset or submit; its
    /// results are discarded.
    pub fn complete_flush(&mut self, outcome: FlushOutcome) -> bool {
        let FlushOutcome {
            generation,
            kind,
            results,
            guard,
        } = outcome;
        guard.disarm();
        let slots: Vec<usize> = results.iter().map(|(slot, _)| *slot).collect();
        if !self.scheduler.finish(generation, &slots) {
            return false;
        }

        self.aggregator.apply(results);
        let with_verdict =
            kind == FlushKind::Submit || self.config.verdict_events == VerdictEvents::EveryPass;
        self.aggregator.publish(&mut self.dispatcher, with_verdict);

        if kind == FlushKind::Scheduled && self.scheduler.is_quiescent() {
            self.lifecycle.transition(LifecycleState::Idle);
        }
        true
    }

    /// Run scheduled flushes until none is left. Returns how many completed.
    pub async fn settle(&mut self) -> usize {
        let mut completed = 0;
        while let Some(flush) = self.begin_flush() {
            let outcome = flush.run().await;
            if self.complete_flush(outcome) {
                completed += 1;
            }
        }
        completed
    }

    /// Validate every field now. Returns the aggregate verdict.
    pub async fn validate_all(&mut self) -> bool {
        self.request_validation();
        self.settle().await;
        self.valid()
    }

    /// Render every entry in declared order.
    pub fn render<R: FieldRenderer>(&self, renderer: &R) -> Vec<R::Output> {
        self.fields
            .iter()
            .enumerate()
            .map(|(index, schema)| {
                let group = self.field_groups[index];
                let legend = group
                    .and_then(|g| self.groups()?.get(g))
                    .and_then(|g| g.legend.as_deref());
                let key = schema.model.as_deref().filter(|_| !schema.kind.is_button());
                renderer.render(FieldView {
                    index,
                    schema,
                    group,
                    legend,
                    value: key.and_then(|k| self.model.get(k)),
                    state: key.and_then(|k| self.aggregator.validity().get(k)),
                })
            })
            .collect()
    }

    /// Fold journaled model writes into pending marks.
    pub(crate) fn sync_model(&mut self) {
        let keys = self.model.take_journal();
        if keys.is_empty() {
            return;
        }

        let mut slots = Vec::with_capacity(keys.len());
        for key in keys {
            match self.slot_index.get(&key) {
                Some(&slot) => {
                    self.aggregator.mark_dirty(slot);
                    slots.push(slot);
                }
                None => trace!("Form {}: ignoring write to undeclared key '{}'", self.id, key),
            }
        }
        self.schedule(slots);
    }

    fn schedule(&mut self, slots: Vec<usize>) {
        if slots.is_empty() {
            return;
        }
        if self.scheduler.mark(slots) {
            debug!("Form {}: flush scheduled", self.id);
        }
        self.lifecycle.transition(LifecycleState::Validating);
    }

    pub(crate) fn build_flush(&self, generation: u64, kind: FlushKind, slots: &[usize]) -> Flush {
        let guard = self.scheduler.guard(generation, slots);
        let mut flush = Flush::new(generation, kind, self.evaluator, guard);
        for &slot in slots {
            let s = &self.slots[slot];
            let value = self.model.get(&s.key).unwrap_or(Value::Null);
            flush.push(slot, &s.key, value, s.rules.clone());
        }
        flush
    }
}

impl fmt::Debug for FormEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormEngine")
            .field("id", &self.id)
            .field("fields", &self.fields.len())
            .field("state", &self.lifecycle.state())
            .field("dirty", &self.dirty())
            .field("valid", &self.valid())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
