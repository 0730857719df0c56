//! Submit and reset flows, and the engine state machine.

use log::{debug, info};

use crate::engine::{FormEngine, FormId};
use crate::events::{FormEvent, ResetEvent, SubmitEvent};
use crate::scheduler::FlushKind;

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Idle,
    /// A pass is scheduled or in flight.
    Validating,
    /// Delivering the submit event.
    Submitting,
    Resetting,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    form: FormId,
    state: LifecycleState,
}

impl Lifecycle {
    pub(crate) fn new(form: FormId) -> Self {
        Self {
            form,
            state: LifecycleState::Idle,
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn transition(&mut self, next: LifecycleState) {
        if self.state != next {
            debug!("Form {}: {:?} -> {:?}", self.form, self.state, next);
            self.state = next;
        }
    }
}

/// A failing field, for focus or scrolling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidField {
    /// Index into `FormEngine::fields`.
    pub index: usize,
    pub key: String,
}

/// Result of [`FormEngine::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The form was valid and the submit event was delivered.
    Submitted { default_prevented: bool },
    /// Validation failed; no submit event was emitted.
    Blocked { first_invalid: Option<InvalidField> },
}

impl SubmitOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }
}

impl FormEngine {
    /// Validate every field now and submit if the form is valid.
    ///
    /// Any scheduled flush is absorbed into the submit pass, and a pass still
    /// in flight is superseded. `validate` and the verdict are always emitted;
    /// `submit` only follows `valid`.
    pub async fn submit(&mut self) -> SubmitOutcome {
        info!("Form {}: submit requested", self.id);
        self.lifecycle.transition(LifecycleState::Validating);
        self.sync_model();

        let (generation, slots) = self.scheduler.take_all(self.slots.len());
        self.aggregator.mark_pending(&slots);
        let flush = self.build_flush(generation, FlushKind::Submit, &slots);
        let outcome = flush.run().await;
        let valid = self.complete_flush(outcome) && self.aggregator.valid();

        let outcome = if valid {
            self.lifecycle.transition(LifecycleState::Submitting);
            let event = SubmitEvent::new(self.id, self.action.clone());
            self.dispatcher.emit(FormEvent::Submit(event.clone()));
            let default_prevented = event.is_default_prevented();
            info!(
                "Form {}: submitted (default prevented: {})",
                self.id, default_prevented
            );
            SubmitOutcome::Submitted { default_prevented }
        } else {
            let first_invalid = self.first_invalid_field();
            info!("Form {}: submit blocked at {:?}", self.id, first_invalid);
            SubmitOutcome::Blocked { first_invalid }
        };

        self.lifecycle.transition(LifecycleState::Idle);
        // Writes that landed while the pass was awaited.
        self.sync_model();
        outcome
    }

    /// Return the form to its baseline.
    ///
    /// Cancels scheduled work, discards any in-flight result, restores the
    /// model's baseline values and every field to untouched.
    pub fn reset(&mut self) {
        info!("Form {}: reset", self.id);
        self.lifecycle.transition(LifecycleState::Resetting);
        self.scheduler.supersede();
        let discarded = self.model.take_journal();
        if !discarded.is_empty() {
            debug!(
                "Form {}: discarding {} unobserved write(s)",
                self.id,
                discarded.len()
            );
        }

        for (key, value) in &self.baseline {
            self.model.write_untracked(key, value.clone());
        }
        for slot in &self.slots {
            if !self.baseline.contains_key(&slot.key) {
                self.model.remove_untracked(&slot.key);
            }
        }

        self.aggregator.clear();
        self.dispatcher
            .emit(FormEvent::Reset(ResetEvent { form: self.id }));
        self.lifecycle.transition(LifecycleState::Idle);

        if self.config.revalidate_on_reset {
            self.request_validation();
        }
    }

    /// Capture the current model as the values `reset` restores.
    pub fn set_baseline(&mut self) {
        self.baseline = self.model.snapshot();
        debug!(
            "Form {}: baseline captured ({} value(s))",
            self.id,
            self.baseline.len()
        );
    }
}
