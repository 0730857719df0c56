//! Form-level state derived from the per-field table.

use log::debug;

use crate::events::{EventDispatcher, FormEvent};
use crate::state::{RuleResult, Validity};

/// Owns the per-field table and derives the form-wide view from it.
///
/// Aggregates are computed on read, so they are consistent with the table at
/// every point, including between a mutation and the pass it schedules.
#[derive(Debug)]
pub struct FormAggregator {
    validity: Validity,
    /// Slot → index in the flattened field list.
    field_index: Vec<usize>,
    /// Slot → whether the field has any rule. Rule-less fields never pend.
    has_rules: Vec<bool>,
    /// Passes completed since construction or the last reset.
    passes: u64,
}

impl FormAggregator {
    pub(crate) fn new(validity: Validity, field_index: Vec<usize>, has_rules: Vec<bool>) -> Self {
        Self {
            validity,
            field_index,
            has_rules,
            passes: 0,
        }
    }

    /// The live mapping.
    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Any field touched.
    pub fn dirty(&self) -> bool {
        self.validity.fold(false, |acc, (_, s)| acc || s.dirty)
    }

    /// Any field failed its latest pass.
    pub fn invalid(&self) -> bool {
        self.first_invalid_slot().is_some()
    }

    /// No field failed, and at least one pass has completed.
    pub fn valid(&self) -> bool {
        self.passes > 0 && !self.invalid()
    }

    /// Declared-order index of the first failing field.
    pub fn first_invalid_field_index(&self) -> Option<usize> {
        self.first_invalid_slot().map(|slot| self.field_index[slot])
    }

    pub(crate) fn first_invalid_slot(&self) -> Option<usize> {
        self.validity.fold(None, |acc, (slot, s)| {
            acc.or_else(|| s.is_invalid().then_some(slot))
        })
    }

    /// Value mutation: dirty right away, before any result lands.
    pub(crate) fn mark_dirty(&self, slot: usize) {
        self.validity.update(slot, |s| s.dirty = true);
    }

    /// Flag fields covered by a pass that has rules to await.
    pub(crate) fn mark_pending(&self, slots: &[usize]) {
        for &slot in slots {
            if self.has_rules.get(slot).copied().unwrap_or(false) {
                self.validity.update(slot, |s| s.pending = true);
            }
        }
    }

    /// Write a completed pass. Only the covered fields change.
    pub(crate) fn apply(&mut self, results: Vec<(usize, RuleResult)>) {
        for (slot, result) in results {
            self.validity.update(slot, |s| s.settle(result));
        }
        self.passes += 1;
    }

    /// Return every field to untouched.
    pub(crate) fn clear(&mut self) {
        self.validity.update_all(|s| *s = Default::default());
        self.passes = 0;
    }

    /// Emit `validate`, then the verdict if requested. Returns the verdict.
    pub(crate) fn publish(&self, dispatcher: &mut EventDispatcher, with_verdict: bool) -> bool {
        let valid = self.valid();
        dispatcher.emit(FormEvent::Validate(self.validity.clone()));
        if with_verdict {
            debug!(
                "Form is {} (first invalid: {:?})",
                if valid { "valid" } else { "invalid" },
                self.first_invalid_field_index()
            );
            let event = if valid {
                FormEvent::Valid(self.validity.clone())
            } else {
                FormEvent::Invalid(self.validity.clone())
            };
            dispatcher.emit(event);
        }
        valid
    }
}
