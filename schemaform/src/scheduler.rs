//! Validation scheduling.
//!
//! Mutations mark fields pending; the first mark of a burst schedules one
//! flush. A flush is taken as a detached [`Flush`] that owns everything it
//! needs, so the engine stays usable while its rules are awaited. Completion is
//! matched against a generation counter: reset and submit bump it, and a pass
//! that lands afterwards is discarded. A pass dropped before completion hands
//! its fields back, and they are pending again at the next boundary.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use log::debug;
use serde_json::Value;

use crate::evaluator::{FieldRules, RuleEvaluator};
use crate::state::RuleResult;
use crate::wakeup::{FlushNotifier, NotifierSlot};

/// What started a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushKind {
    /// Coalesced mutations or an explicit validation request.
    Scheduled,
    /// The forced full pass of a submit.
    Submit,
}

/// Bookkeeping for pending, scheduled and in-flight fields.
///
/// Fields are addressed by slot: their position among the form's
/// value-bearing fields, in declared order.
#[derive(Debug, Default)]
pub struct ValidationScheduler {
    pending: BTreeSet<usize>,
    in_flight: HashSet<usize>,
    scheduled: bool,
    generation: u64,
    notifier: NotifierSlot,
    abandoned: Abandoned,
}

impl ValidationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Fields marked and not yet taken.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_in_flight(&self, slot: usize) -> bool {
        self.in_flight.contains(&slot)
    }

    /// Whether nothing is pending, scheduled or in flight.
    pub fn is_quiescent(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty() && !self.scheduled
    }

    pub(crate) fn install_notifier(&self, notifier: FlushNotifier) {
        self.notifier.install(notifier);
        if self.scheduled {
            self.notifier.notify();
        }
    }

    /// Mark fields for revalidation. Returns true if this scheduled a flush.
    pub fn mark(&mut self, slots: impl IntoIterator<Item = usize>) -> bool {
        self.pending.extend(slots);
        if self.scheduled || self.pending.is_empty() {
            return false;
        }
        self.scheduled = true;
        self.notifier.notify();
        true
    }

    /// Guard for a pass over `slots`, carried by its `Flush` and outcome.
    pub(crate) fn guard(&self, generation: u64, slots: &[usize]) -> FlightGuard {
        FlightGuard {
            generation,
            slots: slots.to_vec(),
            abandoned: Arc::clone(&self.abandoned),
            notifier: self.notifier.clone(),
            armed: true,
        }
    }

    /// Return the fields of dropped passes to pending. Returns how many.
    ///
    /// Passes from an older generation were superseded and are ignored.
    pub fn reclaim(&mut self) -> usize {
        let dropped = std::mem::take(
            &mut *self
                .abandoned
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        let mut reclaimed = 0;
        for (generation, slots) in dropped {
            if generation != self.generation {
                continue;
            }
            for slot in slots {
                if self.in_flight.remove(&slot) {
                    self.pending.insert(slot);
                    reclaimed += 1;
                }
            }
        }
        if reclaimed > 0 {
            debug!("Reclaimed {} field(s) from a dropped pass", reclaimed);
            if !self.scheduled {
                self.scheduled = true;
                self.notifier.notify();
            }
        }
        reclaimed
    }

    /// Take the runnable pending fields, in slot order.
    ///
    /// Fields already in flight stay pending for the next flush.
    pub fn take(&mut self) -> Option<(u64, Vec<usize>)> {
        self.reclaim();
        let ready: Vec<usize> = self
            .pending
            .iter()
            .copied()
            .filter(|slot| !self.in_flight.contains(slot))
            .collect();
        if ready.is_empty() {
            return None;
        }
        for slot in &ready {
            self.pending.remove(slot);
            self.in_flight.insert(*slot);
        }
        self.scheduled = !self.pending.is_empty();
        Some((self.generation, ready))
    }

    /// Take every field for a forced pass, superseding anything in flight.
    pub fn take_all(&mut self, slot_count: usize) -> (u64, Vec<usize>) {
        self.supersede();
        let slots: Vec<usize> = (0..slot_count).collect();
        self.in_flight.extend(slots.iter().copied());
        (self.generation, slots)
    }

    /// Record that a pass finished. Returns false if it is stale.
    pub fn finish(&mut self, generation: u64, slots: &[usize]) -> bool {
        if generation != self.generation {
            debug!(
                "Discarding stale pass (generation {} < {})",
                generation, self.generation
            );
            return false;
        }
        for slot in slots {
            self.in_flight.remove(slot);
        }
        if !self.pending.is_empty() {
            // Marks made while these fields were in flight.
            self.scheduled = true;
            self.notifier.notify();
        }
        true
    }

    /// Drop every mark and invalidate in-flight passes.
    pub fn supersede(&mut self) {
        self.pending.clear();
        self.in_flight.clear();
        self.scheduled = false;
        self.generation += 1;
    }
}

type Abandoned = Arc<Mutex<Vec<(u64, Vec<usize>)>>>;

/// Hands a pass's fields back to the scheduler unless the pass is completed.
#[derive(Debug)]
pub(crate) struct FlightGuard {
    generation: u64,
    slots: Vec<usize>,
    abandoned: Abandoned,
    notifier: NotifierSlot,
    armed: bool,
}

impl FlightGuard {
    /// The pass reached `complete_flush`.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let slots = std::mem::take(&mut self.slots);
        self.abandoned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((self.generation, slots));
        self.notifier.notify();
    }
}

#[derive(Debug)]
struct FieldJob {
    slot: usize,
    key: String,
    value: Value,
    rules: FieldRules,
}

/// A detached validation pass.
///
/// Owns captured values and rules, so running it borrows nothing from the
/// engine. Hand the [`FlushOutcome`] back to `FormEngine::complete_flush`.
/// Dropping the flush or its outcome instead returns its fields to pending.
#[derive(Debug)]
#[must_use = "a flush does nothing until run and completed"]
pub struct Flush {
    generation: u64,
    kind: FlushKind,
    evaluator: RuleEvaluator,
    jobs: Vec<FieldJob>,
    guard: FlightGuard,
}

impl Flush {
    pub(crate) fn new(
        generation: u64,
        kind: FlushKind,
        evaluator: RuleEvaluator,
        guard: FlightGuard,
    ) -> Self {
        Self {
            generation,
            kind,
            evaluator,
            jobs: Vec::new(),
            guard,
        }
    }

    pub(crate) fn push(&mut self, slot: usize, key: &str, value: Value, rules: FieldRules) {
        self.jobs.push(FieldJob {
            slot,
            key: key.to_string(),
            value,
            rules,
        });
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn kind(&self) -> FlushKind {
        self.kind
    }

    /// Keys covered by this pass, in declared order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|job| job.key.as_str())
    }

    /// Evaluate every field. Fields run concurrently; the outcome is ready
    /// once all of them have settled.
    pub async fn run(self) -> FlushOutcome {
        let Flush {
            generation,
            kind,
            evaluator,
            jobs,
            guard,
        } = self;
        let results = join_all(jobs.iter().map(|job| async move {
            let result = evaluator.evaluate(&job.key, &job.rules, &job.value).await;
            (job.slot, result)
        }))
        .await;

        FlushOutcome {
            generation,
            kind,
            results,
            guard,
        }
    }
}

/// Results of a finished [`Flush`].
#[derive(Debug)]
#[must_use = "pass the outcome to FormEngine::complete_flush"]
pub struct FlushOutcome {
    pub(crate) generation: u64,
    pub(crate) kind: FlushKind,
    pub(crate) results: Vec<(usize, RuleResult)>,
    pub(crate) guard: FlightGuard,
}

impl FlushOutcome {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
