//! Coalescing, in-flight handling and async rules.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use schemaform::prelude::*;
use schemaform::{RuleDef, RuleFault, wakeup};
use serde_json::{Value, json};

fn two_fields(registry: RuleRegistry, config: FormConfig) -> FormEngine {
    let schema = FormSchema::flat(vec![
        FieldSchema::new(FieldKind::Input)
            .with_model("a")
            .with_rule("required", true),
        FieldSchema::new(FieldKind::Input)
            .with_model("b")
            .with_rule("min", 3),
    ]);
    let model: Model = [
        ("a".to_string(), json!("")),
        ("b".to_string(), json!("long enough")),
    ]
    .into_iter()
    .collect();
    FormEngine::builder(schema)
        .model(model)
        .rules(registry)
        .config(config)
        .build()
        .unwrap()
}

fn validate_counter(form: &mut FormEngine) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    form.subscribe(move |event| {
        if let FormEvent::Validate(_) = event {
            c.fetch_add(1, Ordering::SeqCst);
        }
    });
    counter
}

// ============================================================================
// Coalescing
// ============================================================================

#[tokio::test]
async fn test_burst_yields_one_pass() {
    let evaluations = Arc::new(AtomicUsize::new(0));
    let registry = {
        let evaluations = Arc::clone(&evaluations);
        RuleRegistry::builtin().rule(
            "counted",
            move |_, _| {
                evaluations.fetch_add(1, Ordering::SeqCst);
                true
            },
            "unused",
        )
    };
    let schema = FormSchema::flat(vec![
        FieldSchema::new(FieldKind::Input)
            .with_model("x")
            .with_rule("counted", true),
    ]);
    let mut form = FormEngine::builder(schema)
        .rules(registry)
        .config(FormConfig::default().with_validate_on_create(false))
        .build()
        .unwrap();
    let validates = validate_counter(&mut form);

    for value in ["a", "ab", "abc"] {
        form.report_value("x", value).unwrap();
    }
    form.model().set("x", "abcd");

    assert_eq!(form.settle().await, 1);
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);
    assert_eq!(validates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mutation_touches_only_that_field() {
    let mut form = two_fields(RuleRegistry::builtin(), FormConfig::default());
    form.settle().await;
    let b_before = form.validity().get("b").unwrap();

    form.report_value("a", "filled").unwrap();
    assert!(form.validity().get("a").unwrap().dirty);

    let flush = form.begin_flush().unwrap();
    assert_eq!(flush.keys().collect::<Vec<_>>(), vec!["a"]);
    let outcome = flush.run().await;
    assert!(form.complete_flush(outcome));

    assert_eq!(form.validity().get("b").unwrap(), b_before);
    assert_eq!(form.validity().get("a").unwrap().valid, Some(true));
}

#[test]
fn test_unknown_key_is_rejected() {
    let mut form = two_fields(RuleRegistry::builtin(), FormConfig::default());
    assert!(form.report_value("nope", 1).is_err());
}

// ============================================================================
// In-flight passes
// ============================================================================

#[tokio::test]
async fn test_mutation_during_pass_lands_in_next_flush() {
    let mut form = two_fields(RuleRegistry::builtin(), FormConfig::default());
    let validates = validate_counter(&mut form);

    let first = form.begin_flush().unwrap();
    form.report_value("a", "now filled").unwrap();
    assert!(form.begin_flush().is_none(), "a is still in flight");
    assert!(form.validity().get("a").unwrap().pending);

    let outcome = first.run().await;
    assert!(form.complete_flush(outcome));
    assert_eq!(form.validity().get("a").unwrap().valid, Some(false));
    assert!(!form.is_settled());

    assert_eq!(form.settle().await, 1);
    assert_eq!(form.validity().get("a").unwrap().valid, Some(true));
    assert_eq!(validates.load(Ordering::SeqCst), 2);
    assert!(form.is_settled());
}

#[tokio::test]
async fn test_async_result_after_reset_is_discarded() {
    let registry = RuleRegistry::builtin().rule_async(
        "remote",
        |_: Value, _: Value| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            false
        },
        "Rejected by server",
    );
    let schema = FormSchema::flat(vec![
        FieldSchema::new(FieldKind::Input)
            .with_model("user")
            .with_rule("remote", true),
    ]);
    let model: Model = [("user".to_string(), json!("ada"))].into_iter().collect();
    let mut form = FormEngine::builder(schema)
        .model(model)
        .rules(registry)
        .build()
        .unwrap();

    let flush = form.begin_flush().unwrap();
    let pending = flush.run();
    form.reset();
    let outcome = pending.await;

    assert!(!form.complete_flush(outcome));
    assert!(form.validity().get("user").unwrap().is_untouched());
    assert!(!form.invalid());
}

#[tokio::test]
async fn test_submit_supersedes_in_flight_pass() {
    let mut form = two_fields(RuleRegistry::builtin(), FormConfig::default());
    let validates = validate_counter(&mut form);

    let stale = form.begin_flush().unwrap();
    form.model().set("a", "filled");
    assert!(form.submit().await.is_submitted());

    let outcome = stale.run().await;
    assert!(!form.complete_flush(outcome));
    assert_eq!(validates.load(Ordering::SeqCst), 1);
    assert!(form.valid());
}

#[tokio::test]
async fn test_rule_less_field_is_never_pending() {
    let schema = FormSchema::flat(vec![
        FieldSchema::new(FieldKind::Input).with_model("free"),
        FieldSchema::new(FieldKind::Input)
            .with_model("x")
            .with_rule("required", true),
    ]);
    let mut form = FormEngine::new(schema, Model::new()).unwrap();

    let flush = form.begin_flush().unwrap();
    assert_eq!(flush.keys().collect::<Vec<_>>(), vec!["free", "x"]);
    assert!(!form.validity().get("free").unwrap().pending);
    assert!(form.validity().get("x").unwrap().pending);

    let outcome = flush.run().await;
    assert!(form.complete_flush(outcome));
    let free = form.validity().get("free").unwrap();
    assert!(!free.pending);
    assert_eq!(free.valid, Some(true));
    assert!(free.result.unwrap().is_empty());
}

#[tokio::test]
async fn test_dropped_flush_returns_fields_to_pending() {
    let mut form = two_fields(RuleRegistry::builtin(), FormConfig::default());

    drop(form.begin_flush().unwrap());
    assert!(!form.is_settled());

    assert_eq!(form.settle().await, 1);
    assert!(form.is_settled());
    assert_eq!(form.validity().get("a").unwrap().valid, Some(false));
    assert_eq!(form.validity().get("b").unwrap().valid, Some(true));
}

#[tokio::test]
async fn test_dropped_outcome_wakes_host_loop() {
    let mut form = two_fields(RuleRegistry::builtin(), FormConfig::default());
    let (notifier, mut signals) = wakeup::channel();
    form.install_wakeup(notifier);
    signals.drain();

    let outcome = form.begin_flush().unwrap().run().await;
    assert!(!signals.try_recv());
    drop(outcome);
    assert!(signals.try_recv());

    assert_eq!(form.settle().await, 1);
    assert!(form.is_settled());
}

// ============================================================================
// Faults
// ============================================================================

#[tokio::test]
async fn test_faulting_rule_does_not_affect_siblings() {
    let registry = RuleRegistry::builtin().define(
        "lookup",
        RuleDef::sync(
            |_, _| Err(RuleFault::new("backend unavailable")),
            "unused",
        ),
    );
    let schema = FormSchema::flat(vec![
        FieldSchema::new(FieldKind::Input)
            .with_model("a")
            .with_rule("required", true)
            .with_rule("lookup", true),
        FieldSchema::new(FieldKind::Input)
            .with_model("b")
            .with_rule("required", true),
    ]);
    let model: Model = [
        ("a".to_string(), json!("x")),
        ("b".to_string(), json!("y")),
    ]
    .into_iter()
    .collect();
    let mut form = FormEngine::builder(schema)
        .model(model)
        .rules(registry)
        .build()
        .unwrap();

    form.settle().await;
    let a = form.validity().get("a").unwrap();
    let result = a.result.unwrap();
    assert!(!result.get("required").unwrap().invalid);
    assert_eq!(
        result.get("lookup").unwrap().message.as_deref(),
        Some("backend unavailable")
    );
    assert_eq!(form.validity().get("b").unwrap().valid, Some(true));
    assert_eq!(form.first_invalid_field_index(), Some(0));
}

#[tokio::test]
async fn test_rule_timeout_marks_field_invalid() {
    let registry = RuleRegistry::new().rule_async(
        "slow",
        |_: Value, _: Value| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            true
        },
        "unused",
    );
    let schema = FormSchema::flat(vec![
        FieldSchema::new(FieldKind::Input)
            .with_model("x")
            .with_rule("slow", true),
    ]);
    let model: Model = [("x".to_string(), json!("v"))].into_iter().collect();
    let mut form = FormEngine::builder(schema)
        .model(model)
        .rules(registry)
        .config(FormConfig::default().with_rule_timeout(Duration::from_millis(5)))
        .build()
        .unwrap();

    form.settle().await;
    assert!(form.invalid());
}

// ============================================================================
// Wakeup
// ============================================================================

#[tokio::test]
async fn test_model_write_wakes_host_loop() {
    let mut form = two_fields(
        RuleRegistry::builtin(),
        FormConfig::default().with_validate_on_create(false),
    );
    let (notifier, mut signals) = wakeup::channel();
    form.install_wakeup(notifier);
    assert!(!signals.try_recv());

    let model = form.model().clone();
    model.set("a", "one");
    model.set("a", "two");
    model.set("b", "x");

    assert!(signals.recv().await.is_some());
    assert_eq!(signals.drain(), 0);
    form.settle().await;

    assert_eq!(form.validity().get("a").unwrap().valid, Some(true));
    assert_eq!(form.validity().get("b").unwrap().valid, Some(false));
    assert!(form.dirty());
    assert!(form.is_settled());
}
