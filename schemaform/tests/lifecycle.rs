//! Submit, reset and event sequencing through the public API.

use std::sync::{Arc, Mutex};

use schemaform::prelude::*;
use schemaform::{InvalidField, LifecycleState, Validity};
use serde_json::json;

type Log = Arc<Mutex<Vec<(&'static str, Option<Validity>)>>>;

fn record(form: &mut FormEngine) -> Log {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    form.subscribe(move |event| {
        sink.lock()
            .unwrap()
            .push((event.name(), event.validity().cloned()));
    });
    log
}

fn names(log: &Log) -> Vec<&'static str> {
    log.lock().unwrap().iter().map(|(name, _)| *name).collect()
}

fn count(log: &Log, name: &str) -> usize {
    names(log).iter().filter(|n| **n == name).count()
}

fn single(rules: &[(&str, serde_json::Value)], value: serde_json::Value) -> FormEngine {
    let mut field = FieldSchema::new(FieldKind::Input).with_model("x");
    for (name, config) in rules {
        field = field.with_rule(*name, config.clone());
    }
    let model: Model = [("x".to_string(), value)].into_iter().collect();
    FormEngine::new(FormSchema::flat(vec![field]), model).unwrap()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_fields_start_untouched() {
    let schema = FormSchema::grouped(vec![
        FieldGroup::new(vec![
            FieldSchema::new(FieldKind::Input)
                .with_model("a")
                .with_rule("required", true),
            FieldSchema::new(FieldKind::Select).with_model("b"),
        ]),
        FieldGroup::new(vec![FieldSchema::new(FieldKind::Submit)]),
    ]);
    let form = FormEngine::new(schema, Model::new()).unwrap();

    let validity = form.validity();
    assert_eq!(validity.keys(), vec!["a", "b"]);
    for (_, state) in validity.snapshot() {
        assert_eq!(state.valid, None);
        assert!(state.result.is_none());
        assert!(!state.dirty);
    }
    assert!(!form.valid());
    assert!(!form.invalid());
    assert_eq!(form.fields().len(), 3);
    assert_eq!(form.lifecycle_state(), LifecycleState::Validating);
}

// ============================================================================
// Scenario
// ============================================================================

#[tokio::test]
async fn test_required_scenario() {
    let mut form = single(&[("required", json!(true))], json!(""));

    form.settle().await;
    assert!(!form.dirty());
    assert!(!form.valid());
    assert!(form.invalid());
    assert_eq!(form.first_invalid_field_index(), Some(0));
    let x = form.validity().get("x").unwrap();
    assert_eq!(x.valid, Some(false));
    assert!(x.result.unwrap().get("required").unwrap().invalid);

    form.report_value("x", "a").unwrap();
    form.settle().await;
    let x = form.validity().get("x").unwrap();
    assert_eq!(x.valid, Some(true));
    assert!(x.dirty);
    assert!(form.dirty());
    assert_eq!(form.lifecycle_state(), LifecycleState::Idle);

    form.reset();
    assert!(!form.dirty());
    assert_eq!(form.validity().get("x").unwrap().valid, None);
}

#[tokio::test]
async fn test_event_counts_across_submit_and_reset() {
    let schema = FormSchema::flat(vec![
        FieldSchema::new(FieldKind::Input)
            .with_model("x")
            .with_rule("required", true),
        FieldSchema::new(FieldKind::Submit),
        FieldSchema::new(FieldKind::Reset),
    ]);
    let model: Model = [("x".to_string(), json!(""))].into_iter().collect();
    let mut form = FormEngine::builder(schema)
        .model(model)
        .config(FormConfig::default().with_verdict_events(VerdictEvents::OnSubmit))
        .build()
        .unwrap();
    let log = record(&mut form);

    assert!(!form.submit().await.is_submitted());
    assert_eq!(count(&log, "validate"), 1);
    assert_eq!(count(&log, "invalid"), 1);

    form.reset();
    form.settle().await;
    assert_eq!(count(&log, "validate"), 2);
    assert_eq!(count(&log, "reset"), 1);

    form.report_value("x", "filled").unwrap();
    form.settle().await;
    assert_eq!(count(&log, "validate"), 3);

    assert!(form.submit().await.is_submitted());
    assert_eq!(count(&log, "validate"), 4);
    assert_eq!(count(&log, "valid"), 1);
    assert_eq!(count(&log, "invalid"), 1);
    assert_eq!(count(&log, "submit"), 1);
}

// ============================================================================
// Submit
// ============================================================================

#[tokio::test]
async fn test_invalid_submit_reports_first_invalid_field() {
    let schema = FormSchema::flat(vec![
        FieldSchema::new(FieldKind::Input).with_model("name"),
        FieldSchema::new(FieldKind::Checkbox)
            .with_model("terms")
            .with_rule("required", true),
        FieldSchema::new(FieldKind::Rate)
            .with_model("stars")
            .with_rule("required", true),
        FieldSchema::new(FieldKind::Submit),
    ]);
    let model: Model = [
        ("name".to_string(), json!("")),
        ("terms".to_string(), json!(false)),
        ("stars".to_string(), json!(0)),
    ]
    .into_iter()
    .collect();
    let mut form = FormEngine::new(schema, model).unwrap();
    let log = record(&mut form);

    let outcome = form.submit().await;
    assert_eq!(
        outcome,
        SubmitOutcome::Blocked {
            first_invalid: Some(InvalidField {
                index: 1,
                key: "terms".to_string()
            })
        }
    );
    assert_eq!(names(&log), vec!["validate", "invalid"]);

    let (_, payload) = log.lock().unwrap()[1].clone();
    assert!(payload.unwrap().ptr_eq(&form.validity()));
}

#[tokio::test]
async fn test_valid_submit_order_and_action() {
    let schema = FormSchema::flat(vec![
        FieldSchema::new(FieldKind::Input)
            .with_model("x")
            .with_rule("required", true),
    ]);
    let model: Model = [("x".to_string(), json!("ok"))].into_iter().collect();
    let mut form = FormEngine::builder(schema)
        .model(model)
        .action("/accounts")
        .build()
        .unwrap();
    let log = record(&mut form);

    let action = Arc::new(Mutex::new(None));
    {
        let action = Arc::clone(&action);
        form.subscribe(move |event| {
            if let FormEvent::Submit(submit) = event {
                *action.lock().unwrap() = submit.action().map(str::to_string);
                submit.prevent_default();
            }
        });
    }

    let outcome = form.submit().await;
    assert_eq!(
        outcome,
        SubmitOutcome::Submitted {
            default_prevented: true
        }
    );
    assert_eq!(names(&log), vec!["validate", "valid", "submit"]);
    assert_eq!(action.lock().unwrap().as_deref(), Some("/accounts"));
    assert_eq!(form.lifecycle_state(), LifecycleState::Idle);
}

#[tokio::test]
async fn test_submit_covers_fields_written_through_model() {
    let mut form = single(&[("min", json!(3))], json!("abc"));
    form.settle().await;

    form.model().set("x", "ab");
    assert!(!form.submit().await.is_submitted());
    assert!(form.validity().get("x").unwrap().dirty);
}

// ============================================================================
// Reset
// ============================================================================

#[tokio::test]
async fn test_reset_mid_flush_discards_result() {
    let mut form = single(&[("required", json!(true))], json!(""));
    let log = record(&mut form);

    let flush = form.begin_flush().unwrap();
    form.reset();
    let outcome = flush.run().await;

    assert!(!form.complete_flush(outcome));
    assert!(form.validity().get("x").unwrap().is_untouched());
    assert!(!form.dirty());
    assert_eq!(names(&log), vec!["reset"]);

    form.settle().await;
    assert_eq!(names(&log), vec!["reset", "validate", "invalid"]);
}

#[tokio::test]
async fn test_reset_clears_verdict_until_next_pass() {
    let mut form = single(&[], json!("anything"));
    form.settle().await;
    assert!(form.valid());
    assert_eq!(
        form.validity().get("x").unwrap().result.unwrap().len(),
        0,
        "rule-less field is valid with an empty result"
    );

    form.reset();
    assert!(!form.valid());
    assert!(!form.invalid());

    form.settle().await;
    assert!(form.valid());
    assert!(!form.dirty());
}

#[tokio::test]
async fn test_channel_subscriber_sees_same_sequence() {
    let mut form = single(&[("required", json!(true))], json!(""));
    let mut rx = form.subscribe_channel();

    form.settle().await;
    form.reset();

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event.name());
    }
    assert_eq!(seen, vec!["validate", "invalid", "reset"]);
}
