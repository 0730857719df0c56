//! Scripted session runner.

use log::{debug, info};
use schemaform::wakeup::{self, FlushSignals};
use schemaform::{FormEngine, FormEvent, SubmitOutcome};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::args::Step;
use crate::error::CliError;

/// Drives an engine through steps the way an interactive host would.
pub struct Session {
    form: FormEngine,
    signals: FlushSignals,
    events: UnboundedReceiver<FormEvent>,
    log: Vec<String>,
}

impl Session {
    pub fn new(mut form: FormEngine) -> Self {
        let (notifier, signals) = wakeup::channel();
        form.install_wakeup(notifier);
        let events = form.subscribe_channel();
        Self {
            form,
            signals,
            events,
            log: Vec::new(),
        }
    }

    pub fn form(&self) -> &FormEngine {
        &self.form
    }

    /// Event log lines, oldest first.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Apply one step, then run any flush it scheduled.
    pub async fn step(&mut self, step: &Step) -> Result<(), CliError> {
        debug!("Step {:?}", step);
        match step {
            Step::Set { key, value } => self.form.report_value(key, value.clone())?,
            Step::Validate => self.form.request_validation(),
            Step::Submit => {
                let outcome = self.form.submit().await;
                self.collect();
                self.log.push(match outcome {
                    SubmitOutcome::Submitted { .. } => "-> submitted".to_string(),
                    SubmitOutcome::Blocked {
                        first_invalid: Some(field),
                    } => format!("-> blocked at '{}' (#{})", field.key, field.index),
                    SubmitOutcome::Blocked { first_invalid: None } => "-> blocked".to_string(),
                });
            }
            Step::Reset => self.form.reset(),
        }
        self.pump().await;
        Ok(())
    }

    /// Run every step, then settle.
    pub async fn run(&mut self, steps: &[Step]) -> Result<(), CliError> {
        self.pump().await;
        for step in steps {
            self.step(step).await?;
        }
        info!("Session finished after {} step(s)", steps.len());
        Ok(())
    }

    /// Settle if a flush was signalled.
    async fn pump(&mut self) {
        if self.signals.try_recv() {
            self.signals.drain();
            let passes = self.form.settle().await;
            debug!("Settled {} pass(es)", passes);
        }
        self.collect();
    }

    fn collect(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.log.push(describe(&event));
        }
    }
}

fn describe(event: &FormEvent) -> String {
    match event {
        FormEvent::Submit(submit) => match submit.action() {
            Some(action) => format!("submit -> {}", action),
            None => "submit".to_string(),
        },
        FormEvent::Invalid(validity) => {
            let failing: Vec<String> = validity
                .snapshot()
                .into_iter()
                .filter(|(_, s)| s.is_invalid())
                .map(|(key, _)| key)
                .collect();
            format!("invalid [{}]", failing.join(", "))
        }
        other => other.name().to_string(),
    }
}
