//! Form events and the dispatcher that delivers them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::trace;
use tokio::sync::mpsc;

use crate::engine::FormId;
use crate::state::Validity;

/// Event payload delivered to listeners.
///
/// The validity-carrying variants hold the engine's live [`Validity`] handle,
/// not a copy.
#[derive(Debug, Clone)]
pub enum FormEvent {
    /// A pass completed. Emitted after every pass.
    Validate(Validity),
    /// The aggregate is valid after a pass.
    Valid(Validity),
    /// The aggregate is invalid after a pass.
    Invalid(Validity),
    /// A submit passed validation.
    Submit(SubmitEvent),
    /// The form was reset.
    Reset(ResetEvent),
}

impl FormEvent {
    /// Event name: `validate`, `valid`, `invalid`, `submit` or `reset`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validate(_) => "validate",
            Self::Valid(_) => "valid",
            Self::Invalid(_) => "invalid",
            Self::Submit(_) => "submit",
            Self::Reset(_) => "reset",
        }
    }

    /// The validity payload, for `validate` / `valid` / `invalid`.
    pub fn validity(&self) -> Option<&Validity> {
        match self {
            Self::Validate(v) | Self::Valid(v) | Self::Invalid(v) => Some(v),
            Self::Submit(_) | Self::Reset(_) => None,
        }
    }
}

/// Submit notification with a preventable default action.
///
/// Clones share the prevented flag, so a listener calling
/// [`SubmitEvent::prevent_default`] is seen by the engine.
#[derive(Debug, Clone)]
pub struct SubmitEvent {
    form: FormId,
    action: Option<String>,
    default_prevented: Arc<AtomicBool>,
}

impl SubmitEvent {
    pub(crate) fn new(form: FormId, action: Option<String>) -> Self {
        Self {
            form,
            action,
            default_prevented: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn form(&self) -> FormId {
        self.form
    }

    /// Submit target declared on the form.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Cancel the default submit handling.
    pub fn prevent_default(&self) {
        self.default_prevented.store(true, Ordering::SeqCst);
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented.load(Ordering::SeqCst)
    }
}

/// Reset notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetEvent {
    pub form: FormId,
}

/// Handle returned by [`EventDispatcher::subscribe`]. Only meaningful to the
/// dispatcher that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

type Listener = Box<dyn Fn(&FormEvent) + Send + Sync>;

/// Publish/subscribe hub for form events.
///
/// Callback listeners run synchronously in registration order; channel
/// subscribers receive a clone afterwards. Closed channels are pruned on the
/// next emit.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<(ListenerId, Listener)>,
    channels: Vec<mpsc::UnboundedSender<FormEvent>>,
    next_id: usize,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback listener.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&FormEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a callback listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Register a channel subscriber.
    pub fn subscribe_channel(&mut self) -> mpsc::UnboundedReceiver<FormEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.push(tx);
        rx
    }

    /// Deliver an event to every subscriber.
    pub fn emit(&mut self, event: FormEvent) {
        trace!(
            "Emitting '{}' to {} listener(s), {} channel(s)",
            event.name(),
            self.listeners.len(),
            self.channels.len()
        );
        for (_, listener) in &self.listeners {
            listener(&event);
        }
        self.channels.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len() + self.channels.len()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_listeners_run_in_order_then_unsubscribe() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();

        let first = {
            let seen = Arc::clone(&seen);
            dispatcher.subscribe(move |e| seen.lock().unwrap().push(format!("1:{}", e.name())))
        };
        {
            let seen = Arc::clone(&seen);
            dispatcher.subscribe(move |e| seen.lock().unwrap().push(format!("2:{}", e.name())));
        }

        let form = FormId::new();
        dispatcher.emit(FormEvent::Reset(ResetEvent { form }));
        assert!(dispatcher.unsubscribe(first));
        assert!(!dispatcher.unsubscribe(first));
        dispatcher.emit(FormEvent::Reset(ResetEvent { form }));

        assert_eq!(*seen.lock().unwrap(), vec!["1:reset", "2:reset", "2:reset"]);
    }

    #[test]
    fn test_listener_ids_are_per_dispatcher() {
        let mut first = EventDispatcher::new();
        let mut second = EventDispatcher::new();

        let a = first.subscribe(|_| {});
        let b = first.subscribe(|_| {});
        assert_ne!(a, b);
        assert_eq!(second.subscribe(|_| {}), a);

        assert!(first.unsubscribe(a));
        assert_ne!(first.subscribe(|_| {}), a);
    }

    #[test]
    fn test_closed_channels_are_pruned() {
        let mut dispatcher = EventDispatcher::new();
        let mut open = dispatcher.subscribe_channel();
        drop(dispatcher.subscribe_channel());
        assert_eq!(dispatcher.listener_count(), 2);

        dispatcher.emit(FormEvent::Reset(ResetEvent {
            form: FormId::new(),
        }));
        assert_eq!(dispatcher.listener_count(), 1);
        assert_eq!(open.try_recv().unwrap().name(), "reset");
    }

    #[test]
    fn test_prevent_default_is_shared_between_clones() {
        let event = SubmitEvent::new(FormId::new(), Some("/signup".to_string()));
        let copy = event.clone();
        copy.prevent_default();

        assert!(event.is_default_prevented());
        assert_eq!(event.action(), Some("/signup"));
    }
}
