//! Flush signals for host event loops.
//!
//! The engine never runs a flush on its own. When a flush becomes scheduled it
//! sends one signal; the host loop wakes, drains redundant signals and calls
//! `FormEngine::settle()`. A burst of mutations therefore wakes the loop once.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

/// Sending half, installed into the engine and its model.
#[derive(Clone, Debug)]
pub struct FlushNotifier {
    tx: mpsc::Sender<()>,
}

impl FlushNotifier {
    /// Signal that a flush is scheduled.
    ///
    /// Non-blocking. A full channel already holds an unconsumed signal, and a
    /// closed one means the host loop is gone; both are ignored.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Receiving half, owned by the host loop.
#[derive(Debug)]
pub struct FlushSignals {
    rx: mpsc::Receiver<()>,
}

impl FlushSignals {
    /// Wait for the next signal. `None` once every notifier is dropped.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Consume a signal if one is waiting.
    pub fn try_recv(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Drain all waiting signals, returning how many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

/// Create a new notifier / signal pair.
pub fn channel() -> (FlushNotifier, FlushSignals) {
    let (tx, rx) = mpsc::channel(1);
    (FlushNotifier { tx }, FlushSignals { rx })
}

/// Late-bound notifier shared by every clone of a handle.
#[derive(Debug, Default, Clone)]
pub(crate) struct NotifierSlot {
    inner: Arc<Mutex<Option<FlushNotifier>>>,
}

impl NotifierSlot {
    pub(crate) fn install(&self, notifier: FlushNotifier) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(notifier);
        }
    }

    pub(crate) fn notify(&self) {
        if let Ok(guard) = self.inner.lock()
            && let Some(notifier) = guard.as_ref()
        {
            notifier.notify();
        }
    }
}
