//! Change events fired by an inventory.
//!
//! Listeners run synchronously on the thread that detected the change, in
//! registration order. A listener that fails or panics is logged and the
//! remaining listeners still run.

use crate::types::ChangeReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

/// Error type listeners may return.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerKind {
    /// The file set changed.
    Always,
    /// Downstream aggregation should recompute its proto dataset.
    ResetProto,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Always => f.write_str("always"),
            TriggerKind::ResetProto => f.write_str("resetProto"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub collection: String,
    pub kind: TriggerKind,
    /// Present for change events.
    pub report: Option<ChangeReport>,
}

/// Receives inventory change events.
pub trait TriggerListener: Send + Sync {
    fn on_event(&self, event: &TriggerEvent) -> Result<(), ListenerError>;
}

impl<F> TriggerListener for F
where
    F: Fn(&TriggerEvent) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_event(&self, event: &TriggerEvent) -> Result<(), ListenerError> {
        self(event)
    }
}

/// Handle returned on registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered listener registry.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn TriggerListener>)>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, listener: Arc<dyn TriggerListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.listeners.write() {
            Ok(mut guard) => guard.push((id, listener)),
            Err(poisoned) => poisoned.into_inner().push((id, listener)),
        }
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut guard = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = guard.len();
        guard.retain(|(existing, _)| *existing != id);
        guard.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        match self.listeners.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Deliver `event` to every listener registered at call time.
    pub(crate) fn dispatch(&self, event: &TriggerEvent) {
        // snapshot so listeners may (un)register without deadlocking
        let listeners: Vec<Arc<dyn TriggerListener>> = match self.listeners.read() {
            Ok(guard) => guard.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(_, l)| Arc::clone(l)).collect(),
        };
        debug!(
            collection = %event.collection,
            kind = %event.kind,
            listeners = listeners.len(),
            "Dispatching trigger event"
        );

        for listener in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(collection = %event.collection, kind = %event.kind, error = %e, "Trigger listener failed");
                }
                Err(_) => {
                    error!(collection = %event.collection, kind = %event.kind, "Trigger listener panicked");
                }
            }
        }
    }
}
