//! Transient notification slot.
//!
//! DESIGN
//! ======
//! At most one toast is current. Setting a toast schedules its dismissal on
//! the tokio runtime; the timer only clears the slot if the same toast is
//! still showing, so a newer toast keeps its full display time.
//!
//! Listeners are notified one change at a time, in the order the changes
//! were applied, and must not show or dismiss toasts themselves.
//!
//! Outside a runtime no timer is scheduled and the toast stays until
//! replaced or cleared.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// How long a toast stays up.
pub const TOAST_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub kind: ToastKind,
    pub message: String,
}

type Listener = Arc<dyn Fn(Option<&Toast>) + Send + Sync>;

#[derive(Default)]
struct Slot {
    current: Option<Toast>,
    next_id: u64,
    next_listener: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Handle returned by [`Toaster::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToastSubscription(u64);

/// Shared toast slot. Cloning shares the same slot.
#[derive(Clone, Default)]
pub struct Toaster {
    slot: Arc<Mutex<Slot>>,
    delivery: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Toaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toaster")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

impl Toaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a toast, replacing any current one. Returns its id.
    pub fn set(&self, kind: ToastKind, message: impl Into<String>) -> u64 {
        let delivery = self.lock_delivery();
        let toast = {
            let mut slot = self.lock();
            slot.next_id += 1;
            let toast = Toast { id: slot.next_id, kind, message: message.into() };
            slot.current = Some(toast.clone());
            toast
        };
        tracing::debug!(id = toast.id, kind = ?toast.kind, "toast shown");
        self.notify(Some(&toast));
        drop(delivery);
        self.schedule_dismiss(toast.id);
        toast.id
    }

    pub fn success(&self, message: impl Into<String>) -> u64 {
        self.set(ToastKind::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.set(ToastKind::Error, message)
    }

    #[must_use]
    pub fn current(&self) -> Option<Toast> {
        self.lock().current.clone()
    }

    /// Clear the slot if toast `id` is still showing. Returns whether it was.
    pub fn dismiss(&self, id: u64) -> bool {
        let _delivery = self.lock_delivery();
        {
            let mut slot = self.lock();
            if slot.current.as_ref().map(|t| t.id) != Some(id) {
                return false;
            }
            slot.current = None;
        }
        self.notify(None);
        true
    }

    /// Register `listener`. It receives the current toast immediately and
    /// every later change synchronously.
    pub fn subscribe<F>(&self, listener: F) -> ToastSubscription
    where
        F: Fn(Option<&Toast>) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let _delivery = self.lock_delivery();
        let (id, current) = {
            let mut slot = self.lock();
            let id = slot.next_listener;
            slot.next_listener += 1;
            slot.listeners.push((id, Arc::clone(&listener)));
            (id, slot.current.clone())
        };
        listener(current.as_ref());
        ToastSubscription(id)
    }

    pub fn unsubscribe(&self, subscription: ToastSubscription) -> bool {
        let mut slot = self.lock();
        let before = slot.listeners.len();
        slot.listeners.retain(|(id, _)| *id != subscription.0);
        slot.listeners.len() != before
    }

    fn schedule_dismiss(&self, id: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let toaster = self.clone();
        handle.spawn(async move {
            tokio::time::sleep(TOAST_DURATION).await;
            toaster.dismiss(id);
        });
    }

    fn notify(&self, toast: Option<&Toast>) {
        let listeners: Vec<Listener> = self
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(toast);
        }
    }

    fn lock_delivery(&self) -> std::sync::MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "toast_test.rs"]
mod tests;
