use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::publish::events::RecordingUpdate;

pub type ListenerCallback = dyn Fn(&[RecordingUpdate]) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(u64);

/// Ordered list of observers notified after each successful cycle.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<(u64, Arc<ListenerCallback>)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&[RecordingUpdate]) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap()
            .push((id, Arc::new(callback)));
        ListenerHandle(id)
    }

    pub fn unsubscribe(&self, handle: ListenerHandle) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|(id, _)| *id != handle.0);
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synchronous fan-out in subscription order. A failing observer is
    /// logged and skipped; it cannot abort the loop.
    pub fn notify(&self, updates: &[RecordingUpdate]) {
        let listeners: Vec<Arc<ListenerCallback>> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in listeners {
            if catch_unwind(AssertUnwindSafe(|| callback(updates))).is_err() {
                debug!("listener update failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(camera: &str) -> RecordingUpdate {
        RecordingUpdate {
            camera: camera.to_string(),
            event_type: "Person".to_string(),
        }
    }

    #[test]
    fn subscribe_and_unsubscribe() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicU64::new(0));

        let seen = calls.clone();
        let handle = registry.subscribe(move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        registry.notify(&[update("Driveway")]);
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        registry.unsubscribe(handle);
        registry.notify(&[update("Driveway")]);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn a_panicking_listener_does_not_abort_the_fanout() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicU64::new(0));

        registry.subscribe(|_| panic!("observer bug"));
        let seen = calls.clone();
        registry.subscribe(move |updates| {
            assert_eq!(updates.len(), 1);
            seen.fetch_add(1, Ordering::Relaxed);
        });

        registry.notify(&[update("Porch")]);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
