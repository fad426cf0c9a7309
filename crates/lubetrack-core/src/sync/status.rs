//! Connectivity and sync status with an explicit subscriber list

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::watch;

/// Snapshot delivered to status subscribers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    /// Time of the last drain that pushed at least one entry (Unix ms)
    pub last_sync: Option<i64>,
    pub pending_count: usize,
}

type Callback = Arc<dyn Fn(&SyncStatus) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    callbacks: Vec<(u64, Callback)>,
}

/// Owner of the current [`SyncStatus`].
///
/// Callbacks run synchronously on the thread that changed the status and
/// must not call back into the hub.
#[derive(Clone)]
pub struct SyncStatusHub {
    sender: Arc<watch::Sender<SyncStatus>>,
    subscribers: Arc<Mutex<Subscribers>>,
}

impl SyncStatusHub {
    pub fn new(initial: SyncStatus) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
        }
    }

    pub fn current(&self) -> SyncStatus {
        self.sender.borrow().clone()
    }

    /// Receiver for async consumers
    pub fn watch(&self) -> watch::Receiver<SyncStatus> {
        self.sender.subscribe()
    }

    /// Register `callback`; it receives the current status immediately and
    /// then every change until the subscription is dropped.
    pub fn on_sync_status_change(
        &self,
        callback: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> Subscription {
        let callback: Callback = Arc::new(callback);
        let mut subscribers = self.lock();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.callbacks.push((id, Arc::clone(&callback)));

        // Delivered under the lock so no change can overtake the first call.
        callback(&self.current());
        drop(subscribers);

        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Apply `change` and notify subscribers if the status differs afterwards
    pub fn update(&self, change: impl FnOnce(&mut SyncStatus)) -> bool {
        let subscribers = self.lock();
        let changed = self.sender.send_if_modified(|status| {
            let before = status.clone();
            change(status);
            *status != before
        });
        if changed {
            let snapshot = self.current();
            for (_, callback) in &subscribers.callbacks {
                callback(&snapshot);
            }
        }
        changed
    }

    pub fn set_online(&self, is_online: bool) -> bool {
        self.update(|status| status.is_online = is_online)
    }

    pub fn set_pending_count(&self, pending_count: usize) -> bool {
        self.update(|status| status.pending_count = pending_count)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().callbacks.len()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SyncStatusHub {
    fn default() -> Self {
        Self::new(SyncStatus::default())
    }
}

/// Keeps a status callback registered; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .callbacks
                .retain(|(id, _)| *id != self.id);
        }
    }
}
