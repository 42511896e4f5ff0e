//! Shared handle to the pending store.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::error::{Error, Result};
use crate::payload::SerializedPayload;
use crate::status::{Notifier, StatusEvent};

use super::{KeyedDurableStore, PendingSubmission, QueueStats};

/// A cloneable handle to a [`KeyedDurableStore`].
///
/// The submission client and the sync engine each hold one. Locks are taken
/// per operation and never held across an `.await`. Every successful
/// mutation republishes the pending count.
#[derive(Clone)]
pub struct PendingQueue {
    store: Arc<Mutex<dyn KeyedDurableStore>>,
    notifier: Notifier,
}

impl std::fmt::Debug for PendingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingQueue").finish_non_exhaustive()
    }
}

impl PendingQueue {
    /// Wrap a store.
    pub fn new<S: KeyedDurableStore + 'static>(store: S, notifier: Notifier) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            notifier,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, dyn KeyedDurableStore + 'static>> {
        self.store
            .lock()
            .map_err(|_| Error::internal("pending store lock poisoned"))
    }

    fn publish_count(&self, store: &dyn KeyedDurableStore) {
        match store.count() {
            Ok(count) => self.notifier.publish(StatusEvent::PendingChanged { count }),
            Err(e) => warn!(error = %e, "Failed to read pending count"),
        }
    }

    /// Append a payload and return its id.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the write is refused.
    pub fn add(&self, payload: &SerializedPayload) -> Result<i64> {
        let store = self.lock()?;
        let id = store.add(payload)?;
        self.publish_count(&*store);
        Ok(id)
    }

    /// Remove a record; missing ids are a no-op returning `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn remove(&self, id: i64) -> Result<bool> {
        let store = self.lock()?;
        let removed = store.remove(id)?;
        if removed {
            self.publish_count(&*store);
        }
        Ok(removed)
    }

    /// All pending records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn list_all(&self) -> Result<Vec<PendingSubmission>> {
        self.lock()?.list_all()
    }

    /// Number of pending records.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn count(&self) -> Result<u64> {
        self.lock()?.count()
    }

    /// Whether a record is still pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn contains(&self, id: i64) -> Result<bool> {
        self.lock()?.contains(id)
    }

    /// Queue statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn stats(&self) -> Result<QueueStats> {
        self.lock()?.stats()
    }

    /// The notifier this queue reports to.
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}
