//! Key → result table with broadcast wake-up.
//!
//! Every insert wakes *all* waiters; each re-checks its own key and goes
//! back to sleep with whatever is left of its deadline. Waiters register
//! for the wake-up before checking the table, so an insert that lands in
//! between cannot be missed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use relay_core::Outcome;

/// Result of [`Correlator::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The result for the key, now removed from the table.
    Ready(Outcome),
    /// The deadline passed with no result for the key.
    Timeout,
}

#[derive(Default)]
struct Inner {
    table: Mutex<HashMap<String, Outcome>>,
    inserted: Notify,
}

/// Shared correlation table. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct Correlator {
    inner: Arc<Inner>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Outcome>> {
        self.inner
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a result and wake every waiter.
    ///
    /// An unclaimed result for the same key is replaced.
    pub fn insert(&self, outcome: Outcome) {
        let key = outcome.key.clone();
        let replaced = self.table().insert(key.clone(), outcome);
        if replaced.is_some() {
            debug!(%key, "replaced unclaimed result");
        } else {
            trace!(%key, "result stored");
        }
        self.inner.inserted.notify_waiters();
    }

    /// Wait up to `timeout` for the result of `key` and claim it.
    pub async fn wait(&self, key: &str, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        loop {
            let inserted = self.inner.inserted.notified();
            tokio::pin!(inserted);
            inserted.as_mut().enable();

            if let Some(outcome) = self.take(key) {
                return WaitOutcome::Ready(outcome);
            }

            if tokio::time::timeout_at(deadline, inserted).await.is_err() {
                debug!(%key, ?timeout, "wait timed out");
                return WaitOutcome::Timeout;
            }
        }
    }

    /// Claim the result for `key` without waiting.
    pub fn take(&self, key: &str) -> Option<Outcome> {
        self.table().remove(key)
    }

    /// Drop any unclaimed result for `key`. Returns whether one was present.
    pub fn discard(&self, key: &str) -> bool {
        self.table().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table().contains_key(key)
    }

    /// Number of unclaimed results.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
