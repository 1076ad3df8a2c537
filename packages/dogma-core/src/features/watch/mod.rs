//! Watch multiplexer (§4.E): one logical instance per repository, keyed
//! by `(last_known_revision, path_pattern)` waiters that wake only when
//! a commit touches a matching path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::domain::{PathPattern, Revision};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    Changed(Revision),
    TimedOut,
    Cancelled,
}

struct Waiter {
    last_known: Revision,
    pattern: PathPattern,
    sender: Option<oneshot::Sender<WatchOutcome>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

/// State: a map of waiter id to `{last_known, path-pattern, sink}`. Not a
/// literal multimap keyed by revision as §4.E phrases it — a flat map
/// scanned on `notify` is simpler and the waiter counts per repository
/// are small (long-poll clients, not a hot path).
pub struct WatchMultiplexer {
    waiters: Mutex<HashMap<u64, Waiter>>,
    next_id: AtomicU64,
}

impl Default for WatchMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchMultiplexer {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(
        &self,
        last_known: Revision,
        pattern: PathPattern,
    ) -> (WaiterId, oneshot::Receiver<WatchOutcome>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(
            id,
            Waiter {
                last_known,
                pattern,
                sender: Some(tx),
            },
        );
        (WaiterId(id), rx)
    }

    /// Invoked by the repository engine after a commit publishes. Every
    /// waiter whose `last_known < new_revision` and whose pattern matches
    /// any of `changed_paths` is completed and removed. A waiter already
    /// at `new_revision` is untouched — it already knew this revision.
    pub fn notify(&self, new_revision: Revision, changed_paths: &[String]) {
        let mut woken = Vec::new();
        {
            let mut waiters = self.waiters.lock();
            waiters.retain(|id, waiter| {
                if waiter.last_known.value() < new_revision.value()
                    && waiter.pattern.matches_any(changed_paths.iter())
                {
                    if let Some(sender) = waiter.sender.take() {
                        woken.push((*id, sender));
                    }
                    false
                } else {
                    true
                }
            });
        }
        for (id, sender) in woken {
            trace!(waiter = id, revision = new_revision.value(), "watch woke");
            let _ = sender.send(WatchOutcome::Changed(new_revision));
        }
    }

    pub fn cancel(&self, id: WaiterId) {
        if let Some(mut waiter) = self.waiters.lock().remove(&id.0) {
            if let Some(sender) = waiter.sender.take() {
                let _ = sender.send(WatchOutcome::Cancelled);
            }
        }
    }

    fn remove_silently(&self, id: WaiterId) {
        self.waiters.lock().remove(&id.0);
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

/// Resolve a watch request: return immediately if `find_latest_revision`
/// already has an answer, otherwise register and suspend until a match
/// or `timeout` elapses.
pub async fn watch(
    mux: &WatchMultiplexer,
    last_known: Revision,
    pattern: PathPattern,
    immediate: Option<Revision>,
    timeout: Duration,
) -> WatchOutcome {
    if let Some(revision) = immediate {
        return WatchOutcome::Changed(revision);
    }
    let (id, rx) = mux.register(last_known, pattern);
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => WatchOutcome::Cancelled,
        Err(_) => {
            debug!(?id, "watch timed out");
            mux.remove_silently(id);
            WatchOutcome::TimedOut
        }
    }
}
