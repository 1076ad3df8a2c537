//! Reference [`LeaderElection`]: a fixed replica id with a manually
//! toggled leadership flag, for single-process embedding and for tests
//! that simulate several replicas sharing one [`MemoryReplicatedLog`]
//! and flipping which one is "leader."

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::super::ports::LeaderElection;

type Callback = Box<dyn Fn() + Send + Sync>;

pub struct LocalLeaderElection {
    replica_id: i32,
    leader: AtomicBool,
    on_take: Mutex<Vec<Callback>>,
    on_release: Mutex<Vec<Callback>>,
}

impl LocalLeaderElection {
    pub fn new(replica_id: i32, initially_leader: bool) -> Self {
        Self {
            replica_id,
            leader: AtomicBool::new(initially_leader),
            on_take: Mutex::new(Vec::new()),
            on_release: Mutex::new(Vec::new()),
        }
    }

    /// Flip leadership and fire the relevant callbacks, simulating an
    /// external coordination service handing leadership to a replica.
    pub fn set_leader(&self, leader: bool) {
        let was_leader = self.leader.swap(leader, Ordering::SeqCst);
        if leader && !was_leader {
            for cb in self.on_take.lock().iter() {
                cb();
            }
        } else if !leader && was_leader {
            for cb in self.on_release.lock().iter() {
                cb();
            }
        }
    }
}

impl LeaderElection for LocalLeaderElection {
    fn on_take_leadership(&self, callback: Callback) {
        self.on_take.lock().push(callback);
    }

    fn on_release_leadership(&self, callback: Callback) {
        self.on_release.lock().push(callback);
    }

    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    fn replica_id(&self) -> i32 {
        self.replica_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn callbacks_fire_on_transition_only() {
        let election = LocalLeaderElection::new(1, false);
        let takes = Arc::new(AtomicBool::new(false));
        let takes2 = takes.clone();
        election.on_take_leadership(Box::new(move || takes2.store(true, Ordering::SeqCst)));

        assert!(!election.is_leader());
        election.set_leader(true);
        assert!(election.is_leader());
        assert!(takes.load(Ordering::SeqCst));

        takes.store(false, Ordering::SeqCst);
        election.set_leader(true);
        assert!(!takes.load(Ordering::SeqCst));
    }
}
