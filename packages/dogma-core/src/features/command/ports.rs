//! External collaborator interfaces the command executor depends on
//! (§6): leader election and the replicated append-only log. Both are
//! ports; this crate ships one in-process reference implementation of
//! each (see `infrastructure`) so the total-order/convergence
//! properties of §8 are exercisable without a real coordination service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A replication log record, matching §6's literal on-disk shape: a
/// JSON header plus an opaque payload. The payload here is a
/// JSON-serialized [`super::domain::Command`]; `blocks` is carried for
/// wire-compatibility with a chunked-payload transport but always empty
/// in this single-process reference implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub replica_id: i32,
    pub timestamp_millis: i64,
    pub size: i32,
    pub blocks: Vec<i64>,
    pub compressed: Option<bool>,
    pub encrypted: Option<bool>,
    pub payload: Vec<u8>,
}

impl LogRecord {
    pub fn new(replica_id: i32, timestamp_millis: i64, payload: Vec<u8>) -> Self {
        Self {
            replica_id,
            timestamp_millis,
            size: payload.len() as i32,
            blocks: Vec::new(),
            compressed: None,
            encrypted: None,
            payload,
        }
    }
}

/// Leader-election primitive (§6). A real deployment plugs in etcd,
/// ZooKeeper, or similar behind this trait.
pub trait LeaderElection: Send + Sync {
    fn on_take_leadership(&self, callback: Box<dyn Fn() + Send + Sync>);

    fn on_release_leadership(&self, callback: Box<dyn Fn() + Send + Sync>);

    fn is_leader(&self) -> bool;

    fn replica_id(&self) -> i32;
}

/// Replicated append-only log (§6). `append` assigns the next
/// sequence number; `read_from` replays everything at or after `seq`
/// in order, as a follower does on catch-up.
#[async_trait]
pub trait ReplicatedLog: Send + Sync {
    async fn append(&self, record: LogRecord) -> Result<i64>;

    async fn read_from(&self, seq: i64) -> Result<Vec<(i64, LogRecord)>>;

    async fn last_persisted_seq(&self) -> Result<i64>;
}
