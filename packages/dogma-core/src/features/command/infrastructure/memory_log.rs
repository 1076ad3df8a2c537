//! Reference [`ReplicatedLog`]: an in-memory append-only vector shared
//! (via `Arc`) across every simulated replica in a test, so a command
//! appended by one "replica" is immediately visible to the others'
//! `read_from` — standing in for quorum-durable network replication.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::super::ports::{LogRecord, ReplicatedLog};
use crate::error::Result;

#[derive(Default)]
pub struct MemoryReplicatedLog {
    records: RwLock<Vec<LogRecord>>,
}

impl MemoryReplicatedLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplicatedLog for MemoryReplicatedLog {
    async fn append(&self, record: LogRecord) -> Result<i64> {
        let mut records = self.records.write();
        records.push(record);
        Ok(records.len() as i64 - 1)
    }

    async fn read_from(&self, seq: i64) -> Result<Vec<(i64, LogRecord)>> {
        if seq < 0 {
            return Ok(Vec::new());
        }
        let records = self.records.read();
        Ok(records
            .iter()
            .enumerate()
            .skip(seq as usize)
            .map(|(i, r)| (i as i64, r.clone()))
            .collect())
    }

    async fn last_persisted_seq(&self) -> Result<i64> {
        let records = self.records.read();
        Ok(records.len() as i64 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_assigns_sequential_seq() {
        let log = MemoryReplicatedLog::new();
        let a = log.append(LogRecord::new(1, 0, vec![1])).await.unwrap();
        let b = log.append(LogRecord::new(1, 1, vec![2])).await.unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(log.last_persisted_seq().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn read_from_replays_in_order() {
        let log = MemoryReplicatedLog::new();
        log.append(LogRecord::new(1, 0, vec![1])).await.unwrap();
        log.append(LogRecord::new(1, 1, vec![2])).await.unwrap();
        log.append(LogRecord::new(1, 2, vec![3])).await.unwrap();

        let replayed = log.read_from(1).await.unwrap();
        let seqs: Vec<i64> = replayed.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }
}
