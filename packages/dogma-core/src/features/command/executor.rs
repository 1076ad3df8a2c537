//! The command executor (§4.F): the single write authority. Every
//! mutating operation is appended to the replicated log before being
//! applied locally, so a follower replaying the same log in the same
//! order reaches bit-identical repository state.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::{Author, CommitMessage, PathPattern};
use crate::error::{DogmaError, Result};
use crate::features::repo_engine::FindOptions;

use super::domain::{Command, CommandOutcome};
use super::ports::{LeaderElection, LogRecord, ReplicatedLog};
use super::registry::RepositoryRegistry;

pub struct CommandExecutor {
    replica_id: i32,
    leader: Arc<dyn LeaderElection>,
    log: Arc<dyn ReplicatedLog>,
    registry: Arc<RepositoryRegistry>,
    read_only: AtomicBool,
    /// Highest log sequence this replica has applied; `-1` means none.
    applied_seq: AtomicI64,
}

impl CommandExecutor {
    pub fn new(leader: Arc<dyn LeaderElection>, log: Arc<dyn ReplicatedLog>, registry: Arc<RepositoryRegistry>) -> Self {
        let replica_id = leader.replica_id();
        Self {
            replica_id,
            leader,
            log,
            registry,
            read_only: AtomicBool::new(false),
            applied_seq: AtomicI64::new(-1),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &Arc<RepositoryRegistry> {
        &self.registry
    }

    /// Accept `command` as this replica's leader: assign it a log
    /// sequence, durably append it, then apply it locally (§4.F steps
    /// 1-4). A fault while applying is still returned to the caller —
    /// the command was already recorded, so a follower replaying it
    /// reaches the same no-state-change outcome.
    #[instrument(skip(self, command), fields(kind = command.kind()))]
    pub async fn submit(&self, command: Command) -> Result<CommandOutcome> {
        if !self.leader.is_leader() {
            return Err(DogmaError::NotLeader);
        }
        if let Command::ForcePush(inner) = &command {
            if !matches!(inner.as_ref(), Command::NormalizingPush { .. } | Command::PushAsIs { .. }) {
                return Err(DogmaError::InvalidPush {
                    repository: "force-push".into(),
                    reason: "force-push payload must be normalizing-push or push-as-is".into(),
                });
            }
        } else if self.is_read_only() {
            return Err(DogmaError::ReadOnly);
        }

        let payload = serde_json::to_vec(&command)?;
        let record = LogRecord::new(self.replica_id, chrono::Utc::now().timestamp_millis(), payload);
        let seq = self.log.append(record).await?;

        let outcome = self.apply(&command).await;
        self.applied_seq.store(seq, Ordering::SeqCst);
        info!(seq, ok = outcome.is_ok(), "command applied on leader");
        outcome
    }

    /// Replay every log record after the last one this replica applied,
    /// in strict sequence order (§4.F step 5) — used by followers, and
    /// by a leader catching up after restart.
    pub async fn catch_up(&self) -> Result<()> {
        let from = self.applied_seq.load(Ordering::SeqCst) + 1;
        for (seq, record) in self.log.read_from(from).await? {
            let command: Command = serde_json::from_slice(&record.payload)?;
            if let Err(e) = self.apply(&command).await {
                warn!(seq, error = %e, "replayed command faulted (expected to match the leader's outcome)");
            }
            self.applied_seq.store(seq, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn apply(&self, command: &Command) -> Result<CommandOutcome> {
        match command {
            Command::CreateProject { author, name } => {
                self.registry.create_project(author.clone(), name).await?;
                Ok(CommandOutcome::Unit)
            }
            Command::RemoveProject { name } => {
                self.registry.remove_project(name)?;
                Ok(CommandOutcome::Unit)
            }
            Command::PurgeProject { name } => {
                self.registry.purge_project(name).await?;
                Ok(CommandOutcome::Unit)
            }
            Command::UnremoveProject { name } => {
                self.registry.unremove_project(name)?;
                Ok(CommandOutcome::Unit)
            }
            Command::CreateRepository { author, project, name } => {
                self.registry.create_repository(author.clone(), project, name).await?;
                Ok(CommandOutcome::Unit)
            }
            Command::RemoveRepository { project, name } => {
                self.registry.remove_repository(project, name)?;
                Ok(CommandOutcome::Unit)
            }
            Command::PurgeRepository { project, name } => {
                self.registry.purge_repository(project, name).await?;
                Ok(CommandOutcome::Unit)
            }
            Command::UnremoveRepository { project, name } => {
                self.registry.unremove_repository(project, name)?;
                Ok(CommandOutcome::Unit)
            }
            Command::NormalizingPush { project, repository, base_revision, author, summary, detail, markup, changes } => {
                let engine = self.registry.active_engine(project, repository)?;
                let message = CommitMessage::new(summary.clone(), detail.clone(), *markup);
                let (revision, changes) =
                    engine.commit(*base_revision, author.clone(), message, changes.clone(), false, false).await?;
                Ok(CommandOutcome::Push { revision, changes })
            }
            Command::PushAsIs { project, repository, base_revision, author, summary, detail, markup, changes } => {
                let engine = self.registry.active_engine(project, repository)?;
                let message = CommitMessage::new(summary.clone(), detail.clone(), *markup);
                let (revision, _) =
                    engine.commit(*base_revision, author.clone(), message, changes.clone(), false, false).await?;
                Ok(CommandOutcome::Revision(revision))
            }
            Command::Transform { project, repository, base_revision, author, summary, detail, markup, transformer } => {
                let engine = self.registry.active_engine(project, repository)?;
                let transformer = self
                    .registry
                    .transformer(transformer)
                    .ok_or_else(|| DogmaError::Storage(format!("no transformer registered: {transformer}")))?;
                let entries = engine.find(*base_revision, &PathPattern::all(), FindOptions::default()).await?;
                let changes = transformer.transform(&entries).await?;
                let message = CommitMessage::new(summary.clone(), detail.clone(), *markup);
                let (revision, changes) = engine.commit(*base_revision, author.clone(), message, changes, false, false).await?;
                Ok(CommandOutcome::Push { revision, changes })
            }
            Command::CreateSession { session_id, user, ttl_secs } => {
                self.registry.create_session(session_id.clone(), user.clone(), *ttl_secs);
                Ok(CommandOutcome::Unit)
            }
            Command::RemoveSession { session_id } => {
                self.registry.remove_session(session_id);
                Ok(CommandOutcome::Unit)
            }
            Command::UpdateServerStatus { read_only } => {
                self.read_only.store(*read_only, Ordering::SeqCst);
                Ok(CommandOutcome::Unit)
            }
            Command::ForcePush(inner) => self.apply(&force_as_system(inner)).await,
        }
    }
}

/// `force-push`'s author-override (§4.F): the wrapped command is
/// re-applied with `author = system`, never the caller's author.
fn force_as_system(command: &Command) -> Command {
    match command {
        Command::NormalizingPush { project, repository, base_revision, summary, detail, markup, changes, .. } => {
            Command::NormalizingPush {
                project: project.clone(),
                repository: repository.clone(),
                base_revision: *base_revision,
                author: Author::system(),
                summary: summary.clone(),
                detail: detail.clone(),
                markup: *markup,
                changes: changes.clone(),
            }
        }
        Command::PushAsIs { project, repository, base_revision, summary, detail, markup, changes, .. } => Command::PushAsIs {
            project: project.clone(),
            repository: repository.clone(),
            base_revision: *base_revision,
            author: Author::system(),
            summary: summary.clone(),
            detail: detail.clone(),
            markup: *markup,
            changes: changes.clone(),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DogmaConfig;
    use crate::domain::{Change, Entry};
    use crate::features::command::infrastructure::{LocalLeaderElection, MemoryReplicatedLog};
    use async_trait::async_trait;

    async fn new_executor(leader: bool) -> (Arc<CommandExecutor>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DogmaConfig::default();
        config.data_dir = dir.path().to_path_buf();
        let registry = Arc::new(RepositoryRegistry::new(config).await.unwrap());
        let election: Arc<dyn LeaderElection> = Arc::new(LocalLeaderElection::new(1, leader));
        let log: Arc<dyn ReplicatedLog> = Arc::new(MemoryReplicatedLog::new());
        (Arc::new(CommandExecutor::new(election, log, registry)), dir)
    }

    #[tokio::test]
    async fn non_leader_rejects_submissions() {
        let (executor, _dir) = new_executor(false).await;
        let result = executor
            .submit(Command::CreateProject { author: Author::system(), name: "proj".into() })
            .await;
        assert!(matches!(result, Err(DogmaError::NotLeader)));
    }

    #[tokio::test]
    async fn create_project_then_push_applies_and_logs() {
        let (executor, _dir) = new_executor(true).await;
        executor
            .submit(Command::CreateProject { author: Author::system(), name: "proj".into() })
            .await
            .unwrap();
        executor
            .submit(Command::CreateRepository { author: Author::system(), project: "proj".into(), name: "app".into() })
            .await
            .unwrap();

        let outcome = executor
            .submit(Command::NormalizingPush {
                project: "proj".into(),
                repository: "app".into(),
                base_revision: crate::domain::Revision::new(1),
                author: Author::new("alice", "alice@example.com"),
                summary: "add file".into(),
                detail: String::new(),
                markup: crate::domain::Markup::Unknown,
                changes: vec![Change::upsert_text("/a.txt", "hi")],
            })
            .await
            .unwrap();
        match outcome {
            CommandOutcome::Push { revision, .. } => assert_eq!(revision, crate::domain::Revision::new(2)),
            _ => panic!("expected a push outcome"),
        }
    }

    #[tokio::test]
    async fn update_server_status_enforces_read_only_except_force_push() {
        let (executor, _dir) = new_executor(true).await;
        executor
            .submit(Command::CreateProject { author: Author::system(), name: "proj".into() })
            .await
            .unwrap();
        executor
            .submit(Command::CreateRepository { author: Author::system(), project: "proj".into(), name: "app".into() })
            .await
            .unwrap();
        executor.submit(Command::UpdateServerStatus { read_only: true }).await.unwrap();

        let rejected = executor
            .submit(Command::NormalizingPush {
                project: "proj".into(),
                repository: "app".into(),
                base_revision: crate::domain::Revision::new(1),
                author: Author::new("alice", "alice@example.com"),
                summary: "blocked".into(),
                detail: String::new(),
                markup: crate::domain::Markup::Unknown,
                changes: vec![Change::upsert_text("/a.txt", "hi")],
            })
            .await;
        assert!(matches!(rejected, Err(DogmaError::ReadOnly)));

        let forced = executor
            .submit(Command::ForcePush(Box::new(Command::NormalizingPush {
                project: "proj".into(),
                repository: "app".into(),
                base_revision: crate::domain::Revision::new(1),
                author: Author::new("alice", "alice@example.com"),
                summary: "forced".into(),
                detail: String::new(),
                markup: crate::domain::Markup::Unknown,
                changes: vec![Change::upsert_text("/a.txt", "hi")],
            })))
            .await;
        assert!(forced.is_ok());
    }

    #[tokio::test]
    async fn transform_applies_registered_transformer() {
        let (executor, _dir) = new_executor(true).await;
        executor
            .submit(Command::CreateProject { author: Author::system(), name: "proj".into() })
            .await
            .unwrap();
        executor
            .submit(Command::CreateRepository { author: Author::system(), project: "proj".into(), name: "app".into() })
            .await
            .unwrap();

        struct AddMarker;
        #[async_trait]
        impl crate::features::command::domain::Transformer for AddMarker {
            async fn transform(&self, _entries: &[Entry]) -> Result<Vec<Change>> {
                Ok(vec![Change::upsert_text("/marker.txt", "added")])
            }
        }
        executor.registry().register_transformer("add-marker", Arc::new(AddMarker));

        let outcome = executor
            .submit(Command::Transform {
                project: "proj".into(),
                repository: "app".into(),
                base_revision: crate::domain::Revision::new(1),
                author: Author::system(),
                summary: "transform".into(),
                detail: String::new(),
                markup: crate::domain::Markup::Unknown,
                transformer: "add-marker".into(),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, CommandOutcome::Push { .. }));
    }

    #[tokio::test]
    async fn follower_catch_up_converges_with_leader() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DogmaConfig::default();
        config.data_dir = dir.path().to_path_buf();
        let log: Arc<dyn ReplicatedLog> = Arc::new(MemoryReplicatedLog::new());

        let leader_registry = Arc::new(RepositoryRegistry::new(config.clone()).await.unwrap());
        let leader_election: Arc<dyn LeaderElection> = Arc::new(LocalLeaderElection::new(1, true));
        let leader = CommandExecutor::new(leader_election, log.clone(), leader_registry);

        leader.submit(Command::CreateProject { author: Author::system(), name: "proj".into() }).await.unwrap();
        leader
            .submit(Command::CreateRepository { author: Author::system(), project: "proj".into(), name: "app".into() })
            .await
            .unwrap();

        let mut follower_dir_config = config.clone();
        let follower_dir = tempfile::tempdir().unwrap();
        follower_dir_config.data_dir = follower_dir.path().to_path_buf();
        let follower_registry = Arc::new(RepositoryRegistry::new(follower_dir_config).await.unwrap());
        let follower_election: Arc<dyn LeaderElection> = Arc::new(LocalLeaderElection::new(2, false));
        let follower = CommandExecutor::new(follower_election, log.clone(), follower_registry);
        follower.catch_up().await.unwrap();

        assert!(follower.registry().active_engine("proj", "app").is_ok());
    }
}
