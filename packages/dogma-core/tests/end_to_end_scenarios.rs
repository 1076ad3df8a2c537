//! Integration tests for the §8 end-to-end scenarios, driven through the
//! public command-executor/registry surface rather than the engine
//! directly, so they exercise the same path a real server would.

use std::sync::Arc;
use std::time::Duration;

use dogma_core::config::DogmaConfig;
use dogma_core::domain::{Author, Change, ChangeContent, Markup, PathPattern, Query, Revision};
use dogma_core::error::DogmaError;
use dogma_core::features::command::infrastructure::{LocalLeaderElection, MemoryReplicatedLog};
use dogma_core::features::command::ports::{LeaderElection, ReplicatedLog};
use dogma_core::features::command::{Command, CommandExecutor, CommandOutcome, RepositoryRegistry};
use serde_json::json;

async fn new_executor() -> (Arc<CommandExecutor>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DogmaConfig::default();
    config.data_dir = dir.path().to_path_buf();
    let registry = Arc::new(RepositoryRegistry::new(config).await.unwrap());
    let election: Arc<dyn LeaderElection> = Arc::new(LocalLeaderElection::new(1, true));
    let log: Arc<dyn ReplicatedLog> = Arc::new(MemoryReplicatedLog::new());
    (Arc::new(CommandExecutor::new(election, log, registry)), dir)
}

async fn bootstrap(executor: &CommandExecutor, project: &str, repo: &str) {
    executor
        .submit(Command::CreateProject { author: Author::system(), name: project.into() })
        .await
        .unwrap();
    executor
        .submit(Command::CreateRepository { author: Author::system(), project: project.into(), name: repo.into() })
        .await
        .unwrap();
}

fn push(project: &str, repo: &str, base: i64, summary: &str, changes: Vec<Change>) -> Command {
    Command::NormalizingPush {
        project: project.into(),
        repository: repo.into(),
        base_revision: Revision::new(base),
        author: Author::new("alice", "alice@example.com"),
        summary: summary.into(),
        detail: String::new(),
        markup: Markup::Unknown,
        changes,
    }
}

/// Scenario 1: initial creation leaves an empty repository at revision 1.
#[tokio::test]
async fn scenario_1_initial_creation() {
    let (executor, _dir) = new_executor().await;
    bootstrap(&executor, "foo", "bar").await;

    let engine = executor.registry().active_engine("foo", "bar").unwrap();
    assert_eq!(engine.head_revision(), Some(Revision::new(1)));

    let found = engine.find(Revision::new(1), &PathPattern::all(), Default::default()).await.unwrap();
    assert!(found.is_empty());

    let err = engine.get(Revision::new(0), &Query::identity("/x").unwrap()).await;
    assert!(matches!(err, Err(DogmaError::RevisionNotFound { .. })));
}

/// Scenario 2: text upsert, read-back, then a redundant replay fails
/// without moving head.
#[tokio::test]
async fn scenario_2_text_upsert_and_redundant_replay() {
    let (executor, _dir) = new_executor().await;
    bootstrap(&executor, "foo", "bar").await;

    let outcome = executor
        .submit(push("foo", "bar", 1, "add a", vec![Change::upsert_text("/a.txt", "hello")]))
        .await
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::Push { revision, .. } if revision == Revision::new(2)));

    let engine = executor.registry().active_engine("foo", "bar").unwrap();
    let entry = engine.get(Revision::new(2), &Query::identity("/a.txt").unwrap()).await.unwrap();
    assert_eq!(entry.as_text(), Some("hello\n"));

    let redundant = executor
        .submit(push("foo", "bar", 2, "add a again", vec![Change::upsert_text("/a.txt", "hello")]))
        .await;
    assert!(matches!(redundant, Err(DogmaError::RedundantChange)));
    assert_eq!(engine.head_revision(), Some(Revision::new(2)));
}

/// Scenario 3: a JSON safe-replace patch applies once, then a replay of
/// the same patch against the new value conflicts.
#[tokio::test]
async fn scenario_3_json_patch_then_conflicting_replay() {
    let (executor, _dir) = new_executor().await;
    bootstrap(&executor, "foo", "bar").await;

    executor
        .submit(push("foo", "bar", 1, "seed", vec![Change::upsert_json("/a.json", json!({"foo": "bar"}))]))
        .await
        .unwrap();

    let patch = json!([
        {"op": "test", "path": "/foo", "value": "bar"},
        {"op": "replace", "path": "/foo", "value": "baz"}
    ]);
    let outcome = executor
        .submit(push("foo", "bar", 2, "patch", vec![Change::new("/a.json", ChangeContent::ApplyJsonPatch(patch.clone()))]))
        .await
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::Push { revision, .. } if revision == Revision::new(3)));

    let engine = executor.registry().active_engine("foo", "bar").unwrap();
    let entry = engine.get(Revision::new(3), &Query::identity("/a.json").unwrap()).await.unwrap();
    assert_eq!(entry.as_json(), Some(&json!({"foo": "baz"})));

    let replay = executor
        .submit(push("foo", "bar", 3, "replay", vec![Change::new("/a.json", ChangeContent::ApplyJsonPatch(patch))]))
        .await;
    assert!(matches!(replay, Err(DogmaError::ChangeConflict { .. })));
}

/// Scenario 4: a watcher on `/a.json` is not woken by an unrelated
/// `/b.txt` push, but wakes with the right revision once `/a.json` changes.
#[tokio::test]
async fn scenario_4_watch_wakes_only_on_matching_path() {
    let (executor, _dir) = new_executor().await;
    bootstrap(&executor, "foo", "bar").await;
    executor
        .submit(push("foo", "bar", 1, "seed", vec![Change::upsert_json("/a.json", json!({"foo": "bar"}))]))
        .await
        .unwrap();

    let engine = executor.registry().active_engine("foo", "bar").unwrap();
    let waiter = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .watch(Revision::new(2), PathPattern::parse("/a.json").unwrap(), Duration::from_secs(5))
                .await
                .unwrap()
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    executor
        .submit(push("foo", "bar", 2, "unrelated", vec![Change::upsert_text("/b.txt", "x")]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    executor
        .submit(push("foo", "bar", 3, "matching", vec![Change::upsert_json("/a.json", json!({"foo": "qux"}))]))
        .await
        .unwrap();

    let woken_at = tokio::time::timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
    assert_eq!(woken_at, Some(Revision::new(4)));
}

/// Scenario 5: five replicas sharing one replicated log converge to a
/// byte-identical commit-id index after the same commands are replayed
/// on each, regardless of which replica was the leader.
#[tokio::test]
async fn scenario_5_replicas_converge_after_replay() {
    let shared_log: Arc<dyn ReplicatedLog> = Arc::new(MemoryReplicatedLog::new());
    let mut dirs = Vec::new();
    let mut executors = Vec::new();
    for replica_id in 1..=5i32 {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DogmaConfig::default();
        config.data_dir = dir.path().to_path_buf();
        let registry = Arc::new(RepositoryRegistry::new(config).await.unwrap());
        let is_leader = replica_id == 1;
        let election: Arc<dyn LeaderElection> = Arc::new(LocalLeaderElection::new(replica_id, is_leader));
        let executor = Arc::new(CommandExecutor::new(election, shared_log.clone(), registry));
        dirs.push(dir);
        executors.push(executor);
    }
    let leader = executors[0].clone();

    bootstrap(&leader, "foo", "bar").await;
    for i in 0..5 {
        leader
            .submit(push("foo", "bar", 1 + i, &format!("change {i}"), vec![Change::upsert_text(format!("/f{i}.txt"), "x")]))
            .await
            .unwrap();
    }
    // 7 commands total: create-project, create-repository, 5 pushes.

    for follower in &executors[1..] {
        follower.catch_up().await.unwrap();
    }

    let expected_head = leader.registry().active_engine("foo", "bar").unwrap().head_revision();
    for follower in &executors[1..] {
        let engine = follower.registry().active_engine("foo", "bar").unwrap();
        assert_eq!(engine.head_revision(), expected_head);
        for rev in 1..=expected_head.unwrap().value() {
            let leader_entry = leader
                .registry()
                .active_engine("foo", "bar")
                .unwrap()
                .find(Revision::new(rev), &PathPattern::all(), Default::default())
                .await
                .unwrap();
            let follower_entry = engine.find(Revision::new(rev), &PathPattern::all(), Default::default()).await.unwrap();
            assert_eq!(leader_entry.len(), follower_entry.len());
        }
    }
}

/// Scenario 6: deleting an encrypted repository's data removes every
/// wrapped key and metadata entry under its prefix.
#[tokio::test]
async fn scenario_6_encrypted_repository_purge_removes_all_keys() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DogmaConfig::default();
    config.data_dir = dir.path().to_path_buf();
    config.encryption.enabled = true;
    let registry = Arc::new(RepositoryRegistry::new(config).await.unwrap());
    let election: Arc<dyn LeaderElection> = Arc::new(LocalLeaderElection::new(1, true));
    let log: Arc<dyn ReplicatedLog> = Arc::new(MemoryReplicatedLog::new());
    let executor = Arc::new(CommandExecutor::new(election, log, registry));

    bootstrap(&executor, "foo", "bar").await;
    for i in 0..10 {
        executor
            .submit(push("foo", "bar", 1 + i, &format!("change {i}"), vec![Change::upsert_text(format!("/f{i}.txt"), "x")]))
            .await
            .unwrap();
    }

    executor
        .submit(Command::PurgeRepository { project: "foo".into(), name: "bar".into() })
        .await
        .unwrap();

    assert!(executor.registry().active_engine("foo", "bar").is_err());
    assert!(executor.registry().repository_metadata("foo", "bar").is_err());

    // Recreating under the same name must not collide with leftover
    // encryption state (the purge really removed the WDEK entries).
    executor
        .submit(Command::CreateRepository { author: Author::system(), project: "foo".into(), name: "bar".into() })
        .await
        .unwrap();
    assert!(executor.registry().active_engine("foo", "bar").is_ok());
}
