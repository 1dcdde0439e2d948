//! Integration tests for the event store over the in-memory adapter

use std::collections::BTreeMap;
use std::sync::Arc;

use core_kernel::{OperationMetadata, WorkflowId};
use domain_workflow::{
    EventStore, WorkflowError, WorkflowEventKind, WorkflowInstance, WorkflowPersistence,
    WorkflowPriority, WorkflowStatus,
};
use infra_store::InMemoryWorkflowStore;

fn meta() -> OperationMetadata {
    OperationMetadata::new("store-tests")
}

fn store() -> EventStore<InMemoryWorkflowStore> {
    EventStore::new(Arc::new(InMemoryWorkflowStore::new()))
}

async fn start_committed(store: &EventStore<InMemoryWorkflowStore>) -> WorkflowId {
    let mut instance = WorkflowInstance::start(
        "prior-auth",
        "1",
        "authorization_request",
        "AUTH-100",
        WorkflowPriority::Normal,
        BTreeMap::from([("patient.age".to_string(), serde_json::json!(72))]),
        &meta(),
    );
    store.commit(&mut instance).await.unwrap();
    instance.id()
}

#[tokio::test]
async fn test_started_event_committed_at_version_zero() {
    let store = store();
    let workflow_id = start_committed(&store).await;

    let history = store.history(workflow_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version, 0);
    assert!(matches!(history[0].kind, WorkflowEventKind::Started { .. }));
}

#[tokio::test]
async fn test_commit_returns_committed_events_and_clears_buffer() {
    let store = store();
    let workflow_id = start_committed(&store).await;

    let mut instance = store.load(workflow_id).await.unwrap();
    instance.advance_step("review", &meta()).unwrap();
    instance.assign("bob", &meta()).unwrap();

    let events = store.commit(&mut instance).await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(instance.uncommitted_events().is_empty());

    // Committing with nothing pending is a no-op.
    let events = store.commit(&mut instance).await.unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_load_replays_to_identical_state() {
    let store = store();
    let workflow_id = start_committed(&store).await;

    let mut instance = store.load(workflow_id).await.unwrap();
    instance.advance_step("clinical_review", &meta()).unwrap();
    instance
        .set_variables(
            BTreeMap::from([("urgency".to_string(), serde_json::json!("high"))]),
            &meta(),
        )
        .unwrap();
    store.commit(&mut instance).await.unwrap();

    let loaded = store.load(workflow_id).await.unwrap();
    assert_eq!(loaded.status(), WorkflowStatus::Running);
    assert_eq!(loaded.current_step(), Some("clinical_review"));
    assert_eq!(loaded.version(), instance.version());
    assert_eq!(loaded.variables(), instance.variables());
}

#[tokio::test]
async fn test_load_unknown_stream_is_not_found() {
    let store = store();
    let result = store.load(WorkflowId::new()).await;
    assert!(matches!(result, Err(WorkflowError::NotFound(_))));
}

#[tokio::test]
async fn test_stale_writer_gets_concurrency_conflict() {
    let store = store();
    let workflow_id = start_committed(&store).await;

    // Two collaborators load the same version.
    let mut first = store.load(workflow_id).await.unwrap();
    let mut second = store.load(workflow_id).await.unwrap();

    first.assign("alice", &meta()).unwrap();
    store.commit(&mut first).await.unwrap();

    second.assign("bob", &meta()).unwrap();
    let result = store.commit(&mut second).await;
    match result {
        Err(WorkflowError::ConcurrencyConflict { expected, actual }) => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected concurrency conflict, got {other:?}"),
    }

    // The losing writer changed nothing.
    let loaded = store.load(workflow_id).await.unwrap();
    assert_eq!(loaded.assigned_to(), Some("alice"));
    assert_eq!(loaded.version(), 2);
}

#[tokio::test]
async fn test_exactly_one_concurrent_writer_wins() {
    let store = store();
    let workflow_id = start_committed(&store).await;

    let mut first = store.load(workflow_id).await.unwrap();
    let mut second = store.load(workflow_id).await.unwrap();
    first.assign("alice", &meta()).unwrap();
    second.assign("bob", &meta()).unwrap();

    let (a, b) = tokio::join!(store.commit(&mut first), store.commit(&mut second));
    let successes = [a.is_ok(), b.is_ok()].iter().filter(|&&ok| ok).count();
    assert_eq!(successes, 1);

    let loaded = store.load(workflow_id).await.unwrap();
    assert_eq!(loaded.version(), 2);
}

#[tokio::test]
async fn test_snapshot_taken_at_cadence_and_used_for_load() {
    let persistence = Arc::new(InMemoryWorkflowStore::new());
    let store = EventStore::new(Arc::clone(&persistence)).with_snapshot_cadence(5);

    let mut instance = WorkflowInstance::start(
        "prior-auth",
        "1",
        "authorization_request",
        "AUTH-200",
        WorkflowPriority::Normal,
        BTreeMap::new(),
        &meta(),
    );
    store.commit(&mut instance).await.unwrap();
    let workflow_id = instance.id();

    for i in 0..6 {
        let mut current = store.load(workflow_id).await.unwrap();
        current.advance_step(format!("step-{i}"), &meta()).unwrap();
        store.commit(&mut current).await.unwrap();
    }

    let snapshot = persistence.find_snapshot(workflow_id).await.unwrap();
    let snapshot = snapshot.expect("snapshot should exist after crossing cadence");
    assert!(snapshot.version >= 5);

    // Loading through the snapshot still reaches the head of the log.
    let loaded = store.load(workflow_id).await.unwrap();
    assert_eq!(loaded.version(), 7);
    assert_eq!(loaded.current_step(), Some("step-5"));
}

#[tokio::test]
async fn test_deleting_snapshots_loses_nothing() {
    let persistence = Arc::new(InMemoryWorkflowStore::new());
    let store = EventStore::new(Arc::clone(&persistence)).with_snapshot_cadence(2);

    let mut instance = WorkflowInstance::start(
        "claims",
        "1",
        "claim",
        "CLM-77",
        WorkflowPriority::High,
        BTreeMap::new(),
        &meta(),
    );
    store.commit(&mut instance).await.unwrap();
    let workflow_id = instance.id();

    let mut current = store.load(workflow_id).await.unwrap();
    current.advance_step("adjudicate", &meta()).unwrap();
    current.complete(Some("paid".to_string()), &meta()).unwrap();
    store.commit(&mut current).await.unwrap();

    let with_snapshot = store.load(workflow_id).await.unwrap();

    // Same store type without the snapshot: full replay must agree.
    let bare = Arc::new(InMemoryWorkflowStore::new());
    let bare_store = EventStore::new(Arc::clone(&bare));
    let history = store.history(workflow_id).await.unwrap();
    bare.append_events(workflow_id, &history, 0, &with_snapshot)
        .await
        .unwrap();

    let replayed = bare_store.load(workflow_id).await.unwrap();
    assert_eq!(replayed.status(), with_snapshot.status());
    assert_eq!(replayed.version(), with_snapshot.version());
    assert_eq!(replayed.current_step(), with_snapshot.current_step());
}
