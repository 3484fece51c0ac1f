use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;
use test_fixtures::{document_body, issue_body, test_config, ScriptedReply, ScriptedTransport};
use tether_core::errors::{StorageError, SyncError, TetherError, TetherResult};
use tether_core::mutation::{
    ErrorClass, Mutation, MutationPatch, MutationStatus, NewMutation, ResourceId, ResourceType,
};
use tether_core::traits::{IIdMappingStore, IQueueStore, IdMapping};
use tether_core::TetherConfig;
use tether_storage::QueueStore;
use tether_sync::{EnqueueOutcome, SyncEngine};

type Engine = SyncEngine<QueueStore, ScriptedTransport>;

fn engine_with(transport: &ScriptedTransport, config: TetherConfig) -> Engine {
    SyncEngine::new(QueueStore::open_in_memory().unwrap(), transport.clone(), config).unwrap()
}

fn engine(transport: &ScriptedTransport) -> Engine {
    engine_with(transport, test_config())
}

fn assert_pending_count_matches(engine: &Engine) {
    let unsynced = engine
        .queued()
        .unwrap()
        .iter()
        .filter(|m| m.status != MutationStatus::Synced)
        .count();
    assert_eq!(engine.status().pending_count, unsynced);
}

#[tokio::test(start_paused = true)]
async fn rejected_create_fails_its_dependents() {
    let transport = ScriptedTransport::from_replies([ScriptedReply::json(
        422,
        json!({"error": "title required"}),
    )]);
    let engine = engine(&transport);
    engine.set_offline().unwrap();

    let doc = engine.create(ResourceType::Document, document_body("")).unwrap();
    let temp = doc.resource_id.as_str().to_string();
    engine
        .update(ResourceType::Document, temp.as_str(), json!({"content": "x"}))
        .unwrap();
    let issue = engine
        .create(ResourceType::Issue, issue_body("Follow up", &temp))
        .unwrap();
    assert_eq!(issue.depends_on.as_deref(), Some(doc.id.as_str()));
    assert_pending_count_matches(&engine);

    engine.set_online().unwrap();
    let report = engine.drain().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 3);
    assert_eq!(transport.lines(), vec!["POST /documents"]);

    let queue = engine.queued().unwrap();
    assert!(queue.iter().all(|m| m.status == MutationStatus::Failed));
    let classes: Vec<ErrorClass> = queue
        .iter()
        .map(|m| m.last_error.as_ref().unwrap().class)
        .collect();
    assert_eq!(
        classes,
        vec![ErrorClass::Permanent, ErrorClass::Dependency, ErrorClass::Dependency]
    );
    assert!(engine.cache_snapshot().unwrap().is_empty());
    assert_eq!(engine.status().failed_count, 3);
    assert_pending_count_matches(&engine);
}

#[tokio::test(start_paused = true)]
async fn discarding_a_create_discards_its_dependents() {
    let transport = ScriptedTransport::new();
    let engine = engine(&transport);
    engine.set_offline().unwrap();

    let doc = engine.create(ResourceType::Document, document_body("Plan")).unwrap();
    let temp = doc.resource_id.as_str().to_string();
    engine
        .update(ResourceType::Document, temp.as_str(), json!({"title": "Plan B"}))
        .unwrap();
    engine
        .create(ResourceType::Issue, issue_body("Task", &temp))
        .unwrap();
    let unrelated = engine
        .update(ResourceType::Sprint, "spr-1", json!({"name": "S1"}))
        .unwrap();

    let removed = engine.discard(&doc.id).unwrap();
    assert_eq!(removed.len(), 3);
    assert_eq!(removed[0], doc.id);

    let queue = engine.queued().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, unrelated.mutation().unwrap().id);
    assert!(engine.entity(ResourceType::Document, &temp).unwrap().is_none());
    assert_pending_count_matches(&engine);

    engine.set_online().unwrap();
    let report = engine.drain().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(transport.lines(), vec!["PATCH /sprints/spr-1"]);
}

#[tokio::test(start_paused = true)]
async fn manual_retry_reapplies_rolled_back_edit() {
    let transport = ScriptedTransport::from_replies([ScriptedReply::status(400)]);
    let engine = engine(&transport);
    engine
        .seed_entity(ResourceType::Issue, "iss-1", json!({"id": "iss-1", "state": "open"}))
        .unwrap();
    let update = engine
        .update(ResourceType::Issue, "iss-1", json!({"state": "closed"}))
        .unwrap();
    let id = update.mutation().unwrap().id.clone();

    engine.drain().await.unwrap();
    assert_eq!(
        engine.entity(ResourceType::Issue, "iss-1").unwrap().unwrap()["state"],
        "open"
    );

    let retried = engine.retry(&id).unwrap();
    assert_eq!(retried.status, MutationStatus::Pending);
    assert_eq!(retried.attempt, 0);
    assert!(retried.last_error.is_none());
    assert_eq!(
        engine.entity(ResourceType::Issue, "iss-1").unwrap().unwrap()["state"],
        "closed"
    );

    let report = engine.drain().await.unwrap();
    assert_eq!(report.synced, 1);
    assert!(engine.queued().unwrap().is_empty());
    assert_eq!(
        engine.entity(ResourceType::Issue, "iss-1").unwrap().unwrap()["state"],
        "closed"
    );
}

#[tokio::test(start_paused = true)]
async fn retry_of_pending_mutation_is_rejected() {
    let transport = ScriptedTransport::new();
    let engine = engine(&transport);
    engine.set_offline().unwrap();
    let outcome = engine
        .update(ResourceType::Plan, "pln-1", json!({"title": "x"}))
        .unwrap();
    let err = engine.retry(&outcome.mutation().unwrap().id).unwrap_err();
    assert!(matches!(
        err,
        TetherError::InvalidTransition {
            from: MutationStatus::Pending,
            ..
        }
    ));
    assert!(matches!(
        engine.retry("missing").unwrap_err(),
        TetherError::MutationNotFound { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn reload_after_conflict_takes_server_version() {
    let transport = ScriptedTransport::from_replies([ScriptedReply::status(409)]);
    let engine = engine(&transport);
    engine
        .seed_entity(ResourceType::Document, "doc-1", json!({"id": "doc-1", "title": "Base"}))
        .unwrap();
    let outcome = engine
        .update(ResourceType::Document, "doc-1", json!({"title": "Mine"}))
        .unwrap();
    engine
        .update(ResourceType::Document, "doc-1", json!({"content": "later"}))
        .unwrap();
    let first = outcome.mutation().unwrap().id.clone();

    let report = engine.drain().await.unwrap();
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.held, 1, "the second edit waits behind the conflict");

    engine
        .reload(&first, Some(json!({"id": "doc-1", "title": "Theirs", "content": ""})))
        .unwrap();
    let entity = engine.entity(ResourceType::Document, "doc-1").unwrap().unwrap();
    assert_eq!(entity["title"], "Theirs");
    assert_eq!(entity["content"], "later");
    assert_eq!(engine.status().conflict_count, 0);

    let report = engine.drain().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn discard_refuses_in_flight_mutation() {
    let transport = ScriptedTransport::new();
    transport.set_latency(Duration::from_secs(10));
    let engine = Arc::new(engine(&transport));
    let handle = engine.spawn();

    let outcome = engine
        .update(ResourceType::Project, "prj-1", json!({"name": "n"}))
        .unwrap();
    let id = outcome.mutation().unwrap().id.clone();
    let mut rx = engine.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.syncing_count == 1))
        .await
        .unwrap()
        .unwrap();

    let err = engine.discard(&id).unwrap_err();
    assert!(matches!(
        err,
        TetherError::SyncError(SyncError::MutationInFlight { .. })
    ));

    tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|s| s.pending_count == 0))
        .await
        .unwrap()
        .unwrap();
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn hung_request_times_out_and_is_retried() {
    let transport = ScriptedTransport::from_replies([ScriptedReply::Hang]);
    let mut config = test_config();
    config.transport.request_timeout_ms = 2_000;
    let engine = engine_with(&transport, config);

    engine
        .update(ResourceType::Document, "doc-1", json!({"title": "t"}))
        .unwrap();
    let report = engine.drain().await.unwrap();
    assert_eq!(report.retry_scheduled, 1);
    assert!(engine.retry_armed());

    let queue = engine.queued().unwrap();
    assert_eq!(queue[0].status, MutationStatus::Pending);
    assert_eq!(queue[0].attempt, 1);
    let error = queue[0].last_error.as_ref().unwrap();
    assert_eq!(error.class, ErrorClass::Transient);
    assert_eq!(error.message, "request timed out");
    assert!(engine.network().is_online(), "timeouts do not flip connectivity");

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let report = engine.drain().await.unwrap();
    assert_eq!(report.synced, 1);
}

#[tokio::test(start_paused = true)]
async fn backing_off_create_holds_its_dependents() {
    let transport = ScriptedTransport::from_replies([ScriptedReply::status(503)]);
    let engine = engine(&transport);
    engine.set_offline().unwrap();
    let doc = engine.create(ResourceType::Document, document_body("D")).unwrap();
    engine
        .update(ResourceType::Document, doc.resource_id.clone(), json!({"title": "E"}))
        .unwrap();
    engine
        .update(ResourceType::Sprint, "spr-2", json!({"name": "independent"}))
        .unwrap();

    engine.set_online().unwrap();
    let report = engine.drain().await.unwrap();
    assert_eq!(report.retry_scheduled, 1);
    assert_eq!(report.held, 1);
    assert_eq!(report.synced, 1, "other chains keep flowing");
    assert_eq!(transport.lines(), vec!["POST /documents", "PATCH /sprints/spr-2"]);
    assert_pending_count_matches(&engine);
}

#[tokio::test(start_paused = true)]
async fn reference_to_unknown_temp_id_fails_as_dependency() {
    let transport = ScriptedTransport::new();
    let engine = engine(&transport);
    let ghost = ResourceId::temporary();
    engine
        .create(ResourceType::Issue, issue_body("Orphan", ghost.as_str()))
        .unwrap();

    let report = engine.drain().await.unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 1);
    let queue = engine.queued().unwrap();
    assert_eq!(queue[0].last_error.as_ref().unwrap().class, ErrorClass::Dependency);
    assert!(engine.cache_snapshot().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn create_response_without_id_keeps_local_id() {
    let transport = ScriptedTransport::from_replies([ScriptedReply::status(201)]);
    let engine = engine(&transport);
    let doc = engine.create(ResourceType::Document, document_body("No id")).unwrap();

    let report = engine.drain().await.unwrap();
    assert_eq!(report.synced, 1);
    assert!(engine.queued().unwrap().is_empty());
    let entity = engine
        .entity(ResourceType::Document, doc.resource_id.as_str())
        .unwrap()
        .unwrap();
    assert_eq!(entity["title"], "No id");
}

#[tokio::test(start_paused = true)]
async fn coalescing_folds_updates_and_cancels_deletes() {
    let transport = ScriptedTransport::new();
    let mut config = test_config();
    config.sync.coalesce_pending_creates = true;
    let engine = engine_with(&transport, config);
    engine.set_offline().unwrap();

    let doc = engine.create(ResourceType::Document, document_body("One")).unwrap();
    let temp = doc.resource_id.clone();
    let folded = engine
        .update(ResourceType::Document, temp.clone(), json!({"title": "Two"}))
        .unwrap();
    assert_eq!(folded, EnqueueOutcome::Coalesced { into: doc.id.clone() });

    let queue = engine.queued().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].payload["title"], "Two");
    assert_eq!(
        engine.entity(ResourceType::Document, temp.as_str()).unwrap().unwrap()["title"],
        "Two"
    );

    let cancelled = engine.delete(ResourceType::Document, temp.clone()).unwrap();
    assert_eq!(
        cancelled,
        EnqueueOutcome::Cancelled {
            removed: vec![doc.id.clone()]
        }
    );
    assert!(engine.queued().unwrap().is_empty());
    assert!(engine.cache_snapshot().unwrap().is_empty());

    engine.set_online().unwrap();
    engine.drain().await.unwrap();
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn coalesced_create_syncs_with_merged_body() {
    let transport = ScriptedTransport::new();
    let mut config = test_config();
    config.sync.coalesce_pending_creates = true;
    let engine = engine_with(&transport, config);
    engine.set_offline().unwrap();

    let doc = engine.create(ResourceType::Document, document_body("A")).unwrap();
    engine
        .update(ResourceType::Document, doc.resource_id.clone(), json!({"content": "merged"}))
        .unwrap();
    engine.set_online().unwrap();
    engine.drain().await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let body = requests[0].request.body.as_ref().unwrap();
    assert_eq!(body["title"], "A");
    assert_eq!(body["content"], "merged");
}

#[tokio::test(start_paused = true)]
async fn non_object_payloads_are_rejected() {
    let transport = ScriptedTransport::new();
    let engine = engine(&transport);
    let err = engine
        .enqueue(NewMutation::update(ResourceType::Document, "doc-1", json!("oops")))
        .unwrap_err();
    assert!(matches!(
        err,
        TetherError::SyncError(SyncError::PayloadNotObject { .. })
    ));
    assert!(engine.queued().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn restart_rehydrates_queue_and_optimistic_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let transport = ScriptedTransport::new();

    let (doc_temp, update_id) = {
        let engine = SyncEngine::new(
            QueueStore::open_path(&path).unwrap(),
            transport.clone(),
            test_config(),
        )
        .unwrap();
        engine.set_offline().unwrap();
        let doc = engine.create(ResourceType::Document, document_body("Saved")).unwrap();
        let update = engine
            .update(ResourceType::Document, doc.resource_id.clone(), json!({"content": "kept"}))
            .unwrap();
        // A crash mid-request leaves the row `syncing`.
        engine
            .store()
            .update(&doc.id, &MutationPatch::status(MutationStatus::Syncing))
            .unwrap();
        (
            doc.resource_id.as_str().to_string(),
            update.mutation().unwrap().id.clone(),
        )
    };

    let engine = SyncEngine::new(
        QueueStore::open_path(&path).unwrap(),
        transport.clone(),
        test_config(),
    )
    .unwrap();
    let queue = engine.queued().unwrap();
    assert_eq!(queue.len(), 2);
    assert!(queue.iter().all(|m| m.status == MutationStatus::Pending));
    assert_eq!(queue[1].id, update_id);
    let entity = engine.entity(ResourceType::Document, &doc_temp).unwrap().unwrap();
    assert_eq!(entity["title"], "Saved");
    assert_eq!(entity["content"], "kept");
    assert_eq!(engine.status().pending_count, 2);

    let report = engine.drain().await.unwrap();
    assert_eq!(report.synced, 2);
    assert_eq!(transport.lines(), vec!["POST /documents", "PATCH /documents/srv-1"]);
}

#[tokio::test(start_paused = true)]
async fn restart_finishes_a_half_reconciled_create() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let transport = ScriptedTransport::new();

    let (doc_id, temp) = {
        let engine = SyncEngine::new(
            QueueStore::open_path(&path).unwrap(),
            transport.clone(),
            test_config(),
        )
        .unwrap();
        engine.set_offline().unwrap();
        let doc = engine.create(ResourceType::Document, document_body("X")).unwrap();
        engine
            .update(ResourceType::Document, doc.resource_id.clone(), json!({"title": "Y"}))
            .unwrap();
        // The server accepted the create and the mapping was written, then
        // the process died.
        engine
            .store()
            .record_mapping(&IdMapping {
                temp_id: doc.resource_id.as_str().to_string(),
                real_id: "doc-77".into(),
                resource_type: ResourceType::Document,
                recorded_at: chrono::Utc::now(),
            })
            .unwrap();
        (doc.id, doc.resource_id.as_str().to_string())
    };

    let engine = SyncEngine::new(
        QueueStore::open_path(&path).unwrap(),
        transport.clone(),
        test_config(),
    )
    .unwrap();
    let queue = engine.queued().unwrap();
    assert_eq!(queue.len(), 1);
    assert_ne!(queue[0].id, doc_id);
    assert_eq!(queue[0].resource_id.as_str(), "doc-77");
    assert_eq!(engine.resolve_id(&temp).unwrap(), "doc-77");

    engine.drain().await.unwrap();
    assert_eq!(transport.lines(), vec!["PATCH /documents/doc-77"]);
}

/// A queue store whose next updates fail, except the ones marking a
/// mutation `syncing`.
struct FlakyStore {
    inner: QueueStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: QueueStore::open_in_memory().unwrap(),
            failures: AtomicUsize::new(0),
        }
    }

    fn fail_next_updates(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

impl IQueueStore for FlakyStore {
    fn enqueue(&self, mutation: &Mutation) -> TetherResult<i64> {
        self.inner.enqueue(mutation)
    }

    fn list(&self) -> TetherResult<Vec<Mutation>> {
        self.inner.list()
    }

    fn get(&self, id: &str) -> TetherResult<Option<Mutation>> {
        self.inner.get(id)
    }

    fn update(&self, id: &str, patch: &MutationPatch) -> TetherResult<Mutation> {
        let marks_syncing = patch.status == Some(MutationStatus::Syncing);
        if !marks_syncing
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StorageError::SqliteError {
                message: "disk I/O error".into(),
            }
            .into());
        }
        self.inner.update(id, patch)
    }

    fn remove(&self, id: &str) -> TetherResult<bool> {
        self.inner.remove(id)
    }

    fn rewrite_resource_ids(&self, temp_id: &str, real_id: &str) -> TetherResult<usize> {
        self.inner.rewrite_resource_ids(temp_id, real_id)
    }

    fn clear_dependency(&self, dependency_id: &str) -> TetherResult<usize> {
        self.inner.clear_dependency(dependency_id)
    }

    fn recover_in_flight(&self) -> TetherResult<usize> {
        self.inner.recover_in_flight()
    }

    fn pending_count(&self) -> TetherResult<usize> {
        self.inner.pending_count()
    }
}

impl IIdMappingStore for FlakyStore {
    fn record_mapping(&self, mapping: &IdMapping) -> TetherResult<()> {
        self.inner.record_mapping(mapping)
    }

    fn load_mappings(&self) -> TetherResult<Vec<IdMapping>> {
        self.inner.load_mappings()
    }
}

#[tokio::test(start_paused = true)]
async fn store_failure_while_settling_releases_the_mutation() {
    let transport = ScriptedTransport::from_replies([ScriptedReply::status(500)]);
    let engine = SyncEngine::new(FlakyStore::new(), transport.clone(), test_config()).unwrap();
    let outcome = engine
        .update(ResourceType::Document, "doc-1", json!({"title": "t"}))
        .unwrap();
    let id = outcome.mutation().unwrap().id.clone();

    engine.store().fail_next_updates(1);
    assert!(engine.drain().await.is_err());

    let queue = engine.queued().unwrap();
    assert_eq!(queue[0].status, MutationStatus::Pending);
    assert_eq!(queue[0].attempt, 1);
    assert!(queue[0].next_retry_at.is_some());
    let stored = engine.store().get(&id).unwrap().unwrap();
    assert_eq!(stored.status, MutationStatus::Pending);
    let status = engine.status();
    assert_eq!(status.syncing_count, 0);
    assert_eq!(status.badge("document:doc-1"), Some(MutationStatus::Pending));

    tokio::time::sleep(Duration::from_secs(60)).await;
    let report = engine.drain().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(transport.request_count(), 2);
    assert!(engine.queued().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn released_mutation_can_be_discarded() {
    let transport = ScriptedTransport::from_replies([ScriptedReply::status(422)]);
    let engine = SyncEngine::new(FlakyStore::new(), transport.clone(), test_config()).unwrap();
    let outcome = engine
        .update(ResourceType::Issue, "iss-1", json!({"state": "closed"}))
        .unwrap();
    let id = outcome.mutation().unwrap().id.clone();

    engine.store().fail_next_updates(1);
    assert!(engine.drain().await.is_err());
    assert_eq!(engine.queued().unwrap()[0].status, MutationStatus::Pending);

    assert_eq!(engine.discard(&id).unwrap(), vec![id.clone()]);
    assert!(engine.store().get(&id).unwrap().is_none());
    assert!(engine.entity(ResourceType::Issue, "iss-1").unwrap().is_none());
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

#[derive(Debug, Clone)]
enum Edit {
    Create,
    Update(usize),
    Delete(usize),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        Just(Edit::Create),
        (0usize..3).prop_map(Edit::Update),
        (0usize..3).prop_map(Edit::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// N mutations queued offline produce exactly N requests, in enqueue
    /// order, once connectivity returns.
    #[test]
    fn offline_mutations_drain_exactly_once_in_order(edits in prop::collection::vec(edit_strategy(), 1..10)) {
        runtime().block_on(async {
            let transport = ScriptedTransport::new();
            let engine = engine(&transport);
            engine.set_offline().unwrap();

            let ids = ["doc-a", "doc-b", "doc-c"];
            let mut enqueued = Vec::new();
            for (n, edit) in edits.iter().enumerate() {
                let new = match edit {
                    Edit::Create => NewMutation::create(ResourceType::Document, json!({"n": n})),
                    Edit::Update(i) => NewMutation::update(ResourceType::Document, ids[*i], json!({"n": n})),
                    Edit::Delete(i) => NewMutation::delete(ResourceType::Document, ids[*i]),
                };
                let outcome = engine.enqueue(new).unwrap();
                enqueued.push(outcome.mutation().unwrap().id.clone());
                assert_pending_count_matches(&engine);
            }

            engine.set_online().unwrap();
            let report = engine.drain().await.unwrap();
            assert_eq!(report.sent, edits.len());
            assert_eq!(report.synced, edits.len());
            assert_eq!(transport.request_count(), edits.len());
            assert!(engine.queued().unwrap().is_empty());
            assert_pending_count_matches(&engine);

            let sent: Vec<String> = transport
                .requests()
                .iter()
                .map(|r| r.request.mutation_id.clone())
                .collect();
            assert_eq!(sent, enqueued);
        });
    }
}
