use std::sync::Arc;
use std::time::Duration;

use doc_plane::{
    Clock, CoreError, DocumentStore, InMemoryAuditSink, Ingestion, IngestionPatch,
    IngestionService, IngestionStatus, IngestionStore, ManualClock, NoopPersist, PageRequest,
    VaultStores, EMBEDDINGS_MAX, EMBEDDINGS_MIN,
};
use uuid::Uuid;

const CHECKPOINT_DELAY: Duration = Duration::from_millis(2000);

fn setup() -> (IngestionService, VaultStores, Arc<ManualClock>) {
    let stores = VaultStores::in_memory();
    let clock = ManualClock::starting_now();
    let service = IngestionService::new(
        stores.ingestions.clone(),
        stores.documents.clone(),
        stores.users.clone(),
        clock.clone(),
        InMemoryAuditSink::shared(),
        NoopPersist::shared(),
    )
    .with_checkpoint_delay(CHECKPOINT_DELAY);
    (service, stores, clock)
}

fn seed_document(stores: &VaultStores, clock: &ManualClock) -> i64 {
    stores
        .documents
        .insert(doc_plane::Document {
            id: 0,
            uuid: Uuid::new_v4().to_string(),
            created_at: clock.now(),
            updated_at: clock.now(),
            archived: None,
            filename: "report.pdf".to_string(),
            mimetype: "application/pdf".to_string(),
            url: "memory://report.pdf".to_string(),
            owner_id: None,
        })
        .id
}

/// Lets the detached advancement task reach its next sleep before the
/// clock moves again.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

#[tokio::test]
async fn trigger_on_missing_document_creates_nothing() {
    let (service, stores, _) = setup();
    let err = service.trigger(42, 1).expect_err("missing document");
    assert!(matches!(err, CoreError::NotFound("document")));
    let (records, _) = stores.ingestions.export();
    assert!(records.is_empty());
}

#[tokio::test]
async fn trigger_on_archived_document_is_rejected() {
    let (service, stores, clock) = setup();
    let document_id = seed_document(&stores, &clock);
    let mut document = stores.documents.get(document_id).expect("document");
    document.archived = Some(clock.now());
    stores.documents.put(document);
    let err = service.trigger(document_id, 1).expect_err("archived document");
    assert!(matches!(err, CoreError::NotFound("document")));
}

#[tokio::test]
async fn trigger_returns_a_pending_record_immediately() {
    let (service, stores, clock) = setup();
    let document_id = seed_document(&stores, &clock);
    let detail = service.trigger(document_id, 1).expect("trigger");
    assert_eq!(detail.ingestion.status, IngestionStatus::Pending);
    assert_eq!(detail.ingestion.progress, 0);
    assert!(detail.ingestion.error_message.is_none());
    assert!(detail.ingestion.embeddings_generated.is_none());
    assert_eq!(detail.ingestion.document_id, document_id);
    assert_eq!(detail.ingestion.triggered_by_id, 1);
    assert_eq!(detail.document.expect("document").id, document_id);
}

#[tokio::test]
async fn advancement_walks_checkpoints_to_completion() {
    let (service, stores, clock) = setup();
    let document_id = seed_document(&stores, &clock);
    let id = service.trigger(document_id, 1).expect("trigger").ingestion.id;
    settle().await;

    clock.advance(CHECKPOINT_DELAY);
    settle().await;
    let record = stores.ingestions.get(id).expect("record");
    assert_eq!(record.status, IngestionStatus::Processing);
    assert_eq!(record.progress, 25);

    for _ in 0..3 {
        clock.advance(CHECKPOINT_DELAY);
        settle().await;
    }
    let record = stores.ingestions.get(id).expect("record");
    assert_eq!(record.status, IngestionStatus::Completed);
    assert_eq!(record.progress, 100);
    let embeddings = record.embeddings_generated.expect("embeddings");
    assert!((EMBEDDINGS_MIN..=EMBEDDINGS_MAX).contains(&embeddings));
}

#[tokio::test]
async fn cancel_marks_the_record_failed() {
    let (service, stores, clock) = setup();
    let document_id = seed_document(&stores, &clock);
    let id = service.trigger(document_id, 1).expect("trigger").ingestion.id;
    let cancelled = service.cancel(id).expect("cancel");
    assert_eq!(cancelled.status, IngestionStatus::Failed);
    assert_eq!(cancelled.error_message.as_deref(), Some("Cancelled by user"));
}

#[tokio::test]
async fn cancel_overwrites_a_completed_record() {
    let (service, stores, clock) = setup();
    let document_id = seed_document(&stores, &clock);
    let id = service.trigger(document_id, 1).expect("trigger").ingestion.id;
    settle().await;
    for _ in 0..4 {
        clock.advance(CHECKPOINT_DELAY);
        settle().await;
    }
    assert_eq!(
        stores.ingestions.get(id).expect("record").status,
        IngestionStatus::Completed
    );
    let cancelled = service.cancel(id).expect("cancel");
    assert_eq!(cancelled.status, IngestionStatus::Failed);
    assert_eq!(cancelled.error_message.as_deref(), Some("Cancelled by user"));
}

#[tokio::test]
async fn cancel_missing_record_is_not_found() {
    let (service, _, _) = setup();
    let err = service.cancel(42).expect_err("missing");
    assert!(matches!(err, CoreError::NotFound("ingestion")));
}

#[tokio::test]
async fn update_status_merges_only_supplied_fields() {
    let (service, stores, clock) = setup();
    let document_id = seed_document(&stores, &clock);
    let id = service.trigger(document_id, 1).expect("trigger").ingestion.id;
    let updated = service
        .update_status(
            id,
            IngestionPatch {
                status: IngestionStatus::Failed,
                progress: None,
                error_message: Some("embedding backend unreachable".to_string()),
                embeddings_generated: None,
            },
        )
        .expect("update");
    assert_eq!(updated.status, IngestionStatus::Failed);
    assert_eq!(updated.progress, 0);
    assert_eq!(
        updated.error_message.as_deref(),
        Some("embedding backend unreachable")
    );
    assert!(updated.embeddings_generated.is_none());
}

#[tokio::test]
async fn update_status_on_missing_record_is_not_found() {
    let (service, _, _) = setup();
    let err = service
        .update_status(
            42,
            IngestionPatch {
                status: IngestionStatus::Failed,
                progress: None,
                error_message: None,
                embeddings_generated: None,
            },
        )
        .expect_err("missing");
    assert!(matches!(err, CoreError::NotFound("ingestion")));
}

#[tokio::test]
async fn status_filter_limits_the_listing() {
    let (service, stores, clock) = setup();
    let document_id = seed_document(&stores, &clock);
    let first = service.trigger(document_id, 1).expect("trigger").ingestion.id;
    let _second = service.trigger(document_id, 1).expect("trigger").ingestion.id;
    service.cancel(first).expect("cancel");

    let failed = service.find_all(PageRequest::default(), Some(IngestionStatus::Failed));
    assert_eq!(failed.total, 1);
    assert_eq!(failed.data[0].ingestion.id, first);

    let pending = service.find_all(PageRequest::default(), Some(IngestionStatus::Pending));
    assert_eq!(pending.total, 1);

    let all = service.find_all(PageRequest::default(), None);
    assert_eq!(all.total, 2);
}

#[tokio::test]
async fn find_one_skips_archived_records() {
    let (service, stores, clock) = setup();
    let record = stores.ingestions.insert(Ingestion {
        id: 0,
        uuid: Uuid::new_v4().to_string(),
        created_at: clock.now(),
        updated_at: clock.now(),
        archived: Some(clock.now()),
        status: IngestionStatus::Completed,
        progress: 100,
        error_message: None,
        embeddings_generated: Some(80),
        document_id: 1,
        triggered_by_id: 1,
    });
    let err = service.find_one(record.id).expect_err("archived");
    assert!(matches!(err, CoreError::NotFound("ingestion")));
}

#[tokio::test]
async fn retrigger_is_allowed_while_another_run_is_live() {
    let (service, stores, clock) = setup();
    let document_id = seed_document(&stores, &clock);
    let first = service.trigger(document_id, 1).expect("first").ingestion.id;
    let second = service.trigger(document_id, 2).expect("second").ingestion.id;
    assert_ne!(first, second);
    let (records, _) = stores.ingestions.export();
    assert_eq!(records.len(), 2);
}
