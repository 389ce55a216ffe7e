use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::bootstrap::Persist;
use crate::clock::Clock;
use crate::document::{Document, DocumentStore};
use crate::error::CoreError;
use crate::repository::{Page, PageRequest};
use crate::user::{UserStore, UserSummary};

/// Progress checkpoints the background task walks through. The last one
/// flips the record to `Completed`.
pub const CHECKPOINTS: [u8; 4] = [25, 50, 75, 100];
pub const DEFAULT_CHECKPOINT_DELAY_MS: u64 = 2000;
pub const EMBEDDINGS_MIN: u32 = 50;
pub const EMBEDDINGS_MAX: u32 = 249;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl IngestionStatus {
    /// Terminal states see no further automatic transitions. `cancel` is
    /// still allowed to overwrite them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestionStatus::Completed | IngestionStatus::Failed)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ingestion {
    pub id: i64,
    pub uuid: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived: Option<DateTime<Utc>>,
    pub status: IngestionStatus,
    pub progress: u8,
    pub error_message: Option<String>,
    pub embeddings_generated: Option<u32>,
    /// Immutable after creation.
    pub document_id: i64,
    /// Immutable after creation.
    pub triggered_by_id: i64,
}

/// Raw field-merge applied by `update_status`: only supplied fields change.
/// No transition-legality check happens here, so a careless patch can
/// desynchronize `status` and `progress`.
#[derive(Clone, Debug, Deserialize)]
pub struct IngestionPatch {
    pub status: IngestionStatus,
    pub progress: Option<u8>,
    pub error_message: Option<String>,
    pub embeddings_generated: Option<u32>,
}

impl Ingestion {
    fn apply(&mut self, patch: &IngestionPatch) {
        self.status = patch.status;
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(message) = &patch.error_message {
            self.error_message = Some(message.clone());
        }
        if let Some(count) = patch.embeddings_generated {
            self.embeddings_generated = Some(count);
        }
    }
}

/// Ingestion with embedded document and triggering-user snapshots.
#[derive(Clone, Debug, Serialize)]
pub struct IngestionDetail {
    #[serde(flatten)]
    pub ingestion: Ingestion,
    pub document: Option<Document>,
    pub triggered_by: Option<UserSummary>,
}

pub trait IngestionStore: Send + Sync {
    fn insert(&self, ingestion: Ingestion) -> Ingestion;
    fn get(&self, id: i64) -> Option<Ingestion>;
    fn put(&self, ingestion: Ingestion) -> Option<Ingestion>;
    fn page(&self, request: &PageRequest, status: Option<IngestionStatus>) -> Page<Ingestion>;
}

struct IngestionTable {
    records: HashMap<i64, Ingestion>,
    next_id: i64,
}

pub struct InMemoryIngestionStore {
    inner: Mutex<IngestionTable>,
}

impl InMemoryIngestionStore {
    pub fn new() -> Self {
        Self::from_records(Vec::new(), 1)
    }

    pub fn from_records(records: Vec<Ingestion>, next_id: i64) -> Self {
        let records: HashMap<i64, Ingestion> = records.into_iter().map(|i| (i.id, i)).collect();
        let floor = records.keys().max().map(|id| id + 1).unwrap_or(1);
        Self {
            inner: Mutex::new(IngestionTable {
                records,
                next_id: next_id.max(floor),
            }),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn export(&self) -> (Vec<Ingestion>, i64) {
        let table = self.inner.lock();
        let mut records: Vec<Ingestion> = table.records.values().cloned().collect();
        records.sort_by_key(|i| i.id);
        (records, table.next_id)
    }
}

impl Default for InMemoryIngestionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionStore for InMemoryIngestionStore {
    fn insert(&self, mut ingestion: Ingestion) -> Ingestion {
        let mut table = self.inner.lock();
        ingestion.id = table.next_id;
        table.next_id += 1;
        table.records.insert(ingestion.id, ingestion.clone());
        ingestion
    }

    fn get(&self, id: i64) -> Option<Ingestion> {
        self.inner.lock().records.get(&id).cloned()
    }

    fn put(&self, ingestion: Ingestion) -> Option<Ingestion> {
        let mut table = self.inner.lock();
        if !table.records.contains_key(&ingestion.id) {
            return None;
        }
        table.records.insert(ingestion.id, ingestion)
    }

    fn page(&self, request: &PageRequest, status: Option<IngestionStatus>) -> Page<Ingestion> {
        let table = self.inner.lock();
        let mut matches: Vec<&Ingestion> = table
            .records
            .values()
            .filter(|i| i.archived.is_none())
            .filter(|i| match status {
                None => true,
                Some(status) => i.status == status,
            })
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = matches.len() as u64;
        let data = matches
            .into_iter()
            .skip(request.offset())
            .take(request.limit())
            .cloned()
            .collect();
        Page { data, total }
    }
}

/// Drives ingestion records through `pending → processing → completed` via a
/// detached per-record task. No cancellation token reaches that task: a
/// concurrent `update_status`/`cancel` races it and the last write wins.
pub struct IngestionService {
    ingestions: Arc<dyn IngestionStore>,
    documents: Arc<dyn DocumentStore>,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    persist: Arc<dyn Persist>,
    checkpoint_delay: Duration,
}

impl IngestionService {
    pub fn new(
        ingestions: Arc<dyn IngestionStore>,
        documents: Arc<dyn DocumentStore>,
        users: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        persist: Arc<dyn Persist>,
    ) -> Self {
        Self {
            ingestions,
            documents,
            users,
            clock,
            audit,
            persist,
            checkpoint_delay: Duration::from_millis(DEFAULT_CHECKPOINT_DELAY_MS),
        }
    }

    pub fn with_checkpoint_delay(mut self, delay: Duration) -> Self {
        self.checkpoint_delay = delay;
        self
    }

    fn detail(&self, ingestion: Ingestion) -> IngestionDetail {
        let document = self.documents.get(ingestion.document_id);
        let triggered_by = self.users.get(ingestion.triggered_by_id).map(|u| u.summary());
        IngestionDetail {
            ingestion,
            document,
            triggered_by,
        }
    }

    /// Creates a `pending` record and returns it immediately; the checkpoint
    /// advancement runs on a detached task. Archived documents are treated
    /// like missing ones. A document with a live ingestion can be triggered
    /// again; uniqueness of active ingestions is not enforced.
    pub fn trigger(&self, document_id: i64, principal_id: i64) -> Result<IngestionDetail, CoreError> {
        let document = self
            .documents
            .get(document_id)
            .filter(|d| d.archived.is_none())
            .ok_or(CoreError::NotFound("document"))?;
        let now = self.clock.now();
        let ingestion = Ingestion {
            id: 0,
            uuid: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            archived: None,
            status: IngestionStatus::Pending,
            progress: 0,
            error_message: None,
            embeddings_generated: None,
            document_id: document.id,
            triggered_by_id: principal_id,
        };
        let ingestion = self.ingestions.insert(ingestion);
        self.persist.persist()?;
        self.audit.record(AuditEvent {
            actor_id: Some(principal_id),
            action: "ingestion.trigger".to_string(),
            detail: format!("ingestion {} for document {}", ingestion.id, document.id),
        });
        self.spawn_advancement(ingestion.id);
        Ok(self.detail(ingestion))
    }

    fn spawn_advancement(&self, id: i64) {
        let ingestions = self.ingestions.clone();
        let clock = self.clock.clone();
        let persist = self.persist.clone();
        let delay = self.checkpoint_delay;
        tokio::spawn(async move {
            for checkpoint in CHECKPOINTS {
                clock.sleep(delay).await;
                let result = advance_checkpoint(
                    ingestions.as_ref(),
                    persist.as_ref(),
                    clock.as_ref(),
                    id,
                    checkpoint,
                );
                if let Err(err) = result {
                    // Fatal to this sequence only; the record keeps the
                    // state of the last successful write.
                    warn!(ingestion = id, error = %err, "ingestion advancement aborted");
                    return;
                }
            }
        });
    }

    /// Raw state setter shared by privileged operators and the internal
    /// advancement loop. Absent records fail; everything else is merged
    /// verbatim, legal transition or not.
    pub fn update_status(&self, id: i64, patch: IngestionPatch) -> Result<Ingestion, CoreError> {
        let mut ingestion = self
            .ingestions
            .get(id)
            .ok_or(CoreError::NotFound("ingestion"))?;
        ingestion.apply(&patch);
        ingestion.updated_at = self.clock.now();
        self.ingestions.put(ingestion.clone());
        self.persist.persist()?;
        Ok(ingestion)
    }

    /// Forces `failed` regardless of the current state, terminal states
    /// included. Cancelling a completed ingestion therefore flips it back to
    /// `failed`; that quirk is pinned by a regression test.
    pub fn cancel(&self, id: i64) -> Result<Ingestion, CoreError> {
        let ingestion = self.update_status(
            id,
            IngestionPatch {
                status: IngestionStatus::Failed,
                progress: None,
                error_message: Some("Cancelled by user".to_string()),
                embeddings_generated: None,
            },
        )?;
        self.audit.record(AuditEvent {
            actor_id: None,
            action: "ingestion.cancel".to_string(),
            detail: format!("ingestion {}", id),
        });
        Ok(ingestion)
    }

    pub fn find_all(
        &self,
        request: PageRequest,
        status: Option<IngestionStatus>,
    ) -> Page<IngestionDetail> {
        let page = self.ingestions.page(&request, status);
        Page {
            total: page.total,
            data: page.data.into_iter().map(|i| self.detail(i)).collect(),
        }
    }

    pub fn find_one(&self, id: i64) -> Result<IngestionDetail, CoreError> {
        let ingestion = self
            .ingestions
            .get(id)
            .filter(|i| i.archived.is_none())
            .ok_or(CoreError::NotFound("ingestion"))?;
        Ok(self.detail(ingestion))
    }
}

fn advance_checkpoint(
    ingestions: &dyn IngestionStore,
    persist: &dyn Persist,
    clock: &dyn Clock,
    id: i64,
    checkpoint: u8,
) -> Result<(), CoreError> {
    let mut ingestion = ingestions.get(id).ok_or(CoreError::NotFound("ingestion"))?;
    let done = checkpoint == 100;
    ingestion.apply(&IngestionPatch {
        status: if done {
            IngestionStatus::Completed
        } else {
            IngestionStatus::Processing
        },
        progress: Some(checkpoint),
        error_message: None,
        embeddings_generated: done
            .then(|| rand::thread_rng().gen_range(EMBEDDINGS_MIN..=EMBEDDINGS_MAX)),
    });
    ingestion.updated_at = clock.now();
    ingestions.put(ingestion);
    persist.persist()?;
    Ok(())
}
