use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bootstrap::Persist;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::repository::{Page, PageRequest};
use crate::user::{UserStore, UserSummary};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub uuid: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived: Option<DateTime<Utc>>,
    pub filename: String,
    pub mimetype: String,
    pub url: String,
    /// Set at upload, never reassigned afterwards.
    pub owner_id: Option<i64>,
}

/// Document plus an owner snapshot, the shape every read path returns.
#[derive(Clone, Debug, Serialize)]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub document: Document,
    pub owner: Option<UserSummary>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewDocument {
    pub filename: String,
    pub mimetype: String,
    pub url: String,
    pub owner_id: Option<i64>,
}

pub trait DocumentStore: Send + Sync {
    fn insert(&self, document: Document) -> Document;
    fn get(&self, id: i64) -> Option<Document>;
    fn put(&self, document: Document) -> Option<Document>;
    fn page(
        &self,
        request: &PageRequest,
        search: Option<&str>,
        owner_id: Option<i64>,
    ) -> Page<Document>;
}

struct DocumentTable {
    records: HashMap<i64, Document>,
    next_id: i64,
}

pub struct InMemoryDocumentStore {
    inner: Mutex<DocumentTable>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::from_records(Vec::new(), 1)
    }

    pub fn from_records(records: Vec<Document>, next_id: i64) -> Self {
        let records: HashMap<i64, Document> = records.into_iter().map(|d| (d.id, d)).collect();
        let floor = records.keys().max().map(|id| id + 1).unwrap_or(1);
        Self {
            inner: Mutex::new(DocumentTable {
                records,
                next_id: next_id.max(floor),
            }),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn export(&self) -> (Vec<Document>, i64) {
        let table = self.inner.lock();
        let mut records: Vec<Document> = table.records.values().cloned().collect();
        records.sort_by_key(|d| d.id);
        (records, table.next_id)
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn insert(&self, mut document: Document) -> Document {
        let mut table = self.inner.lock();
        document.id = table.next_id;
        table.next_id += 1;
        table.records.insert(document.id, document.clone());
        document
    }

    fn get(&self, id: i64) -> Option<Document> {
        self.inner.lock().records.get(&id).cloned()
    }

    fn put(&self, document: Document) -> Option<Document> {
        let mut table = self.inner.lock();
        if !table.records.contains_key(&document.id) {
            return None;
        }
        table.records.insert(document.id, document)
    }

    fn page(
        &self,
        request: &PageRequest,
        search: Option<&str>,
        owner_id: Option<i64>,
    ) -> Page<Document> {
        let table = self.inner.lock();
        let needle = search.map(str::to_lowercase);
        let mut matches: Vec<&Document> = table
            .records
            .values()
            .filter(|d| d.archived.is_none())
            .filter(|d| match &needle {
                None => true,
                Some(needle) => d.filename.to_lowercase().contains(needle),
            })
            .filter(|d| match owner_id {
                None => true,
                Some(owner_id) => d.owner_id == Some(owner_id),
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

pub struct DocumentService {
    documents: Arc<dyn DocumentStore>,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    persist: Arc<dyn Persist>,
}

impl DocumentService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        users: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
        persist: Arc<dyn Persist>,
    ) -> Self {
        Self {
            documents,
            users,
            clock,
            persist,
        }
    }

    fn detail(&self, document: Document) -> DocumentDetail {
        let owner = document
            .owner_id
            .and_then(|id| self.users.get(id))
            .map(|u| u.summary());
        DocumentDetail { document, owner }
    }

    pub fn save(&self, upload: NewDocument) -> Result<DocumentDetail, CoreError> {
        let now = self.clock.now();
        let document = Document {
            id: 0,
            uuid: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            archived: None,
            filename: upload.filename,
            mimetype: upload.mimetype,
            url: upload.url,
            owner_id: upload.owner_id,
        };
        let document = self.documents.insert(document);
        self.persist.persist()?;
        Ok(self.detail(document))
    }

    pub fn find_all(
        &self,
        request: PageRequest,
        search: Option<&str>,
        owner_id: Option<i64>,
    ) -> Page<DocumentDetail> {
        let page = self.documents.page(&request, search, owner_id);
        Page {
            total: page.total,
            data: page.data.into_iter().map(|d| self.detail(d)).collect(),
        }
    }

    pub fn find_one(&self, id: i64) -> Result<DocumentDetail, CoreError> {
        let document = self
            .documents
            .get(id)
            .ok_or(CoreError::NotFound("document"))?;
        Ok(self.detail(document))
    }

    /// Soft delete. A second attempt is an error and leaves the archived
    /// timestamp untouched.
    pub fn delete(&self, id: i64) -> Result<(), CoreError> {
        let mut document = self
            .documents
            .get(id)
            .ok_or(CoreError::NotFound("document"))?;
        if document.archived.is_some() {
            return Err(CoreError::AlreadyArchived("document"));
        }
        let now = self.clock.now();
        document.archived = Some(now);
        document.updated_at = now;
        self.documents.put(document);
        self.persist.persist()?;
        Ok(())
    }

    pub fn rename(&self, id: i64, filename: String) -> Result<DocumentDetail, CoreError> {
        let mut document = self
            .documents
            .get(id)
            .ok_or(CoreError::NotFound("document"))?;
        document.filename = filename;
        document.updated_at = self.clock.now();
        self.documents.put(document.clone());
        self.persist.persist()?;
        Ok(self.detail(document))
    }
}
