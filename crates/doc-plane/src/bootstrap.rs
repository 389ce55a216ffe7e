use std::sync::Arc;

use crate::document::InMemoryDocumentStore;
use crate::error::CoreError;
use crate::ingestion::InMemoryIngestionStore;
use crate::repository::{seed_if_empty, RepositoryError, VaultRepository, VaultSnapshot};
use crate::user::InMemoryUserStore;

/// Write-back hook invoked after every mutating operation, including each
/// background checkpoint. A failure aborts only the operation that hit it.
pub trait Persist: Send + Sync {
    fn persist(&self) -> Result<(), CoreError>;
}

pub struct NoopPersist;

impl NoopPersist {
    pub fn shared() -> Arc<Self> {
        Arc::new(NoopPersist)
    }
}

impl Persist for NoopPersist {
    fn persist(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Live in-memory stores, the system of record while the process runs.
#[derive(Clone)]
pub struct VaultStores {
    pub users: Arc<InMemoryUserStore>,
    pub documents: Arc<InMemoryDocumentStore>,
    pub ingestions: Arc<InMemoryIngestionStore>,
}

impl VaultStores {
    pub fn in_memory() -> Self {
        Self {
            users: InMemoryUserStore::shared(),
            documents: InMemoryDocumentStore::shared(),
            ingestions: InMemoryIngestionStore::shared(),
        }
    }

    pub fn snapshot(&self) -> VaultSnapshot {
        let (users, user_seq) = self.users.export();
        let (documents, document_seq) = self.documents.export();
        let (ingestions, ingestion_seq) = self.ingestions.export();
        VaultSnapshot {
            users,
            documents,
            ingestions,
            user_seq,
            document_seq,
            ingestion_seq,
        }
    }
}

impl Default for VaultStores {
    fn default() -> Self {
        Self::in_memory()
    }
}

pub fn from_snapshot(snapshot: &VaultSnapshot) -> VaultStores {
    VaultStores {
        users: Arc::new(InMemoryUserStore::from_records(
            snapshot.users.clone(),
            snapshot.user_seq,
        )),
        documents: Arc::new(InMemoryDocumentStore::from_records(
            snapshot.documents.clone(),
            snapshot.document_seq,
        )),
        ingestions: Arc::new(InMemoryIngestionStore::from_records(
            snapshot.ingestions.clone(),
            snapshot.ingestion_seq,
        )),
    }
}

pub fn load_from_repository(
    repo: &dyn VaultRepository,
    seed: Option<&VaultSnapshot>,
    seed_on_start: bool,
) -> Result<VaultStores, RepositoryError> {
    if seed_on_start {
        if let Some(seed_value) = seed {
            seed_if_empty(repo, seed_value)?;
        }
    }
    let snapshot = repo.load_snapshot()?;
    Ok(from_snapshot(&snapshot))
}

/// Writes the current store state back through the snapshot repository.
pub struct VaultPersister {
    repo: Arc<dyn VaultRepository>,
    stores: VaultStores,
}

impl VaultPersister {
    pub fn new(repo: Arc<dyn VaultRepository>, stores: VaultStores) -> Self {
        Self { repo, stores }
    }

    pub fn shared(repo: Arc<dyn VaultRepository>, stores: VaultStores) -> Arc<Self> {
        Arc::new(Self::new(repo, stores))
    }
}

impl Persist for VaultPersister {
    fn persist(&self) -> Result<(), CoreError> {
        self.repo
            .save_snapshot(&self.stores.snapshot())
            .map_err(CoreError::from)
    }
}
