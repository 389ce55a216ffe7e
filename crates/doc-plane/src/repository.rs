use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::Document;
use crate::ingestion::Ingestion;
use crate::user::User;

/// One page of a filtered listing. `total` counts the whole matching set,
/// not just this page.
#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> usize {
        ((self.page - 1) * self.limit) as usize
    }

    pub fn limit(&self) -> usize {
        self.limit as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

/// Serialized state of every store plus the id sequences, written back as a
/// unit by the persistence hook.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub users: Vec<User>,
    pub documents: Vec<Document>,
    pub ingestions: Vec<Ingestion>,
    pub user_seq: i64,
    pub document_seq: i64,
    pub ingestion_seq: i64,
}

/// Section names used by the SQL backends: one payload per record family
/// plus one for the id sequences.
pub const SECTION_USERS: &str = "users";
pub const SECTION_DOCUMENTS: &str = "documents";
pub const SECTION_INGESTIONS: &str = "ingestions";
pub const SECTION_SEQUENCES: &str = "sequences";

#[derive(Default, Serialize, Deserialize)]
struct Sequences {
    user_seq: i64,
    document_seq: i64,
    ingestion_seq: i64,
}

impl VaultSnapshot {
    pub fn to_sections(&self) -> Result<Vec<(&'static str, serde_json::Value)>, RepositoryError> {
        Ok(vec![
            (SECTION_USERS, encode(&self.users)?),
            (SECTION_DOCUMENTS, encode(&self.documents)?),
            (SECTION_INGESTIONS, encode(&self.ingestions)?),
            (
                SECTION_SEQUENCES,
                encode(&Sequences {
                    user_seq: self.user_seq,
                    document_seq: self.document_seq,
                    ingestion_seq: self.ingestion_seq,
                })?,
            ),
        ])
    }

    /// Missing sections fall back to their defaults; unrecognized section
    /// names are skipped.
    pub fn from_sections<I>(sections: I) -> Result<Self, RepositoryError>
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        let mut snapshot = VaultSnapshot::default();
        for (name, payload) in sections {
            match name.as_str() {
                SECTION_USERS => snapshot.users = decode(payload)?,
                SECTION_DOCUMENTS => snapshot.documents = decode(payload)?,
                SECTION_INGESTIONS => snapshot.ingestions = decode(payload)?,
                SECTION_SEQUENCES => {
                    let sequences: Sequences = decode(payload)?;
                    snapshot.user_seq = sequences.user_seq;
                    snapshot.document_seq = sequences.document_seq;
                    snapshot.ingestion_seq = sequences.ingestion_seq;
                }
                _ => {}
            }
        }
        Ok(snapshot)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<serde_json::Value, RepositoryError> {
    serde_json::to_value(value).map_err(|err| RepositoryError::Serialization(err.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, RepositoryError> {
    serde_json::from_value(value).map_err(|err| RepositoryError::Serialization(err.to_string()))
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository error: {0}")]
    Store(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub trait VaultRepository: Send + Sync {
    fn load_snapshot(&self) -> Result<VaultSnapshot, RepositoryError>;
    fn save_snapshot(&self, snapshot: &VaultSnapshot) -> Result<(), RepositoryError>;
    fn is_seeded(&self) -> Result<bool, RepositoryError>;
}

#[derive(Clone)]
pub struct InMemoryVaultRepository {
    snapshot: Arc<RwLock<VaultSnapshot>>,
    seeded: Arc<RwLock<bool>>,
}

impl InMemoryVaultRepository {
    pub fn new(snapshot: VaultSnapshot) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
            seeded: Arc::new(RwLock::new(false)),
        }
    }

    pub fn shared(snapshot: VaultSnapshot) -> Arc<Self> {
        Arc::new(Self::new(snapshot))
    }
}

impl VaultRepository for InMemoryVaultRepository {
    fn load_snapshot(&self) -> Result<VaultSnapshot, RepositoryError> {
        Ok(self.snapshot.read().clone())
    }

    fn save_snapshot(&self, snapshot: &VaultSnapshot) -> Result<(), RepositoryError> {
        *self.snapshot.write() = snapshot.clone();
        *self.seeded.write() = true;
        Ok(())
    }

    fn is_seeded(&self) -> Result<bool, RepositoryError> {
        Ok(*self.seeded.read())
    }
}

pub fn seed_if_empty(
    repo: &dyn VaultRepository,
    seed: &VaultSnapshot,
) -> Result<bool, RepositoryError> {
    if !repo.is_seeded()? {
        repo.save_snapshot(seed)?;
        return Ok(true);
    }
    Ok(false)
}
