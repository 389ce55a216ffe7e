pub mod access;
pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod document;
pub mod error;
pub mod ingestion;
pub mod pg_repository;
pub mod repository;
pub mod sqlite_repository;
pub mod storage;
pub mod user;

pub use access::{
    owner_or_admin, policy_for, role_gate, AccessDecision, AccessEngine, Action, OperationPolicy,
    PolicyAccessEngine, Principal, RoleSet,
};
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink};
pub use auth::{AuthService, Claims, RegisterRequest, TokenService, BCRYPT_COST};
pub use bootstrap::{
    from_snapshot, load_from_repository, NoopPersist, Persist, VaultPersister, VaultStores,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AuthConfig, BootstrapConfig, ConfigError, IngestionConfig, StorageConfig, SystemConfig,
};
pub use document::{
    Document, DocumentDetail, DocumentService, DocumentStore, InMemoryDocumentStore, NewDocument,
};
pub use error::CoreError;
pub use ingestion::{
    InMemoryIngestionStore, Ingestion, IngestionDetail, IngestionPatch, IngestionService,
    IngestionStatus, IngestionStore, CHECKPOINTS, DEFAULT_CHECKPOINT_DELAY_MS, EMBEDDINGS_MAX,
    EMBEDDINGS_MIN,
};
pub use pg_repository::PgVaultRepository;
pub use repository::{
    seed_if_empty, InMemoryVaultRepository, Page, PageRequest, RepositoryError, VaultRepository,
    VaultSnapshot,
};
pub use sqlite_repository::SqliteVaultRepository;
pub use storage::{HttpObjectStorage, InMemoryObjectStorage, ObjectStorage, StoredObject};
pub use user::{
    InMemoryUserStore, Role, User, UserPatch, UserService, UserStore, UserSummary,
};
