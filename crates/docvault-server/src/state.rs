use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use doc_plane::{
    load_from_repository, AccessEngine, AuditSink, AuthService, DocumentService,
    HttpObjectStorage, InMemoryAuditSink, InMemoryObjectStorage, IngestionService, ObjectStorage,
    PgVaultRepository, PolicyAccessEngine, SqliteVaultRepository, SystemClock, SystemConfig,
    TokenService, UserService, VaultPersister, VaultRepository, VaultSnapshot, VaultStores,
};

use crate::error::AppError;

pub struct AppState {
    pub config: SystemConfig,
    pub stores: VaultStores,
    pub auth: AuthService,
    pub users: UserService,
    pub documents: DocumentService,
    pub ingestions: IngestionService,
    pub access: Arc<dyn AccessEngine>,
    pub storage: Arc<dyn ObjectStorage>,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    pub fn from_config(config: SystemConfig) -> Result<Self, AppError> {
        let repo = build_repository(&config)?;
        let repo: Arc<dyn VaultRepository> = Arc::from(repo);

        let seed = VaultSnapshot::default();
        let stores =
            load_from_repository(repo.as_ref(), Some(&seed), config.bootstrap.seed_on_start)?;
        let persist = VaultPersister::shared(repo, stores.clone());

        let clock = SystemClock::shared();
        let audit = InMemoryAuditSink::shared();
        let tokens = TokenService::new(&config.auth.jwt_secret, config.auth.token_ttl_seconds);

        let auth = AuthService::new(
            stores.users.clone(),
            tokens,
            clock.clone(),
            audit.clone(),
            persist.clone(),
        );
        let users = UserService::new(stores.users.clone(), clock.clone(), persist.clone());
        let documents = DocumentService::new(
            stores.documents.clone(),
            stores.users.clone(),
            clock.clone(),
            persist.clone(),
        );
        let ingestions = IngestionService::new(
            stores.ingestions.clone(),
            stores.documents.clone(),
            stores.users.clone(),
            clock.clone(),
            audit.clone(),
            persist,
        )
        .with_checkpoint_delay(Duration::from_millis(config.ingestion.checkpoint_delay_ms));

        let storage = build_storage(&config);

        Ok(Self {
            config,
            stores,
            auth,
            users,
            documents,
            ingestions,
            access: PolicyAccessEngine::shared(),
            storage,
            audit,
        })
    }
}

pub fn load_config(path: &Path) -> Result<(String, SystemConfig), AppError> {
    let raw = std::fs::read_to_string(path)?;
    let config = SystemConfig::from_toml(&raw)?;
    Ok((raw, config))
}

pub fn create_default_config(path: &Path) -> Result<String, AppError> {
    let content = default_config_template();
    std::fs::write(path, content.as_bytes())?;
    Ok(content)
}

pub fn default_config_template() -> String {
    let mut lines = Vec::new();
    lines.push("storage = { dsn = \"\", sqlite_path = \"docvault.sqlite\", upload_endpoint = \"\" }");
    lines.push("auth = { jwt_secret = \"change-me\", token_ttl_seconds = 3600 }");
    lines.push("ingestion = { checkpoint_delay_ms = 2000 }");
    lines.push("bootstrap = { seed_on_start = true }");
    format!("{}\n", lines.join("\n"))
}

fn build_repository(config: &SystemConfig) -> Result<Box<dyn VaultRepository>, AppError> {
    let dsn = config.storage.dsn.trim();
    if dsn.is_empty() {
        let repo = SqliteVaultRepository::open(&config.storage.sqlite_path)?;
        repo.ensure_schema()?;
        return Ok(Box::new(repo));
    }
    if is_sqlite_dsn(dsn) {
        let repo = SqliteVaultRepository::open(sqlite_path_from_dsn(dsn))?;
        repo.ensure_schema()?;
        return Ok(Box::new(repo));
    }
    let repo = PgVaultRepository::connect(dsn)?;
    repo.ensure_schema()?;
    Ok(Box::new(repo))
}

fn build_storage(config: &SystemConfig) -> Arc<dyn ObjectStorage> {
    let endpoint = config.storage.upload_endpoint.trim();
    if endpoint.is_empty() {
        InMemoryObjectStorage::shared()
    } else {
        Arc::new(HttpObjectStorage::new(endpoint.to_string()))
    }
}

fn is_sqlite_dsn(dsn: &str) -> bool {
    let lowered = dsn.to_lowercase();
    lowered.starts_with("sqlite://") || lowered.starts_with("sqlite:")
}

fn sqlite_path_from_dsn(dsn: &str) -> &str {
    dsn.strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))
        .unwrap_or(dsn)
}
