use parking_lot::Mutex;
use postgres::{Client, NoTls};
use serde_json::Value;

use crate::repository::{RepositoryError, VaultRepository, VaultSnapshot};

/// Postgres snapshot backend, same sectioned layout as the SQLite one but
/// with JSONB payloads.
pub struct PgVaultRepository {
    client: Mutex<Client>,
}

impl PgVaultRepository {
    pub fn connect(dsn: &str) -> Result<Self, RepositoryError> {
        let client = Client::connect(dsn, NoTls).map_err(store_err)?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }

    pub fn ensure_schema(&self) -> Result<(), RepositoryError> {
        self.client
            .lock()
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS vault_sections (
                    name TEXT PRIMARY KEY,
                    payload JSONB NOT NULL
                );",
            )
            .map_err(store_err)
    }
}

impl VaultRepository for PgVaultRepository {
    fn load_snapshot(&self) -> Result<VaultSnapshot, RepositoryError> {
        let mut client = self.client.lock();
        let rows = client
            .query("SELECT name, payload FROM vault_sections", &[])
            .map_err(store_err)?;
        let mut sections = Vec::new();
        for row in rows {
            let name: String = row.try_get(0).map_err(store_err)?;
            let payload: Value = row
                .try_get(1)
                .map_err(|err| RepositoryError::Serialization(err.to_string()))?;
            sections.push((name, payload));
        }
        VaultSnapshot::from_sections(sections)
    }

    fn save_snapshot(&self, snapshot: &VaultSnapshot) -> Result<(), RepositoryError> {
        let sections = snapshot.to_sections()?;
        let mut client = self.client.lock();
        let mut tx = client.transaction().map_err(store_err)?;
        for (name, payload) in sections {
            tx.execute(
                "INSERT INTO vault_sections (name, payload) VALUES ($1, $2)
                 ON CONFLICT (name) DO UPDATE SET payload = EXCLUDED.payload",
                &[&name, &payload],
            )
            .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)
    }

    fn is_seeded(&self) -> Result<bool, RepositoryError> {
        let mut client = self.client.lock();
        let row = client
            .query_one("SELECT COUNT(*) FROM vault_sections", &[])
            .map_err(store_err)?;
        let count: i64 = row.try_get(0).map_err(store_err)?;
        Ok(count > 0)
    }
}

fn store_err(err: postgres::Error) -> RepositoryError {
    RepositoryError::Store(err.to_string())
}
