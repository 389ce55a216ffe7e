use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde_json::Value;

use crate::repository::{RepositoryError, VaultRepository, VaultSnapshot};

/// SQLite snapshot backend. Each record family lives in its own row of
/// `vault_sections`, written together in one transaction.
pub struct SqliteVaultRepository {
    conn: Mutex<Connection>,
}

impl SqliteVaultRepository {
    pub fn open(path: &str) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path).map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn ensure_schema(&self) -> Result<(), RepositoryError> {
        self.conn
            .lock()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS vault_sections (
                    name TEXT PRIMARY KEY,
                    payload TEXT NOT NULL
                );",
            )
            .map_err(store_err)
    }
}

impl VaultRepository for SqliteVaultRepository {
    fn load_snapshot(&self) -> Result<VaultSnapshot, RepositoryError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT name, payload FROM vault_sections")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(store_err)?;
        let mut sections = Vec::new();
        for row in rows {
            let (name, payload) = row.map_err(store_err)?;
            let value: Value = serde_json::from_str(&payload)
                .map_err(|err| RepositoryError::Serialization(err.to_string()))?;
            sections.push((name, value));
        }
        VaultSnapshot::from_sections(sections)
    }

    fn save_snapshot(&self, snapshot: &VaultSnapshot) -> Result<(), RepositoryError> {
        let sections = snapshot.to_sections()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(store_err)?;
        for (name, payload) in sections {
            tx.execute(
                "INSERT INTO vault_sections (name, payload) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET payload = excluded.payload",
                params![name, payload.to_string()],
            )
            .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)
    }

    fn is_seeded(&self) -> Result<bool, RepositoryError> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM vault_sections", [], |row| row.get(0))
            .map_err(store_err)?;
        Ok(count > 0)
    }
}

fn store_err(err: rusqlite::Error) -> RepositoryError {
    RepositoryError::Store(err.to_string())
}
