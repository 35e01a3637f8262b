use std::path::Path;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::model::{Place, PlaceId, UnixTimeMs};

#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(not(target_arch = "wasm32"))]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid place: {0}")]
    Validation(#[from] ValidationError),

    #[error("duplicate place id: {0}")]
    DuplicateId(String),

    #[error("place not found: {0}")]
    NotFound(String),

    #[error("corrupted row: {id}, reason: {reason}")]
    CorruptedRow { id: String, reason: String },

    #[error("storage worker failed: {0}")]
    Worker(String),

    #[error("writer is closed")]
    Closed,

    #[error("lock acquisition failed")]
    LockFailed,
}

// ============================================================================
// Storage Trait
// ============================================================================

/// Record store keyed by place id. Visits and the cached photo live inside
/// the place record, so every operation here covers the whole aggregate.
#[async_trait::async_trait]
pub trait PlaceStorage: Send + Sync {
    /// All rows ordered by position. Rows that fail to decode come back as
    /// `Err` so the caller can skip them without losing the rest.
    async fn load_all(&self) -> Result<Vec<Result<Place, StoreError>>, StoreError>;
    async fn insert(&self, place: &Place) -> Result<(), StoreError>;
    async fn update(&self, place: &Place) -> Result<(), StoreError>;
    /// Applies every update or none of them.
    async fn update_batch(&self, places: &[Place]) -> Result<(), StoreError>;
    async fn delete(&self, id: &PlaceId) -> Result<bool, StoreError>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
pub use self::sqlite::SqliteStorage;

#[cfg(not(target_arch = "wasm32"))]
mod sqlite {
    use super::*;
    use rusqlite::{params, Connection, ErrorCode};

    const SCHEMA: &str = r#"
        CREATE TABLE IF NOT EXISTS places (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            data BLOB NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_places_position ON places(position);
    "#;

    /// SQLite-backed place storage. Statements run on the blocking pool so
    /// the async writer never stalls the runtime.
    pub struct SqliteStorage {
        conn: Arc<Mutex<Connection>>,
    }

    impl SqliteStorage {
        pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
            Self::from_connection(Connection::open(path.as_ref())?)
        }

        pub fn open_in_memory() -> Result<Self, StoreError> {
            Self::from_connection(Connection::open_in_memory()?)
        }

        fn from_connection(conn: Connection) -> Result<Self, StoreError> {
            conn.execute_batch(SCHEMA)?;
            Ok(Self {
                conn: Arc::new(Mutex::new(conn)),
            })
        }

        async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
        where
            T: Send + 'static,
            F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        {
            let conn = Arc::clone(&self.conn);
            tokio::task::spawn_blocking(move || {
                let mut guard = conn.lock().map_err(|_| StoreError::LockFailed)?;
                op(&mut guard)
            })
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))?
        }
    }

    fn update_row(conn: &Connection, place: &Place, now: UnixTimeMs) -> Result<(), StoreError> {
        let data = serde_json::to_vec(place)?;
        let changed = conn.execute(
            "UPDATE places SET position = ?2, data = ?3, updated_at = ?4 WHERE id = ?1",
            params![place.id.as_str(), place.position, data, now.0 as i64],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(place.id.to_string()));
        }
        Ok(())
    }

    #[async_trait::async_trait]
    impl PlaceStorage for SqliteStorage {
        async fn load_all(&self) -> Result<Vec<Result<Place, StoreError>>, StoreError> {
            self.run(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, data FROM places ORDER BY position ASC, id ASC")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(rows
                    .into_iter()
                    .map(|(id, data)| {
                        serde_json::from_slice(&data)
                            .map_err(|e| StoreError::CorruptedRow { id, reason: e.to_string() })
                    })
                    .collect())
            })
            .await
        }

        async fn insert(&self, place: &Place) -> Result<(), StoreError> {
            let place = place.clone();
            self.run(move |conn| {
                let data = serde_json::to_vec(&place)?;
                let result = conn.execute(
                    "INSERT INTO places (id, position, data, updated_at) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        place.id.as_str(),
                        place.position,
                        data,
                        UnixTimeMs::now().0 as i64
                    ],
                );
                match result {
                    Ok(_) => Ok(()),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        Err(StoreError::DuplicateId(place.id.to_string()))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
        }

        async fn update(&self, place: &Place) -> Result<(), StoreError> {
            let place = place.clone();
            self.run(move |conn| update_row(conn, &place, UnixTimeMs::now()))
                .await
        }

        async fn update_batch(&self, places: &[Place]) -> Result<(), StoreError> {
            let places = places.to_vec();
            self.run(move |conn| {
                let tx = conn.transaction()?;
                let now = UnixTimeMs::now();
                for place in &places {
                    // Dropping `tx` on error rolls the whole batch back.
                    update_row(&tx, place, now)?;
                }
                tx.commit()?;
                debug!(count = places.len(), "batch committed");
                Ok(())
            })
            .await
        }

        async fn delete(&self, id: &PlaceId) -> Result<bool, StoreError> {
            let id = id.clone();
            self.run(move |conn| {
                let removed = conn.execute("DELETE FROM places WHERE id = ?1", params![id.as_str()])?;
                if removed == 0 {
                    warn!(place_id = %id, "delete of unknown place");
                }
                Ok(removed > 0)
            })
            .await
        }
    }
}
