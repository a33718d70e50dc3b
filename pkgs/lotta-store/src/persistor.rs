//! Cache persistor - saves and restores store snapshots in SQLite

use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveValue::Set, Database, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder,
    TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use tracing::{info, warn};

use crate::entities::cache_entries;
use crate::error::StoreError;
use crate::key::StoreKey;
use crate::store::NormalizedStore;
use crate::PersistenceConfig;

// SQLite caps bound parameters per statement; three columns per row.
const INSERT_CHUNK: usize = 300;

/// Persists a normalized store so the cache survives restarts
pub struct CachePersistor {
    pub(crate) db: DatabaseConnection,
    config: PersistenceConfig,
}

impl CachePersistor {
    /// Open (or create) the database at `config.db_path` and run migrations
    pub async fn new(config: PersistenceConfig) -> Result<Self> {
        let db_path_str = config
            .db_path
            .to_str()
            .context("Invalid database path")?
            .replace("\\", "/");

        let db_url = format!("sqlite:{}?mode=rwc", db_path_str);

        let db: DatabaseConnection = Database::connect(db_url.as_str())
            .await
            .map_err(StoreError::from)
            .context("Failed to connect to database")?;

        crate::migration::Migrator::up(&db, None)
            .await
            .map_err(StoreError::from)
            .context("Failed to run migrations")?;

        info!("Cache persistor initialized at {}", config.db_path.display());

        Ok(Self { db, config })
    }

    /// Create a persistor on an existing, already migrated connection
    pub fn with_connection(db: DatabaseConnection, config: PersistenceConfig) -> Self {
        Self { db, config }
    }

    /// Replace the persisted snapshot with the current store contents
    pub async fn persist<S: NormalizedStore + ?Sized>(&self, store: &S) -> Result<usize> {
        let snapshot = store.snapshot().context("Failed to snapshot store")?;
        if snapshot.len() > self.config.max_entries {
            return Err(StoreError::CapacityExceeded {
                entries: snapshot.len(),
                max: self.config.max_entries,
            }
            .into());
        }

        let now = Utc::now().timestamp_millis();
        let mut rows = Vec::with_capacity(snapshot.len());
        for (key, value) in snapshot {
            rows.push(cache_entries::ActiveModel {
                key: Set(key.to_string()),
                value: Set(serde_json::to_string(&value)?),
                updated_at: Set(now),
            });
        }
        let count = rows.len();

        let txn = self
            .db
            .begin()
            .await
            .map_err(StoreError::from)
            .context("Failed to begin transaction")?;
        cache_entries::Entity::delete_many()
            .exec(&txn)
            .await
            .map_err(StoreError::from)
            .context("Failed to clear cache entries")?;
        for chunk in rows.chunks(INSERT_CHUNK) {
            cache_entries::Entity::insert_many(chunk.to_vec())
                .exec(&txn)
                .await
                .map_err(StoreError::from)
                .context("Failed to insert cache entries")?;
        }
        txn.commit()
            .await
            .map_err(StoreError::from)
            .context("Failed to commit snapshot")?;

        info!("Persisted {} cache entries", count);
        Ok(count)
    }

    /// Load the persisted snapshot into `store`
    ///
    /// Rows holding malformed JSON are skipped.
    pub async fn restore<S: NormalizedStore + ?Sized>(&self, store: &S) -> Result<usize> {
        let rows = cache_entries::Entity::find()
            .order_by_asc(cache_entries::Column::Key)
            .all(&self.db)
            .await
            .map_err(StoreError::from)
            .context("Failed to load cache entries")?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str(&row.value) {
                Ok(value) => entries.push((StoreKey::new(row.key), value)),
                Err(e) => warn!("Skipping malformed cache entry {}: {}", row.key, e),
            }
        }
        let count = entries.len();

        store
            .restore(entries)
            .context("Failed to restore store")?;

        info!("Restored {} cache entries", count);
        Ok(count)
    }

    /// Number of persisted entries
    pub async fn count(&self) -> Result<u64> {
        let count = cache_entries::Entity::find()
            .count(&self.db)
            .await
            .map_err(StoreError::from)
            .context("Failed to count cache entries")?;
        Ok(count)
    }

    /// Remove the persisted snapshot
    pub async fn clear(&self) -> Result<()> {
        cache_entries::Entity::delete_many()
            .exec(&self.db)
            .await
            .map_err(StoreError::from)
            .context("Failed to clear cache entries")?;
        Ok(())
    }
}
