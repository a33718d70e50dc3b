//! Lotta Store - normalized client cache
//!
//! This crate provides the key/value contract every cached view is built on,
//! an in-memory implementation shared by all views, and SQLite persistence of
//! store snapshots using Sea-ORM.
//!
//! # Architecture
//!
//! - **NormalizedStore**: `read`, `write`, `modify`, `identify`, `evict`, plus
//!   batched writes and snapshots
//! - **MemoryStore**: process-wide store behind a single lock
//! - **CachePersistor**: saves and restores snapshots in the `cache_entries`
//!   table
//!
//! # Keys
//!
//! Entities live under `Typename:id` (`Message:17`), root query fields under
//! `ROOT_QUERY.field` (`ROOT_QUERY.conversations`).
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use lotta_store::{CachePersistor, MemoryStore, NormalizedStore, PersistenceConfig, StoreKey};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = MemoryStore::new();
//! store.write(
//!     StoreKey::entity("Message", "1"),
//!     serde_json::json!({ "__typename": "Message", "id": "1", "content": "Hallo!" }),
//! )?;
//!
//! let persistor = CachePersistor::new(PersistenceConfig {
//!     db_path: "lotta-cache.db".into(),
//!     ..Default::default()
//! })
//! .await?;
//! persistor.persist(&store).await?;
//! # Ok(())
//! # }
//! ```

pub mod entities;
pub mod error;
pub mod key;
pub mod memory_store;
pub mod migration;
pub mod persistor;
pub mod store;

pub use error::StoreError;
pub use key::{identify_value, Entity, StoreKey, ROOT_QUERY};
pub use memory_store::MemoryStore;
pub use persistor::CachePersistor;
pub use store::{put, put_entity, NormalizedStore, StoreExt, StoreOp, Updater};

/// Configuration for snapshot persistence
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file
    pub db_path: std::path::PathBuf,

    /// Largest snapshot accepted by `persist` (default: 50_000)
    pub max_entries: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: std::path::PathBuf::from("lotta-cache.db"),
            max_entries: 50_000,
        }
    }
}
