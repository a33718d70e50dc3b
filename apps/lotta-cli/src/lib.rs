//! Replay recorded cache events and inspect persisted caches
//!
//! A session is a [`MemoryStore`] behind a [`ConsistentMessageCache`],
//! optionally backed by a SQLite snapshot.

use anyhow::{Context, Result};
use lotta_messaging::{
    CacheConfig, CacheEvent, ConsistentMessageCache, Conversation, ConversationSummary,
    CurrentUser,
};
use lotta_store::{CachePersistor, MemoryStore, PersistenceConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The three messaging views as printed by the tool
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheViews {
    pub current_user: Option<CurrentUser>,
    pub conversations: Vec<ConversationSummary>,
    pub threads: Vec<Conversation>,
}

pub struct Session {
    cache: ConsistentMessageCache<MemoryStore>,
    persistor: Option<CachePersistor>,
}

impl Session {
    /// Open a session, restoring the snapshot at `db` when given
    pub async fn open(db: Option<PathBuf>, config: CacheConfig) -> Result<Self> {
        let store = MemoryStore::new();
        let persistor = match db {
            Some(db_path) => {
                let persistor = CachePersistor::new(PersistenceConfig {
                    db_path,
                    ..Default::default()
                })
                .await?;
                let restored = persistor.restore(&store).await?;
                info!("Restored {} cache entries", restored);
                Some(persistor)
            }
            None => None,
        };

        Ok(Self {
            cache: ConsistentMessageCache::with_config(store, config),
            persistor,
        })
    }

    pub fn cache(&self) -> &ConsistentMessageCache<MemoryStore> {
        &self.cache
    }

    /// Apply events in order, stopping at the first failure
    pub fn replay(&self, events: Vec<CacheEvent>) -> Result<usize> {
        let total = events.len();
        for (index, event) in events.into_iter().enumerate() {
            debug!("Applying event {}: {:?}", index, event);
            self.cache
                .apply_event(event)
                .with_context(|| format!("Failed to apply event {}", index))?;
        }
        info!(
            "Replayed {} events, store revision {}",
            total,
            self.cache.store().revision()
        );
        Ok(total)
    }

    pub fn views(&self) -> Result<CacheViews> {
        let conversations = self.cache.conversation_list()?;
        let mut threads = Vec::new();
        for summary in &conversations {
            if let Some(conversation) = self.cache.conversation(&summary.id)? {
                threads.push(conversation);
            }
        }
        Ok(CacheViews {
            current_user: self.cache.current_user()?,
            conversations,
            threads,
        })
    }

    /// Write the store back to the snapshot; `None` without a database
    pub async fn save(&self) -> Result<Option<usize>> {
        match &self.persistor {
            Some(persistor) => Ok(Some(persistor.persist(self.cache.store()).await?)),
            None => Ok(None),
        }
    }
}

/// Load a [`CacheConfig`] from JSON, or the default when no path is given
pub fn load_config(path: Option<&Path>) -> Result<CacheConfig> {
    let Some(path) = path else {
        return Ok(CacheConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

/// Load a JSON array of events
pub fn load_events(path: &Path) -> Result<Vec<CacheEvent>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read events {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid events in {}", path.display()))
}
