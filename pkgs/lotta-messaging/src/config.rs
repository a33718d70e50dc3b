//! Cache configuration

use lotta_store::StoreKey;
use serde::{Deserialize, Serialize};

/// Where the messaging views live in the store and how summaries are built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Root field holding the conversation list (default: `ROOT_QUERY.conversations`)
    pub conversation_list_key: String,

    /// Root field holding the signed-in user (default: `ROOT_QUERY.currentUser`)
    pub current_user_key: String,

    /// Characters of message content kept in a list entry (default: 100)
    pub preview_chars: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            conversation_list_key: StoreKey::root_field("conversations").to_string(),
            current_user_key: StoreKey::root_field("currentUser").to_string(),
            preview_chars: 100,
        }
    }
}

impl CacheConfig {
    pub fn conversation_list_key(&self) -> StoreKey {
        StoreKey::new(self.conversation_list_key.as_str())
    }

    pub fn current_user_key(&self) -> StoreKey {
        StoreKey::new(self.current_user_key.as_str())
    }
}
