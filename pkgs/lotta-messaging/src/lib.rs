//! Lotta Messaging - consistent cache updates for messaging views
//!
//! A sent, received or deleted message touches three cached views at once:
//! the conversation thread, the conversation list and the current user's
//! unread counter. This crate keeps them consistent: every message appears
//! exactly once in each view, optimistic placeholders are superseded rather
//! than duplicated, and the unread counter never drops below zero.
//!
//! # Components
//!
//! - **ConsistentMessageCache**: the only writer of messaging views
//! - **Messenger**: drives API calls and the optimistic lifecycle around them
//! - **SendGate**: locks a destination while a send to it is in flight
//! - **CacheEvent**: serializable record of one cache pass, for replay
//!
//! # Message lifecycle
//!
//! ```text
//! Pending (optimistic) -> Confirmed (server id) -> Deleted
//!        \-> rolled back (send failed)
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use lotta_messaging::{
//!     ConsistentMessageCache, ConversationId, ConversationStub, CurrentUser, Message,
//!     MessageId, MessageStatus, SentMessage, UserId,
//! };
//! use lotta_store::MemoryStore;
//!
//! # fn main() -> Result<(), lotta_messaging::CacheError> {
//! let cache = ConsistentMessageCache::new(MemoryStore::new());
//! let me = CurrentUser { id: UserId::from("me"), name: "Eike".into(), unread_messages: 0 };
//! cache.write_current_user(&me)?;
//!
//! let now = Utc::now();
//! let sent = SentMessage {
//!     message: Message {
//!         id: MessageId::from("m1"),
//!         content: Some("Hallo!".into()),
//!         files: Vec::new(),
//!         user: me.user_ref(),
//!         conversation_id: None,
//!         inserted_at: now,
//!         updated_at: now,
//!         client_token: None,
//!         status: MessageStatus::Confirmed,
//!     },
//!     conversation: ConversationStub::new(ConversationId::from("c1")),
//! };
//! cache.apply_sent_message(&sent, None)?;
//!
//! assert_eq!(cache.conversation_list()?.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
mod merge;
pub mod messenger;
pub mod models;
pub mod send_gate;

pub use cache::{ConsistentMessageCache, PendingDeletion};
pub use config::CacheConfig;
pub use error::{ApiError, CacheError};
pub use events::{CacheEvent, DeletionOutcome};
pub use messenger::{MessagingApi, Messenger};
pub use models::{
    Conversation, ConversationId, ConversationRecord, ConversationStub, ConversationSummary,
    CurrentUser, FileId, FileRef, GroupId, GroupRef, Message, MessageDestination, MessageId,
    MessageStatus, MessageStub, SendMessageInput, SentMessage, UserId, UserRef,
};
pub use send_gate::{SendGate, SendPermit};
