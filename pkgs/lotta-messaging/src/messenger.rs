//! Messenger - runs messaging requests and keeps the cache in step
//!
//! The API round-trip is the only suspension point of every operation; the
//! cache passes before and after it never await.
//!
//! # Send
//!
//! 1. Validate the input and lock the destination
//! 2. Show a pending placeholder if the conversation is cached
//! 3. Await the send mutation
//! 4. Confirmed: apply the result. Failed: roll the placeholder back
//!
//! # Delete
//!
//! The message disappears immediately, is evicted once the server confirms,
//! and reappears if the server refuses.

use async_trait::async_trait;
use lotta_store::NormalizedStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cache::ConsistentMessageCache;
use crate::error::{ApiError, CacheError};
use crate::models::{
    Conversation, ConversationId, CurrentUser, Message, MessageId, SendMessageInput, SentMessage,
};
use crate::send_gate::SendGate;

/// Remote messaging operations
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// Send a message. `client_token` identifies the optimistic placeholder.
    async fn send_message(
        &self,
        input: &SendMessageInput,
        client_token: &str,
    ) -> Result<SentMessage, ApiError>;

    async fn delete_message(&self, message_id: &MessageId) -> Result<(), ApiError>;

    /// Fetch a conversation with its full message list
    async fn fetch_conversation(&self, id: &ConversationId) -> Result<Conversation, ApiError>;
}

pub struct Messenger<A: MessagingApi, S: NormalizedStore> {
    api: Arc<A>,
    cache: Arc<ConsistentMessageCache<S>>,
    me: CurrentUser,
    gate: SendGate,
    opened: Mutex<HashSet<ConversationId>>,
}

impl<A: MessagingApi, S: NormalizedStore> Messenger<A, S> {
    pub fn new(api: Arc<A>, cache: Arc<ConsistentMessageCache<S>>, me: CurrentUser) -> Self {
        Self {
            api,
            cache,
            me,
            gate: SendGate::new(),
            opened: Mutex::new(HashSet::new()),
        }
    }

    pub fn cache(&self) -> &ConsistentMessageCache<S> {
        &self.cache
    }

    pub fn send_gate(&self) -> &SendGate {
        &self.gate
    }

    #[instrument(skip(self, input), fields(destination = %input.destination))]
    pub async fn send(&self, input: SendMessageInput) -> Result<Message, CacheError> {
        input.validate()?;
        let _permit = self
            .gate
            .try_acquire(&input.destination)
            .ok_or_else(|| CacheError::SendInFlight(input.destination.clone()))?;

        let client_token = Uuid::new_v4().to_string();
        let conversation_id = self
            .cache
            .find_conversation_for(&input.destination, &self.me.id)?;
        let prior = match &conversation_id {
            Some(id) => self.cache.conversation(id)?,
            None => None,
        };

        let mut placeholder_shown = false;
        if let Some(id) = &conversation_id {
            let placeholder = Message::placeholder(
                id.clone(),
                self.me.user_ref(),
                input.content.clone(),
                input.files.clone(),
                client_token.clone(),
            );
            placeholder_shown = self.cache.apply_optimistic_message(&placeholder)?;
        }

        match self.api.send_message(&input, &client_token).await {
            Ok(mut sent) => {
                if let (true, Some(id)) = (placeholder_shown, &conversation_id) {
                    if id != &sent.conversation.id {
                        warn!(
                            "Message landed in conversation {}, not {}",
                            sent.conversation.id, id
                        );
                        self.cache.rollback_optimistic_message(id, &client_token)?;
                    }
                }
                if sent.message.client_token.is_none() {
                    sent.message.client_token = Some(client_token);
                }
                self.cache.apply_sent_message(&sent, prior.as_ref())?;
                info!(
                    "Message {} sent to conversation {}",
                    sent.message.id, sent.conversation.id
                );
                Ok(sent.message)
            }
            Err(e) => {
                warn!("Sending message failed: {}", e);
                if let (true, Some(id)) = (placeholder_shown, &conversation_id) {
                    self.cache.rollback_optimistic_message(id, &client_token)?;
                }
                Err(CacheError::Api(e))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<(), CacheError> {
        let pending = self
            .cache
            .apply_deleted_message(conversation_id, message_id)?;

        match self.api.delete_message(message_id).await {
            Ok(()) => {
                if let Some(deletion) = pending {
                    self.cache.confirm_deletion(deletion)?;
                }
                Ok(())
            }
            Err(e) => {
                warn!("Deleting message {} failed: {}", message_id, e);
                if let Some(deletion) = pending {
                    self.cache.revert_deletion(deletion)?;
                }
                Err(CacheError::Api(e))
            }
        }
    }

    /// Fetch a conversation; the first successful fetch marks it read
    #[instrument(skip(self))]
    pub async fn open(&self, conversation_id: &ConversationId) -> Result<Conversation, CacheError> {
        let fetched = self.api.fetch_conversation(conversation_id).await?;
        self.cache.write_conversation(&fetched)?;

        let first_fetch = !self.opened.lock().contains(conversation_id);
        if first_fetch {
            self.cache.apply_conversation_opened(conversation_id)?;
            self.opened.lock().insert(conversation_id.clone());
        }

        Ok(self.cache.conversation(conversation_id)?.unwrap_or(fetched))
    }
}
