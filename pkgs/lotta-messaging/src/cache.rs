//! Consistent message cache
//!
//! Every messaging mutation updates three views held in one normalized
//! store:
//!
//! - `Conversation:{id}`: the single conversation, messages kept as
//!   references to `Message:{id}` entries
//! - the conversation list: one summary per conversation carrying only a
//!   stub of its most recent message
//! - the current user: the global unread counter
//!
//! # Passes
//!
//! Each `apply_*` operation is one pass. Passes are serialized against each
//! other. Inside a pass all reads happen first, derived values are computed
//! next, and every write goes out as one [`StoreOp`] batch: the conversation,
//! its messages, the list and the current user's counter. Counter writers
//! all hold the pass lock, so the counter read at the start of a pass is
//! still its value when the batch lands.
//!
//! Summaries are only ever produced by `merge::summarize` from the same
//! resolved message list that is written to the conversation, so both views
//! agree on the most recent message.

use lotta_store::{put, put_entity, Entity, NormalizedStore, StoreExt, StoreKey, StoreOp};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::events::{CacheEvent, DeletionOutcome};
use crate::merge::{later, replace_summary, stub_of, summarize, upsert_message, upsert_summary};
use crate::models::{
    Conversation, ConversationId, ConversationRecord, ConversationSummary, CurrentUser,
    Message, MessageDestination, MessageId, MessageStatus, SentMessage, UserId,
};

/// An optimistic removal waiting for the server's verdict
///
/// Hand it to [`ConsistentMessageCache::confirm_deletion`] or
/// [`ConsistentMessageCache::revert_deletion`].
#[derive(Debug)]
#[must_use]
pub struct PendingDeletion {
    conversation_id: ConversationId,
    message_id: MessageId,
    position: usize,
}

impl PendingDeletion {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }
}

/// Coordinates messaging mutations against the cached views
pub struct ConsistentMessageCache<S: NormalizedStore> {
    store: S,
    config: CacheConfig,
    pass: Mutex<()>,
}

impl<S: NormalizedStore> ConsistentMessageCache<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, CacheConfig::default())
    }

    pub fn with_config(store: S, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            pass: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ---- readers ----

    /// Single-conversation view, `None` when not cached
    pub fn conversation(&self, id: &ConversationId) -> Result<Option<Conversation>, CacheError> {
        match self.load_record(id)? {
            Some(record) => {
                let messages = self.load_messages(&record)?;
                Ok(Some(record.resolve(messages)))
            }
            None => Ok(None),
        }
    }

    /// Conversation list view, empty when not cached
    pub fn conversation_list(&self) -> Result<Vec<ConversationSummary>, CacheError> {
        self.load_list()
    }

    pub fn current_user(&self) -> Result<Option<CurrentUser>, CacheError> {
        Ok(self.store.read_as(&self.config.current_user_key())?)
    }

    /// Cached conversation `me` would reach by sending to `destination`
    pub fn find_conversation_for(
        &self,
        destination: &MessageDestination,
        me: &UserId,
    ) -> Result<Option<ConversationId>, CacheError> {
        let list = self.load_list()?;
        let found = list.into_iter().find(|summary| match destination {
            MessageDestination::User(user_id) => {
                summary.groups.is_empty()
                    && summary.users.iter().any(|u| &u.id == user_id)
                    && summary.users.iter().all(|u| &u.id == user_id || &u.id == me)
            }
            MessageDestination::Group(group_id) => {
                summary.groups.iter().any(|g| &g.id == group_id)
            }
        });
        Ok(found.map(|summary| summary.id))
    }

    // ---- seeding from query results ----

    /// Store a conversation fetched from the server, replacing the cached one
    pub fn write_conversation(&self, conversation: &Conversation) -> Result<(), CacheError> {
        let _pass = self.pass.lock();

        let mut list = self.load_list()?;

        let mut messages = Vec::with_capacity(conversation.messages.len());
        for message in &conversation.messages {
            let mut message = message.clone();
            message.conversation_id = Some(conversation.id.clone());
            upsert_message(&mut messages, message);
        }
        let mut record = ConversationRecord::from_view(conversation);
        record.messages = messages.iter().map(StoreKey::of).collect();
        upsert_summary(&mut list, self.summarize(&record, &messages));

        let mut ops = Vec::with_capacity(messages.len() + 2);
        for message in &messages {
            ops.push(put_entity(message)?);
        }
        ops.push(put_entity(&record)?);
        ops.push(put(self.config.conversation_list_key(), &list)?);
        self.store.apply(ops)?;

        debug!(
            "Cached conversation {} with {} messages",
            conversation.id,
            messages.len()
        );
        Ok(())
    }

    /// Store the conversation list fetched from the server
    ///
    /// Conversations that are already cached keep their messages; the
    /// fetched header fields and messages are merged into them.
    pub fn write_conversation_list(&self, conversations: &[Conversation]) -> Result<(), CacheError> {
        let _pass = self.pass.lock();

        let mut list = Vec::with_capacity(conversations.len());
        let mut ops = Vec::new();

        for conversation in conversations {
            let (mut record, mut messages) = match self.load_record(&conversation.id)? {
                Some(record) => {
                    let messages = self.load_messages(&record)?;
                    (record, messages)
                }
                None => (ConversationRecord::empty(conversation.id.clone()), Vec::new()),
            };

            record.users = conversation.users.clone();
            record.groups = conversation.groups.clone();
            record.unread_messages = conversation.unread_messages;
            record.updated_at = conversation.updated_at;
            for message in &conversation.messages {
                let mut message = message.clone();
                message.conversation_id = Some(conversation.id.clone());
                ops.push(put_entity(&message)?);
                upsert_message(&mut messages, message);
            }
            record.messages = messages.iter().map(StoreKey::of).collect();

            list.push(self.summarize(&record, &messages));
            ops.push(put_entity(&record)?);
        }
        ops.push(put(self.config.conversation_list_key(), &list)?);
        self.store.apply(ops)?;

        debug!("Cached conversation list with {} entries", list.len());
        Ok(())
    }

    pub fn write_current_user(&self, user: &CurrentUser) -> Result<(), CacheError> {
        let _pass = self.pass.lock();
        self.store
            .write_as(self.config.current_user_key(), user)?;
        Ok(())
    }

    // ---- mutations ----

    /// Apply a confirmed send
    ///
    /// `prior` is the caller's best-known state of the conversation. It is
    /// only used when the store holds no record for it; a cached record is
    /// always the more recent state, which keeps repeated application of
    /// the same result idempotent.
    pub fn apply_sent_message(
        &self,
        sent: &SentMessage,
        prior: Option<&Conversation>,
    ) -> Result<Conversation, CacheError> {
        let stub = &sent.conversation;
        if let Some(found) = &sent.message.conversation_id {
            if found != &stub.id {
                return Err(CacheError::ConversationMismatch {
                    expected: stub.id.clone(),
                    found: found.clone(),
                });
            }
        }

        let _pass = self.pass.lock();

        // reads
        let cached = self.load_record(&stub.id)?;
        let (mut record, mut messages, from_prior) = match cached {
            Some(record) => {
                let messages = self.load_messages(&record)?;
                (record, messages, false)
            }
            None => match prior.filter(|view| view.id == stub.id) {
                Some(view) => (ConversationRecord::from_view(view), view.messages.clone(), true),
                None => (ConversationRecord::empty(stub.id.clone()), Vec::new(), false),
            },
        };
        let mut list = self.load_list()?;

        // compute
        stub.merge_into(&mut record);

        let mut confirmed = sent.message.clone();
        confirmed.conversation_id = Some(stub.id.clone());
        confirmed.status = MessageStatus::Confirmed;
        if stub.updated_at.is_none() {
            record.updated_at = later(record.updated_at, confirmed.inserted_at);
        }

        let upsert = upsert_message(&mut messages, confirmed.clone());
        let previous_unread = record.unread_messages;
        record.unread_messages = 0;
        record.messages = messages.iter().map(StoreKey::of).collect();

        let replaced = upsert_summary(&mut list, self.summarize(&record, &messages));

        // writes
        let mut ops = Vec::new();
        if from_prior {
            for message in messages.iter().filter(|m| m.id != confirmed.id) {
                ops.push(put_entity(message)?);
            }
        }
        ops.push(put_entity(&confirmed)?);
        for superseded in &upsert.superseded {
            ops.push(StoreOp::Evict(message_key(superseded)));
        }
        ops.push(put_entity(&record)?);
        ops.push(put(self.config.conversation_list_key(), &list)?);
        if previous_unread > 0 {
            ops.extend(self.unread_update(previous_unread, 0)?);
        }
        self.store.apply(ops)?;

        info!(
            "Applied sent message {} to conversation {} (new: {}, superseded: {}, list entry replaced: {})",
            confirmed.id,
            stub.id,
            upsert.inserted,
            upsert.superseded.len(),
            replaced
        );

        Ok(record.resolve(messages))
    }

    /// Insert a pending placeholder into a cached conversation
    ///
    /// Returns false when the conversation is not cached or the message was
    /// already confirmed.
    pub fn apply_optimistic_message(&self, message: &Message) -> Result<bool, CacheError> {
        if message.client_token.is_none() {
            return Err(CacheError::InvalidInput(
                "optimistic message needs a client token".to_string(),
            ));
        }
        let Some(conversation_id) = message.conversation_id.clone() else {
            return Ok(false);
        };

        let _pass = self.pass.lock();

        let Some(mut record) = self.load_record(&conversation_id)? else {
            debug!(
                "Conversation {} not cached, skipping optimistic insert",
                conversation_id
            );
            return Ok(false);
        };
        let mut messages = self.load_messages(&record)?;
        if messages
            .iter()
            .any(|m| m.same_as(message) && !m.is_pending())
        {
            return Ok(false);
        }
        let mut list = self.load_list()?;

        let mut pending = message.clone();
        pending.status = MessageStatus::Pending;
        upsert_message(&mut messages, pending.clone());
        record.messages = messages.iter().map(StoreKey::of).collect();
        upsert_summary(&mut list, self.summarize(&record, &messages));

        self.store.apply(vec![
            put_entity(&pending)?,
            put_entity(&record)?,
            put(self.config.conversation_list_key(), &list)?,
        ])?;

        debug!(
            "Applied optimistic message {} to conversation {}",
            pending.id, conversation_id
        );
        Ok(true)
    }

    /// Remove a pending placeholder after its send failed
    pub fn rollback_optimistic_message(
        &self,
        conversation_id: &ConversationId,
        client_token: &str,
    ) -> Result<bool, CacheError> {
        let _pass = self.pass.lock();

        let Some(mut record) = self.load_record(conversation_id)? else {
            return Ok(false);
        };
        let mut messages = self.load_messages(&record)?;
        let Some(index) = messages
            .iter()
            .position(|m| m.is_pending() && m.client_token.as_deref() == Some(client_token))
        else {
            return Ok(false);
        };
        let mut list = self.load_list()?;

        let removed = messages.remove(index);
        record.messages = messages.iter().map(StoreKey::of).collect();
        replace_summary(&mut list, &self.summarize(&record, &messages));

        self.store.apply(vec![
            StoreOp::Evict(StoreKey::of(&removed)),
            put_entity(&record)?,
            put(self.config.conversation_list_key(), &list)?,
        ])?;

        info!(
            "Rolled back optimistic message {} in conversation {}",
            removed.id, conversation_id
        );
        Ok(true)
    }

    /// Optimistically remove a message from its conversation
    ///
    /// The entity itself stays in the store until
    /// [`confirm_deletion`](Self::confirm_deletion). Returns `None` when the
    /// message is not part of the cached conversation.
    pub fn apply_deleted_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Option<PendingDeletion>, CacheError> {
        let _pass = self.pass.lock();

        let Some(mut record) = self.load_record(conversation_id)? else {
            return Ok(None);
        };
        let key = message_key(message_id);
        let Some(position) = record.messages.iter().position(|k| k == &key) else {
            return Ok(None);
        };
        let mut list = self.load_list()?;

        record.messages.remove(position);
        let messages = self.load_messages(&record)?;
        replace_summary(&mut list, &self.summarize(&record, &messages));

        self.store.apply(vec![
            put_entity(&record)?,
            put(self.config.conversation_list_key(), &list)?,
        ])?;

        debug!(
            "Optimistically removed message {} from conversation {}",
            message_id, conversation_id
        );
        Ok(Some(PendingDeletion {
            conversation_id: conversation_id.clone(),
            message_id: message_id.clone(),
            position,
        }))
    }

    /// The server accepted the deletion: drop the entity
    pub fn confirm_deletion(&self, deletion: PendingDeletion) -> Result<(), CacheError> {
        let _pass = self.pass.lock();
        self.store.evict(&message_key(&deletion.message_id))?;
        info!(
            "Deleted message {} from conversation {}",
            deletion.message_id, deletion.conversation_id
        );
        Ok(())
    }

    /// The server refused the deletion: put the message back where it was
    pub fn revert_deletion(&self, deletion: PendingDeletion) -> Result<(), CacheError> {
        let _pass = self.pass.lock();

        let Some(mut record) = self.load_record(&deletion.conversation_id)? else {
            warn!(
                "Conversation {} vanished before deletion of {} could be reverted",
                deletion.conversation_id, deletion.message_id
            );
            return Ok(());
        };
        let key = message_key(&deletion.message_id);
        if record.messages.contains(&key) {
            return Ok(());
        }
        let mut list = self.load_list()?;

        let position = deletion.position.min(record.messages.len());
        record.messages.insert(position, key);
        let mut messages = self.load_messages(&record)?;
        messages.sort_by_key(|m| m.inserted_at);
        record.messages = messages.iter().map(StoreKey::of).collect();
        replace_summary(&mut list, &self.summarize(&record, &messages));

        self.store.apply(vec![
            put_entity(&record)?,
            put(self.config.conversation_list_key(), &list)?,
        ])?;

        warn!(
            "Reverted deletion of message {} in conversation {}",
            deletion.message_id, deletion.conversation_id
        );
        Ok(())
    }

    /// Mark a conversation read after its first successful fetch
    ///
    /// Zeroes the conversation's counter and subtracts exactly the amount it
    /// held from the global counter. Without a cached record the list entry's
    /// counter is the amount. Returns that amount.
    pub fn apply_conversation_opened(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<u32, CacheError> {
        let _pass = self.pass.lock();

        let mut record = self.load_record(conversation_id)?;
        let mut list = self.load_list()?;

        let amount = match &record {
            Some(record) => record.unread_messages,
            None => list
                .iter()
                .find(|s| &s.id == conversation_id)
                .map_or(0, |s| s.unread_messages),
        };

        let mut ops = Vec::new();
        if let Some(record) = record.as_mut() {
            if record.unread_messages > 0 {
                record.unread_messages = 0;
                ops.push(put_entity(&*record)?);
            }
        }
        let mut list_changed = false;
        for summary in list
            .iter_mut()
            .filter(|s| &s.id == conversation_id && s.unread_messages > 0)
        {
            summary.unread_messages = 0;
            list_changed = true;
        }
        if list_changed {
            ops.push(put(self.config.conversation_list_key(), &list)?);
        }
        if amount > 0 {
            ops.extend(self.unread_update(amount, 0)?);
        }
        self.store.apply(ops)?;

        info!(
            "Opened conversation {}, {} messages marked read",
            conversation_id, amount
        );
        Ok(amount)
    }

    /// Apply a message another participant sent
    ///
    /// Increments the conversation's and the user's unread counters once per
    /// new message. Returns false for a message already cached.
    pub fn apply_received_message(&self, message: &Message) -> Result<bool, CacheError> {
        let Some(conversation_id) = message.conversation_id.clone() else {
            return Err(CacheError::InvalidInput(
                "received message without conversation".to_string(),
            ));
        };

        let _pass = self.pass.lock();

        let mut list = self.load_list()?;
        let mut received = message.clone();
        received.status = MessageStatus::Confirmed;

        let mut ops = match self.load_record(&conversation_id)? {
            Some(mut record) => {
                let mut messages = self.load_messages(&record)?;
                if messages.iter().any(|m| m.id == received.id) {
                    return Ok(false);
                }
                upsert_message(&mut messages, received.clone());
                record.unread_messages += 1;
                record.updated_at = later(record.updated_at, received.inserted_at);
                record.messages = messages.iter().map(StoreKey::of).collect();
                upsert_summary(&mut list, self.summarize(&record, &messages));

                vec![
                    put_entity(&received)?,
                    put_entity(&record)?,
                    put(self.config.conversation_list_key(), &list)?,
                ]
            }
            None => {
                // Only the counters and the list entry are known
                if self.store.read(&message_key(&received.id))?.is_some() {
                    return Ok(false);
                }
                let mut ops = vec![put_entity(&received)?];
                if let Some(summary) = list.iter_mut().find(|s| s.id == conversation_id) {
                    summary.unread_messages += 1;
                    summary.updated_at = later(summary.updated_at, received.inserted_at);
                    let newer = summary
                        .last_message
                        .as_ref()
                        .map_or(true, |stub| stub.inserted_at <= received.inserted_at);
                    if newer {
                        summary.last_message =
                            Some(stub_of(&received, self.config.preview_chars));
                    }
                    ops.push(put(self.config.conversation_list_key(), &list)?);
                }
                ops
            }
        };
        ops.extend(self.unread_update(0, 1)?);
        self.store.apply(ops)?;

        debug!(
            "Received message {} in conversation {}",
            received.id, conversation_id
        );
        Ok(true)
    }

    /// Replay a recorded event
    pub fn apply_event(&self, event: CacheEvent) -> Result<(), CacheError> {
        match event {
            CacheEvent::Sent { result, prior } => {
                self.apply_sent_message(&result, prior.as_ref())?;
            }
            CacheEvent::Optimistic { message } => {
                self.apply_optimistic_message(&message)?;
            }
            CacheEvent::SendFailed {
                conversation_id,
                client_token,
            } => {
                self.rollback_optimistic_message(&conversation_id, &client_token)?;
            }
            CacheEvent::Received { message } => {
                self.apply_received_message(&message)?;
            }
            CacheEvent::Deleted {
                conversation_id,
                message_id,
                outcome,
            } => {
                if let Some(deletion) = self.apply_deleted_message(&conversation_id, &message_id)? {
                    match outcome {
                        DeletionOutcome::Confirmed => self.confirm_deletion(deletion)?,
                        DeletionOutcome::Failed => self.revert_deletion(deletion)?,
                    }
                }
            }
            CacheEvent::Opened { conversation_id } => {
                self.apply_conversation_opened(&conversation_id)?;
            }
            CacheEvent::Fetched { conversation } => {
                self.write_conversation(&conversation)?;
            }
            CacheEvent::ConversationList { conversations } => {
                self.write_conversation_list(&conversations)?;
            }
            CacheEvent::CurrentUser { user } => {
                self.write_current_user(&user)?;
            }
        }
        Ok(())
    }

    // ---- internals ----

    /// Counter write for the current user; `None` when no user is cached
    fn unread_update(&self, subtract: u32, add: u32) -> Result<Option<StoreOp>, CacheError> {
        let Some(mut user) = self.current_user()? else {
            return Ok(None);
        };
        if user.unread_messages < subtract {
            warn!(
                "Unread counter {} below subtracted amount {}, clamping",
                user.unread_messages, subtract
            );
        }
        user.unread_messages = user.unread_messages.saturating_sub(subtract).saturating_add(add);
        Ok(Some(put(self.config.current_user_key(), &user)?))
    }

    fn load_record(&self, id: &ConversationId) -> Result<Option<ConversationRecord>, CacheError> {
        Ok(self.store.read_as(&conversation_key(id))?)
    }

    /// Resolve message references; references whose entity is gone are
    /// skipped
    fn load_messages(&self, record: &ConversationRecord) -> Result<Vec<Message>, CacheError> {
        let mut messages = Vec::with_capacity(record.messages.len());
        for key in &record.messages {
            match self.store.read_as::<Message>(key)? {
                Some(message) => messages.push(message),
                None => debug!("Dangling message reference {} in {}", key, record.id),
            }
        }
        Ok(messages)
    }

    fn load_list(&self) -> Result<Vec<ConversationSummary>, CacheError> {
        Ok(self
            .store
            .read_as(&self.config.conversation_list_key())?
            .unwrap_or_default())
    }

    fn summarize(&self, record: &ConversationRecord, messages: &[Message]) -> ConversationSummary {
        summarize(record, messages, self.config.preview_chars)
    }
}

fn conversation_key(id: &ConversationId) -> StoreKey {
    StoreKey::entity(ConversationRecord::TYPENAME, id)
}

fn message_key(id: &MessageId) -> StoreKey {
    StoreKey::entity(Message::TYPENAME, id)
}
