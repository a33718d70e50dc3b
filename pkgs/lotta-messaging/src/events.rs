//! Recordable cache events
//!
//! Each variant corresponds to one cache pass. Events serialize as JSON
//! objects tagged by `type`, which lets tooling replay a session.

use serde::{Deserialize, Serialize};

use crate::models::{
    Conversation, ConversationId, CurrentUser, Message, MessageId, SentMessage,
};

/// How the server answered a deletion request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionOutcome {
    #[default]
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CacheEvent {
    /// The send mutation returned
    Sent {
        result: SentMessage,
        #[serde(default)]
        prior: Option<Conversation>,
    },
    /// A placeholder was shown before the send returned
    Optimistic { message: Message },
    /// The send mutation failed
    SendFailed {
        conversation_id: ConversationId,
        client_token: String,
    },
    /// Another participant's message arrived
    Received { message: Message },
    Deleted {
        conversation_id: ConversationId,
        message_id: MessageId,
        #[serde(default)]
        outcome: DeletionOutcome,
    },
    Opened { conversation_id: ConversationId },
    Fetched { conversation: Conversation },
    ConversationList { conversations: Vec<Conversation> },
    CurrentUser { user: CurrentUser },
}
