//! Messaging entities and the views derived from them

use chrono::{DateTime, Utc};
use lotta_store::{Entity, StoreKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CacheError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Server-assigned conversation handle
    ConversationId
);
string_id!(MessageId);
string_id!(UserId);
string_id!(GroupId);
string_id!(FileId);

const PLACEHOLDER_PREFIX: &str = "temp-";

impl MessageId {
    /// Client-temporary id for an optimistic message
    pub fn placeholder() -> Self {
        Self(format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4()))
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: GroupId,
    pub name: String,
}

/// Attachment reference; file contents never live in the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub id: FileId,
    pub filename: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Client-observed lifecycle of a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Applied optimistically, not yet confirmed by the server
    Pending,
    #[default]
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    /// `None` when the message only carries attachments
    pub content: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
    pub user: UserRef,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Correlates an optimistic placeholder with its confirmation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    /// Build a pending placeholder for a message about to be sent
    pub fn placeholder(
        conversation_id: ConversationId,
        user: UserRef,
        content: Option<String>,
        files: Vec<FileRef>,
        client_token: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::placeholder(),
            content,
            files,
            user,
            conversation_id: Some(conversation_id),
            inserted_at: now,
            updated_at: now,
            client_token: Some(client_token),
            status: MessageStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }

    /// Whether `other` is the same logical message: same id, or same
    /// client correlation token
    pub fn same_as(&self, other: &Message) -> bool {
        if self.id == other.id {
            return true;
        }
        match (&self.client_token, &other.client_token) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl Entity for Message {
    const TYPENAME: &'static str = "Message";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

/// Authoritative conversation fields returned alongside a sent message.
/// `None` means the server did not supply the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStub {
    pub id: ConversationId,
    #[serde(default)]
    pub users: Option<Vec<UserRef>>,
    #[serde(default)]
    pub groups: Option<Vec<GroupRef>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationStub {
    pub fn new(id: ConversationId) -> Self {
        Self {
            id,
            users: None,
            groups: None,
            updated_at: None,
        }
    }

    /// Overwrite every field of `record` the server supplied
    pub(crate) fn merge_into(&self, record: &mut ConversationRecord) {
        record.id = self.id.clone();
        if let Some(users) = &self.users {
            record.users = users.clone();
        }
        if let Some(groups) = &self.groups {
            record.groups = groups.clone();
        }
        if let Some(updated_at) = self.updated_at {
            record.updated_at = Some(updated_at);
        }
    }
}

/// Result of the send-message mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message: Message,
    pub conversation: ConversationStub,
}

/// Single-conversation view with its messages resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub users: Vec<UserRef>,
    #[serde(default)]
    pub groups: Vec<GroupRef>,
    #[serde(default)]
    pub unread_messages: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Stored form of a conversation: messages are references to
/// `Message:{id}` entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: ConversationId,
    #[serde(default)]
    pub users: Vec<UserRef>,
    #[serde(default)]
    pub groups: Vec<GroupRef>,
    #[serde(default)]
    pub unread_messages: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<StoreKey>,
}

impl ConversationRecord {
    pub fn empty(id: ConversationId) -> Self {
        Self {
            id,
            users: Vec::new(),
            groups: Vec::new(),
            unread_messages: 0,
            updated_at: None,
            messages: Vec::new(),
        }
    }

    pub fn from_view(view: &Conversation) -> Self {
        Self {
            id: view.id.clone(),
            users: view.users.clone(),
            groups: view.groups.clone(),
            unread_messages: view.unread_messages,
            updated_at: view.updated_at,
            messages: view.messages.iter().map(StoreKey::of).collect(),
        }
    }

    pub fn resolve(self, messages: Vec<Message>) -> Conversation {
        Conversation {
            id: self.id,
            users: self.users,
            groups: self.groups,
            unread_messages: self.unread_messages,
            updated_at: self.updated_at,
            messages,
        }
    }
}

impl Entity for ConversationRecord {
    const TYPENAME: &'static str = "Conversation";

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}

/// Minimal message data carried by a list entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStub {
    pub id: MessageId,
    pub user_id: UserId,
    pub inserted_at: DateTime<Utc>,
    #[serde(default)]
    pub preview: Option<String>,
}

/// Conversation list entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    #[serde(default)]
    pub users: Vec<UserRef>,
    #[serde(default)]
    pub groups: Vec<GroupRef>,
    #[serde(default)]
    pub unread_messages: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message: Option<MessageStub>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub unread_messages: u32,
}

impl CurrentUser {
    pub fn user_ref(&self) -> UserRef {
        UserRef {
            id: self.id.clone(),
            name: self.name.clone(),
            nickname: None,
        }
    }
}

/// Where a message is sent; conversations are resolved by the server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageDestination {
    User(UserId),
    Group(GroupId),
}

impl fmt::Display for MessageDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageDestination::User(id) => write!(f, "user {}", id),
            MessageDestination::Group(id) => write!(f, "group {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageInput {
    pub destination: MessageDestination,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

impl SendMessageInput {
    pub fn text(destination: MessageDestination, content: impl Into<String>) -> Self {
        Self {
            destination,
            content: Some(content.into()),
            files: Vec::new(),
        }
    }

    /// A message needs text or at least one attachment
    pub fn validate(&self) -> Result<(), CacheError> {
        let has_text = self
            .content
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false);
        if !has_text && self.files.is_empty() {
            return Err(CacheError::InvalidInput(
                "message needs content or files".to_string(),
            ));
        }
        Ok(())
    }
}
