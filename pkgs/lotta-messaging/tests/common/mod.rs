// Shared fixtures for messaging cache tests
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use lotta_messaging::{
    ConsistentMessageCache, Conversation, ConversationId, ConversationStub, CurrentUser, GroupId,
    GroupRef, Message, MessageId, MessageStatus, SentMessage, UserId, UserRef,
};
use lotta_store::MemoryStore;

pub fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 7, 45, 0).unwrap() + Duration::minutes(minute)
}

pub fn user(id: &str, name: &str) -> UserRef {
    UserRef {
        id: UserId::from(id),
        name: name.to_string(),
        nickname: None,
    }
}

pub fn me() -> CurrentUser {
    CurrentUser {
        id: UserId::from("me"),
        name: "Eike".to_string(),
        unread_messages: 0,
    }
}

pub fn message(id: &str, conversation: &str, minute: i64, content: &str) -> Message {
    Message {
        id: MessageId::from(id),
        content: Some(content.to_string()),
        files: Vec::new(),
        user: user("me", "Eike"),
        conversation_id: Some(ConversationId::from(conversation)),
        inserted_at: at(minute),
        updated_at: at(minute),
        client_token: None,
        status: MessageStatus::Confirmed,
    }
}

pub fn incoming(id: &str, conversation: &str, minute: i64, content: &str) -> Message {
    let mut m = message(id, conversation, minute, content);
    m.user = user("ben", "Ben");
    m
}

pub fn sent(id: &str, conversation: &str, minute: i64, content: &str) -> SentMessage {
    let mut stub = ConversationStub::new(ConversationId::from(conversation));
    stub.users = Some(vec![user("me", "Eike"), user("ben", "Ben")]);
    stub.updated_at = Some(at(minute));
    SentMessage {
        message: message(id, conversation, minute, content),
        conversation: stub,
    }
}

pub fn direct_conversation(id: &str, with: &str, unread: u32, messages: Vec<Message>) -> Conversation {
    Conversation {
        id: ConversationId::from(id),
        users: vec![user("me", "Eike"), user(with, with)],
        groups: Vec::new(),
        unread_messages: unread,
        updated_at: messages.last().map(|m| m.inserted_at),
        messages,
    }
}

pub fn group_conversation(id: &str, group: &str, unread: u32) -> Conversation {
    Conversation {
        id: ConversationId::from(id),
        users: Vec::new(),
        groups: vec![GroupRef {
            id: GroupId::from(group),
            name: group.to_string(),
        }],
        unread_messages: unread,
        updated_at: Some(at(0)),
        messages: Vec::new(),
    }
}

pub fn new_cache() -> ConsistentMessageCache<MemoryStore> {
    ConsistentMessageCache::new(MemoryStore::new())
}

pub fn ids(conversation: &Conversation) -> Vec<String> {
    conversation
        .messages
        .iter()
        .map(|m| m.id.to_string())
        .collect()
}
