//! Pure merge helpers shared by every cache pass

use chrono::{DateTime, Utc};

use crate::models::{ConversationRecord, ConversationSummary, Message, MessageId, MessageStub};

/// Outcome of [`upsert_message`]
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Upsert {
    /// No entry for the message existed before
    pub inserted: bool,
    /// Replaced entries whose id differs from the new message (placeholders)
    pub superseded: Vec<MessageId>,
}

/// Insert `message`, replacing every entry that is the same logical message
/// (same id or same client token). Keeps the list sorted by `inserted_at`.
pub(crate) fn upsert_message(messages: &mut Vec<Message>, message: Message) -> Upsert {
    let mut slot = None;
    let mut superseded = Vec::new();
    let mut index = 0;

    messages.retain(|existing| {
        let keep = !existing.same_as(&message);
        if !keep {
            slot.get_or_insert(index);
            if existing.id != message.id {
                superseded.push(existing.id.clone());
            }
        }
        index += 1;
        keep
    });

    let inserted = slot.is_none();
    match slot {
        Some(slot) => messages.insert(slot, message),
        None => messages.push(message),
    }
    messages.sort_by_key(|m| m.inserted_at);

    Upsert {
        inserted,
        superseded,
    }
}

/// Most recent message; on equal timestamps the later entry wins
pub(crate) fn latest_message(messages: &[Message]) -> Option<&Message> {
    messages.iter().fold(None, |best: Option<&Message>, m| match best {
        Some(b) if m.inserted_at < b.inserted_at => Some(b),
        _ => Some(m),
    })
}

pub(crate) fn later(a: Option<DateTime<Utc>>, b: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(a.map_or(b, |a| a.max(b)))
}

pub(crate) fn stub_of(message: &Message, preview_chars: usize) -> MessageStub {
    let preview = match &message.content {
        Some(content) => Some(content.chars().take(preview_chars).collect()),
        None => message.files.first().map(|f| f.filename.clone()),
    };
    MessageStub {
        id: message.id.clone(),
        user_id: message.user.id.clone(),
        inserted_at: message.inserted_at,
        preview,
    }
}

/// Derive the list entry for a conversation from its resolved messages
pub(crate) fn summarize(
    record: &ConversationRecord,
    messages: &[Message],
    preview_chars: usize,
) -> ConversationSummary {
    ConversationSummary {
        id: record.id.clone(),
        users: record.users.clone(),
        groups: record.groups.clone(),
        unread_messages: record.unread_messages,
        updated_at: record.updated_at,
        last_message: latest_message(messages).map(|m| stub_of(m, preview_chars)),
    }
}

/// Replace the entry with the same id in place, or prepend it.
/// Returns true when an entry was replaced.
pub(crate) fn upsert_summary(
    list: &mut Vec<ConversationSummary>,
    summary: ConversationSummary,
) -> bool {
    if replace_summary(list, &summary) {
        return true;
    }
    list.insert(0, summary);
    false
}

/// Replace the entry with the same id in place; no-op when absent
pub(crate) fn replace_summary(list: &mut [ConversationSummary], summary: &ConversationSummary) -> bool {
    match list.iter_mut().find(|s| s.id == summary.id) {
        Some(slot) => {
            *slot = summary.clone();
            true
        }
        None => false,
    }
}
