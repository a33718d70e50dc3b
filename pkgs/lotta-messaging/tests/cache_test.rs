// Tests for ConsistentMessageCache

mod common;

use common::*;
use lotta_messaging::{
    CacheError, CacheEvent, ConversationId, CurrentUser, Message, MessageId, MessageStatus,
    UserId,
};
use lotta_store::{NormalizedStore, StoreKey};
use std::sync::Arc;

fn c(id: &str) -> ConversationId {
    ConversationId::from(id)
}

#[test]
fn test_first_message_creates_conversation_and_list_entry() {
    let cache = new_cache();
    cache.write_current_user(&me()).unwrap();

    let result = sent("m1", "c-new", 0, "Hallo!");
    let conversation = cache
        .apply_sent_message(&result, None)
        .expect("apply failed");

    assert_eq!(conversation.id, c("c-new"));
    assert_eq!(ids(&conversation), vec!["m1"]);

    let list = cache.conversation_list().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, c("c-new"));
    let stub = list[0].last_message.as_ref().expect("list entry carries a stub");
    assert_eq!(stub.id, MessageId::from("m1"));
    assert_eq!(stub.preview.as_deref(), Some("Hallo!"));

    let cached = cache.conversation(&c("c-new")).unwrap().unwrap();
    assert_eq!(ids(&cached), vec!["m1"]);
    assert_eq!(cached.users.len(), 2);
}

#[test]
fn test_applying_the_same_result_twice_is_idempotent() {
    let cache = new_cache();
    let result = sent("m1", "c1", 0, "Hallo!");

    let once = cache.apply_sent_message(&result, None).unwrap();
    let twice = cache.apply_sent_message(&result, None).unwrap();

    assert_eq!(once, twice);
    assert_eq!(ids(&twice), vec!["m1"]);
    assert_eq!(cache.conversation_list().unwrap().len(), 1);
}

#[test]
fn test_many_sends_each_appear_exactly_once() {
    let cache = new_cache();
    for (i, minute) in [3, 1, 4, 0, 2].into_iter().enumerate() {
        let result = sent(&format!("m{}", i), "c1", minute, "text");
        cache.apply_sent_message(&result, None).unwrap();
    }

    let conversation = cache.conversation(&c("c1")).unwrap().unwrap();
    assert_eq!(conversation.messages.len(), 5);
    let mut seen = ids(&conversation);
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 5);

    // Thread is ordered by time, list entry points at the latest message
    let times: Vec<_> = conversation.messages.iter().map(|m| m.inserted_at).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    let list = cache.conversation_list().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(
        list[0].last_message.as_ref().unwrap().id,
        MessageId::from("m2")
    );
}

#[test]
fn test_confirmation_supersedes_optimistic_placeholder() {
    let cache = new_cache();
    cache
        .write_conversation(&direct_conversation(
            "c1",
            "ben",
            0,
            vec![message("m0", "c1", 0, "Guten Morgen")],
        ))
        .unwrap();

    let mut placeholder = message("ignored", "c1", 1, "Hallo!");
    placeholder.id = MessageId::placeholder();
    placeholder.client_token = Some("tok".into());
    placeholder.status = MessageStatus::Pending;
    assert!(cache.apply_optimistic_message(&placeholder).unwrap());

    let pending_view = cache.conversation(&c("c1")).unwrap().unwrap();
    assert_eq!(pending_view.messages.len(), 2);
    assert!(pending_view.messages[1].is_pending());

    let mut result = sent("srv-1", "c1", 2, "Hallo!");
    result.message.client_token = Some("tok".into());
    cache.apply_sent_message(&result, None).unwrap();

    let view = cache.conversation(&c("c1")).unwrap().unwrap();
    assert_eq!(ids(&view), vec!["m0", "srv-1"]);
    assert!(view.messages.iter().all(|m| !m.id.is_placeholder()));
    assert!(view.messages.iter().all(|m| !m.is_pending()));
    assert!(cache
        .store()
        .read(&StoreKey::entity("Message", &placeholder.id))
        .unwrap()
        .is_none());

    let list = cache.conversation_list().unwrap();
    assert_eq!(
        list[0].last_message.as_ref().unwrap().id,
        MessageId::from("srv-1")
    );
}

#[test]
fn test_optimistic_message_needs_cached_conversation_and_token() {
    let cache = new_cache();
    let mut placeholder = message("temp-1", "c-unknown", 0, "Hallo!");
    placeholder.client_token = Some("tok".into());
    assert!(!cache.apply_optimistic_message(&placeholder).unwrap());

    placeholder.client_token = None;
    assert!(matches!(
        cache.apply_optimistic_message(&placeholder),
        Err(CacheError::InvalidInput(_))
    ));
}

#[test]
fn test_failed_send_rolls_placeholder_back() {
    let cache = new_cache();
    cache
        .write_conversation(&direct_conversation(
            "c1",
            "ben",
            0,
            vec![message("m0", "c1", 0, "Guten Morgen")],
        ))
        .unwrap();

    let mut placeholder = message("temp-1", "c1", 5, "Hallo!");
    placeholder.client_token = Some("tok".into());
    placeholder.status = MessageStatus::Pending;
    cache.apply_optimistic_message(&placeholder).unwrap();

    assert!(cache.rollback_optimistic_message(&c("c1"), "tok").unwrap());
    assert!(!cache.rollback_optimistic_message(&c("c1"), "tok").unwrap());

    let view = cache.conversation(&c("c1")).unwrap().unwrap();
    assert_eq!(ids(&view), vec!["m0"]);
    let list = cache.conversation_list().unwrap();
    assert_eq!(
        list[0].last_message.as_ref().unwrap().id,
        MessageId::from("m0")
    );
}

#[test]
fn test_server_stub_fields_take_precedence() {
    let cache = new_cache();
    cache
        .write_conversation(&direct_conversation("c1", "ben", 0, Vec::new()))
        .unwrap();

    let mut result = sent("m1", "c1", 1, "Hallo!");
    let mut users = result.conversation.users.clone().unwrap();
    users.push(user("carla", "Carla"));
    result.conversation.users = Some(users);

    let view = cache.apply_sent_message(&result, None).unwrap();
    assert_eq!(view.users.len(), 3);
    assert_eq!(view.updated_at, Some(at(1)));
    assert_eq!(cache.conversation_list().unwrap()[0].users.len(), 3);
}

#[test]
fn test_prior_view_is_used_when_nothing_is_cached() {
    let cache = new_cache();
    let prior = direct_conversation("c1", "ben", 0, vec![message("m0", "c1", 0, "Hi")]);

    let view = cache
        .apply_sent_message(&sent("m1", "c1", 1, "Hallo!"), Some(&prior))
        .unwrap();

    assert_eq!(ids(&view), vec!["m0", "m1"]);
    assert!(cache
        .store()
        .read(&StoreKey::entity("Message", "m0"))
        .unwrap()
        .is_some());
}

#[test]
fn test_message_for_other_conversation_is_rejected() {
    let cache = new_cache();
    let mut result = sent("m1", "c1", 0, "Hallo!");
    result.message.conversation_id = Some(c("c2"));

    assert!(matches!(
        cache.apply_sent_message(&result, None),
        Err(CacheError::ConversationMismatch { .. })
    ));
    assert!(cache.conversation_list().unwrap().is_empty());
}

#[test]
fn test_sending_marks_conversation_read() {
    let cache = new_cache();
    cache
        .write_current_user(&CurrentUser {
            unread_messages: 5,
            ..me()
        })
        .unwrap();
    cache
        .write_conversation(&direct_conversation("c1", "ben", 2, Vec::new()))
        .unwrap();

    let view = cache
        .apply_sent_message(&sent("m1", "c1", 0, "Hallo!"), None)
        .unwrap();

    assert_eq!(view.unread_messages, 0);
    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 3);
    assert_eq!(cache.conversation_list().unwrap()[0].unread_messages, 0);
}

#[test]
fn test_list_order_of_untouched_conversations_is_preserved() {
    let cache = new_cache();
    cache
        .write_conversation_list(&[
            direct_conversation("c1", "ben", 0, Vec::new()),
            direct_conversation("c2", "carla", 0, Vec::new()),
            direct_conversation("c3", "dora", 0, Vec::new()),
        ])
        .unwrap();

    cache
        .apply_sent_message(&sent("m1", "c2", 0, "Hallo!"), None)
        .unwrap();
    let order: Vec<String> = cache
        .conversation_list()
        .unwrap()
        .iter()
        .map(|s| s.id.to_string())
        .collect();
    assert_eq!(order, vec!["c1", "c2", "c3"]);

    cache
        .apply_sent_message(&sent("m2", "c9", 1, "Neu"), None)
        .unwrap();
    let order: Vec<String> = cache
        .conversation_list()
        .unwrap()
        .iter()
        .map(|s| s.id.to_string())
        .collect();
    assert_eq!(order, vec!["c9", "c1", "c2", "c3"]);
}

#[test]
fn test_opening_conversation_subtracts_its_unread_count() {
    let cache = new_cache();
    cache
        .write_current_user(&CurrentUser {
            unread_messages: 10,
            ..me()
        })
        .unwrap();
    cache
        .write_conversation(&direct_conversation("c1", "ben", 3, Vec::new()))
        .unwrap();

    assert_eq!(cache.apply_conversation_opened(&c("c1")).unwrap(), 3);

    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 7);
    assert_eq!(
        cache.conversation(&c("c1")).unwrap().unwrap().unread_messages,
        0
    );
    assert_eq!(cache.conversation_list().unwrap()[0].unread_messages, 0);

    // Nothing left to subtract on a second open
    assert_eq!(cache.apply_conversation_opened(&c("c1")).unwrap(), 0);
    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 7);
}

#[test]
fn test_opening_unknown_conversation_is_a_no_op() {
    let cache = new_cache();
    cache
        .write_current_user(&CurrentUser {
            unread_messages: 4,
            ..me()
        })
        .unwrap();

    assert_eq!(cache.apply_conversation_opened(&c("missing")).unwrap(), 0);
    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 4);
}

#[test]
fn test_concurrent_opens_lose_no_subtraction() {
    let cache = Arc::new(new_cache());
    let counts = [2u32, 3, 0, 5, 1, 4];
    let total: u32 = counts.iter().sum();

    // Two extra unread messages live in a conversation nobody opens
    cache
        .write_current_user(&CurrentUser {
            unread_messages: total + 2,
            ..me()
        })
        .unwrap();
    for (i, count) in counts.iter().enumerate() {
        cache
            .write_conversation(&direct_conversation(
                &format!("c{}", i),
                &format!("u{}", i),
                *count,
                Vec::new(),
            ))
            .unwrap();
    }

    let subtracted: u32 = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..counts.len())
            .map(|i| {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    cache
                        .apply_conversation_opened(&c(&format!("c{}", i)))
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(subtracted, total);
    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 2);
}

#[test]
fn test_unread_counter_never_goes_negative() {
    let cache = new_cache();
    cache
        .write_current_user(&CurrentUser {
            unread_messages: 1,
            ..me()
        })
        .unwrap();
    cache
        .write_conversation(&direct_conversation("c1", "ben", 3, Vec::new()))
        .unwrap();

    cache.apply_conversation_opened(&c("c1")).unwrap();
    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 0);
}

#[test]
fn test_confirmed_deletion_evicts_message() {
    let cache = new_cache();
    cache
        .write_conversation(&direct_conversation(
            "c1",
            "ben",
            0,
            vec![
                message("m1", "c1", 0, "eins"),
                message("m2", "c1", 1, "zwei"),
                message("m3", "c1", 2, "drei"),
            ],
        ))
        .unwrap();

    let deletion = cache
        .apply_deleted_message(&c("c1"), &MessageId::from("m2"))
        .unwrap()
        .expect("message is cached");

    let view = cache.conversation(&c("c1")).unwrap().unwrap();
    assert_eq!(ids(&view), vec!["m1", "m3"]);
    // Entity stays until the server confirms
    let key = StoreKey::entity("Message", "m2");
    assert!(cache.store().read(&key).unwrap().is_some());

    cache.confirm_deletion(deletion).unwrap();
    assert!(cache.store().read(&key).unwrap().is_none());
    assert_eq!(
        ids(&cache.conversation(&c("c1")).unwrap().unwrap()),
        vec!["m1", "m3"]
    );
}

#[test]
fn test_failed_deletion_restores_previous_state() {
    let cache = new_cache();
    cache
        .write_conversation(&direct_conversation(
            "c1",
            "ben",
            0,
            vec![
                message("m1", "c1", 0, "eins"),
                message("m2", "c1", 1, "zwei"),
                message("m3", "c1", 2, "drei"),
            ],
        ))
        .unwrap();
    let before_view = cache.conversation(&c("c1")).unwrap();
    let before_list = cache.conversation_list().unwrap();

    let deletion = cache
        .apply_deleted_message(&c("c1"), &MessageId::from("m3"))
        .unwrap()
        .unwrap();
    let list = cache.conversation_list().unwrap();
    assert_eq!(
        list[0].last_message.as_ref().unwrap().id,
        MessageId::from("m2")
    );

    cache.revert_deletion(deletion).unwrap();
    assert_eq!(cache.conversation(&c("c1")).unwrap(), before_view);
    assert_eq!(cache.conversation_list().unwrap(), before_list);
}

#[test]
fn test_deleting_unknown_message_returns_none() {
    let cache = new_cache();
    cache
        .write_conversation(&direct_conversation("c1", "ben", 0, Vec::new()))
        .unwrap();

    assert!(cache
        .apply_deleted_message(&c("c1"), &MessageId::from("nope"))
        .unwrap()
        .is_none());
    assert!(cache
        .apply_deleted_message(&c("c-unknown"), &MessageId::from("nope"))
        .unwrap()
        .is_none());
}

#[test]
fn test_received_message_counts_as_unread_once() {
    let cache = new_cache();
    cache.write_current_user(&me()).unwrap();
    cache
        .write_conversation(&direct_conversation("c1", "ben", 0, Vec::new()))
        .unwrap();

    let m = incoming("m9", "c1", 3, "Bist du da?");
    assert!(cache.apply_received_message(&m).unwrap());
    assert!(!cache.apply_received_message(&m).unwrap());

    let view = cache.conversation(&c("c1")).unwrap().unwrap();
    assert_eq!(view.unread_messages, 1);
    assert_eq!(ids(&view), vec!["m9"]);
    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 1);
    let list = cache.conversation_list().unwrap();
    assert_eq!(list[0].unread_messages, 1);
    assert_eq!(
        list[0].last_message.as_ref().unwrap().user_id,
        UserId::from("ben")
    );
}

#[test]
fn test_received_message_for_uncached_conversation_updates_counter() {
    let cache = new_cache();
    cache.write_current_user(&me()).unwrap();

    assert!(cache
        .apply_received_message(&incoming("m1", "c-far", 0, "Hallo"))
        .unwrap());
    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 1);
    assert!(cache.conversation(&c("c-far")).unwrap().is_none());

    let mut orphan: Message = incoming("m2", "c-far", 1, "Hallo");
    orphan.conversation_id = None;
    assert!(matches!(
        cache.apply_received_message(&orphan),
        Err(CacheError::InvalidInput(_))
    ));
}

#[test]
fn test_list_fetch_keeps_cached_thread() {
    let cache = new_cache();
    cache
        .write_conversation(&direct_conversation(
            "c1",
            "ben",
            0,
            vec![message("m1", "c1", 0, "eins"), message("m2", "c1", 1, "zwei")],
        ))
        .unwrap();

    // The list query only carries the latest message
    cache
        .write_conversation_list(&[direct_conversation(
            "c1",
            "ben",
            1,
            vec![incoming("m3", "c1", 2, "drei")],
        )])
        .unwrap();

    let view = cache.conversation(&c("c1")).unwrap().unwrap();
    assert_eq!(ids(&view), vec!["m1", "m2", "m3"]);
    assert_eq!(view.unread_messages, 1);
    let list = cache.conversation_list().unwrap();
    assert_eq!(
        list[0].last_message.as_ref().unwrap().id,
        MessageId::from("m3")
    );
}

#[test]
fn test_find_conversation_for_destination() {
    use lotta_messaging::{GroupId, MessageDestination};

    let cache = new_cache();
    cache
        .write_conversation_list(&[
            direct_conversation("c1", "ben", 0, Vec::new()),
            group_conversation("c2", "lehrer", 0),
        ])
        .unwrap();
    let me = UserId::from("me");

    let ben = MessageDestination::User(UserId::from("ben"));
    let carla = MessageDestination::User(UserId::from("carla"));
    let lehrer = MessageDestination::Group(GroupId::from("lehrer"));

    assert_eq!(cache.find_conversation_for(&ben, &me).unwrap(), Some(c("c1")));
    assert_eq!(cache.find_conversation_for(&carla, &me).unwrap(), None);
    assert_eq!(
        cache.find_conversation_for(&lehrer, &me).unwrap(),
        Some(c("c2"))
    );
}

#[test]
fn test_replay_events_from_json() {
    let events: Vec<CacheEvent> = serde_json::from_str(
        r#"[
            { "type": "currentUser", "user": { "id": "me", "name": "Eike", "unreadMessages": 4 } },
            { "type": "fetched", "conversation": {
                "id": "c1",
                "users": [{ "id": "me", "name": "Eike" }, { "id": "ben", "name": "Ben" }],
                "unreadMessages": 4,
                "messages": [{
                    "id": "m1",
                    "content": "Hallo!",
                    "user": { "id": "ben", "name": "Ben" },
                    "insertedAt": "2026-03-02T08:00:00Z",
                    "updatedAt": "2026-03-02T08:00:00Z"
                }]
            } },
            { "type": "opened", "conversationId": "c1" },
            { "type": "deleted", "conversationId": "c1", "messageId": "m1", "outcome": "failed" }
        ]"#,
    )
    .expect("events parse");

    let cache = new_cache();
    for event in events {
        cache.apply_event(event).unwrap();
    }

    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 0);
    let view = cache.conversation(&c("c1")).unwrap().unwrap();
    assert_eq!(ids(&view), vec!["m1"]);
    assert_eq!(view.unread_messages, 0);
}

#[test]
fn test_opening_conversation_known_only_from_list_subtracts_its_count() {
    let cache = new_cache();
    cache.write_current_user(&me()).unwrap();
    cache
        .write_conversation(&direct_conversation("c-far", "ben", 0, Vec::new()))
        .unwrap();
    // Keep the list entry, drop the thread
    cache
        .store()
        .evict(&StoreKey::entity("Conversation", "c-far"))
        .unwrap();

    for (i, minute) in [1, 2, 3].into_iter().enumerate() {
        cache
            .apply_received_message(&incoming(&format!("m{}", i), "c-far", minute, "Hallo"))
            .unwrap();
    }
    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 3);
    assert_eq!(cache.conversation_list().unwrap()[0].unread_messages, 3);

    assert_eq!(cache.apply_conversation_opened(&c("c-far")).unwrap(), 3);
    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 0);
    assert_eq!(cache.conversation_list().unwrap()[0].unread_messages, 0);
}

#[test]
fn test_counter_changes_land_in_the_same_batch_as_the_views() {
    let cache = new_cache();
    cache
        .write_current_user(&CurrentUser {
            unread_messages: 6,
            ..me()
        })
        .unwrap();
    cache
        .write_conversation(&direct_conversation("c1", "ben", 2, Vec::new()))
        .unwrap();
    cache
        .write_conversation(&direct_conversation("c2", "carla", 4, Vec::new()))
        .unwrap();

    let before = cache.store().revision();
    cache.apply_conversation_opened(&c("c1")).unwrap();
    assert_eq!(cache.store().revision(), before + 1);
    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 4);

    let before = cache.store().revision();
    cache
        .apply_sent_message(&sent("m1", "c2", 0, "Hallo!"), None)
        .unwrap();
    assert_eq!(cache.store().revision(), before + 1);
    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 0);

    let before = cache.store().revision();
    cache
        .apply_received_message(&incoming("m2", "c1", 1, "Bist du da?"))
        .unwrap();
    assert_eq!(cache.store().revision(), before + 1);
    assert_eq!(cache.current_user().unwrap().unwrap().unread_messages, 1);
}
