//! Reconciliation must not depend on the order or repetition of deliveries.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use courier_client::{ChatList, MessageTimeline};
use courier_shared::{ChatId, MessageId, UserId};
use courier_store::{ChatRoom, Message};

fn message(id: u8, secs: i64) -> Message {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let mut m = Message::new(
        ChatId::from("c1"),
        UserId::from("u1"),
        "Alice",
        format!("m{id}"),
        base + Duration::seconds(secs),
    );
    m.id = MessageId::from(format!("m{id:03}").as_str());
    m
}

fn chat(id: u8, secs: i64) -> ChatRoom {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let mut c = ChatRoom::new(format!("chat {id}"), UserId::from("u1"), Vec::<UserId>::new(), false);
    c.id = ChatId::from(format!("c{id:03}").as_str());
    c.last_message_time = base + Duration::seconds(secs);
    c
}

/// Distinct ids with arbitrary (possibly colliding) timestamps.
fn messages() -> impl Strategy<Value = Vec<Message>> {
    prop::collection::btree_map(any::<u8>(), 0i64..20, 1..40)
        .prop_map(|m| m.into_iter().map(|(id, secs)| message(id, secs)).collect())
}

proptest! {
    #[test]
    fn timeline_is_order_independent(
        batch in messages(),
        order in any::<u64>(),
        repeats in prop::collection::vec(any::<prop::sample::Index>(), 0..20),
    ) {
        let mut expected = batch.clone();
        expected.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let mut shuffled = batch.clone();
        for (i, idx) in repeats.iter().enumerate() {
            // Duplicate deliveries mixed into the stream.
            shuffled.push(batch[idx.index(batch.len())].clone());
            let len = shuffled.len();
            let j = (order as usize).wrapping_add(i) % len;
            shuffled.swap(i % len, j);
        }
        shuffled.reverse();

        let mut timeline = MessageTimeline::new();
        let inserted = timeline.extend(shuffled);

        prop_assert_eq!(inserted, batch.len());
        prop_assert_eq!(timeline.as_slice(), expected.as_slice());
    }

    #[test]
    fn chat_list_sorted_after_any_upserts(
        updates in prop::collection::vec((0u8..12, 0i64..50), 1..60),
    ) {
        let mut list = ChatList::new();
        let mut latest = std::collections::HashMap::new();
        for (id, secs) in &updates {
            list.upsert(chat(*id, *secs));
            latest.insert(*id, *secs);
        }

        prop_assert_eq!(list.len(), latest.len());
        for pair in list.as_slice().windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(
                a.last_message_time > b.last_message_time
                    || (a.last_message_time == b.last_message_time && a.id < b.id)
            );
        }
        for (id, secs) in latest {
            let cached = list.get(&chat(id, secs).id).unwrap();
            prop_assert_eq!(cached.last_message_time, chat(id, secs).last_message_time);
        }
    }
}
