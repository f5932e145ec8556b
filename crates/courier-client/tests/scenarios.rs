//! End-to-end behaviour of the sync core against the in-memory store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use courier_client::{
    AuthProvider, ChatSyncCore, ErrorKind, MemoryAuthProvider, ParticipantUpdate, SendOutcome,
    SubscriptionKey, SyncConfig, SyncEvent,
};
use courier_shared::{UserId, ValidationError};
use courier_store::{
    FileCredentialStore, Fault, MemoryCredentialStore, MemoryStore, Message, Repository, StorePath,
    User,
};

async fn setup(ids: &[&str]) -> (Arc<MemoryStore>, ChatSyncCore) {
    let store = Arc::new(MemoryStore::new());
    let repo = Repository::new(store.clone());
    for id in ids {
        repo.put_user(&User::new(*id, format!("{id}@example.com"), *id))
            .await
            .unwrap();
    }
    let auth = Arc::new(MemoryAuthProvider::new(Arc::new(MemoryCredentialStore::new())));
    let core = ChatSyncCore::new(store.clone(), auth, SyncConfig::default());
    (store, core)
}

async fn with_session(user: &str, ids: &[&str]) -> (Arc<MemoryStore>, ChatSyncCore) {
    let (store, core) = setup(ids).await;
    let me = core.get_user(&user.into()).await.unwrap();
    core.start_session(me).await.unwrap();
    (store, core)
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

fn uid(id: &str) -> UserId {
    UserId::from(id)
}

#[tokio::test]
async fn create_chat_records_creator_and_participants() {
    let (_, core) = setup(&["u1", "u2"]).await;
    let write = core
        .create_chat("Team", &uid("u1"), [uid("u1"), uid("u2")], true)
        .await
        .unwrap();

    let chat = core.get_chat(&write.chat.id).await.unwrap();
    assert_eq!(chat.created_by, uid("u1"));
    assert_eq!(chat.participant_ids.iter().cloned().collect::<Vec<_>>(), [uid("u1"), uid("u2")]);
    assert!(chat.is_group_chat);
    assert!(write.membership.is_complete());
}

#[tokio::test]
async fn non_participant_send_writes_nothing() {
    let (store, core) = setup(&["u1", "u2", "u3"]).await;
    let chat = core
        .create_chat("Team", &uid("u1"), [uid("u2")], true)
        .await
        .unwrap()
        .chat;

    let writes = store.write_count();
    let err = core
        .send_message(&chat.id, &uid("u3"), "Carol", "hello")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ValidationError::NotParticipant {
            user: uid("u3"),
            chat: chat.id.clone(),
        }
        .into()
    );
    assert_eq!(store.write_count(), writes);
    assert!(core.chat_messages(&chat.id, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_push_renders_once() {
    let (_, core) = with_session("u1", &["u1", "u2"]).await;
    let chat = core
        .create_chat("Pair", &uid("u1"), [uid("u2")], false)
        .await
        .unwrap()
        .chat;
    core.select_chat(&chat.id).await.unwrap();

    let mut message = Message::new(chat.id.clone(), uid("u2"), "Bob", "hi", chrono::Utc::now());
    message.is_read = true;
    assert!(core.apply_incoming_message(message.clone()));
    assert!(!core.apply_incoming_message(message));
    assert_eq!(core.messages().len(), 1);
}

#[tokio::test]
async fn unread_count_tracks_mark_as_read() {
    let (_, core) = setup(&["u1", "u2"]).await;
    let chat = core
        .create_chat("Pair", &uid("u1"), [uid("u2")], false)
        .await
        .unwrap()
        .chat;

    let mut sent = Vec::new();
    for text in ["one", "two", "three"] {
        let outcome = core.send_message(&chat.id, &uid("u2"), "Bob", text).await.unwrap();
        sent.push(outcome.into_message());
    }
    core.send_message(&chat.id, &uid("u1"), "Alice", "mine").await.unwrap();

    assert_eq!(core.unread_messages_count(&uid("u1")).await.unwrap(), 3);
    for message in &sent {
        core.mark_as_read(&chat.id, &message.id).await.unwrap();
    }
    assert_eq!(core.unread_messages_count(&uid("u1")).await.unwrap(), 0);
}

#[tokio::test]
async fn switching_chats_stops_previous_stream() {
    let (store, core) = with_session("u1", &["u1"]).await;
    let a = core
        .create_chat("A", &uid("u1"), [uid("u1")], false)
        .await
        .unwrap()
        .chat;
    let b = core
        .create_chat("B", &uid("u1"), [uid("u1")], false)
        .await
        .unwrap()
        .chat;
    let path_a = StorePath::messages(&a.id).unwrap();

    core.select_chat(&a.id).await.unwrap();
    core.select_chat(&b.id).await.unwrap();
    assert_eq!(core.open_chat(), Some(b.id.clone()));
    assert!(!core.is_subscribed(&SubscriptionKey::ChatMessages(a.id.clone())));

    eventually(|| {
        let store = store.clone();
        let path = path_a.clone();
        async move { store.subscriber_count(&path) == 0 }
    })
    .await;

    let mut events = core.subscribe_events();
    let late = Message::new(a.id.clone(), uid("u1"), "u1", "late", chrono::Utc::now());
    core.repository().put_message(&late).await.unwrap();
    let on_b = Message::new(b.id.clone(), uid("u1"), "u1", "current", chrono::Utc::now());
    core.repository().put_message(&on_b).await.unwrap();

    // The write to B is delivered, so anything from A would have been too.
    loop {
        match tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap()
        {
            SyncEvent::MessageAdded { chat_id, message_id } => {
                assert_eq!(chat_id, b.id);
                assert_eq!(message_id, on_b.id);
                break;
            }
            _ => continue,
        }
    }
    assert!(core.messages().iter().all(|m| m.chat_id == b.id));
}

#[tokio::test]
async fn removing_last_participant_deletes_chat() {
    let (_, core) = setup(&["u1", "u2"]).await;
    let chat = core
        .create_chat("Pair", &uid("u1"), [uid("u2")], true)
        .await
        .unwrap()
        .chat;
    core.send_message(&chat.id, &uid("u1"), "Alice", "bye").await.unwrap();

    match core.remove_participant(&chat.id, &uid("u1")).await.unwrap() {
        ParticipantUpdate::Updated(write) => {
            assert_eq!(write.chat.participant_ids.iter().cloned().collect::<Vec<_>>(), [uid("u2")]);
        }
        other => panic!("expected an update, got {other:?}"),
    }
    assert!(core.get_user_chats(&uid("u1")).await.unwrap().is_empty());
    assert_eq!(core.get_user_chats(&uid("u2")).await.unwrap().len(), 1);

    match core.remove_participant(&chat.id, &uid("u2")).await.unwrap() {
        ParticipantUpdate::ChatDeleted { chat_id, membership } => {
            assert_eq!(chat_id, chat.id);
            assert!(membership.is_complete());
        }
        other => panic!("expected deletion, got {other:?}"),
    }
    assert_eq!(core.get_chat(&chat.id).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert!(core.repository().list_messages(&chat.id).await.unwrap().is_empty());
    for user in ["u1", "u2"] {
        assert!(core.get_user_chats(&uid(user)).await.unwrap().is_empty());
        assert!(core.get_user(&uid(user)).await.unwrap().chat_ids.is_empty());
    }
}

#[tokio::test]
async fn summary_write_failure_is_reported_not_lost() {
    let (store, core) = setup(&["u1"]).await;
    let chat = core
        .create_chat("Solo", &uid("u1"), [uid("u1")], false)
        .await
        .unwrap()
        .chat;
    store.inject_fault(Fault::on_writes(StorePath::chat(&chat.id).unwrap()).denied().times(1));

    let outcome = core.send_message(&chat.id, &uid("u1"), "Alice", "hi").await.unwrap();
    let SendOutcome::PartialFailure { written, summary_error } = outcome else {
        panic!("expected a partial failure");
    };
    assert_eq!(summary_error.kind(), ErrorKind::Permission);
    assert_eq!(core.chat_messages(&chat.id, 10).await.unwrap(), [written]);
    assert_eq!(core.get_chat(&chat.id).await.unwrap().last_message, "");

    // The next send repairs the summary.
    let next = core.send_message(&chat.id, &uid("u1"), "Alice", "again").await.unwrap();
    assert!(next.is_delivered());
    assert_eq!(core.get_chat(&chat.id).await.unwrap().last_message, "again");
}

#[tokio::test]
async fn compose_rollback_then_retry() {
    let (store, core) = with_session("u1", &["u1"]).await;
    let chat = core
        .create_chat("Solo", &uid("u1"), [uid("u1")], false)
        .await
        .unwrap()
        .chat;
    core.select_chat(&chat.id).await.unwrap();
    store.inject_fault(Fault::on_writes(StorePath::messages(&chat.id).unwrap()).times(1));

    core.set_draft("draft text");
    assert_eq!(core.submit_draft().await.unwrap_err().kind(), ErrorKind::Remote);
    assert_eq!(core.draft(), "draft text");
    assert!(core.messages().is_empty());

    let token = core.failed_sends()[0].token;
    let outcome = core.retry_send(token).await.unwrap();
    assert!(outcome.is_delivered());
    assert_eq!(core.draft(), "");
    assert_eq!(core.messages().len(), 1);
}

#[tokio::test]
async fn fan_out_reports_each_failure() {
    let (store, core) = setup(&["u1", "u2", "u3"]).await;
    store.inject_fault(Fault::on_writes(StorePath::user(&uid("u3")).unwrap()).denied());

    let write = core
        .create_chat("Team", &uid("u1"), [uid("u2"), uid("u3"), uid("ghost")], true)
        .await
        .unwrap();

    let mut failed: Vec<_> = write
        .membership
        .failed
        .iter()
        .map(|(user, err)| (user.clone(), err.kind()))
        .collect();
    failed.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        failed,
        [(uid("ghost"), ErrorKind::NotFound), (uid("u3"), ErrorKind::Permission)]
    );
    assert_eq!(write.membership.succeeded.len(), 2);
}

#[tokio::test]
async fn remote_chat_activity_updates_unread_badge() {
    let (_, core) = with_session("u1", &["u1", "u2"]).await;
    let chat = core
        .create_chat("Pair", &uid("u2"), [uid("u1")], false)
        .await
        .unwrap()
        .chat;

    // Another client sends as u2: message write, then summary write.
    let message = Message::new(chat.id.clone(), uid("u2"), "Bob", "ping", chrono::Utc::now());
    let repo = core.repository().clone();
    repo.put_message(&message).await.unwrap();
    repo.update_chat_summary(&chat.id, &message).await.unwrap();

    eventually(|| {
        let core = core.clone();
        async move { core.unread_total() == 1 }
    })
    .await;
    assert_eq!(core.chats()[0].last_message, "ping");
}

#[tokio::test]
async fn file_backed_credentials_follow_sign_in() {
    let dir = tempfile::tempdir().unwrap();
    let creds = Arc::new(FileCredentialStore::open_at(dir.path()).unwrap());
    let auth = MemoryAuthProvider::new(creds.clone());

    auth.set_remember_me(true);
    let user = auth.register("alice@example.com", "alice", "secret1").await.unwrap();
    assert_eq!(
        auth.remembered_email().unwrap().as_deref(),
        Some("alice@example.com")
    );
    assert_eq!(auth.restore().unwrap().map(|u| u.id), Some(user.id));

    assert!(auth.logout().await.unwrap());
    assert!(auth.restore().unwrap().is_none());
    assert!(!auth.is_authenticated());
    // The remembered email outlives the session.
    assert!(auth.remembered_email().unwrap().is_some());
}
