mod common;

use common::{drain_events, next_event, TestApp};
use chat_realtime_service::error::AppError;
use chat_realtime_service::storage::Storage;
use uuid::Uuid;

#[tokio::test]
async fn sender_gets_flagged_echo_and_members_get_plain_copy() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;
    let bob = app.storage.add_user("bob").await;
    let chat = app
        .storage
        .create_chat(alice.id, Some("pair"), &[alice.id, bob.id])
        .await
        .unwrap();

    let (_, mut alice_rx) = app.connect(alice.id).await;
    let (_, mut bob_rx) = app.connect(bob.id).await;
    drain_events(&mut alice_rx); // snapshot + presence noise
    drain_events(&mut bob_rx);

    let message = app
        .dispatcher
        .send_message(alice.id, chat.id, "hello")
        .await
        .unwrap();

    let echo = next_event(&mut alice_rx);
    assert_eq!(echo["type"], "message.new");
    assert_eq!(echo["is_from_caller"], true);
    assert_eq!(echo["message_id"], message.id.to_string());

    let copy = next_event(&mut bob_rx);
    assert_eq!(copy["type"], "message.new");
    assert_eq!(copy["is_from_caller"], false);
    assert_eq!(copy["content"], "hello");
    assert_eq!(copy["sender_id"], alice.id.to_string());

    // exactly one copy each, one durable row
    assert!(alice_rx.try_recv().is_err());
    assert!(bob_rx.try_recv().is_err());
    assert_eq!(app.storage.message_count(chat.id).await, 1);
}

#[tokio::test]
async fn offline_members_miss_the_broadcast_but_the_row_persists() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;
    let bob = app.storage.add_user("bob").await;
    let chat = app
        .storage
        .create_chat(alice.id, None, &[alice.id, bob.id])
        .await
        .unwrap();

    // bob never connects
    let (_, mut alice_rx) = app.connect(alice.id).await;
    drain_events(&mut alice_rx);

    app.dispatcher
        .send_message(alice.id, chat.id, "anyone there?")
        .await
        .unwrap();

    assert_eq!(next_event(&mut alice_rx)["is_from_caller"], true);
    assert_eq!(app.storage.message_count(chat.id).await, 1);
}

#[tokio::test]
async fn non_member_cannot_send() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;
    let mallory = app.storage.add_user("mallory").await;
    let chat = app
        .storage
        .create_chat(alice.id, None, &[alice.id])
        .await
        .unwrap();

    let err = app
        .dispatcher
        .send_message(mallory.id, chat.id, "let me in")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    assert_eq!(app.storage.message_count(chat.id).await, 0);
}

#[tokio::test]
async fn empty_content_and_missing_chat_are_rejected_before_any_write() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;
    let chat = app
        .storage
        .create_chat(alice.id, None, &[alice.id])
        .await
        .unwrap();

    assert!(matches!(
        app.dispatcher
            .send_message(alice.id, chat.id, "   ")
            .await
            .unwrap_err(),
        AppError::BadRequest(_)
    ));
    assert!(matches!(
        app.dispatcher
            .send_message(alice.id, Uuid::new_v4(), "hi")
            .await
            .unwrap_err(),
        AppError::NotFound
    ));
    assert_eq!(app.storage.message_count(chat.id).await, 0);
}

#[tokio::test]
async fn messages_arrive_in_send_order_per_connection() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;
    let bob = app.storage.add_user("bob").await;
    let chat = app
        .storage
        .create_chat(alice.id, None, &[alice.id, bob.id])
        .await
        .unwrap();

    let (_, mut bob_rx) = app.connect(bob.id).await;
    drain_events(&mut bob_rx);

    for i in 0..20 {
        app.dispatcher
            .send_message(alice.id, chat.id, &format!("m{i}"))
            .await
            .unwrap();
    }

    let received = drain_events(&mut bob_rx);
    let contents: Vec<&str> = received
        .iter()
        .filter(|e| e["type"] == "message.new")
        .map(|e| e["content"].as_str().unwrap())
        .collect();
    let expected: Vec<String> = (0..20).map(|i| format!("m{i}")).collect();
    assert_eq!(contents, expected);
}

#[tokio::test]
async fn typing_indicator_excludes_the_sender_and_persists_nothing() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;
    let bob = app.storage.add_user("bob").await;
    let chat = app
        .storage
        .create_chat(alice.id, None, &[alice.id, bob.id])
        .await
        .unwrap();

    let (_, mut alice_rx) = app.connect(alice.id).await;
    let (_, mut bob_rx) = app.connect(bob.id).await;
    drain_events(&mut alice_rx);
    drain_events(&mut bob_rx);

    app.dispatcher.typing(alice.id, chat.id, true).await.unwrap();

    let seen = next_event(&mut bob_rx);
    assert_eq!(seen["type"], "typing.started");
    assert_eq!(seen["user_id"], alice.id.to_string());
    assert!(alice_rx.try_recv().is_err());
    assert_eq!(app.storage.message_count(chat.id).await, 0);
}

#[tokio::test]
async fn typing_in_a_missing_chat_is_not_found() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;

    // an absent chat is not-found, the same as the other chat operations;
    // forbidden is reserved for existing chats the caller is no member of
    assert!(matches!(
        app.dispatcher
            .typing(alice.id, Uuid::new_v4(), true)
            .await
            .unwrap_err(),
        AppError::NotFound
    ));

    let bob = app.storage.add_user("bob").await;
    let chat = app
        .storage
        .create_chat(bob.id, None, &[bob.id])
        .await
        .unwrap();
    assert!(matches!(
        app.dispatcher
            .typing(alice.id, chat.id, true)
            .await
            .unwrap_err(),
        AppError::Forbidden
    ));
}

#[tokio::test]
async fn read_mark_acks_only_the_caller() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;
    let bob = app.storage.add_user("bob").await;
    let chat = app
        .storage
        .create_chat(alice.id, None, &[alice.id, bob.id])
        .await
        .unwrap();

    let (_, mut alice_rx) = app.connect(alice.id).await;
    let (_, mut bob_rx) = app.connect(bob.id).await;
    drain_events(&mut alice_rx);
    drain_events(&mut bob_rx);

    app.dispatcher.mark_read(alice.id, chat.id).await.unwrap();

    let ack = next_event(&mut alice_rx);
    assert_eq!(ack["type"], "message.read");
    assert!(bob_rx.try_recv().is_err());
}
