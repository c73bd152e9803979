mod common;

use common::{drain_events, next_event, TestApp};
use chat_realtime_service::storage::Storage;
use tokio::sync::mpsc::error::TryRecvError;

#[tokio::test]
async fn fresh_connection_receives_its_snapshot_first() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;
    let bob = app.storage.add_user("bob").await;
    let chat = app
        .storage
        .create_chat(bob.id, Some("general"), &[alice.id, bob.id])
        .await
        .unwrap();
    app.storage
        .create_message(chat.id, bob.id, "welcome")
        .await
        .unwrap();
    app.storage
        .create_friend_request(bob.id, alice.id)
        .await
        .unwrap();

    let (_, mut rx) = app.connect(alice.id).await;

    let snapshot = next_event(&mut rx);
    assert_eq!(snapshot["type"], "session.snapshot");
    assert_eq!(snapshot["chats"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["chats"][0]["chat_id"], chat.id.to_string());
    assert_eq!(snapshot["pending_requests"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["blocked"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn friends_see_one_online_event_after_the_registry_committed() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;
    let fred = app.storage.add_user("fred").await;
    app.storage.befriend(alice.id, fred.id).await;

    let (_, mut fred_rx) = app.connect(fred.id).await;
    drain_events(&mut fred_rx);

    app.connect(alice.id).await;

    let events = drain_events(&mut fred_rx);
    let presence: Vec<_> = events
        .iter()
        .filter(|e| e["type"] == "presence.updated")
        .collect();
    assert_eq!(presence.len(), 1);
    assert_eq!(presence[0]["user_id"], alice.id.to_string());
    assert_eq!(presence[0]["is_online"], true);

    // the announcement never contradicts the registry
    assert!(app.registry.lookup(alice.id).await.is_some());
}

#[tokio::test]
async fn disconnect_deregisters_then_announces_offline_exactly_once() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;
    let fred = app.storage.add_user("fred").await;
    app.storage.befriend(alice.id, fred.id).await;

    let (alice_conn, _alice_rx) = app.connect(alice.id).await;
    let (_, mut fred_rx) = app.connect(fred.id).await;
    drain_events(&mut fred_rx);

    app.sessions.on_disconnect(alice.id, alice_conn).await;
    assert!(app.registry.lookup(alice.id).await.is_none());

    // double invocation is a no-op
    app.sessions.on_disconnect(alice.id, alice_conn).await;

    let events = drain_events(&mut fred_rx);
    let offline: Vec<_> = events
        .iter()
        .filter(|e| e["type"] == "presence.updated" && e["is_online"] == false)
        .collect();
    assert_eq!(offline.len(), 1);
    assert_eq!(offline[0]["user_id"], alice.id.to_string());
}

#[tokio::test]
async fn reconnect_supersedes_and_routes_only_to_the_new_device() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;
    let bob = app.storage.add_user("bob").await;
    let chat = app
        .storage
        .create_chat(alice.id, None, &[alice.id, bob.id])
        .await
        .unwrap();

    let (old_conn, mut old_rx) = app.connect(alice.id).await;
    let (_, mut new_rx) = app.connect(alice.id).await;
    drain_events(&mut old_rx);
    drain_events(&mut new_rx);

    app.dispatcher
        .send_message(bob.id, chat.id, "which device?")
        .await
        .unwrap();

    let delivered = next_event(&mut new_rx);
    assert_eq!(delivered["type"], "message.new");
    assert_eq!(delivered["content"], "which device?");

    // supersession dropped the only sender, so the old queue is closed
    // outright and its transport loop can tear itself down
    assert!(matches!(old_rx.try_recv(), Err(TryRecvError::Disconnected)));

    // the old transport's late disconnect must not evict the new connection
    app.sessions.on_disconnect(alice.id, old_conn).await;
    assert!(app.registry.lookup(alice.id).await.is_some());
}

#[tokio::test]
async fn presence_audience_spans_friends_and_chat_co_members() {
    let app = TestApp::new();
    let alice = app.storage.add_user("alice").await;
    let friend = app.storage.add_user("friend").await;
    let coworker = app.storage.add_user("coworker").await;
    let stranger = app.storage.add_user("stranger").await;
    app.storage.befriend(alice.id, friend.id).await;
    app.storage
        .create_chat(alice.id, Some("work"), &[alice.id, coworker.id])
        .await
        .unwrap();

    let (_, mut friend_rx) = app.connect(friend.id).await;
    let (_, mut coworker_rx) = app.connect(coworker.id).await;
    let (_, mut stranger_rx) = app.connect(stranger.id).await;
    drain_events(&mut friend_rx);
    drain_events(&mut coworker_rx);
    drain_events(&mut stranger_rx);

    app.connect(alice.id).await;

    assert_eq!(next_event(&mut friend_rx)["type"], "presence.updated");
    assert_eq!(next_event(&mut coworker_rx)["type"], "presence.updated");
    assert!(stranger_rx.try_recv().is_err());
}
