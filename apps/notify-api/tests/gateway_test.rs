mod common;

use std::time::Duration;

use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;

use notify_api::config::Config;
use notify_api::models::notification::{NotificationDraft, NotificationType};

fn draft(title: &str) -> NotificationDraft {
    NotificationDraft::new(NotificationType::Event, title, "Doors open at 6pm")
        .with_link("/events/42")
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auth_registers_and_acks() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state.clone()).await;
    let user_id = common::new_user_id();

    let _ws = common::connect_and_auth(addr, &user_id).await;

    assert!(state.gateway.registry().contains_user(&user_id));
    assert_eq!(state.gateway.registry().get(&user_id).len(), 1);
}

#[tokio::test]
async fn auth_without_user_id_closes_with_policy_violation() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    for frame in [
        serde_json::json!({ "type": "auth" }),
        serde_json::json!({ "type": "auth", "userId": "" }),
        serde_json::json!({ "type": "auth", "userId": 42 }),
    ] {
        let mut ws = common::connect(addr).await;
        common::send_json(&mut ws, frame).await;

        let close = common::expect_close(&mut ws).await;
        assert_eq!(u16::from(close.code), 1008);
        assert_eq!(close.reason.as_str(), "User ID required");
    }

    assert_eq!(state.gateway.registry().connection_count(), 0);
}

#[tokio::test]
async fn silent_socket_is_closed_after_auth_timeout() {
    let config = Config {
        auth_timeout: Duration::from_millis(200),
        ..Config::default()
    };
    let (state, _store) = common::test_state_with(config);
    let addr = common::start_server(state.clone()).await;

    let mut ws = common::connect(addr).await;
    let close = common::expect_close(&mut ws).await;

    assert_eq!(u16::from(close.code), 4001);
    assert_eq!(close.reason.as_str(), "Authentication timeout");
    assert_eq!(state.gateway.registry().connection_count(), 0);
}

#[tokio::test]
async fn garbage_before_and_after_auth_is_ignored() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state.clone()).await;
    let user_id = common::new_user_id();

    let mut ws = common::connect(addr).await;
    ws.send(Message::Text("not json".into())).await.unwrap();
    common::send_json(&mut ws, serde_json::json!({ "type": "subscribe" })).await;
    common::send_json(&mut ws, serde_json::json!({ "type": "auth", "userId": user_id })).await;
    assert_eq!(common::next_json(&mut ws).await["type"], "auth_success");

    ws.send(Message::Binary(vec![0xde, 0xad].into())).await.unwrap();
    common::send_json(&mut ws, serde_json::json!({ "type": "auth", "userId": "usr_other" })).await;
    ws.send(Message::Text("{".into())).await.unwrap();

    state.dispatcher.notify_one(&user_id, &draft("Still here")).await.unwrap();
    let pushed = common::next_json(&mut ws).await;
    assert_eq!(pushed["type"], "notification");
    assert_eq!(pushed["data"]["title"], "Still here");
    assert!(!state.gateway.registry().contains_user("usr_other"));
}

#[tokio::test]
async fn oversized_text_is_ignored_and_huge_frame_drops_connection() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state.clone()).await;
    let user_id = common::new_user_id();
    let mut ws = common::connect_and_auth(addr, &user_id).await;

    // Over the parse limit but under the transport limit: ignored.
    let padded = format!(r#"{{"type":"auth","userId":"{}"}}"#, "x".repeat(100 * 1024));
    ws.send(Message::Text(padded.into())).await.unwrap();
    state.dispatcher.notify_one(&user_id, &draft("After padding")).await.unwrap();
    assert_eq!(common::next_json(&mut ws).await["data"]["title"], "After padding");

    // Over the transport limit: the read fails and the connection is dropped.
    let huge = "y".repeat(2 * 1024 * 1024);
    let _ = ws.send(Message::Text(huge.into())).await;
    common::eventually(|| state.gateway.registry().connection_count() == 0).await;
    assert!(!state.gateway.registry().contains_user(&user_id));
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispatched_notification_is_persisted_and_pushed() {
    let (state, store) = common::test_state();
    let addr = common::start_server(state.clone()).await;
    let user_id = common::new_user_id();
    let mut ws = common::connect_and_auth(addr, &user_id).await;

    let created = state
        .dispatcher
        .notify_one(&user_id, &draft("Youth night"))
        .await
        .unwrap();

    let pushed = common::next_json(&mut ws).await;
    assert_eq!(pushed["type"], "notification");
    assert_eq!(pushed["data"]["id"], created.id.as_str());
    assert_eq!(pushed["data"]["userId"], user_id.as_str());
    assert_eq!(pushed["data"]["type"], "EVENT");
    assert_eq!(pushed["data"]["link"], "/events/42");
    assert_eq!(pushed["data"]["read"], false);
    assert!(store.get(&created.id).is_some());
}

#[tokio::test]
async fn every_tab_of_a_user_receives_the_push() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state.clone()).await;
    let user_id = common::new_user_id();
    let other_id = common::new_user_id();

    let mut tab1 = common::connect_and_auth(addr, &user_id).await;
    let mut tab2 = common::connect_and_auth(addr, &user_id).await;
    let mut other = common::connect_and_auth(addr, &other_id).await;
    assert_eq!(state.gateway.registry().get(&user_id).len(), 2);

    state.dispatcher.notify_one(&user_id, &draft("Both tabs")).await.unwrap();

    assert_eq!(common::next_json(&mut tab1).await["data"]["title"], "Both tabs");
    assert_eq!(common::next_json(&mut tab2).await["data"]["title"], "Both tabs");
    common::expect_silence(&mut other, Duration::from_millis(200)).await;

    tab1.close(None).await.unwrap();
    let registry = state.gateway.registry().clone();
    let uid = user_id.clone();
    common::eventually(move || registry.get(&uid).len() == 1).await;

    state.dispatcher.notify_one(&user_id, &draft("One tab")).await.unwrap();
    assert_eq!(common::next_json(&mut tab2).await["data"]["title"], "One tab");
}

#[tokio::test]
async fn closing_last_connection_removes_user() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state.clone()).await;
    let user_id = common::new_user_id();

    let mut ws = common::connect_and_auth(addr, &user_id).await;
    ws.close(None).await.unwrap();

    let registry = state.gateway.registry().clone();
    common::eventually(move || registry.user_count() == 0).await;

    // Offline users still get the record.
    let created = state
        .dispatcher
        .notify_one(&user_id, &draft("Offline"))
        .await
        .unwrap();
    assert_eq!(created.user_id, user_id);
}

#[tokio::test]
async fn bulk_dispatch_skips_failed_user_and_pushes_the_rest() {
    let (state, store) = common::test_state();
    let addr = common::start_server(state.clone()).await;
    let (a, b, c) = (common::new_user_id(), common::new_user_id(), common::new_user_id());
    let mut ws_c = common::connect_and_auth(addr, &c).await;
    store.fail_for_user(&b);

    let created = state
        .dispatcher
        .notify_many(&[a.as_str(), b.as_str(), c.as_str()], &draft("Bulk"))
        .await;

    let owners: Vec<_> = created.iter().map(|n| n.user_id.clone()).collect();
    assert_eq!(owners, vec![a, c.clone()]);
    assert_eq!(common::next_json(&mut ws_c).await["data"]["userId"], c.as_str());
}

// ---------------------------------------------------------------------------
// Heartbeat and shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unresponsive_client_is_evicted_within_two_sweeps() {
    let (state, store) = common::test_state();
    let addr = common::start_server(state.clone()).await;
    let user_id = common::new_user_id();

    // The client never reads again, so it never answers the ping.
    let mut ws = common::connect_and_auth(addr, &user_id).await;

    let first = state.gateway.sweep();
    assert_eq!(first.pinged, 1);
    assert!(state.gateway.registry().contains_user(&user_id));

    let second = state.gateway.sweep();
    assert_eq!(second.evicted, 1);
    assert!(!state.gateway.registry().contains_user(&user_id));

    let close = common::expect_close(&mut ws).await;
    assert_eq!(u16::from(close.code), 4002);

    // Later notifications are still persisted but no longer pushed anywhere.
    let created = state.dispatcher.notify_one(&user_id, &draft("After eviction")).await.unwrap();
    assert!(store.get(&created.id).is_some());
    assert_eq!(state.gateway.deliver_to_user(&user_id, &created), 0);
}

#[tokio::test]
async fn pong_keeps_connection_registered() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state.clone()).await;
    let user_id = common::new_user_id();
    let mut ws = common::connect_and_auth(addr, &user_id).await;

    for _ in 0..3 {
        state.gateway.sweep();
        ws.send(Message::Pong(Default::default())).await.unwrap();

        let registry = state.gateway.registry().clone();
        let uid = user_id.clone();
        common::eventually(move || registry.get(&uid).iter().all(|h| h.is_alive())).await;
    }

    assert_eq!(state.gateway.sweep().evicted, 0);
    assert!(state.gateway.registry().contains_user(&user_id));
}

#[tokio::test]
async fn shutdown_closes_connections_with_going_away() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state.clone()).await;
    let user_id = common::new_user_id();
    let mut authed = common::connect_and_auth(addr, &user_id).await;
    let mut pending = common::connect(addr).await;

    state.gateway.shutdown();

    assert_eq!(u16::from(common::expect_close(&mut authed).await.code), 1001);
    assert_eq!(u16::from(common::expect_close(&mut pending).await.code), 1001);

    let registry = state.gateway.registry().clone();
    common::eventually(move || registry.connection_count() == 0).await;
}

#[tokio::test]
async fn stats_report_live_connections() {
    let (state, _store) = common::test_state();
    let addr = common::start_server(state.clone()).await;
    let user_id = common::new_user_id();
    let _tab1 = common::connect_and_auth(addr, &user_id).await;
    let _tab2 = common::connect_and_auth(addr, &user_id).await;

    let stats: serde_json::Value = reqwest::get(format!("http://{addr}/gateway/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(stats["users"], 1);
    assert_eq!(stats["connections"], 2);
}
