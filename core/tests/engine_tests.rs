/// Engine integration tests: the full client wired to a real-TCP fake
/// gateway and an in-memory REST collaborator.
mod support;

use chrono::{Duration as ChronoDuration, Utc};
use homelink_core::{
    ChatClient, ChatError, ChatMessage, ClientEvent, Config, Contact, HistoryState, Role,
    ServerEvent, UserId,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use support::{FakeGateway, MemoryApi};
use tokio::time::{sleep, timeout};

fn test_config(addr: SocketAddr) -> Config {
    Config {
        server_addr: addr,
        local_user_id: 1,
        local_role: Role::User,
        connect_timeout: Duration::from_secs(2),
        retry_interval: Duration::from_millis(50),
        retry_jitter: Duration::from_millis(10),
        typing_stop_after: Duration::from_millis(150),
        typing_expiry: Duration::from_millis(300),
        ..Config::default()
    }
}

fn msg(id: Option<i64>, sender: UserId, recipient: UserId, content: &str, secs_ago: i64) -> ChatMessage {
    ChatMessage {
        id,
        sender_id: sender,
        recipient_id: recipient,
        content: content.to_string(),
        created_at: Utc::now() - ChronoDuration::seconds(secs_ago),
    }
}

fn contact(id: UserId, name: &str, role: Role, unread: u32) -> Contact {
    Contact {
        id,
        display_name: name.to_string(),
        avatar_url: None,
        role,
        last_message: None,
        last_message_at: None,
        introduced_at: Utc::now(),
        unread_count: unread,
        online: false,
    }
}

/// Build a started engine and consume the registration handshake
async fn setup() -> (FakeGateway, ChatClient, Arc<MemoryApi>) {
    let mut gateway = FakeGateway::start().await;
    let api = MemoryApi::new();
    let client = ChatClient::new(test_config(gateway.addr), api.clone());
    client.start().await.unwrap();

    assert_eq!(
        gateway.expect_event().await,
        ClientEvent::Register { user_id: 1 }
    );
    assert_eq!(gateway.expect_event().await, ClientEvent::PresenceRequest);

    (gateway, client, api)
}

/// Poll an async condition until it holds, failing the test after 2s
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(Duration::from_secs(2), async {
        loop {
            if check().await {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_live_message_during_history_fetch_lands_after_replace() {
    let (mut gateway, client, api) = setup().await;
    api.set_history(vec![
        msg(Some(1), 2, 1, "m1", 60),
        msg(Some(2), 1, 2, "m2", 30),
    ])
    .await;
    let release = api.hold_next_history().await;

    let opener = {
        let client = client.clone();
        tokio::spawn(async move { client.open_conversation(2).await })
    };

    // The open intent reaches the server while the fetch is held in flight
    gateway
        .expect_matching(|e| matches!(e, ClientEvent::HistoryOpen { .. }))
        .await;

    // m3 arrives live before the fetch resolves; it must be queued
    gateway.push(&ServerEvent::Message {
        message: msg(Some(3), 2, 1, "m3", 0),
    });
    sleep(Duration::from_millis(100)).await;
    assert!(client.messages().await.is_empty());

    release.send(()).unwrap();
    opener.await.unwrap().unwrap();

    let contents: Vec<String> = client
        .messages()
        .await
        .iter()
        .map(|m| m.content.clone())
        .collect();
    assert_eq!(contents, vec!["m1", "m2", "m3"]);
    assert_eq!(client.history_state().await, HistoryState::Loaded);
    // The open conversation accrues no unread
    assert_eq!(client.unread_count(2).await, 0);
}

#[tokio::test]
async fn test_unread_optimistic_authoritative_and_reset_on_open() {
    let (gateway, client, _api) = setup().await;

    // Optimistic increment for a conversation that is not open
    gateway.push(&ServerEvent::Message {
        message: msg(Some(10), 3, 1, "oi", 0),
    });
    eventually(|| {
        let c = client.clone();
        async move { c.unread_count(3).await == 1 }
    })
    .await;

    // The authoritative push overwrites, never adds
    gateway.push(&ServerEvent::UnreadUpdate { peer_id: 3, total: 7 });
    eventually(|| {
        let c = client.clone();
        async move { c.unread_count(3).await == 7 }
    })
    .await;

    // A negative total is a server bug; clamped, never shown
    gateway.push(&ServerEvent::UnreadUpdate {
        peer_id: 3,
        total: -2,
    });
    eventually(|| {
        let c = client.clone();
        async move { c.unread_count(3).await == 0 }
    })
    .await;

    gateway.push(&ServerEvent::Message {
        message: msg(Some(11), 3, 1, "tudo bem?", 0),
    });
    eventually(|| {
        let c = client.clone();
        async move { c.unread_count(3).await == 1 }
    })
    .await;

    // Opening zeroes immediately, whatever the prior value
    client.open_conversation(3).await.unwrap();
    assert_eq!(client.unread_count(3).await, 0);
    assert_eq!(client.unread_total().await, 0);
}

#[tokio::test]
async fn test_self_message_never_reaches_the_transport() {
    let (mut gateway, client, _api) = setup().await;

    let result = client.send_message(1, "hi").await;
    assert!(matches!(result, Err(ChatError::SelfMessage)));
    gateway.expect_silence(Duration::from_millis(200)).await;
    assert!(client.messages().await.is_empty());
}

#[tokio::test]
async fn test_typing_indicator_expires_without_an_explicit_stop() {
    let (mut gateway, client, _api) = setup().await;
    client.open_conversation(7).await.unwrap();
    gateway
        .expect_matching(|e| matches!(e, ClientEvent::HistoryOpen { .. }))
        .await;

    gateway.push(&ServerEvent::PeerTypingStart { sender_id: 7 });
    eventually(|| {
        let c = client.clone();
        async move { c.typing_peer().await == Some(7) }
    })
    .await;

    // No stop ever arrives; the indicator must clear within the window
    eventually(|| {
        let c = client.clone();
        async move { c.typing_peer().await.is_none() }
    })
    .await;
}

#[tokio::test]
async fn test_explicit_typing_stop_clears_the_indicator() {
    let (gateway, client, _api) = setup().await;
    client.open_conversation(7).await.unwrap();

    gateway.push(&ServerEvent::PeerTypingStart { sender_id: 7 });
    eventually(|| {
        let c = client.clone();
        async move { c.typing_peer().await == Some(7) }
    })
    .await;

    gateway.push(&ServerEvent::PeerTypingStop { sender_id: 7 });
    eventually(|| {
        let c = client.clone();
        async move { c.typing_peer().await.is_none() }
    })
    .await;
}

#[tokio::test]
async fn test_local_typing_burst_emits_one_start_then_stop_after_idle() {
    let (mut gateway, client, _api) = setup().await;

    client.notify_typing(2).await.unwrap();
    client.notify_typing(2).await.unwrap();
    client.notify_typing(2).await.unwrap();

    assert_eq!(
        gateway.expect_event().await,
        ClientEvent::TypingStart {
            sender_id: 1,
            recipient_id: 2,
        }
    );
    // The very next outbound event is the debounced stop, proving the
    // repeated keystrokes emitted no duplicate starts
    assert_eq!(
        gateway.expect_event().await,
        ClientEvent::TypingStop {
            sender_id: 1,
            recipient_id: 2,
        }
    );
}

#[tokio::test]
async fn test_preview_for_unknown_peer_is_dropped() {
    let (gateway, client, api) = setup().await;
    api.set_contacts(vec![contact(2, "Ana Corretora", Role::Corretor, 0)])
        .await;
    client.refresh_contacts().await.unwrap();

    gateway.push(&ServerEvent::ConversationPreview {
        peer_id: 42,
        last_message: "de quem?".to_string(),
        last_message_at: Utc::now(),
    });
    gateway.push(&ServerEvent::ConversationPreview {
        peer_id: 2,
        last_message: "nova".to_string(),
        last_message_at: Utc::now(),
    });

    eventually(|| {
        let c = client.clone();
        async move {
            let list = c.conversations("").await;
            list.len() == 1 && list[0].last_message.as_deref() == Some("nova")
        }
    })
    .await;
}

#[tokio::test]
async fn test_refresh_contacts_merges_presence_and_seeds_unread() {
    let (gateway, client, api) = setup().await;
    api.set_contacts(vec![
        contact(2, "Ana Corretora", Role::Corretor, 3),
        contact(5, "Outro Usuário", Role::User, 1),
    ])
    .await;

    gateway.push(&ServerEvent::PresenceSnapshot { user_ids: vec![2] });
    eventually(|| {
        let c = client.clone();
        async move { c.is_online(2).await }
    })
    .await;

    client.refresh_contacts().await.unwrap();

    // Role USER only sees the broker, with presence and unread merged in
    let list = client.conversations("").await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, 2);
    assert!(list[0].online);
    assert_eq!(list[0].unread_count, 3);
    assert_eq!(client.unread_count(2).await, 3);
}

#[tokio::test]
async fn test_failed_history_fetch_is_retryable() {
    let (mut gateway, client, api) = setup().await;
    api.set_history_failing(true);

    assert!(client.open_conversation(2).await.is_err());
    assert_eq!(client.history_state().await, HistoryState::Failed);
    assert!(client.messages().await.is_empty());
    gateway
        .expect_matching(|e| matches!(e, ClientEvent::HistoryOpen { .. }))
        .await;

    // Reopening retries the fetch
    api.set_history_failing(false);
    api.set_history(vec![msg(Some(1), 2, 1, "m1", 10)]).await;
    client.open_conversation(2).await.unwrap();
    assert_eq!(client.history_state().await, HistoryState::Loaded);
    assert_eq!(client.messages().await.len(), 1);
}

#[tokio::test]
async fn test_server_echo_reconciles_with_optimistic_send() {
    let (mut gateway, client, _api) = setup().await;
    client.open_conversation(2).await.unwrap();

    client.send_message(2, "oi").await.unwrap();
    let sent = gateway
        .expect_matching(|e| matches!(e, ClientEvent::SendMessage { .. }))
        .await;
    let ClientEvent::SendMessage { message } = sent else {
        unreachable!()
    };
    assert!(message.id.is_none());
    assert_eq!(client.messages().await.len(), 1);

    // The echo is the same logical message, now carrying the server id
    let echo = ChatMessage {
        id: Some(77),
        ..message
    };
    gateway.push(&ServerEvent::Message { message: echo });

    eventually(|| {
        let c = client.clone();
        async move {
            let messages = c.messages().await;
            messages.len() == 1 && messages[0].id == Some(77)
        }
    })
    .await;
}
