mod common;

use std::time::Duration;

use common::{default_server, pair};
use serde_json::json;

#[tokio::test]
async fn msg_reaches_target_only() {
    let server = default_server().await;
    let (mut alice, mut bob) = pair(server.addr, "alice", "bob").await;

    alice.send("/msg bob hello there").await;
    bob.expect_text("(Private) alice: hello there").await;
    alice.expect_silence(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn msg_to_absent_user_reports_not_found() {
    let server = default_server().await;
    let (mut alice, _bob) = pair(server.addr, "alice", "bob").await;

    alice.send("/msg ghost hi").await;
    alice.expect_text("User 'ghost' not found.").await;
    alice.send("/whisper ghost hi").await;
    alice.expect_text("User 'ghost' not found.").await;
}

#[tokio::test]
async fn usage_strings_for_missing_arguments() {
    let server = default_server().await;
    let (mut alice, _bob) = pair(server.addr, "alice", "bob").await;

    alice.send("/msg bob").await;
    alice.expect_text("Usage: /msg [username] [message]").await;
    alice.send("/whisper").await;
    alice.expect_text("Usage: /whisper [username] [message]").await;
    alice.send("/mute").await;
    alice.expect_text("Usage: /mute [username]").await;
}

#[tokio::test]
async fn whisper_is_json_and_acknowledged() {
    let server = default_server().await;
    let (mut alice, mut bob) = pair(server.addr, "alice", "bob").await;

    alice.send("/whisper bob meet at the well").await;
    assert_eq!(
        bob.recv_json().await,
        json!({"type": "whisper", "from": "alice", "message": "meet at the well"})
    );
    alice.expect_text("Message sent.").await;
}

#[tokio::test]
async fn mute_list_filters_direct_messages() {
    let server = default_server().await;
    let (mut alice, mut bob) = pair(server.addr, "alice", "bob").await;

    bob.send("/mute alice").await;
    assert_eq!(
        bob.recv_json().await,
        json!({"type": "success", "message": "Muted alice"})
    );
    bob.send("/mute alice").await;
    assert_eq!(
        bob.recv_json().await,
        json!({"type": "error", "message": "alice already exists in the muted users"})
    );

    alice.send("/msg bob are you there").await;
    alice.send("/whisper bob hello?").await;
    alice.expect_text("Message sent.").await;
    bob.expect_silence(Duration::from_millis(150)).await;

    bob.send("/unmute alice").await;
    assert_eq!(bob.recv_json().await["message"], "Unmuted alice");
    bob.send("/unmute alice").await;
    assert_eq!(
        bob.recv_json().await,
        json!({"type": "error", "message": "alice is not in the mute list to unmute"})
    );

    alice.send("/msg bob back again").await;
    bob.expect_text("(Private) alice: back again").await;
}

#[tokio::test]
async fn list_and_broadcast() {
    let server = default_server().await;
    let (mut alice, mut bob) = pair(server.addr, "alice", "bob").await;

    alice.send("/list").await;
    alice.expect_text("Connected users:").await;
    alice.expect_text(" - alice").await;
    alice.expect_text(" - bob").await;

    bob.send("/broadcast").await;
    alice.expect_text("bob has requested a broadcast!").await;
    bob.expect_text("bob has requested a broadcast!").await;
}

#[tokio::test]
async fn relayed_private_message_from_another_server() {
    let server = default_server().await;
    let (mut alice, _bob) = pair(server.addr, "alice", "bob").await;

    server
        .world
        .send_private("zed", "alice", "east", "greetings from afar")
        .unwrap();
    assert_eq!(
        alice.recv_json().await,
        json!({"type": "private_message", "from": "zed", "fromServer": "east", "message": "greetings from afar"})
    );
}
