//! Integration tests for the lobby server
//!
//! These tests boot a real server on an ephemeral port and drive it with
//! websocket clients, covering join, roster fanout, requests, rejection and
//! disconnect handling end to end.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use server::config::{NameBackend, ServerConfig};
use server::names::MemoryNameStore;
use server::network::LobbyServer;
use shared::{encode_join, encode_requests, Command};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_test::assert_ok;
use tokio_tungstenite::tungstenite::protocol::frame::coding::{Data, OpCode};
use tokio_tungstenite::tungstenite::protocol::frame::Frame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Boots a server with in-memory names and returns its address
async fn boot_server() -> SocketAddr {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        send_timeout: Duration::from_millis(500),
        names: NameBackend::Memory,
    };
    let server = LobbyServer::bind(&config, Box::new(MemoryNameStore::new()))
        .await
        .expect("Failed to bind server");
    let addr = server.local_addr().unwrap();

    tokio::spawn(server.run());
    addr
}

async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(format!("ws://{}", addr)))
        .await
        .expect("connect timed out")
        .expect("Failed to connect");
    ws
}

async fn send_text(ws: &mut WsStream, text: String) {
    ws.send(Message::text(text)).await.expect("send failed");
}

/// Next server envelope's `res` list, skipping control frames
async fn recv(ws: &mut WsStream) -> Value {
    loop {
        let frame = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection ended")
            .expect("websocket error");

        if let Message::Text(text) = frame {
            let envelope: Value = serde_json::from_str(text.as_str()).unwrap();
            return envelope["res"].clone();
        }
    }
}

/// Asserts that nothing arrives for a short while
async fn assert_quiet(ws: &mut WsStream) {
    if let Ok(frame) = timeout(QUIET, ws.next()).await {
        panic!("expected no traffic, got {:?}", frame);
    }
}

/// Asserts the server closed the connection
async fn assert_closed(ws: &mut WsStream) {
    loop {
        match timeout(TIMEOUT, ws.next()).await.expect("connection stayed open") {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(Message::Text(text))) => panic!("unexpected event {}", text.as_str()),
            Some(Ok(_)) => {}
        }
    }
}

/// Joins as `identity`, returning the socket and the `join_server` tuple
async fn join(addr: SocketAddr, identity: &str) -> (WsStream, Value) {
    let mut ws = connect(addr).await;
    send_text(&mut ws, encode_join(identity)).await;

    let joined = recv(&mut ws).await;
    assert_eq!(joined[0][0], "join_server");
    (ws, joined[0].clone())
}

fn roster_identities(roster: &Value) -> Vec<(String, bool)> {
    assert_eq!(roster[0][0], "get_lobby_players");
    roster[0][1]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| (p[0].as_str().unwrap().to_string(), p[3].as_bool().unwrap()))
        .collect()
}

/// LOBBY SCENARIOS
mod lobby_tests {
    use super::*;

    #[tokio::test]
    async fn first_client_becomes_leader() {
        let addr = boot_server().await;
        let (mut a, joined) = join(addr, "u1").await;

        assert_eq!(joined[1], "u1");
        assert_eq!(joined[3], true);
        let name = joined[2].clone();
        assert!(name.as_str().unwrap().contains(' '));

        let roster = recv(&mut a).await;
        assert_eq!(roster, json!([["get_lobby_players", [["u1", name, false, true]]]]));
    }

    #[tokio::test]
    async fn second_client_joins_as_member() {
        let addr = boot_server().await;
        let (mut a, joined_a) = join(addr, "u1").await;
        recv(&mut a).await;

        let (mut b, joined_b) = join(addr, "u2").await;
        assert_eq!(joined_b[1], "u2");
        assert_eq!(joined_b[3], false);

        let expected = json!([["get_lobby_players", [
            ["u1", joined_a[2].clone(), false, true],
            ["u2", joined_b[2].clone(), false, false]
        ]]]);
        assert_eq!(recv(&mut a).await, expected);
        assert_eq!(recv(&mut b).await, expected);
    }

    #[tokio::test]
    async fn ready_update_reaches_everyone() {
        let addr = boot_server().await;
        let (mut a, _) = join(addr, "u1").await;
        recv(&mut a).await;
        let (mut b, _) = join(addr, "u2").await;
        recv(&mut a).await;
        recv(&mut b).await;

        send_text(&mut a, r#"{"req":[["update_is_ready", true]]}"#.to_string()).await;

        let expected = json!([["update_is_ready", "u1", true]]);
        assert_eq!(recv(&mut a).await, expected);
        assert_eq!(recv(&mut b).await, expected);
    }

    #[tokio::test]
    async fn abnormal_disconnect_promotes_next_member() {
        let addr = boot_server().await;
        let (mut a, _) = join(addr, "u1").await;
        recv(&mut a).await;
        let (mut b, joined_b) = join(addr, "u2").await;
        recv(&mut a).await;
        recv(&mut b).await;

        // Drop the socket without a closing handshake.
        drop(a);

        let roster = recv(&mut b).await;
        assert_eq!(
            roster,
            json!([["get_lobby_players", [["u2", joined_b[2].clone(), false, true]]]])
        );
    }

    #[tokio::test]
    async fn graceful_close_also_leaves() {
        let addr = boot_server().await;
        let (mut a, _) = join(addr, "u1").await;
        recv(&mut a).await;
        let (mut b, _) = join(addr, "u2").await;
        recv(&mut a).await;
        recv(&mut b).await;

        assert_ok!(a.close(None).await);

        let roster = recv(&mut b).await;
        assert_eq!(roster_identities(&roster), vec![("u2".to_string(), true)]);
    }

    #[tokio::test]
    async fn member_disconnect_keeps_leader() {
        let addr = boot_server().await;
        let (mut a, joined_a) = join(addr, "u1").await;
        recv(&mut a).await;
        let (mut b, _) = join(addr, "u2").await;
        recv(&mut a).await;
        recv(&mut b).await;

        drop(b);

        let roster = recv(&mut a).await;
        assert_eq!(
            roster,
            json!([["get_lobby_players", [["u1", joined_a[2].clone(), false, true]]]])
        );
    }

    #[tokio::test]
    async fn invalid_utf8_text_frame_drops_the_connection() {
        let addr = boot_server().await;
        let (mut a, _) = join(addr, "u1").await;
        recv(&mut a).await;
        let (mut b, joined_b) = join(addr, "u2").await;
        recv(&mut a).await;
        recv(&mut b).await;

        // A text frame whose payload is not UTF-8 is a protocol violation.
        let frame = Frame::message(vec![0xff, 0xfe, 0x7b], OpCode::Data(Data::Text), true);
        let _ = a.send(Message::Frame(frame)).await;

        let roster = recv(&mut b).await;
        assert_eq!(
            roster,
            json!([["get_lobby_players", [["u2", joined_b[2].clone(), false, true]]]])
        );
        assert_closed(&mut a).await;
    }

    #[tokio::test]
    async fn leader_succession_follows_join_order() {
        let addr = boot_server().await;
        let (mut a, _) = join(addr, "a").await;
        recv(&mut a).await;
        let (mut b, _) = join(addr, "b").await;
        recv(&mut b).await;
        let (mut c, _) = join(addr, "c").await;
        recv(&mut c).await;
        recv(&mut b).await;

        drop(a);

        let expected = vec![("b".to_string(), true), ("c".to_string(), false)];
        assert_eq!(roster_identities(&recv(&mut b).await), expected);
        assert_eq!(roster_identities(&recv(&mut c).await), expected);
    }

    #[tokio::test]
    async fn duplicate_identity_is_refused() {
        let addr = boot_server().await;
        let (mut b, _) = join(addr, "u2").await;
        recv(&mut b).await;

        let mut intruder = connect(addr).await;
        send_text(&mut intruder, encode_join("u2")).await;

        assert_eq!(
            recv(&mut intruder).await,
            json!([["error", "connection_refused", "client already connected"]])
        );
        assert_closed(&mut intruder).await;

        assert_quiet(&mut b).await;
        send_text(&mut b, encode_requests(&[Command::StartGame])).await;
        assert_eq!(recv(&mut b).await, json!([["start_game"]]));
    }

    #[tokio::test]
    async fn join_without_identity_is_refused() {
        let addr = boot_server().await;
        let mut ws = connect(addr).await;

        send_text(&mut ws, r#"{"req":[["start_game"]]}"#.to_string()).await;

        assert_eq!(
            recv(&mut ws).await,
            json!([["error", "connection_refused", "no identity provided"]])
        );
        assert_closed(&mut ws).await;
    }

    #[tokio::test]
    async fn malformed_payload_is_ignored() {
        let addr = boot_server().await;
        let (mut a, _) = join(addr, "u1").await;
        recv(&mut a).await;
        let (mut b, _) = join(addr, "u2").await;
        recv(&mut a).await;
        recv(&mut b).await;

        send_text(&mut a, "this is not json".to_string()).await;
        assert_quiet(&mut a).await;
        assert_quiet(&mut b).await;

        send_text(&mut a, encode_requests(&[Command::UpdateIsReady { ready: true }])).await;
        let expected = json!([["update_is_ready", "u1", true]]);
        assert_eq!(recv(&mut a).await, expected);
        assert_eq!(recv(&mut b).await, expected);
    }

    #[tokio::test]
    async fn malformed_payload_before_join_is_ignored() {
        let addr = boot_server().await;
        let mut ws = connect(addr).await;

        send_text(&mut ws, "{not json".to_string()).await;
        assert_quiet(&mut ws).await;

        send_text(&mut ws, encode_join("u1")).await;
        assert_eq!(recv(&mut ws).await[0][0], "join_server");
    }

    #[tokio::test]
    async fn unknown_commands_are_ignored() {
        let addr = boot_server().await;
        let (mut a, _) = join(addr, "u1").await;
        recv(&mut a).await;

        send_text(
            &mut a,
            r#"{"req":[["moonwalk"], ["update_is_ready", "maybe"], ["init_start_game"]]}"#
                .to_string(),
        )
        .await;

        assert_eq!(recv(&mut a).await, json!([["init_start_game"]]));
        assert_quiet(&mut a).await;
    }

    #[tokio::test]
    async fn envelope_without_requests_keeps_connection() {
        let addr = boot_server().await;
        let (mut a, _) = join(addr, "u1").await;
        recv(&mut a).await;

        send_text(&mut a, r#"{"hello": "world"}"#.to_string()).await;
        assert_quiet(&mut a).await;

        send_text(&mut a, encode_requests(&[Command::CancelStartGame])).await;
        assert_eq!(recv(&mut a).await, json!([["cancel_start_game"]]));
    }
}

/// REQUEST HANDLING TESTS
mod request_tests {
    use super::*;

    #[tokio::test]
    async fn chat_is_relayed_with_name_and_time() {
        let addr = boot_server().await;
        let (mut a, joined_a) = join(addr, "u1").await;
        recv(&mut a).await;
        let (mut b, _) = join(addr, "u2").await;
        recv(&mut a).await;
        recv(&mut b).await;

        send_text(&mut a, encode_requests(&[Command::Chat { text: "gl hf".to_string() }])).await;

        for ws in [&mut a, &mut b] {
            let chat = recv(ws).await;
            assert_eq!(chat[0][0], "chat");
            assert_eq!(chat[0][1], joined_a[2]);
            assert_eq!(chat[0][2], "gl hf");
            assert!(chat[0][3].is_string());
        }
    }

    #[tokio::test]
    async fn start_game_handshake_is_relayed_from_any_member() {
        let addr = boot_server().await;
        let (mut a, _) = join(addr, "u1").await;
        recv(&mut a).await;
        let (mut b, _) = join(addr, "u2").await;
        recv(&mut a).await;
        recv(&mut b).await;

        send_text(
            &mut b,
            encode_requests(&[
                Command::InitStartGame,
                Command::CancelStartGame,
                Command::StartGame,
            ]),
        )
        .await;

        for ws in [&mut a, &mut b] {
            assert_eq!(recv(ws).await, json!([["init_start_game"]]));
            assert_eq!(recv(ws).await, json!([["cancel_start_game"]]));
            assert_eq!(recv(ws).await, json!([["start_game"]]));
        }
    }

    #[tokio::test]
    async fn get_user_name_is_private_and_stable_across_reconnect() {
        let addr = boot_server().await;
        let (mut a, joined) = join(addr, "u1").await;
        recv(&mut a).await;
        let (mut b, _) = join(addr, "u2").await;
        recv(&mut a).await;
        recv(&mut b).await;

        send_text(&mut a, encode_requests(&[Command::GetUserName])).await;
        assert_eq!(recv(&mut a).await, json!([["get_user_name", joined[2].clone()]]));
        assert_quiet(&mut b).await;

        assert_ok!(a.close(None).await);
        recv(&mut b).await;

        let (mut again, rejoined) = join(addr, "u1").await;
        assert_eq!(rejoined[2], joined[2]);
        assert_eq!(rejoined[3], false);
        recv(&mut again).await;

        send_text(&mut again, encode_requests(&[Command::GetUserName])).await;
        assert_eq!(recv(&mut again).await, json!([["get_user_name", joined[2].clone()]]));
    }

    #[tokio::test]
    async fn later_commands_see_earlier_effects() {
        let addr = boot_server().await;
        let (mut a, _) = join(addr, "u1").await;
        recv(&mut a).await;

        send_text(
            &mut a,
            encode_requests(&[
                Command::UpdateIsReady { ready: true },
                Command::UpdateIsReady { ready: false },
                Command::UpdateIsReady { ready: true },
            ]),
        )
        .await;
        for ready in [true, false, true] {
            assert_eq!(recv(&mut a).await, json!([["update_is_ready", "u1", ready]]));
        }

        let (mut b, _) = join(addr, "u2").await;
        let roster = recv(&mut b).await;
        assert_eq!(roster[0][1][0][2], true);
        assert_eq!(recv(&mut a).await, roster);
    }
}
