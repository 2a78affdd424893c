//! Voice session integration tests — drive a real session over a local
//! WebSocket agent server.
//!
//! Run with: `cargo test -p voicedesk-session --test integration`

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use voicedesk_core::state::{ConnectionState, Role, SessionPhase, SessionState};
use voicedesk_media::{LineCapture, LineFeed, TerminalPlayback};
use voicedesk_session::{VoiceSession, VoiceSessionHandle, WebSocketConnector};

const GREETING: &str = "Hi, this is Ava. How can I help?";

fn agent_frame(text: &str) -> Message {
    Message::Text(json!({"type": "agent_response", "text": text}).to_string().into())
}

/// Start a fake agent server: greets on connect, confirms every user
/// utterance with a transcription, then echoes it back. "bye" closes the
/// socket and "garbage" answers with a malformed payload.
async fn start_agent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                if ws.send(agent_frame(GREETING)).await.is_err() {
                    return;
                }

                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else { continue };
                    let frame: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                    assert_eq!(frame["type"], "user_text");
                    let said = frame["text"].as_str().unwrap_or_default().to_string();

                    match said.as_str() {
                        "bye" => {
                            let _ = ws.close(None).await;
                            break;
                        }
                        "garbage" => {
                            let _ = ws.send(Message::Text("{not json".into())).await;
                        }
                        _ => {
                            let confirm = json!({"type": "transcription", "text": said});
                            let _ = ws.send(Message::Text(confirm.to_string().into())).await;
                            let _ = ws.send(agent_frame(&format!("echo: {said}"))).await;
                        }
                    }
                }
            });
        }
    });

    format!("ws://{addr}/api/v1/chat/voice/1")
}

fn start_session(endpoint: &str) -> (LineFeed, VoiceSessionHandle) {
    let (feed, capture) = LineCapture::new(Duration::from_secs(5));
    let playback = TerminalPlayback::new(Box::new(std::io::sink()), 60_000, "");
    let handle = VoiceSession::start(
        endpoint,
        Arc::new(WebSocketConnector::new(Duration::from_secs(2))),
        Box::new(capture),
        Box::new(playback),
    );
    (feed, handle)
}

async fn until(
    handle: &VoiceSessionHandle,
    predicate: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    tokio::time::timeout(Duration::from_secs(5), handle.wait_for(predicate))
        .await
        .expect("timed out waiting for session state")
        .expect("session closed")
}

fn entries(state: &SessionState) -> Vec<(Role, String)> {
    state
        .transcript
        .entries()
        .iter()
        .map(|e| (e.role, e.text.clone()))
        .collect()
}

fn greetings(state: &SessionState) -> usize {
    state
        .transcript
        .entries()
        .iter()
        .filter(|e| e.role == Role::Agent && e.text == GREETING)
        .count()
}

#[tokio::test]
async fn test_conversation_round_trip() {
    let endpoint = start_agent_server().await;
    let (feed, handle) = start_session(&endpoint);

    handle.connect().unwrap();
    until(&handle, |s| greetings(s) == 1 && !s.is_speaking()).await;

    feed.push("hello");
    handle.start_talking().unwrap();
    let state = until(&handle, |s| s.transcript.len() == 3 && !s.is_speaking()).await;

    assert_eq!(
        entries(&state),
        vec![
            (Role::Agent, GREETING.to_string()),
            (Role::User, "hello".to_string()),
            (Role::Agent, "echo: hello".to_string()),
        ]
    );
    assert_eq!(state.phase(), SessionPhase::Idle);
    assert!(state.last_error.is_none());

    let last = handle.close().await;
    assert_eq!(last.connection, ConnectionState::Closing);
}

#[tokio::test]
async fn test_malformed_message_is_non_fatal() {
    let endpoint = start_agent_server().await;
    let (feed, handle) = start_session(&endpoint);

    handle.connect().unwrap();
    until(&handle, |s| greetings(s) == 1 && !s.is_speaking()).await;

    feed.push("garbage");
    handle.start_talking().unwrap();
    let state = until(&handle, |s| s.last_error.as_deref() == Some("malformed message")).await;

    assert!(state.is_connected());
    assert_eq!(state.transcript.len(), 2);

    handle.close().await;
}

#[tokio::test]
async fn test_remote_close_then_reconnect() {
    let endpoint = start_agent_server().await;
    let (feed, handle) = start_session(&endpoint);

    handle.connect().unwrap();
    until(&handle, |s| greetings(s) == 1 && !s.is_speaking()).await;

    feed.push("bye");
    handle.start_talking().unwrap();
    let state = until(&handle, |s| s.connection == ConnectionState::Disconnected).await;
    assert!(!state.is_listening());
    assert!(!state.is_speaking());
    assert_eq!(state.phase(), SessionPhase::Disconnected);

    // Start-talking from Disconnected opens a fresh channel.
    handle.start_talking().unwrap();
    let state = until(&handle, |s| greetings(s) == 2).await;
    assert!(state.is_connected());

    handle.close().await;
}

#[tokio::test]
async fn test_unreachable_endpoint_is_errored() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let (_feed, handle) = start_session(&format!("ws://127.0.0.1:{port}/api/v1/chat/voice/1"));

    handle.start_talking().unwrap();
    let state = until(&handle, |s| s.phase() == SessionPhase::Errored).await;

    assert!(!state.is_listening());
    assert!(state.last_error.is_some());
    assert_eq!(state.transcript.entries()[0].role, Role::Error);

    handle.close().await;
}
