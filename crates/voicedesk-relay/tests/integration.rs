//! Relay integration tests — run the HTTP relay against a local server that
//! mimics the backend chat endpoints.
//!
//! Run with: `cargo test -p voicedesk-relay --test integration`

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use voicedesk_core::error::VoiceDeskError;
use voicedesk_core::state::Role;
use voicedesk_relay::{ChatSession, HttpRelay, RELAY_FAILURE, TextRelay};

const KNOWN_AGENT: u64 = 1;

/// Message counts per (agent, session).
type Store = Arc<Mutex<HashMap<(u64, String), u64>>>;

fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"detail": "Agent not found"})),
    )
}

async fn chat_text(
    State(store): State<Store>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let agent_id = body["agent_id"].as_u64().unwrap_or_default();
    if agent_id != KNOWN_AGENT {
        return Err(not_found());
    }
    let message = body["message"].as_str().unwrap_or_default().to_string();
    let session_id = body["session_id"].as_str().unwrap_or("default").to_string();

    // One user turn plus one agent turn per exchange.
    *store
        .lock()
        .unwrap()
        .entry((agent_id, session_id.clone()))
        .or_default() += 2;

    Ok(Json(json!({
        "agent_id": agent_id,
        "user_message": message,
        "agent_response": format!("You asked: {message}"),
        "session_id": session_id,
    })))
}

async fn list_sessions(State(store): State<Store>, Path(agent_id): Path<u64>) -> Json<Value> {
    let mut sessions: Vec<Value> = store
        .lock()
        .unwrap()
        .iter()
        .filter(|((agent, _), _)| *agent == agent_id)
        .map(|((_, session), count)| json!({"session_id": session, "message_count": count}))
        .collect();
    sessions.sort_by(|a, b| a["session_id"].as_str().cmp(&b["session_id"].as_str()));
    Json(json!({"agent_id": agent_id, "sessions": sessions}))
}

async fn clear_session(
    State(store): State<Store>,
    Path((agent_id, session_id)): Path<(u64, String)>,
) -> Json<Value> {
    store.lock().unwrap().remove(&(agent_id, session_id.clone()));
    Json(json!({"message": format!("Session {session_id} cleared")}))
}

async fn start_backend() -> String {
    let store = Store::default();
    let app = Router::new()
        .route("/api/v1/chat/text", post(chat_text))
        .route("/api/v1/chat/sessions/{agent_id}", get(list_sessions))
        .route(
            "/api/v1/chat/session/{agent_id}/{session_id}",
            delete(clear_session),
        )
        .with_state(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn relay(base_url: &str) -> HttpRelay {
    HttpRelay::new(base_url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_send_returns_agent_reply() {
    let base = start_backend().await;
    let relay = relay(&base);

    let reply = relay.send(KNOWN_AGENT, "what are your hours?", "session-1").await.unwrap();
    assert_eq!(reply.agent_id, KNOWN_AGENT);
    assert_eq!(reply.user_message, "what are your hours?");
    assert_eq!(reply.agent_response, "You asked: what are your hours?");
    assert_eq!(reply.session_id, "session-1");
}

#[tokio::test]
async fn test_unknown_agent_is_relay_error() {
    let base = start_backend().await;
    let err = relay(&base).send(99, "hello", "session-1").await.unwrap_err();
    match err {
        VoiceDeskError::Relay(reason) => assert!(reason.contains("Agent not found"), "{reason}"),
        other => panic!("expected relay error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_and_clear_sessions() {
    let base = start_backend().await;
    let relay = relay(&base);

    relay.send(KNOWN_AGENT, "one", "session-a").await.unwrap();
    relay.send(KNOWN_AGENT, "two", "session-a").await.unwrap();
    relay.send(KNOWN_AGENT, "three", "session-b").await.unwrap();

    let sessions = relay.list_sessions(KNOWN_AGENT).await.unwrap();
    let counts: Vec<(&str, u64)> = sessions
        .iter()
        .map(|s| (s.session_id.as_str(), s.message_count))
        .collect();
    assert_eq!(counts, vec![("session-a", 4), ("session-b", 2)]);

    let message = relay.clear_session(KNOWN_AGENT, "session-a").await.unwrap();
    assert_eq!(message, "Session session-a cleared");

    let sessions = relay.list_sessions(KNOWN_AGENT).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, "session-b");
}

#[tokio::test]
async fn test_chat_session_over_http() {
    let base = start_backend().await;
    let mut chat = ChatSession::new(Arc::new(relay(&base)), KNOWN_AGENT, None);

    let entry = chat.say("hello").await.unwrap();
    assert_eq!(entry.role, Role::Agent);
    assert_eq!(entry.text, "You asked: hello");
    assert!(chat.session_id().starts_with("session-"));
}

#[tokio::test]
async fn test_unreachable_backend_appends_error_entry() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let relay = relay(&format!("http://127.0.0.1:{port}"));
    let mut chat = ChatSession::new(Arc::new(relay), KNOWN_AGENT, None);

    let entry = chat.say("hello").await.unwrap();
    assert_eq!(entry.role, Role::Error);
    assert_eq!(entry.text, RELAY_FAILURE);
}
