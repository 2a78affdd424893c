//! Text relay: single-turn chat with an agent over HTTP.
//!
//! Each [`TextRelay::send`] is one request/response exchange; conversation
//! memory lives server-side, keyed by a client-generated session id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use voicedesk_core::config::Config;
use voicedesk_core::error::{Result, VoiceDeskError};
use voicedesk_core::state::{Role, Transcript, TranscriptEntry};

pub const CHAT_TEXT_PATH: &str = "/api/v1/chat/text";
pub const CHAT_SESSIONS_PATH: &str = "/api/v1/chat/sessions";
pub const CHAT_SESSION_PATH: &str = "/api/v1/chat/session";

/// Shown in the transcript when a relay exchange fails.
pub const RELAY_FAILURE: &str = "Failed to get response. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub agent_id: u64,
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub agent_id: u64,
    pub user_message: String,
    pub agent_response: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: u64,
}

#[derive(Debug, Deserialize)]
struct SessionList {
    #[serde(default)]
    sessions: Vec<SessionSummary>,
}

#[derive(Debug, Deserialize)]
struct ClearReply {
    message: String,
}

/// Error body shape used by the backend for non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Fresh chat session id, `session-{unix_millis}`.
pub fn new_session_id() -> String {
    format!("session-{}", chrono::Utc::now().timestamp_millis())
}

#[async_trait]
pub trait TextRelay: Send + Sync {
    /// Send one user message and return the agent's reply. Blank messages
    /// are rejected without a request.
    async fn send(&self, agent_id: u64, message: &str, session_id: &str) -> Result<ChatReply>;

    async fn list_sessions(&self, agent_id: u64) -> Result<Vec<SessionSummary>>;

    /// Drop the server-side history of one session. Returns the server's
    /// confirmation message.
    async fn clear_session(&self, agent_id: u64, session_id: &str) -> Result<String>;
}

pub struct HttpRelay {
    pub base_url: String,
    client: reqwest::Client,
}

impl HttpRelay {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| VoiceDeskError::Relay(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.base_url(),
            Duration::from_millis(config.request_timeout_ms()),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.detail)
                .unwrap_or_else(|_| status.to_string());
            warn!(%status, %reason, "Relay request rejected");
            return Err(VoiceDeskError::Relay(format!("{status}: {reason}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| VoiceDeskError::Relay(format!("invalid response body: {e}")))
    }
}

fn transport(e: reqwest::Error) -> VoiceDeskError {
    VoiceDeskError::Relay(format!("request failed: {e}"))
}

#[async_trait]
impl TextRelay for HttpRelay {
    async fn send(&self, agent_id: u64, message: &str, session_id: &str) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(VoiceDeskError::Relay("message is empty".into()));
        }

        let request = ChatRequest {
            agent_id,
            message: message.to_string(),
            session_id: session_id.to_string(),
        };
        debug!(agent_id, session_id, "Sending text message");

        let response = self
            .client
            .post(self.url(CHAT_TEXT_PATH))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        Self::read(response).await
    }

    async fn list_sessions(&self, agent_id: u64) -> Result<Vec<SessionSummary>> {
        let response = self
            .client
            .get(self.url(&format!("{CHAT_SESSIONS_PATH}/{agent_id}")))
            .send()
            .await
            .map_err(transport)?;
        let list: SessionList = Self::read(response).await?;
        Ok(list.sessions)
    }

    async fn clear_session(&self, agent_id: u64, session_id: &str) -> Result<String> {
        let response = self
            .client
            .delete(self.url(&format!("{CHAT_SESSION_PATH}/{agent_id}/{session_id}")))
            .send()
            .await
            .map_err(transport)?;
        let reply: ClearReply = Self::read(response).await?;
        Ok(reply.message)
    }
}

/// A text conversation with one agent: the relay plus the local transcript.
pub struct ChatSession {
    relay: Arc<dyn TextRelay>,
    agent_id: u64,
    session_id: String,
    transcript: Transcript,
}

impl ChatSession {
    pub fn new(relay: Arc<dyn TextRelay>, agent_id: u64, session_id: Option<String>) -> Self {
        Self {
            relay,
            agent_id,
            session_id: session_id.unwrap_or_else(new_session_id),
            transcript: Transcript::default(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Record the user's message, relay it, and record the reply (or an
    /// error entry). Returns the entry appended last, or `None` for a blank
    /// message, which is neither recorded nor sent.
    pub async fn say(&mut self, message: &str) -> Option<&TranscriptEntry> {
        let message = message.trim();
        if message.is_empty() {
            return None;
        }
        self.transcript.append(Role::User, message);

        match self.relay.send(self.agent_id, message, &self.session_id).await {
            Ok(reply) => Some(self.transcript.append(Role::Agent, reply.agent_response)),
            Err(e) => {
                warn!(agent_id = self.agent_id, %e, "Text relay failed");
                Some(self.transcript.append(Role::Error, RELAY_FAILURE))
            }
        }
    }

    /// Clear the server-side history and start over with a fresh session id.
    pub async fn reset(&mut self) -> Result<()> {
        self.relay.clear_session(self.agent_id, &self.session_id).await?;
        self.session_id = new_session_id();
        self.transcript = Transcript::default();
        Ok(())
    }
}
