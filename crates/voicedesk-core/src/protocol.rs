//! Voice session wire protocol.
//!
//! Every frame is a JSON text message carrying a `type` tag plus payload
//! fields. The agent server additionally reports application errors as a bare
//! `{"error": "..."}` object, which decodes to [`VoiceFrame::Fault`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, VoiceDeskError};

/// Fault text substituted for any inbound payload that cannot be decoded.
pub const MALFORMED_MESSAGE: &str = "malformed message";

/// Path prefix of the duplex voice endpoint, followed by the agent id.
pub const VOICE_PATH: &str = "/api/v1/chat/voice";

/// A voice session wire frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VoiceFrame {
    /// Client -> Server: a finalized user utterance.
    #[serde(rename = "user_text")]
    UserUtterance { text: String },

    /// Server -> Client: an agent reply to be spoken and recorded.
    #[serde(rename = "agent_response")]
    AgentUtterance { text: String },

    /// Server -> Client: server-confirmed transcription of the user's speech.
    #[serde(rename = "transcription")]
    Transcription { text: String },

    /// Either direction: non-fatal application error.
    #[serde(rename = "fault")]
    Fault { message: String },
}

#[derive(Deserialize)]
struct ErrorPayload {
    error: String,
}

impl VoiceFrame {
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserUtterance { text: text.into() }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
        }
    }

    /// Strict decode of an inbound text payload.
    pub fn parse(raw: &str) -> Result<Self> {
        if let Ok(ErrorPayload { error }) = serde_json::from_str::<ErrorPayload>(raw) {
            return Ok(Self::Fault { message: error });
        }
        serde_json::from_str(raw).map_err(|e| VoiceDeskError::Protocol(e.to_string()))
    }

    /// Decode an inbound text payload. Never fails: anything unrecognised
    /// becomes `Fault { "malformed message" }`.
    pub fn decode(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|e| {
            warn!(%e, "Dropping malformed frame");
            Self::fault(MALFORMED_MESSAGE)
        })
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Build the voice endpoint URL for an agent from an HTTP(S) base URL.
///
/// `http` maps to `ws` and `https` to `wss`; a base that already uses a
/// WebSocket scheme is kept as is.
pub fn voice_endpoint(base_url: &str, agent_id: u64) -> Option<String> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return None;
    };
    Some(format!("{ws_base}{VOICE_PATH}/{agent_id}"))
}
