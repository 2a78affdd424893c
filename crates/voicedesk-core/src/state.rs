//! Session state model: connection/capture/playback status and the
//! append-only transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel status. There is no `Errored` variant: a session that failed is
/// `Disconnected` with [`SessionState::faulted`] set, and
/// [`SessionState::phase`] reports it as [`SessionPhase::Errored`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    #[default]
    Idle,
    Listening,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Speaking,
}

/// Composite view of the session for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Disconnected,
    /// Disconnected after a fatal channel error that has not been retried.
    Errored,
    Connecting,
    Idle,
    Listening,
    Speaking,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    Error,
}

/// One immutable transcript line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    pub occurred_at: DateTime<Utc>,
}

/// Append-only transcript. Insertion order is render order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> &TranscriptEntry {
        self.entries.push(TranscriptEntry {
            role,
            text: text.into(),
            occurred_at: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// Entries appended after the first `seen` ones.
    pub fn since(&self, seen: usize) -> &[TranscriptEntry] {
        self.entries.get(seen..).unwrap_or(&[])
    }
}

/// Snapshot of one voice session, published after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub connection: ConnectionState,
    pub capture: CaptureState,
    pub playback: PlaybackState,
    pub transcript: Transcript,
    pub last_error: Option<String>,
    /// Bumped on every published snapshot.
    pub version: u64,
    /// Set when the last return to `Disconnected` was caused by an error.
    #[serde(default)]
    pub faulted: bool,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self.connection {
            ConnectionState::Disconnected if self.faulted => SessionPhase::Errored,
            ConnectionState::Disconnected => SessionPhase::Disconnected,
            ConnectionState::Connecting => SessionPhase::Connecting,
            ConnectionState::Closing => SessionPhase::Closing,
            ConnectionState::Connected => match (self.capture, self.playback) {
                (CaptureState::Listening, _) => SessionPhase::Listening,
                (_, PlaybackState::Speaking) => SessionPhase::Speaking,
                _ => SessionPhase::Idle,
            },
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    pub fn is_listening(&self) -> bool {
        self.capture == CaptureState::Listening
    }

    pub fn is_speaking(&self) -> bool {
        self.playback == PlaybackState::Speaking
    }

    /// Capture and playback are never active together, and neither is active
    /// off a live connection.
    pub fn audio_invariants_hold(&self) -> bool {
        let exclusive = !(self.is_listening() && self.is_speaking());
        let gated = self.is_connected() || (!self.is_listening() && !self.is_speaking());
        exclusive && gated
    }
}
