//! Voice session core.
//!
//! A [`VoiceSession`] owns one duplex channel to a remote agent, one capture
//! adapter and one playback adapter. All state transitions are applied by a
//! single actor task draining one event queue; the presentation layer sends
//! intents through a [`VoiceSessionHandle`] and watches [`SessionState`]
//! snapshots.
//!
//! [`SessionState`]: voicedesk_core::state::SessionState

pub mod channel;
pub mod machine;
pub mod runtime;

pub use channel::{ChannelLink, Connector, WebSocketConnector};
pub use machine::{SessionCore, Step};
pub use runtime::{VoiceSession, VoiceSessionHandle};
