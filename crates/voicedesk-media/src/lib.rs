//! Media adapters: speech capture and speech playback.
//!
//! The session core only ever talks to the [`CaptureAdapter`] and
//! [`PlaybackAdapter`] traits. Implementations report completions by posting
//! into the session's [`EventSink`](voicedesk_core::event::EventSink), tagged
//! with the activation or utterance id they were started with.

pub mod capture;
pub mod playback;

pub use capture::{CaptureAdapter, LineCapture, LineFeed};
pub use playback::{PlaybackAdapter, TerminalPlayback};
