//! Session events: everything the session core reacts to arrives as one of
//! these, through a single queue.

use tokio::sync::mpsc;

use crate::protocol::VoiceFrame;

/// Identifies one channel instance. Bumped on every `open`.
pub type LinkId = u64;

/// Identifies one capture activation (one `start()`).
pub type ActivationId = u64;

/// Identifies one playback utterance (one `speak()`).
pub type UtteranceId = u64;

/// User intents accepted from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Connect,
    StartTalking,
    StopTalking,
    StopSpeaking,
    Close,
}

/// Asynchronous notifications from a session channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Message(VoiceFrame),
    Error(String),
    Closed,
}

/// Terminal event of a capture activation. Exactly one per activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Utterance(String),
    NoSpeechDetected,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started,
    Finished,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Intent(Intent),
    Channel { link: LinkId, event: ChannelEvent },
    Capture { activation: ActivationId, event: CaptureEvent },
    Playback { utterance: UtteranceId, event: PlaybackEvent },
}

/// Receiver half of the session event queue.
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Cloneable handle adapters use to post events into the session queue.
///
/// Every `post*` returns `false` once the session has gone away; adapters
/// treat that as a signal to stop quietly.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn new() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn post(&self, event: SessionEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn intent(&self, intent: Intent) -> bool {
        self.post(SessionEvent::Intent(intent))
    }

    pub fn channel(&self, link: LinkId, event: ChannelEvent) -> bool {
        self.post(SessionEvent::Channel { link, event })
    }

    pub fn capture(&self, activation: ActivationId, event: CaptureEvent) -> bool {
        self.post(SessionEvent::Capture { activation, event })
    }

    pub fn playback(&self, utterance: UtteranceId, event: PlaybackEvent) -> bool {
        self.post(SessionEvent::Playback { utterance, event })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
