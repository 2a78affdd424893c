//! Session state machine: applies one event at a time.
//!
//! `SessionCore` is synchronous: it never awaits. Adapters are driven through
//! fire-and-forget calls and answer later through the event queue, tagged
//! with the link, activation or utterance id they were started with. An
//! event whose id is not the current one is stray and dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use voicedesk_core::error::VoiceDeskError;
use voicedesk_core::event::{
    ActivationId, CaptureEvent, ChannelEvent, EventSink, Intent, LinkId, PlaybackEvent,
    SessionEvent, UtteranceId,
};
use voicedesk_core::protocol::VoiceFrame;
use voicedesk_core::state::{
    CaptureState, ConnectionState, PlaybackState, Role, SessionState,
};
use voicedesk_media::{CaptureAdapter, PlaybackAdapter};

use crate::channel::{ChannelLink, Connector};

/// Outcome of handling one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The session was closed; the instance must be discarded.
    Terminated,
}

pub struct SessionCore {
    endpoint: String,
    connector: Arc<dyn Connector>,
    capture: Box<dyn CaptureAdapter>,
    playback: Box<dyn PlaybackAdapter>,
    sink: EventSink,
    state: SessionState,

    link: Option<Box<dyn ChannelLink>>,
    link_id: LinkId,
    activation: ActivationId,
    utterance: UtteranceId,
    /// Start-talking arrived before the channel was connected.
    pending_capture: bool,
    /// Stop-talking was requested for the current activation.
    stop_requested: bool,

    /// Bumped on every capture start.
    user_turn: u64,
    /// Turns sent to the agent and not yet confirmed by a transcription,
    /// oldest first.
    unconfirmed: VecDeque<u64>,
}

impl SessionCore {
    pub fn new(
        endpoint: impl Into<String>,
        connector: Arc<dyn Connector>,
        capture: Box<dyn CaptureAdapter>,
        playback: Box<dyn PlaybackAdapter>,
        sink: EventSink,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            connector,
            capture,
            playback,
            sink,
            state: SessionState::default(),
            link: None,
            link_id: 0,
            activation: 0,
            utterance: 0,
            pending_capture: false,
            stop_requested: false,
            user_turn: 0,
            unconfirmed: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Clone the current state as a new snapshot version.
    pub fn snapshot(&mut self) -> SessionState {
        self.state.version += 1;
        self.state.clone()
    }

    pub fn handle(&mut self, event: SessionEvent) -> Step {
        let step = match event {
            SessionEvent::Intent(intent) => self.on_intent(intent),
            SessionEvent::Channel { link, event } => {
                self.on_channel(link, event);
                Step::Continue
            }
            SessionEvent::Capture { activation, event } => {
                self.on_capture(activation, event);
                Step::Continue
            }
            SessionEvent::Playback { utterance, event } => {
                self.on_playback(utterance, event);
                Step::Continue
            }
        };
        debug_assert!(
            self.state.audio_invariants_hold(),
            "audio invariants violated: {:?}",
            self.state
        );
        step
    }

    // --- intents ---

    fn on_intent(&mut self, intent: Intent) -> Step {
        debug!(?intent, connection = ?self.state.connection, "Intent");
        match intent {
            Intent::Connect => {
                if self.state.connection == ConnectionState::Disconnected {
                    self.open_channel();
                }
            }
            Intent::StartTalking => self.start_talking(),
            Intent::StopTalking => {
                self.pending_capture = false;
                if self.state.capture == CaptureState::Listening {
                    self.stop_requested = true;
                    self.capture.stop();
                }
            }
            Intent::StopSpeaking => {
                if self.state.playback == PlaybackState::Speaking {
                    self.playback.cancel();
                    self.state.playback = PlaybackState::Idle;
                }
            }
            Intent::Close => {
                self.close();
                return Step::Terminated;
            }
        }
        Step::Continue
    }

    fn start_talking(&mut self) {
        match self.state.connection {
            ConnectionState::Disconnected => {
                self.pending_capture = true;
                self.open_channel();
            }
            ConnectionState::Connecting => self.pending_capture = true,
            ConnectionState::Connected => {
                if self.state.playback == PlaybackState::Speaking {
                    self.state.last_error = Some("cannot listen while the agent is speaking".into());
                } else if self.state.capture == CaptureState::Idle {
                    self.begin_capture();
                }
            }
            ConnectionState::Closing => {}
        }
    }

    fn close(&mut self) {
        info!(link = self.link_id, "Closing voice session");
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.capture.stop();
        self.playback.cancel();
        self.pending_capture = false;
        self.state.capture = CaptureState::Idle;
        self.state.playback = PlaybackState::Idle;
        self.state.connection = ConnectionState::Closing;
    }

    // --- channel ---

    fn open_channel(&mut self) {
        self.link_id += 1;
        self.state.faulted = false;
        match self
            .connector
            .open(&self.endpoint, self.link_id, self.sink.clone())
        {
            Ok(link) => {
                info!(link = self.link_id, endpoint = %self.endpoint, "Opening channel");
                self.link = Some(link);
                self.state.connection = ConnectionState::Connecting;
            }
            Err(e) => {
                self.pending_capture = false;
                self.fail_channel(e.to_string());
            }
        }
    }

    /// Session-fatal: release audio, drop the link, back to Disconnected.
    fn fail_channel(&mut self, reason: String) {
        warn!(link = self.link_id, %reason, "Channel failed");
        self.drop_channel();
        self.state.faulted = true;
        self.state.transcript.append(Role::Error, reason.as_str());
        self.state.last_error = Some(reason);
    }

    fn drop_channel(&mut self) {
        if self.state.capture == CaptureState::Listening {
            self.capture.stop();
            self.state.capture = CaptureState::Idle;
        }
        if self.state.playback == PlaybackState::Speaking {
            self.playback.cancel();
            self.state.playback = PlaybackState::Idle;
        }
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.pending_capture = false;
        self.unconfirmed.clear();
        self.state.connection = ConnectionState::Disconnected;
    }

    fn on_channel(&mut self, link: LinkId, event: ChannelEvent) {
        if link != self.link_id || self.link.is_none() {
            debug!(link, current = self.link_id, ?event, "Dropping stray channel event");
            return;
        }

        match event {
            ChannelEvent::Opened => {
                if self.state.connection != ConnectionState::Connecting {
                    return;
                }
                self.state.connection = ConnectionState::Connected;
                self.state.last_error = None;
                if std::mem::take(&mut self.pending_capture) {
                    self.begin_capture();
                }
            }
            ChannelEvent::Error(reason) => self.fail_channel(reason),
            ChannelEvent::Closed => {
                if self.state.connection == ConnectionState::Connecting {
                    self.fail_channel("connection closed before it opened".into());
                } else {
                    info!(link, "Channel closed");
                    self.drop_channel();
                }
            }
            ChannelEvent::Message(frame) => {
                if self.state.connection == ConnectionState::Connected {
                    self.on_frame(frame);
                }
            }
        }
    }

    fn on_frame(&mut self, frame: VoiceFrame) {
        match frame {
            VoiceFrame::AgentUtterance { text } => self.agent_said(text),
            VoiceFrame::Transcription { text } => {
                // Confirmations arrive in send order; the listening turn
                // has not been sent yet and is never credited.
                if let Some(turn) = self.unconfirmed.pop_front() {
                    debug!(turn, "Transcription confirms a recorded turn");
                } else if !text.trim().is_empty() {
                    debug!("Recording transcription with no pending turn");
                    self.state.transcript.append(Role::User, text);
                }
            }
            VoiceFrame::Fault { message } => {
                warn!(%message, "Agent reported a fault");
                self.state.last_error = Some(message);
            }
            VoiceFrame::UserUtterance { .. } => {
                warn!("Ignoring user_text frame from the server");
            }
        }
    }

    fn agent_said(&mut self, text: String) {
        if text.trim().is_empty() {
            debug!("Ignoring empty agent reply");
            return;
        }
        if self.state.capture == CaptureState::Listening {
            self.capture.stop();
            self.state.capture = CaptureState::Idle;
        }
        if self.state.playback == PlaybackState::Speaking {
            debug!(utterance = self.utterance, "Preempting playback");
            self.playback.cancel();
            self.state.playback = PlaybackState::Idle;
        }

        self.state.transcript.append(Role::Agent, text.as_str());
        self.state.last_error = None;

        self.utterance += 1;
        match self.playback.speak(self.utterance, &text, self.sink.clone()) {
            Ok(()) => self.state.playback = PlaybackState::Speaking,
            Err(e) => self.state.last_error = Some(e.to_string()),
        }
    }

    // --- capture ---

    fn begin_capture(&mut self) {
        if !self.capture.available() {
            self.state.last_error = Some("speech capture is unavailable".into());
            return;
        }
        self.activation += 1;
        self.stop_requested = false;
        match self.capture.start(self.activation, self.sink.clone()) {
            Ok(()) => {
                self.user_turn += 1;
                self.state.capture = CaptureState::Listening;
                debug!(activation = self.activation, turn = self.user_turn, "Listening");
            }
            Err(e) => self.state.last_error = Some(e.to_string()),
        }
    }

    fn on_capture(&mut self, activation: ActivationId, event: CaptureEvent) {
        if activation != self.activation || self.state.capture != CaptureState::Listening {
            debug!(activation, ?event, "Dropping stray capture event");
            return;
        }
        self.state.capture = CaptureState::Idle;
        let stopped = std::mem::take(&mut self.stop_requested);

        match event {
            CaptureEvent::Utterance(text) if !text.trim().is_empty() => self.user_said(text),
            CaptureEvent::Utterance(_) | CaptureEvent::NoSpeechDetected if stopped => {
                debug!(activation, "Listening stopped");
            }
            CaptureEvent::Utterance(_) | CaptureEvent::NoSpeechDetected => {
                self.state.last_error = Some("no speech detected".into());
            }
            CaptureEvent::Error(reason) => {
                warn!(activation, %reason, "Speech recognition failed");
                self.state.last_error = Some(format!("speech recognition error: {reason}"));
            }
        }
    }

    fn user_said(&mut self, text: String) {
        let frame = VoiceFrame::user(text.as_str());
        self.state.transcript.append(Role::User, text);

        let sent = match self.link.as_mut() {
            Some(link) => link.send(&frame),
            None => Err(VoiceDeskError::Send("channel is not connected".into())),
        };
        match sent {
            Ok(()) => {
                self.unconfirmed.push_back(self.user_turn);
                self.state.last_error = None;
            }
            Err(e) => self.state.last_error = Some(e.to_string()),
        }
    }

    // --- playback ---

    fn on_playback(&mut self, utterance: UtteranceId, event: PlaybackEvent) {
        if utterance != self.utterance || self.state.playback != PlaybackState::Speaking {
            debug!(utterance, ?event, "Dropping stray playback event");
            return;
        }
        match event {
            PlaybackEvent::Started => debug!(utterance, "Speaking"),
            PlaybackEvent::Finished => {
                self.state.playback = PlaybackState::Idle;
                self.state.last_error = None;
            }
            PlaybackEvent::Error(reason) => {
                warn!(utterance, %reason, "Speech synthesis failed");
                self.state.playback = PlaybackState::Idle;
                self.state.last_error = Some(format!("speech synthesis error: {reason}"));
            }
        }
    }
}
