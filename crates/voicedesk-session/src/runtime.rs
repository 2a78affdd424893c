//! Voice session actor: drains the event queue into a [`SessionCore`] and
//! publishes a snapshot after every event.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use voicedesk_core::error::{Result, VoiceDeskError};
use voicedesk_core::event::{EventReceiver, EventSink, Intent};
use voicedesk_core::state::SessionState;
use voicedesk_media::{CaptureAdapter, PlaybackAdapter};

use crate::channel::Connector;
use crate::machine::{SessionCore, Step};

/// Handle for driving a voice session from the presentation layer.
///
/// Dropping the handle without calling [`close`](Self::close) still closes
/// the session, releasing the channel and any active audio.
pub struct VoiceSessionHandle {
    sink: EventSink,
    snapshots: watch::Receiver<SessionState>,
    task: Option<JoinHandle<()>>,
}

/// One voice interaction lifetime, from open to close.
pub struct VoiceSession {
    core: SessionCore,
    events: EventReceiver,
    snapshot_tx: watch::Sender<SessionState>,
}

impl VoiceSession {
    /// Start a session in a background task, returning its handle.
    ///
    /// Nothing is opened until the first `connect` or `start_talking`.
    pub fn start(
        endpoint: impl Into<String>,
        connector: Arc<dyn Connector>,
        capture: Box<dyn CaptureAdapter>,
        playback: Box<dyn PlaybackAdapter>,
    ) -> VoiceSessionHandle {
        let (sink, events) = EventSink::new();
        let mut core = SessionCore::new(endpoint, connector, capture, playback, sink.clone());
        let (snapshot_tx, snapshots) = watch::channel(core.snapshot());

        let session = Self {
            core,
            events,
            snapshot_tx,
        };

        let task = tokio::spawn(async move {
            info!("Voice session started");
            session.run().await;
            info!("Voice session ended");
        });

        VoiceSessionHandle {
            sink,
            snapshots,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            let step = self.core.handle(event);
            let snapshot = self.core.snapshot();
            self.snapshot_tx.send_replace(snapshot);
            if step == Step::Terminated {
                break;
            }
        }
        debug!("Voice session queue drained");
    }
}

impl VoiceSessionHandle {
    fn intent(&self, intent: Intent) -> Result<()> {
        if self.sink.intent(intent) {
            Ok(())
        } else {
            Err(VoiceDeskError::SessionClosed)
        }
    }

    pub fn connect(&self) -> Result<()> {
        self.intent(Intent::Connect)
    }

    /// Listen for one utterance, connecting first if needed.
    pub fn start_talking(&self) -> Result<()> {
        self.intent(Intent::StartTalking)
    }

    pub fn stop_talking(&self) -> Result<()> {
        self.intent(Intent::StopTalking)
    }

    pub fn stop_speaking(&self) -> Result<()> {
        self.intent(Intent::StopSpeaking)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionState {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified after every transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.snapshots.clone()
    }

    /// Wait until a snapshot satisfies `predicate`, returning it.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionState) -> bool,
    ) -> Result<SessionState> {
        let mut rx = self.snapshots.clone();
        let state = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| VoiceDeskError::SessionClosed)?;
        Ok(state.clone())
    }

    /// Close the session and wait for the actor to release its resources.
    /// Returns the final snapshot.
    pub async fn close(mut self) -> SessionState {
        let _ = self.sink.intent(Intent::Close);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.snapshots.borrow().clone()
    }
}

impl Drop for VoiceSessionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.sink.intent(Intent::Close);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use voicedesk_core::error::Result;
    use voicedesk_core::event::{ActivationId, CaptureEvent, ChannelEvent, LinkId, UtteranceId};
    use voicedesk_core::protocol::VoiceFrame;
    use voicedesk_core::state::{ConnectionState, Role};

    use super::*;
    use crate::channel::ChannelLink;

    /// Connector that opens instantly and echoes every user utterance back
    /// as an agent reply.
    struct EchoConnector;

    struct EchoLink {
        link: LinkId,
        sink: EventSink,
    }

    impl Connector for EchoConnector {
        fn open(&self, _endpoint: &str, link: LinkId, sink: EventSink) -> Result<Box<dyn ChannelLink>> {
            sink.channel(link, ChannelEvent::Opened);
            Ok(Box::new(EchoLink { link, sink }))
        }
    }

    impl ChannelLink for EchoLink {
        fn send(&mut self, frame: &VoiceFrame) -> Result<()> {
            if let VoiceFrame::UserUtterance { text } = frame {
                self.sink.channel(
                    self.link,
                    ChannelEvent::Message(VoiceFrame::AgentUtterance {
                        text: format!("you said {text}"),
                    }),
                );
            }
            Ok(())
        }

        fn close(&mut self) {}
    }

    /// Capture that immediately hears a fixed phrase.
    struct ScriptedCapture(&'static str);

    impl CaptureAdapter for ScriptedCapture {
        fn available(&self) -> bool {
            true
        }

        fn start(&mut self, activation: ActivationId, sink: EventSink) -> Result<()> {
            sink.capture(activation, CaptureEvent::Utterance(self.0.into()));
            Ok(())
        }

        fn stop(&mut self) {}
    }

    #[derive(Default)]
    struct RecordingPlayback {
        spoken: Arc<Mutex<Vec<String>>>,
        cancels: Arc<Mutex<usize>>,
    }

    impl PlaybackAdapter for RecordingPlayback {
        fn speak(&mut self, _utterance: UtteranceId, text: &str, _sink: EventSink) -> Result<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn cancel(&mut self) {
            *self.cancels.lock().unwrap() += 1;
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_actor() {
        let playback = RecordingPlayback::default();
        let spoken = playback.spoken.clone();

        let handle = VoiceSession::start(
            "ws://echo",
            Arc::new(EchoConnector),
            Box::new(ScriptedCapture("hello")),
            Box::new(playback),
        );

        handle.start_talking().unwrap();
        let state = handle.wait_for(|s| s.is_speaking()).await.unwrap();

        let entries: Vec<_> = state
            .transcript
            .entries()
            .iter()
            .map(|e| (e.role, e.text.as_str()))
            .collect();
        assert_eq!(
            entries,
            vec![(Role::User, "hello"), (Role::Agent, "you said hello")]
        );
        assert_eq!(*spoken.lock().unwrap(), vec!["you said hello".to_string()]);

        let last = handle.close().await;
        assert_eq!(last.connection, ConnectionState::Closing);
    }

    #[tokio::test]
    async fn test_intents_fail_after_close() {
        let playback = RecordingPlayback::default();
        let cancels = playback.cancels.clone();
        let handle = VoiceSession::start(
            "ws://echo",
            Arc::new(EchoConnector),
            Box::new(ScriptedCapture("hi")),
            Box::new(playback),
        );
        let sink = handle.sink.clone();
        handle.close().await;

        assert_eq!(*cancels.lock().unwrap(), 1);
        assert!(!sink.intent(Intent::Connect));
    }

    #[tokio::test]
    async fn test_drop_closes_session() {
        let playback = RecordingPlayback::default();
        let cancels = playback.cancels.clone();
        let handle = VoiceSession::start(
            "ws://echo",
            Arc::new(EchoConnector),
            Box::new(ScriptedCapture("hi")),
            Box::new(playback),
        );
        let mut rx = handle.subscribe();
        drop(handle);

        let _ = rx
            .wait_for(|s| s.connection == ConnectionState::Closing)
            .await;
        assert_eq!(*cancels.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_snapshots_are_versioned() {
        let handle = VoiceSession::start(
            "ws://echo",
            Arc::new(EchoConnector),
            Box::new(ScriptedCapture("hi")),
            Box::new(RecordingPlayback::default()),
        );
        let first = handle.snapshot();
        handle.connect().unwrap();
        let connected = handle.wait_for(|s| s.is_connected()).await.unwrap();
        assert!(connected.version > first.version);
        handle.close().await;
    }
}
