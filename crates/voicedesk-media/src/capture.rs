//! Speech capture: one finalized utterance per activation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use voicedesk_core::error::{Result, VoiceDeskError};
use voicedesk_core::event::{ActivationId, CaptureEvent, EventSink};

/// Speech-to-text capture.
///
/// Activation is single-shot: every successful `start()` is answered by
/// exactly one terminal [`CaptureEvent`] posted for that activation id.
pub trait CaptureAdapter: Send {
    /// Capability probe. Never fails.
    fn available(&self) -> bool;

    /// Begin listening. Fails if already listening or capture is unavailable.
    fn start(&mut self, activation: ActivationId, sink: EventSink) -> Result<()>;

    /// Request early termination. No-op when idle.
    fn stop(&mut self);
}

/// Producer side of a [`LineCapture`]: every pushed line is one utterance.
#[derive(Debug, Clone)]
pub struct LineFeed {
    tx: mpsc::UnboundedSender<String>,
}

impl LineFeed {
    pub fn push(&self, line: impl Into<String>) -> bool {
        self.tx.send(line.into()).is_ok()
    }
}

/// Console capture: each activation takes the next line pushed into its
/// [`LineFeed`]. A blank line, a timeout or an early `stop()` all end the
/// activation with `NoSpeechDetected`.
pub struct LineCapture {
    lines: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    listen_timeout: Duration,
    /// Active activation id, 0 when idle.
    current: Arc<AtomicU64>,
    input_closed: Arc<AtomicBool>,
    cancel: Option<CancellationToken>,
}

impl LineCapture {
    pub fn new(listen_timeout: Duration) -> (LineFeed, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let capture = Self {
            lines: Arc::new(Mutex::new(rx)),
            listen_timeout,
            current: Arc::new(AtomicU64::new(0)),
            input_closed: Arc::new(AtomicBool::new(false)),
            cancel: None,
        };
        (LineFeed { tx }, capture)
    }

    pub fn is_listening(&self) -> bool {
        self.current.load(Ordering::SeqCst) != 0
    }
}

impl CaptureAdapter for LineCapture {
    fn available(&self) -> bool {
        !self.input_closed.load(Ordering::SeqCst)
    }

    fn start(&mut self, activation: ActivationId, sink: EventSink) -> Result<()> {
        if !self.available() {
            return Err(VoiceDeskError::Capture("speech input is unavailable".into()));
        }
        if self
            .current
            .compare_exchange(0, activation, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VoiceDeskError::Capture("already listening".into()));
        }

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let lines = self.lines.clone();
        let current = self.current.clone();
        let input_closed = self.input_closed.clone();
        let listen_timeout = self.listen_timeout;

        tokio::spawn(async move {
            debug!(activation, "Capture started");
            let event = tokio::select! {
                _ = cancel.cancelled() => CaptureEvent::NoSpeechDetected,
                event = next_utterance(&lines, listen_timeout, &input_closed) => event,
            };
            let _ = current.compare_exchange(activation, 0, Ordering::SeqCst, Ordering::SeqCst);
            debug!(activation, ?event, "Capture finished");
            sink.capture(activation, event);
        });

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.current.store(0, Ordering::SeqCst);
    }
}

async fn next_utterance(
    lines: &Mutex<mpsc::UnboundedReceiver<String>>,
    listen_timeout: Duration,
    input_closed: &AtomicBool,
) -> CaptureEvent {
    let mut lines = lines.lock().await;
    match tokio::time::timeout(listen_timeout, lines.recv()).await {
        Err(_) => CaptureEvent::NoSpeechDetected,
        Ok(None) => {
            input_closed.store(true, Ordering::SeqCst);
            CaptureEvent::Error("speech input closed".into())
        }
        Ok(Some(line)) => {
            let text = line.trim();
            if text.is_empty() {
                CaptureEvent::NoSpeechDetected
            } else {
                CaptureEvent::Utterance(text.to_string())
            }
        }
    }
}
