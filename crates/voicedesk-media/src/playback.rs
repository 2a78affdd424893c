//! Speech playback: at most one utterance audible at any instant.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use voicedesk_core::error::{Result, VoiceDeskError};
use voicedesk_core::event::{EventSink, PlaybackEvent, UtteranceId};

/// Text-to-speech playback.
///
/// `speak` preempts: an utterance still in flight is cancelled before the new
/// one begins, never queued. A cancelled utterance posts no further events.
pub trait PlaybackAdapter: Send {
    fn speak(&mut self, utterance: UtteranceId, text: &str, sink: EventSink) -> Result<()>;

    /// Stop any in-progress utterance. No-op when idle.
    fn cancel(&mut self);
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Console playback: "speaks" by writing the utterance word by word at a
/// fixed speaking rate.
pub struct TerminalPlayback {
    out: SharedWriter,
    word_delay: Duration,
    prefix: String,
    active: Option<CancellationToken>,
}

impl TerminalPlayback {
    pub fn new(out: Box<dyn Write + Send>, words_per_minute: u32, prefix: impl Into<String>) -> Self {
        let words_per_minute = words_per_minute.max(1) as u64;
        Self {
            out: Arc::new(Mutex::new(out)),
            word_delay: Duration::from_millis(60_000 / words_per_minute),
            prefix: prefix.into(),
            active: None,
        }
    }

    pub fn stdout(words_per_minute: u32, prefix: impl Into<String>) -> Self {
        Self::new(Box::new(std::io::stdout()), words_per_minute, prefix)
    }

    pub fn is_speaking(&self) -> bool {
        self.active.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

fn write_out(out: &SharedWriter, text: &str) -> std::io::Result<()> {
    let mut out = out
        .lock()
        .map_err(|_| std::io::Error::other("playback output poisoned"))?;
    out.write_all(text.as_bytes())?;
    out.flush()
}

impl PlaybackAdapter for TerminalPlayback {
    fn speak(&mut self, utterance: UtteranceId, text: &str, sink: EventSink) -> Result<()> {
        self.cancel();

        let words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        if words.is_empty() {
            return Err(VoiceDeskError::Playback("nothing to speak".into()));
        }

        let cancel = CancellationToken::new();
        self.active = Some(cancel.clone());

        let out = self.out.clone();
        let word_delay = self.word_delay;
        let prefix = self.prefix.clone();

        tokio::spawn(async move {
            sink.playback(utterance, PlaybackEvent::Started);
            let spoken = async {
                write_out(&out, &prefix)?;
                for (i, word) in words.iter().enumerate() {
                    tokio::time::sleep(word_delay).await;
                    let sep = if i == 0 { "" } else { " " };
                    write_out(&out, &format!("{sep}{word}"))?;
                }
                write_out(&out, "\n")
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(utterance, "Playback cancelled");
                    let _ = write_out(&out, " …\n");
                }
                result = spoken => match result {
                    Ok(()) => {
                        cancel.cancel();
                        sink.playback(utterance, PlaybackEvent::Finished);
                    }
                    Err(e) => {
                        warn!(utterance, %e, "Playback output failed");
                        cancel.cancel();
                        sink.playback(utterance, PlaybackEvent::Error(e.to_string()));
                    }
                },
            }
        });

        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.active.take() {
            cancel.cancel();
        }
    }
}
