//! Session channel. Persistent duplex link to the remote agent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use voicedesk_core::error::{Result, VoiceDeskError};
use voicedesk_core::event::{ChannelEvent, EventSink, LinkId};
use voicedesk_core::protocol::{MALFORMED_MESSAGE, VoiceFrame};

/// Opens channel instances. `open` returns immediately; the outcome arrives
/// later as `Opened` or `Error` on the sink, tagged with `link`.
pub trait Connector: Send + Sync {
    fn open(&self, endpoint: &str, link: LinkId, sink: EventSink) -> Result<Box<dyn ChannelLink>>;
}

/// One open (or opening) channel instance.
pub trait ChannelLink: Send {
    /// Fails with a send error unless the channel is connected.
    fn send(&mut self, frame: &VoiceFrame) -> Result<()>;

    /// Idempotent; safe on a link that never opened.
    fn close(&mut self);
}

/// JSON-over-WebSocket channel.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, endpoint: &str, link: LinkId, sink: EventSink) -> Result<Box<dyn ChannelLink>> {
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(VoiceDeskError::Connect(format!(
                "not a WebSocket endpoint: {endpoint}"
            )));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let opened = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        tokio::spawn(run_link(
            endpoint.to_string(),
            link,
            sink,
            outbound_rx,
            opened.clone(),
            cancel.clone(),
            self.connect_timeout,
        ));

        Ok(Box::new(WebSocketLink {
            link,
            outbound_tx,
            opened,
            cancel,
        }))
    }
}

struct WebSocketLink {
    link: LinkId,
    outbound_tx: mpsc::UnboundedSender<String>,
    opened: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl ChannelLink for WebSocketLink {
    fn send(&mut self, frame: &VoiceFrame) -> Result<()> {
        if self.cancel.is_cancelled() || !self.opened.load(Ordering::SeqCst) {
            return Err(VoiceDeskError::Send("channel is not connected".into()));
        }
        let text = frame.encode()?;
        self.outbound_tx
            .send(text)
            .map_err(|_| VoiceDeskError::Send("channel writer has stopped".into()))
    }

    fn close(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!(link = self.link, "Closing channel");
            self.cancel.cancel();
        }
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_link(
    endpoint: String,
    link: LinkId,
    sink: EventSink,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    opened: Arc<AtomicBool>,
    cancel: CancellationToken,
    connect_timeout: Duration,
) {
    let connect = tokio::time::timeout(connect_timeout, connect_async(endpoint.as_str()));
    let stream = tokio::select! {
        _ = cancel.cancelled() => return,
        result = connect => match result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                warn!(link, %endpoint, %e, "Channel connect failed");
                sink.channel(link, ChannelEvent::Error(format!("connection failed: {e}")));
                return;
            }
            Err(_) => {
                warn!(link, %endpoint, "Channel connect timed out");
                sink.channel(link, ChannelEvent::Error("connection timed out".into()));
                return;
            }
        }
    };

    info!(link, %endpoint, "Channel connected");
    opened.store(true, Ordering::SeqCst);
    sink.channel(link, ChannelEvent::Opened);

    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            Some(text) = outbound_rx.recv() => {
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    warn!(link, %e, "Channel write failed");
                    sink.channel(link, ChannelEvent::Error(format!("send failed: {e}")));
                    break;
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    sink.channel(link, ChannelEvent::Message(VoiceFrame::decode(text.as_str())));
                }
                Some(Ok(Message::Binary(_))) => {
                    sink.channel(link, ChannelEvent::Message(VoiceFrame::fault(MALFORMED_MESSAGE)));
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(link, "Channel closed by remote");
                    sink.channel(link, ChannelEvent::Closed);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(link, %e, "Channel read failed");
                    sink.channel(link, ChannelEvent::Error(e.to_string()));
                    break;
                }
            },
        }
    }

    opened.store(false, Ordering::SeqCst);
    debug!(link, "Channel task ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicedesk_core::event::SessionEvent;

    #[tokio::test]
    async fn test_rejects_non_websocket_endpoint() {
        let (sink, _rx) = EventSink::new();
        let connector = WebSocketConnector::default();
        let result = connector.open("http://localhost:8000/api/v1/chat/voice/1", 1, sink);
        assert!(matches!(result, Err(VoiceDeskError::Connect(_))));
    }

    #[tokio::test]
    async fn test_send_before_open_fails() {
        let (sink, _rx) = EventSink::new();
        let connector = WebSocketConnector::new(Duration::from_millis(200));
        let mut link = connector.open("ws://127.0.0.1:9/voice", 1, sink).unwrap();
        let err = link.send(&VoiceFrame::user("hello")).unwrap_err();
        assert!(matches!(err, VoiceDeskError::Send(_)));
        link.close();
        link.close();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (sink, mut rx) = EventSink::new();
        let connector = WebSocketConnector::new(Duration::from_secs(2));
        let _link = connector
            .open(&format!("ws://127.0.0.1:{port}/voice"), 5, sink)
            .unwrap();

        match rx.recv().await {
            Some(SessionEvent::Channel {
                link: 5,
                event: ChannelEvent::Error(_),
            }) => {}
            other => panic!("expected channel error, got {other:?}"),
        }
    }
}
