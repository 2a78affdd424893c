//! `voicedesk voice`: a live voice session on the console.
//!
//! Each typed line is one utterance; the agent's replies are "spoken" to the
//! terminal word by word and can be interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

use voicedesk_core::config::Config;
use voicedesk_core::protocol::voice_endpoint;
use voicedesk_core::state::{Role, SessionPhase, SessionState};
use voicedesk_media::{LineCapture, LineFeed, TerminalPlayback};
use voicedesk_session::{VoiceSession, VoiceSessionHandle, WebSocketConnector};

const HELP: &str = "Type to speak. /talk listens for one line, /stop stops listening, \
/hush interrupts the agent, /connect reconnects, /quit leaves.";

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Connect,
    Talk,
    Stop,
    Hush,
    Quit,
    Help,
    Say(&'a str),
    Empty,
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        match line {
            "" => Self::Empty,
            "/connect" => Self::Connect,
            "/talk" => Self::Talk,
            "/stop" => Self::Stop,
            "/hush" => Self::Hush,
            "/quit" | "/exit" => Self::Quit,
            "/help" => Self::Help,
            cmd if cmd.starts_with('/') => Self::Unknown(cmd),
            text => Self::Say(text),
        }
    }
}

pub async fn run(config: &Config, agent_id: u64) -> anyhow::Result<()> {
    let base_url = config.base_url();
    let endpoint = voice_endpoint(&base_url, agent_id)
        .ok_or_else(|| anyhow!("server base_url must be http(s) or ws(s): {base_url}"))?;

    let (feed, capture) = LineCapture::new(Duration::from_millis(config.listen_timeout_ms()));
    let playback = TerminalPlayback::stdout(config.words_per_minute(), "Agent: ");
    let connector = WebSocketConnector::new(Duration::from_millis(config.connect_timeout_ms()));

    info!(agent_id, %endpoint, "Starting voice session");
    let handle = VoiceSession::start(
        endpoint,
        Arc::new(connector),
        Box::new(capture),
        Box::new(playback),
    );
    let render = tokio::spawn(render(handle.subscribe(), config.echo_transcript()));

    println!("{HELP}");
    handle.connect()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line.context("failed to read stdin")?,
        };
        let Some(line) = line else { break };

        match Command::parse(&line) {
            Command::Quit => break,
            Command::Connect => handle.connect()?,
            Command::Talk => handle.start_talking()?,
            Command::Stop => handle.stop_talking()?,
            Command::Hush => handle.stop_speaking()?,
            Command::Help => println!("{HELP}"),
            Command::Say(text) => say(&handle, &feed, text)?,
            Command::Empty => {}
            Command::Unknown(cmd) => println!("Unknown command: {cmd}"),
        }
    }

    let last = handle.close().await;
    let _ = render.await;
    info!(entries = last.transcript.len(), "Voice session closed");
    Ok(())
}

/// Speak one line: interrupt the agent if needed, then listen unless an
/// activation is already waiting for input.
fn say(handle: &VoiceSessionHandle, feed: &LineFeed, text: &str) -> anyhow::Result<()> {
    let state = handle.snapshot();
    if state.is_speaking() {
        handle.stop_speaking()?;
    }
    if !feed.push(text) {
        warn!("Capture input is closed");
        return Ok(());
    }
    if !state.is_listening() {
        handle.start_talking()?;
    }
    Ok(())
}

fn phase_label(phase: SessionPhase) -> Option<&'static str> {
    match phase {
        SessionPhase::Connecting => Some("connecting…"),
        SessionPhase::Idle => Some("connected"),
        SessionPhase::Disconnected => Some("disconnected"),
        SessionPhase::Errored => Some("disconnected (error)"),
        SessionPhase::Listening | SessionPhase::Speaking | SessionPhase::Closing => None,
    }
}

/// Print transcript growth, phase changes and errors from each snapshot.
/// Agent lines are printed by playback itself.
async fn render(mut rx: watch::Receiver<SessionState>, echo_user: bool) {
    let mut seen = 0;
    let mut phase = rx.borrow().phase();
    let mut last_error: Option<String> = None;

    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();

        let mut shown_error = None;
        for entry in state.transcript.since(seen) {
            match entry.role {
                Role::User if echo_user => println!("You: {}", entry.text),
                Role::Error => {
                    println!("Error: {}", entry.text);
                    shown_error = Some(entry.text.clone());
                }
                _ => {}
            }
        }
        seen = state.transcript.len();

        if state.last_error != last_error {
            if let Some(err) = &state.last_error {
                if shown_error.as_ref() != Some(err) {
                    println!("! {err}");
                }
            }
            last_error = state.last_error.clone();
        }

        let current = state.phase();
        if current != phase {
            // Idle after Listening/Speaking is not news.
            let resumed = current == SessionPhase::Idle
                && matches!(phase, SessionPhase::Listening | SessionPhase::Speaking);
            if !resumed {
                if let Some(label) = phase_label(current) {
                    println!("[{label}]");
                }
            }
            phase = current;
        }
    }
}
