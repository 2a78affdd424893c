//! `voicedesk chat` and `voicedesk sessions`: the text relay on the console.

use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};

use voicedesk_core::config::Config;
use voicedesk_core::state::{Role, TranscriptEntry};
use voicedesk_relay::{ChatSession, HttpRelay, TextRelay};

fn print_entry(entry: &TranscriptEntry) {
    match entry.role {
        Role::Agent => println!("Agent: {}", entry.text),
        Role::Error => println!("Error: {}", entry.text),
        Role::User => println!("You: {}", entry.text),
    }
}

pub async fn run(
    config: &Config,
    agent_id: u64,
    message: Option<String>,
    session: Option<String>,
) -> anyhow::Result<()> {
    let relay = Arc::new(HttpRelay::from_config(config)?);
    let mut chat = ChatSession::new(relay, agent_id, session);

    if let Some(message) = message {
        let Some(entry) = chat.say(&message).await else {
            bail!("message is empty");
        };
        print_entry(entry);
        if entry.role == Role::Error {
            bail!("agent {agent_id} did not respond");
        }
        return Ok(());
    }

    println!(
        "Chatting with agent {agent_id} (session {}). /reset starts over, /quit leaves.",
        chat.session_id()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        match line.trim() {
            "/quit" | "/exit" => break,
            "/reset" => {
                let reset = chat.reset().await;
                match reset {
                    Ok(()) => println!("Started session {}", chat.session_id()),
                    Err(e) => println!("Error: {e}"),
                }
            }
            text => {
                if let Some(entry) = chat.say(text).await {
                    print_entry(entry);
                }
            }
        }
    }
    Ok(())
}

pub async fn list_sessions(config: &Config, agent_id: u64) -> anyhow::Result<()> {
    let relay = HttpRelay::from_config(config)?;
    let sessions = relay.list_sessions(agent_id).await?;
    if sessions.is_empty() {
        println!("No chat sessions for agent {agent_id}");
        return Ok(());
    }
    println!("{:<32} MESSAGES", "SESSION");
    for session in sessions {
        println!("{:<32} {}", session.session_id, session.message_count);
    }
    Ok(())
}

pub async fn clear_session(config: &Config, agent_id: u64, session_id: &str) -> anyhow::Result<()> {
    let relay = HttpRelay::from_config(config)?;
    let message = relay.clear_session(agent_id, session_id).await?;
    println!("{message}");
    Ok(())
}
