//! Core types, config, errors, and wire protocol for VoiceDesk.

pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod state;
