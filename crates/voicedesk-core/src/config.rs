//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, VoiceDeskError};

/// Top-level VoiceDesk configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Agent platform server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP(S) base URL of the agent platform (default: http://localhost:8000).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Voice channel connect timeout in ms (default: 10000).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Text relay request timeout in ms (default: 30000).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_request_timeout() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Console playback pace (default: 180).
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,

    /// How long one capture activation waits for speech, in ms (default: 8000).
    #[serde(default = "default_listen_timeout")]
    pub listen_timeout_ms: u64,

    /// Print user transcript entries as they are recorded.
    #[serde(default = "default_true")]
    pub echo_transcript: bool,
}

fn default_words_per_minute() -> u32 {
    180
}

fn default_listen_timeout() -> u64 {
    8_000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "voicedesk_session=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };
    re.replace_all(input, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        let config: Self = json5::from_str(&substituted).map_err(|e| {
            warn!(path = %path.display(), %e, "Config file is not valid JSON5");
            VoiceDeskError::Config(e.to_string())
        })?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn base_url(&self) -> String {
        self.server
            .as_ref()
            .map(|s| s.base_url.clone())
            .unwrap_or_else(default_base_url)
    }

    pub fn connect_timeout_ms(&self) -> u64 {
        self.server
            .as_ref()
            .map(|s| s.connect_timeout_ms)
            .unwrap_or_else(default_connect_timeout)
    }

    pub fn request_timeout_ms(&self) -> u64 {
        self.server
            .as_ref()
            .map(|s| s.request_timeout_ms)
            .unwrap_or_else(default_request_timeout)
    }

    pub fn words_per_minute(&self) -> u32 {
        self.voice
            .as_ref()
            .map(|v| v.words_per_minute)
            .unwrap_or_else(default_words_per_minute)
    }

    pub fn listen_timeout_ms(&self) -> u64 {
        self.voice
            .as_ref()
            .map(|v| v.listen_timeout_ms)
            .unwrap_or_else(default_listen_timeout)
    }

    pub fn echo_transcript(&self) -> bool {
        self.voice.as_ref().is_none_or(|v| v.echo_transcript)
    }

    /// Get a config value by dotted path (e.g. "server.base_url").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(server) = &self.server {
            let url = server.base_url.as_str();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(format!("Server base_url must be http(s): {url}"));
            }
            if server.connect_timeout_ms == 0 {
                errors.push("Server connect_timeout_ms cannot be 0".to_string());
            }
            if server.request_timeout_ms == 0 {
                errors.push("Server request_timeout_ms cannot be 0".to_string());
            }
        }

        if let Some(voice) = &self.voice {
            if voice.words_per_minute == 0 {
                errors.push("Voice words_per_minute cannot be 0".to_string());
            }
            if voice.listen_timeout_ms < 1_000 {
                warnings.push(format!(
                    "Voice listen_timeout_ms of {} gives very little time to speak",
                    voice.listen_timeout_ms
                ));
            }
        }

        if let Some(logging) = &self.logging {
            if !matches!(logging.format.as_str(), "plain" | "json") {
                warnings.push(format!(
                    "Unknown log format '{}', falling back to plain",
                    logging.format
                ));
            }
        }

        (warnings, errors)
    }
}

/// Base directory for VoiceDesk data: `~/.voicedesk/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".voicedesk")
}
