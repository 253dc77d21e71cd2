// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parla practice backend.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Parla configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParlaConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chat turn processing settings.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Sentence audio staging and caching settings.
    #[serde(default)]
    pub audio: AudioConfig,

    /// Anthropic API settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Speech synthesis API settings.
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Queue worker loop settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Role-play scenario catalog, looked up by topic.
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<ScenarioConfig>,
}

impl Default for ParlaConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            storage: StorageConfig::default(),
            chat: ChatConfig::default(),
            audio: AudioConfig::default(),
            anthropic: AnthropicConfig::default(),
            speech: SpeechConfig::default(),
            worker: WorkerConfig::default(),
            scenarios: default_scenarios(),
        }
    }
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name of the service.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "parla".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("parla").join("parla.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parla.db"))
        .to_string_lossy()
        .to_string()
}

fn default_true() -> bool {
    true
}

/// Chat turn processing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Dispatch model calls through the job queue instead of answering inline.
    #[serde(default = "default_true")]
    pub async_mode: bool,

    /// Hard cap on stored messages (user and assistant) per conversation.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Number of trailing messages sent to the model.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Conversation expiry once the student has said something.
    #[serde(default = "default_conversation_ttl_secs")]
    pub conversation_ttl_secs: u64,

    /// Conversation expiry while no user turn carries text.
    #[serde(default = "default_empty_conversation_ttl_secs")]
    pub empty_conversation_ttl_secs: u64,

    /// Job status row expiry.
    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,

    /// Fixed closing line appended when a conversation reaches its limit.
    #[serde(default = "default_wrap_up_message")]
    pub wrap_up_message: String,

    /// Queue carrying chat completion jobs.
    #[serde(default = "default_chat_queue")]
    pub queue_name: String,

    /// Model override for chat turns. `None` uses the provider default.
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            async_mode: true,
            max_messages: default_max_messages(),
            history_window: default_history_window(),
            conversation_ttl_secs: default_conversation_ttl_secs(),
            empty_conversation_ttl_secs: default_empty_conversation_ttl_secs(),
            job_ttl_secs: default_job_ttl_secs(),
            wrap_up_message: default_wrap_up_message(),
            queue_name: default_chat_queue(),
            model: None,
        }
    }
}

fn default_max_messages() -> usize {
    15
}

fn default_history_window() -> usize {
    10
}

fn default_conversation_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_empty_conversation_ttl_secs() -> u64 {
    60 * 60
}

fn default_job_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_wrap_up_message() -> String {
    "That's all the time we have for today. You did a great job keeping the \
     conversation going! Let's practice again soon."
        .to_string()
}

fn default_chat_queue() -> String {
    "chat-jobs".to_string()
}

/// Sentence audio staging and cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AudioConfig {
    /// Queue carrying synthesis jobs.
    #[serde(default = "default_tts_queue")]
    pub queue_name: String,

    /// Entries per enqueue call (1..=10).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sentence audio record expiry.
    #[serde(default = "default_record_ttl_secs")]
    pub record_ttl_secs: u64,

    /// Lifetime of minted audio URLs.
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,

    /// Object key prefix for cached audio.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Voice used when a request does not name one.
    #[serde(default = "default_voice")]
    pub default_voice: String,

    /// Measure and record audio duration.
    #[serde(default = "default_true")]
    pub track_duration: bool,

    /// Local directory backing the object store. `None` keeps objects in memory.
    #[serde(default)]
    pub blob_root: Option<String>,

    /// Base URL audio objects are served from.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// HMAC secret for signed audio URLs. `None` requires `PARLA_AUDIO_URL_SIGNING_SECRET`.
    #[serde(default)]
    pub url_signing_secret: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            queue_name: default_tts_queue(),
            batch_size: default_batch_size(),
            record_ttl_secs: default_record_ttl_secs(),
            url_ttl_secs: default_url_ttl_secs(),
            key_prefix: default_key_prefix(),
            default_voice: default_voice(),
            track_duration: true,
            blob_root: None,
            public_base_url: default_public_base_url(),
            url_signing_secret: None,
        }
    }
}

fn default_tts_queue() -> String {
    "tts-jobs".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_record_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_url_ttl_secs() -> u64 {
    60 * 60
}

fn default_key_prefix() -> String {
    "tts".to_string()
}

fn default_voice() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8080/audio".to_string()
}

/// Anthropic API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// Anthropic API key. `None` requires environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Default model to use for LLM requests.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Maximum tokens to generate per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Anthropic API version string.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: default_model(),
            max_tokens: default_max_tokens(),
            api_version: default_api_version(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

/// Speech synthesis API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpeechConfig {
    /// Provider API key. `None` requires environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the text-to-speech API.
    #[serde(default = "default_speech_base_url")]
    pub base_url: String,

    /// Synthesis model identifier.
    #[serde(default = "default_speech_model")]
    pub model_id: String,

    /// Requested output format (e.g. `mp3_44100_128`, `pcm_16000`).
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_speech_base_url(),
            model_id: default_speech_model(),
            output_format: default_output_format(),
        }
    }
}

fn default_speech_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_speech_model() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_output_format() -> String {
    "mp3_44100_128".to_string()
}

/// Queue worker loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Sleep between polls when a queue is empty.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a claimed entry stays invisible before it is redelivered.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Delivery attempts before an entry is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            lock_timeout_secs: default_lock_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_lock_timeout_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

/// One role-play scenario, selected by topic when a chat starts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Topic key clients pick from.
    pub topic: String,

    /// Human-readable topic description.
    pub description: String,

    /// Role the assistant plays.
    pub persona: String,

    /// Situation the student is placed in.
    pub situation: String,
}

fn default_scenarios() -> Vec<ScenarioConfig> {
    vec![
        ScenarioConfig {
            topic: "cafe".to_string(),
            description: "Ordering drinks and snacks at a coffee shop".to_string(),
            persona: "a friendly barista".to_string(),
            situation: "You walk up to the counter of a busy cafe to order.".to_string(),
        },
        ScenarioConfig {
            topic: "travel".to_string(),
            description: "Checking in and asking for help while travelling".to_string(),
            persona: "a hotel front desk clerk".to_string(),
            situation: "You arrive at your hotel late in the evening.".to_string(),
        },
        ScenarioConfig {
            topic: "interview".to_string(),
            description: "Answering common job interview questions".to_string(),
            persona: "a hiring manager".to_string(),
            situation: "You are interviewing for a position you applied to.".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_turn_and_batch_limits() {
        let config = ParlaConfig::default();
        assert_eq!(config.chat.max_messages, 15);
        assert_eq!(config.audio.batch_size, 10);
        assert!(config.chat.async_mode);
        assert!(!config.chat.wrap_up_message.is_empty());
    }

    #[test]
    fn default_scenarios_are_present() {
        let config = ParlaConfig::default();
        assert!(config.scenarios.iter().any(|s| s.topic == "cafe"));
    }

    #[test]
    fn explicit_scenarios_replace_defaults() {
        let toml_str = r#"
[[scenarios]]
topic = "market"
description = "Haggling at a street market"
persona = "a fruit vendor"
situation = "You want to buy apples."
"#;
        let config: ParlaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scenarios.len(), 1);
        assert_eq!(config.scenarios[0].persona, "a fruit vendor");
    }

    #[test]
    fn scenarios_deny_unknown_fields() {
        let toml_str = r#"
[[scenarios]]
topic = "market"
description = "x"
persona = "y"
situation = "z"
mood = "grumpy"
"#;
        assert!(toml::from_str::<ParlaConfig>(toml_str).is_err());
    }
}
