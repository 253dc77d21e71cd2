// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as batch size bounds, non-zero lifetimes, and unique scenario topics.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::ParlaConfig;

/// The queue accepts at most this many entries per batched call.
const MAX_BATCH_SIZE: usize = 10;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation instead of stopping at the first one.
pub fn validate_config(config: &ParlaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        fail(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    // Chat
    if config.chat.max_messages < 2 {
        fail(format!(
            "chat.max_messages must be at least 2, got {}",
            config.chat.max_messages
        ));
    }
    if config.chat.history_window == 0 {
        fail("chat.history_window must be at least 1".to_string());
    }
    if config.chat.wrap_up_message.trim().is_empty() {
        fail("chat.wrap_up_message must not be empty".to_string());
    }
    for (key, value) in [
        ("chat.conversation_ttl_secs", config.chat.conversation_ttl_secs),
        (
            "chat.empty_conversation_ttl_secs",
            config.chat.empty_conversation_ttl_secs,
        ),
        ("chat.job_ttl_secs", config.chat.job_ttl_secs),
        ("audio.record_ttl_secs", config.audio.record_ttl_secs),
        ("audio.url_ttl_secs", config.audio.url_ttl_secs),
        ("worker.lock_timeout_secs", config.worker.lock_timeout_secs),
    ] {
        if value == 0 {
            fail(format!("{key} must be greater than zero"));
        }
    }

    // Queues
    if config.chat.queue_name.trim().is_empty() {
        fail("chat.queue_name must not be empty".to_string());
    }
    if config.audio.queue_name.trim().is_empty() {
        fail("audio.queue_name must not be empty".to_string());
    }
    if config.chat.queue_name == config.audio.queue_name {
        fail(format!(
            "chat.queue_name and audio.queue_name must differ, both are `{}`",
            config.chat.queue_name
        ));
    }
    if !(1..=MAX_BATCH_SIZE).contains(&config.audio.batch_size) {
        fail(format!(
            "audio.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
            config.audio.batch_size
        ));
    }
    if config.worker.max_attempts == 0 {
        fail("worker.max_attempts must be at least 1".to_string());
    }

    // Audio keys
    if config.audio.key_prefix.trim_matches('/').is_empty() {
        fail("audio.key_prefix must not be empty".to_string());
    }
    if config.audio.default_voice.trim().is_empty() {
        fail("audio.default_voice must not be empty".to_string());
    }

    // Scenarios
    if config.scenarios.is_empty() {
        fail("at least one [[scenarios]] entry is required".to_string());
    }
    let mut seen = HashSet::new();
    for scenario in &config.scenarios {
        let topic = scenario.topic.trim();
        if topic.is_empty() {
            fail("scenarios.topic must not be empty".to_string());
        } else if !seen.insert(topic.to_lowercase()) {
            fail(format!("duplicate scenario topic `{topic}`"));
        }
        if scenario.persona.trim().is_empty() {
            fail(format!("scenario `{topic}` must define a persona"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScenarioConfig;

    fn messages(result: Result<(), Vec<ConfigError>>) -> Vec<String> {
        result
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ParlaConfig::default()).is_ok());
    }

    #[test]
    fn batch_size_above_queue_limit_is_rejected() {
        let mut config = ParlaConfig::default();
        config.audio.batch_size = 11;
        let errors = messages(validate_config(&config));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("audio.batch_size"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = ParlaConfig::default();
        config.audio.batch_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ParlaConfig::default();
        config.chat.max_messages = 1;
        config.chat.history_window = 0;
        config.audio.url_ttl_secs = 0;
        config.service.log_level = "loud".to_string();
        let errors = messages(validate_config(&config));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn duplicate_topics_are_rejected_case_insensitively() {
        let mut config = ParlaConfig::default();
        config.scenarios.push(ScenarioConfig {
            topic: "Cafe".to_string(),
            description: "again".to_string(),
            persona: "another barista".to_string(),
            situation: "same counter".to_string(),
        });
        let errors = messages(validate_config(&config));
        assert!(errors.iter().any(|e| e.contains("duplicate scenario topic")));
    }

    #[test]
    fn shared_queue_name_is_rejected() {
        let mut config = ParlaConfig::default();
        config.audio.queue_name = config.chat.queue_name.clone();
        let errors = messages(validate_config(&config));
        assert!(errors[0].contains("must differ"));
    }

    #[test]
    fn empty_scenario_catalog_is_rejected() {
        let mut config = ParlaConfig::default();
        config.scenarios.clear();
        assert!(validate_config(&config).is_err());
    }
}
