// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scenario catalog and role-play prompt construction.

use std::collections::HashMap;

use parla_config::ScenarioConfig;
use parla_core::ParlaError;
use parla_core::types::{Conversation, Message, Role};

/// Difficulty tags accepted by [`ScenarioCatalog`] lookups.
pub const DIFFICULTIES: [&str; 3] = ["beginner", "intermediate", "advanced"];

/// Read-only topic lookup, built once from configuration.
#[derive(Debug, Clone)]
pub struct ScenarioCatalog {
    scenarios: HashMap<String, ScenarioConfig>,
}

impl ScenarioCatalog {
    pub fn new(scenarios: Vec<ScenarioConfig>) -> Self {
        Self {
            scenarios: scenarios
                .into_iter()
                .map(|s| (s.topic.to_lowercase(), s))
                .collect(),
        }
    }

    /// Look up a topic, case-insensitively.
    pub fn get(&self, topic: &str) -> Option<&ScenarioConfig> {
        self.scenarios.get(&topic.trim().to_lowercase())
    }

    /// Resolve `topic`, or fail with a validation error listing known topics.
    pub fn resolve(&self, topic: &str) -> Result<&ScenarioConfig, ParlaError> {
        self.get(topic).ok_or_else(|| {
            ParlaError::Validation(format!(
                "unknown topic '{topic}' (available: {})",
                self.topics().join(", ")
            ))
        })
    }

    /// Known topic keys, sorted.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.scenarios.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }
}

/// Builds system prompts and model-facing history for a conversation.
pub struct PromptBuilder;

impl PromptBuilder {
    /// The role-play system prompt for a conversation.
    pub fn system_prompt(conversation: &Conversation, max_messages: usize) -> String {
        format!(
            "You are {persona}. Stay in character for a role-play with an English learner.\n\
             Topic: {topic}\n\
             Situation: {scenario}\n\
             Learner level: {difficulty}\n\n\
             {guidance}\n\
             Reply in one to three short sentences and end with a question or prompt that \
             keeps the conversation going. The conversation lasts at most {max_messages} \
             messages in total.",
            persona = conversation.persona,
            topic = conversation.topic,
            scenario = conversation.scenario,
            difficulty = conversation.difficulty,
            guidance = difficulty_guidance(&conversation.difficulty),
        )
    }

    /// Prompt asking for practice sentences as a JSON array.
    pub fn sentence_prompt(conversation: &Conversation, count: usize) -> String {
        format!(
            "You create speaking practice material for an English learner at the {difficulty} \
             level. The learner is practicing the topic \"{topic}\" ({scenario}).\n\n\
             Write {count} natural English sentences the learner could say in this situation, \
             each with a Korean translation. Respond with only a JSON array of objects with \
             the keys \"english\" and \"korean\", and no other text.",
            difficulty = conversation.difficulty,
            topic = conversation.topic,
            scenario = conversation.scenario,
        )
    }

    /// The trailing `window` messages, trimmed so the history opens on a user turn.
    pub fn history(conversation: &Conversation, window: usize) -> Vec<Message> {
        let mut recent = conversation.recent_messages(window);
        let first_user = recent
            .iter()
            .position(|m| m.role == Role::User)
            .unwrap_or(recent.len());
        recent.drain(..first_user);
        recent
    }
}

fn difficulty_guidance(difficulty: &str) -> &'static str {
    match difficulty {
        "beginner" => "Use simple everyday words and short sentences. Speak slowly and clearly.",
        "advanced" => "Use natural, idiomatic English at native speed, including phrasal verbs.",
        _ => "Use clear, natural English with common expressions.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parla_core::types::now_timestamp;

    fn catalog() -> ScenarioCatalog {
        ScenarioCatalog::new(vec![
            ScenarioConfig {
                topic: "Cafe".into(),
                description: "Ordering coffee".into(),
                persona: "a friendly barista".into(),
                situation: "You are at the counter.".into(),
            },
            ScenarioConfig {
                topic: "airport".into(),
                description: "Checking in".into(),
                persona: "an airline agent".into(),
                situation: "You are at the check-in desk.".into(),
            },
        ])
    }

    fn conversation(messages: Vec<Message>) -> Conversation {
        Conversation {
            id: "c1".into(),
            owner: "s@example.com".into(),
            topic: "cafe".into(),
            difficulty: "beginner".into(),
            scenario: "You are at the counter.".into(),
            persona: "a friendly barista".into(),
            messages,
            created_at: now_timestamp(),
            expires_at: now_timestamp(),
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let catalog = catalog();
        assert_eq!(catalog.get(" CAFE ").unwrap().persona, "a friendly barista");
        assert!(catalog.get("bank").is_none());
        assert_eq!(catalog.topics(), vec!["airport", "cafe"]);
    }

    #[test]
    fn unknown_topic_is_a_validation_error() {
        let err = catalog().resolve("bank").unwrap_err();
        assert!(matches!(err, ParlaError::Validation(_)));
        assert!(err.to_string().contains("airport, cafe"));
    }

    #[test]
    fn system_prompt_carries_persona_and_level() {
        let prompt = PromptBuilder::system_prompt(&conversation(vec![]), 15);
        assert!(prompt.starts_with("You are a friendly barista."));
        assert!(prompt.contains("Learner level: beginner"));
        assert!(prompt.contains("simple everyday words"));
        assert!(prompt.contains("at most 15"));
    }

    #[test]
    fn history_opens_on_a_user_turn() {
        let messages = vec![
            Message::user("1"),
            Message::assistant("2"),
            Message::user("3"),
            Message::assistant("4"),
            Message::user("5"),
        ];
        let history = PromptBuilder::history(&conversation(messages), 4);
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["3", "4", "5"]);
    }

    #[test]
    fn history_of_assistant_only_transcript_is_empty() {
        let history = PromptBuilder::history(&conversation(vec![Message::assistant("hi")]), 10);
        assert!(history.is_empty());
    }
}
