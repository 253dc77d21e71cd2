// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation expiry.

use std::time::Duration;

use parla_config::model::ChatConfig;
use parla_core::types::{Conversation, timestamp_after};

/// Expiry for a conversation after a write.
///
/// Transcripts without any non-blank user turn get the short empty-conversation TTL.
pub fn conversation_expiry(conversation: &Conversation, config: &ChatConfig) -> String {
    let secs = if conversation.has_user_content() {
        config.conversation_ttl_secs
    } else {
        config.empty_conversation_ttl_secs
    };
    timestamp_after(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parla_core::types::{Message, now_timestamp};

    fn conversation(messages: Vec<Message>) -> Conversation {
        Conversation {
            id: "c1".into(),
            owner: "s@example.com".into(),
            topic: "cafe".into(),
            difficulty: "beginner".into(),
            scenario: String::new(),
            persona: String::new(),
            messages,
            created_at: now_timestamp(),
            expires_at: now_timestamp(),
        }
    }

    #[test]
    fn user_content_selects_long_ttl() {
        let config = ChatConfig {
            conversation_ttl_secs: 86_400,
            empty_conversation_ttl_secs: 60,
            ..ChatConfig::default()
        };
        let empty = conversation_expiry(&conversation(vec![Message::user("  ")]), &config);
        let full = conversation_expiry(
            &conversation(vec![Message::user("Hi"), Message::assistant("Hello")]),
            &config,
        );
        let soon = timestamp_after(Duration::from_secs(3600));
        assert!(empty < soon, "{empty} should be within the hour");
        assert!(full > soon, "{full} should be a day out");
    }
}
