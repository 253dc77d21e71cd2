// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat job queue message.

use parla_core::ParlaError;
use parla_core::types::Message;
use serde::{Deserialize, Serialize};

/// A chat completion job as carried on the queue.
///
/// `student_email` is informational. Authorization happened at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatJobMessage {
    pub request_id: String,
    pub conversation_id: String,
    pub student_email: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
}

impl ChatJobMessage {
    pub fn to_payload(&self) -> Result<String, ParlaError> {
        serde_json::to_string(self).map_err(|e| ParlaError::Internal(format!("encode chat job: {e}")))
    }

    /// Decode a queue payload. A payload that does not decode is a validation error.
    pub fn from_payload(payload: &str) -> Result<Self, ParlaError> {
        let job: Self = serde_json::from_str(payload)
            .map_err(|e| ParlaError::Validation(format!("undecodable chat job: {e}")))?;
        if job.request_id.trim().is_empty() || job.conversation_id.trim().is_empty() {
            return Err(ParlaError::Validation(
                "chat job is missing requestId or conversationId".into(),
            ));
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_camel_case() {
        let job = ChatJobMessage {
            request_id: "R1".into(),
            conversation_id: "c1".into(),
            student_email: "s@example.com".into(),
            system_prompt: "You are a barista.".into(),
            messages: vec![Message::user("Hi")],
        };
        let json: serde_json::Value = serde_json::from_str(&job.to_payload().unwrap()).unwrap();
        assert_eq!(json["requestId"], "R1");
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["studentEmail"], "s@example.com");
        assert_eq!(json["systemPrompt"], "You are a barista.");
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn missing_identifiers_are_rejected() {
        let payload = r#"{"requestId":"","conversationId":"c1","studentEmail":"","systemPrompt":"","messages":[]}"#;
        assert!(matches!(
            ChatJobMessage::from_payload(payload),
            Err(ParlaError::Validation(_))
        ));
        assert!(ChatJobMessage::from_payload("{not json").is_err());
    }
}
