// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Practice sentence recommendation.
//!
//! The model is asked for a JSON array of `{english, korean}` objects. Its
//! reply is decoded strictly first; if that fails, the first balanced JSON
//! array in the reply is decoded instead. Anything else is a
//! [`ParlaError::MalformedResponse`].

use std::sync::Arc;

use parla_core::ParlaError;
use parla_core::traits::ChatModelAdapter;
use parla_core::types::{Conversation, Message, PracticeSentence, ProviderRequest};
use tracing::{debug, warn};

use crate::prompt::PromptBuilder;

/// Upper bound on the number of sentences per request.
pub const MAX_SENTENCES: usize = 20;

/// Bytes of model output scanned during recovery.
const RECOVERY_SCAN_LIMIT: usize = 64 * 1024;

/// Asks the model for practice sentences fitting a conversation.
pub struct SentenceGenerator {
    model: Arc<dyn ChatModelAdapter>,
    model_id: Option<String>,
}

impl SentenceGenerator {
    pub fn new(model: Arc<dyn ChatModelAdapter>, model_id: Option<String>) -> Self {
        Self { model, model_id }
    }

    /// Generate `count` sentences for `conversation`'s topic and level.
    pub async fn recommend(
        &self,
        conversation: &Conversation,
        count: usize,
    ) -> Result<Vec<PracticeSentence>, ParlaError> {
        if count == 0 || count > MAX_SENTENCES {
            return Err(ParlaError::Validation(format!(
                "sentence count must be between 1 and {MAX_SENTENCES}, got {count}"
            )));
        }

        let response = self
            .model
            .complete(ProviderRequest {
                model: self.model_id.clone(),
                system_prompt: PromptBuilder::sentence_prompt(conversation, count),
                messages: vec![Message::user(format!("Give me {count} sentences."))],
                max_tokens: None,
            })
            .await?;

        let mut sentences = decode_sentences(&response.content)?;
        sentences.truncate(count);
        debug!(
            conversation_id = conversation.id.as_str(),
            count = sentences.len(),
            "practice sentences generated"
        );
        Ok(sentences)
    }
}

/// Decode model output into sentences: strict parse, then bounded recovery.
pub fn decode_sentences(raw: &str) -> Result<Vec<PracticeSentence>, ParlaError> {
    let parsed = match serde_json::from_str::<Vec<PracticeSentence>>(raw.trim()) {
        Ok(sentences) => sentences,
        Err(strict_err) => {
            let candidate = first_json_array(raw).ok_or_else(|| ParlaError::MalformedResponse {
                message: format!("no JSON array in model output ({strict_err})"),
            })?;
            warn!(error = %strict_err, "strict sentence decode failed, using recovered array");
            serde_json::from_str::<Vec<PracticeSentence>>(candidate).map_err(|e| {
                ParlaError::MalformedResponse {
                    message: format!("recovered array is not a sentence list: {e}"),
                }
            })?
        }
    };

    let sentences: Vec<PracticeSentence> = parsed
        .into_iter()
        .filter(|s| !s.english.trim().is_empty())
        .map(|s| PracticeSentence {
            english: s.english.trim().to_string(),
            korean: s
                .korean
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
        })
        .collect();
    if sentences.is_empty() {
        return Err(ParlaError::MalformedResponse {
            message: "model output contained no sentences".into(),
        });
    }
    Ok(sentences)
}

/// The first balanced `[...]` span, honoring JSON string escapes.
fn first_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if offset > RECOVERY_SCAN_LIMIT {
            return None;
        }
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use parla_core::types::now_timestamp;
    use parla_test_utils::MockModel;

    fn conversation() -> Conversation {
        Conversation {
            id: "c1".into(),
            owner: "s@example.com".into(),
            topic: "cafe".into(),
            difficulty: "beginner".into(),
            scenario: "ordering".into(),
            persona: "barista".into(),
            messages: vec![],
            created_at: now_timestamp(),
            expires_at: now_timestamp(),
        }
    }

    #[test]
    fn strict_array_decodes() {
        let raw = r#"[{"english":"A latte, please.","korean":"라떼 주세요."},{"english":"To go."}]"#;
        let sentences = decode_sentences(raw).unwrap();
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].korean.as_deref(), Some("라떼 주세요."));
        assert!(sentences[1].korean.is_none());
    }

    #[test]
    fn array_wrapped_in_prose_is_recovered() {
        let raw = "Sure! Here you go:\n```json\n[{\"english\": \"Can I get [a] muffin?\", \
                   \"korean\": \"머핀 \\\"하나\\\" 주세요\"}]\n```\nEnjoy!";
        let sentences = decode_sentences(raw).unwrap();
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].english, "Can I get [a] muffin?");
    }

    #[test]
    fn unrecoverable_output_is_malformed() {
        for raw in ["I cannot do that.", "[{\"english\": 1}]", "[", "[]", "[{\"english\": \" \"}]"] {
            let err = decode_sentences(raw).unwrap_err();
            assert!(
                matches!(err, ParlaError::MalformedResponse { .. }),
                "{raw:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn recommend_truncates_to_count() {
        let model = Arc::new(MockModel::with_responses(vec![
            r#"[{"english":"One."},{"english":"Two."},{"english":"Three."}]"#.into(),
        ]));
        let generator = SentenceGenerator::new(model.clone(), None);
        let sentences = generator.recommend(&conversation(), 2).await.unwrap();
        assert_eq!(sentences.len(), 2);
        let request = model.last_request().await.unwrap();
        assert!(request.system_prompt.contains("\"cafe\""));
    }

    #[tokio::test]
    async fn recommend_rejects_bad_count_without_calling_model() {
        let model = Arc::new(MockModel::new());
        let generator = SentenceGenerator::new(model.clone(), None);
        assert!(generator.recommend(&conversation(), 0).await.is_err());
        assert!(generator.recommend(&conversation(), MAX_SENTENCES + 1).await.is_err());
        assert_eq!(model.calls(), 0);
    }
}
