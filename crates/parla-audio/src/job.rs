// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TTS job queue message.

use parla_core::ParlaError;
use serde::{Deserialize, Serialize};

/// One synthesis job. `storage_key` is derived before enqueueing.
///
/// Jobs without a session are plain cache fills with no record to update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsJob {
    pub job_id: String,
    pub text: String,
    pub voice_id: String,
    #[serde(rename = "s3Key", alias = "storageKey")]
    pub storage_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_index: Option<u32>,
    #[serde(default)]
    pub track_duration: bool,
}

impl TtsJob {
    /// The (session, index) record this job finalizes, if any.
    pub fn record_key(&self) -> Option<(&str, u32)> {
        match (&self.session_id, self.sentence_index) {
            (Some(session), Some(index)) => Some((session.as_str(), index)),
            _ => None,
        }
    }

    pub fn to_payload(&self) -> Result<String, ParlaError> {
        serde_json::to_string(self).map_err(|e| ParlaError::Internal(format!("encode tts job: {e}")))
    }

    pub fn from_payload(payload: &str) -> Result<Self, ParlaError> {
        let job: Self = serde_json::from_str(payload)
            .map_err(|e| ParlaError::Validation(format!("undecodable tts job: {e}")))?;
        if job.text.trim().is_empty() || job.voice_id.is_empty() || job.storage_key.is_empty() {
            return Err(ParlaError::Validation(
                "tts job is missing text, voiceId or s3Key".into(),
            ));
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_s3_key() {
        let job = TtsJob {
            job_id: "j1".into(),
            text: "Hello.".into(),
            voice_id: "rachel".into(),
            storage_key: "tts/rachel/abc.mp3".into(),
            session_id: Some("S1".into()),
            sentence_index: Some(3),
            track_duration: true,
        };
        let json: serde_json::Value = serde_json::from_str(&job.to_payload().unwrap()).unwrap();
        assert_eq!(json["s3Key"], "tts/rachel/abc.mp3");
        assert_eq!(json["voiceId"], "rachel");
        assert_eq!(json["sentenceIndex"], 3);
        assert_eq!(json["trackDuration"], true);
        assert_eq!(job.record_key(), Some(("S1", 3)));
    }

    #[test]
    fn session_fields_are_optional() {
        let job = TtsJob::from_payload(
            r#"{"jobId":"j2","text":"Hi.","voiceId":"v","storageKey":"tts/v/k.mp3"}"#,
        )
        .unwrap();
        assert!(job.record_key().is_none());
        assert!(!job.track_duration);
    }

    #[test]
    fn blank_text_is_rejected() {
        let err = TtsJob::from_payload(r#"{"jobId":"j","text":" ","voiceId":"v","s3Key":"k"}"#)
            .unwrap_err();
        assert!(matches!(err, ParlaError::Validation(_)));
    }
}
