// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session audio read model.

use std::sync::Arc;
use std::time::Duration;

use parla_core::ParlaError;
use parla_core::traits::{BlobAdapter, SentenceAudioStore};
use parla_core::types::{AudioStatus, SentenceAudioRecord};
use serde::Serialize;
use tracing::debug;

/// One sentence as the client sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceAudioView {
    pub index: u32,
    pub english: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub korean: Option<String>,
    pub status: AudioStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub voice_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Counts over a session. Durations only cover completed sentences with a
/// known duration; `duration_complete_count` says how many those were.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSummary {
    pub total_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub pending_count: usize,
    pub total_duration_ms: u64,
    pub duration_complete_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAudioView {
    pub session_id: String,
    pub sentences: Vec<SentenceAudioView>,
    pub summary: AudioSummary,
}

pub struct SessionAudioAggregator {
    records: Arc<dyn SentenceAudioStore>,
    blob: Arc<dyn BlobAdapter>,
    url_ttl: Duration,
}

impl SessionAudioAggregator {
    pub fn new(
        records: Arc<dyn SentenceAudioStore>,
        blob: Arc<dyn BlobAdapter>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            records,
            blob,
            url_ttl,
        }
    }

    /// Summarize a session. URLs are minted per call, so each one is valid
    /// for the full TTL from the time of the read.
    pub async fn summarize(&self, session_id: &str) -> Result<SessionAudioView, ParlaError> {
        let records = self.records.list_records(session_id).await?;
        if records.is_empty() {
            return Err(ParlaError::not_found("session", session_id));
        }

        let mut summary = AudioSummary {
            total_count: records.len(),
            ..AudioSummary::default()
        };
        let mut sentences = Vec::with_capacity(records.len());
        for record in records {
            let mut audio_url = None;
            match record.status {
                AudioStatus::Completed => {
                    summary.completed_count += 1;
                    if let Some(duration) = record.duration_ms {
                        summary.total_duration_ms += duration;
                        summary.duration_complete_count += 1;
                    }
                    if !record.storage_key.is_empty() {
                        audio_url = Some(
                            self.blob
                                .presigned_url(&record.storage_key, self.url_ttl)
                                .await?,
                        );
                    }
                }
                AudioStatus::Failed => summary.failed_count += 1,
                AudioStatus::Pending => summary.pending_count += 1,
            }
            sentences.push(view(record, audio_url));
        }

        debug!(
            session_id,
            total = summary.total_count,
            completed = summary.completed_count,
            "session audio summarized"
        );
        Ok(SessionAudioView {
            session_id: session_id.to_string(),
            sentences,
            summary,
        })
    }
}

fn view(record: SentenceAudioRecord, audio_url: Option<String>) -> SentenceAudioView {
    let completed = record.status == AudioStatus::Completed;
    SentenceAudioView {
        index: record.sentence_index,
        english: record.english,
        korean: record.korean,
        status: record.status,
        audio_url,
        duration_ms: record.duration_ms.filter(|_| completed),
        voice_id: record.voice_id,
        error_code: record.error_code,
        error_message: record.error_message,
    }
}
