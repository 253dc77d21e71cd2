// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only commands: `parla status`, `parla session`, `parla config check`.

use std::sync::Arc;
use std::time::Duration;

use parla_audio::{ObjectBlobStore, SessionAudioAggregator};
use parla_config::model::ParlaConfig;
use parla_core::types::JobStatusView;
use parla_core::{JobStatusStore, ParlaError, StorageAdapter};
use parla_storage::SqliteStorage;

async fn open_storage(config: &ParlaConfig) -> Result<Arc<SqliteStorage>, ParlaError> {
    let storage = SqliteStorage::new(config.storage.clone()).with_worker_config(&config.worker);
    storage.initialize().await?;
    Ok(Arc::new(storage))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), ParlaError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ParlaError::Internal(format!("failed to encode output: {e}")))?;
    println!("{json}");
    Ok(())
}

/// Print the job status read model. A missing job is an error.
pub async fn run_status(config: &ParlaConfig, request_id: &str) -> Result<(), ParlaError> {
    let storage = open_storage(config).await?;
    let view = storage
        .get_job(request_id)
        .await?
        .map(JobStatusView::from)
        .ok_or_else(|| ParlaError::not_found("job", request_id))?;
    print_json(&view)
}

/// Print a session's sentences with freshly signed audio URLs.
pub async fn run_session(config: &ParlaConfig, session_id: &str) -> Result<(), ParlaError> {
    let storage = open_storage(config).await?;
    let blob = Arc::new(ObjectBlobStore::from_config(&config.audio).await?);
    let aggregator = SessionAudioAggregator::new(
        storage,
        blob,
        Duration::from_secs(config.audio.url_ttl_secs),
    );
    print_json(&aggregator.summarize(session_id).await?)
}

/// Print the effective configuration with secrets masked.
pub fn run_config_check(config: &ParlaConfig) -> Result<(), ParlaError> {
    let mut shown = config.clone();
    for secret in [
        &mut shown.anthropic.api_key,
        &mut shown.speech.api_key,
        &mut shown.audio.url_signing_secret,
    ] {
        if secret.is_some() {
            *secret = Some("********".to_string());
        }
    }
    eprintln!("parla: configuration is valid");
    print_json(&shown)
}
