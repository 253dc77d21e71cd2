// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parla serve` command implementation.
//!
//! Opens SQLite storage, builds the model, synthesizer and blob adapters,
//! then runs the chat worker, the TTS worker and the expiry sweep until a
//! shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use parla_anthropic::AnthropicModel;
use parla_audio::{HttpSpeechSynthesizer, ObjectBlobStore, TtsWorker};
use parla_chat::ChatWorker;
use parla_chat::shutdown::{drain_workers, install_signal_handler};
use parla_config::model::ParlaConfig;
use parla_core::{ParlaError, StorageAdapter};
use parla_storage::SqliteStorage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How often expired rows are physically removed.
const PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// Completed queue entries are kept this long before the sweep drops them.
const QUEUE_RETENTION_SECS: u64 = 86_400;

/// Time a worker gets to finish its in-flight job after shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Runs the `parla serve` command.
pub async fn run_serve(config: ParlaConfig, print_metrics: bool) -> Result<(), ParlaError> {
    init_tracing(&config.service.log_level);
    info!(name = config.service.name.as_str(), "starting parla serve");

    #[cfg(feature = "prometheus")]
    let prometheus = match parla_prometheus::PrometheusAdapter::new() {
        Ok(adapter) => Some(adapter),
        Err(e) => {
            warn!(error = %e, "prometheus initialization failed, continuing without metrics");
            None
        }
    };

    let storage = SqliteStorage::new(config.storage.clone()).with_worker_config(&config.worker);
    storage.initialize().await?;
    let storage = Arc::new(storage);

    let model = Arc::new(AnthropicModel::new(&config.anthropic).inspect_err(|_| {
        eprintln!(
            "error: Anthropic API key required. Set anthropic.api_key or ANTHROPIC_API_KEY"
        );
    })?);
    let speech = Arc::new(HttpSpeechSynthesizer::new(&config.speech)?);
    let blob = Arc::new(ObjectBlobStore::from_config(&config.audio).await?);

    let chat_worker = ChatWorker::new(
        storage.clone(),
        storage.clone(),
        storage.clone(),
        model,
        config.chat.clone(),
        &config.worker,
    );
    let tts_worker = TtsWorker::new(
        storage.clone(),
        storage.clone(),
        blob,
        speech,
        &config.audio,
        &config.worker,
    );

    let cancel = install_signal_handler();
    let chat_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { chat_worker.run(cancel).await }
    });
    let tts_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { tts_worker.run(cancel).await }
    });
    let purge_task = tokio::spawn(purge_loop(storage.clone(), cancel.clone()));

    info!(
        chat_queue = config.chat.queue_name.as_str(),
        tts_queue = config.audio.queue_name.as_str(),
        "parla ready"
    );

    let failures = drain_workers(
        vec![("chat", chat_task), ("tts", tts_task)],
        &cancel,
        SHUTDOWN_GRACE,
    )
    .await;
    if failures > 0 {
        warn!(failures, "workers did not stop cleanly");
    }
    if let Err(e) = purge_task.await {
        error!(error = %e, "purge task panicked");
    }

    #[cfg(feature = "prometheus")]
    if print_metrics && let Some(prometheus) = &prometheus {
        println!("{}", prometheus.render());
    }
    #[cfg(not(feature = "prometheus"))]
    if print_metrics {
        warn!("metrics requested but the prometheus feature is not compiled in");
    }

    storage.close().await?;
    info!("parla serve stopped");
    Ok(())
}

async fn purge_loop(storage: Arc<SqliteStorage>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = cancel.cancelled() => break,
        }
        match storage.purge_expired(QUEUE_RETENTION_SECS).await {
            Ok(report) if report.total() > 0 => {
                info!(
                    conversations = report.conversations,
                    jobs = report.jobs,
                    sentence_records = report.sentence_records,
                    queue_entries = report.queue_entries,
                    "expired rows purged"
                );
            }
            Ok(_) => debug!("nothing to purge"),
            Err(e) => warn!(error = %e, "expiry sweep failed"),
        }
    }
}

/// Initialize the tracing subscriber with an env filter.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parla={log_level},warn")));

    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
