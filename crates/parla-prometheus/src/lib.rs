// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus exposition for Parla's chat and audio pipelines.
//!
//! Worker crates call the free `record_*` helpers in [`recording`]; they go
//! through the `metrics` facade and are no-ops until [`PrometheusAdapter`]
//! installs the global recorder.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use parla_core::ParlaError;
use parla_core::traits::adapter::PluginAdapter;
use parla_core::types::{AdapterType, HealthStatus};

pub use recording::{
    record_cache_lookup, record_chat_job, record_enqueue_batch, record_model_latency,
    record_synthesis_latency, record_tokens, record_tts_job, record_turn,
};

/// Bucket bounds for upstream call latency. Model and TTS calls run from
/// a few hundred milliseconds up to the HTTP timeout.
const LATENCY_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

fn builder() -> Result<PrometheusBuilder, ParlaError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("_latency_seconds".into()), LATENCY_BUCKETS)
        .map_err(|e| ParlaError::Internal(format!("invalid histogram buckets: {e}")))
}

pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Install the process-wide recorder. Fails if one is already installed.
    pub fn new() -> Result<Self, ParlaError> {
        let handle = builder()?.install_recorder().map_err(|e| {
            ParlaError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;
        recording::register_metrics();
        tracing::info!(
            buckets = LATENCY_BUCKETS.len(),
            "prometheus recorder installed"
        );
        Ok(Self { handle })
    }

    /// Current metrics in text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, ParlaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParlaError> {
        Ok(())
    }
}
