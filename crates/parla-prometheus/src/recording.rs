// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Without an installed recorder every helper is
//! a no-op, so call sites never check.

use metrics::{describe_counter, describe_histogram};

/// Register all Parla metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("parla_turns_total", "Chat turns classified by the turn limit policy");
    describe_counter!("parla_chat_jobs_total", "Chat jobs finalized, by outcome");
    describe_counter!("parla_tokens_total", "Language model tokens consumed");
    describe_histogram!(
        "parla_model_latency_seconds",
        "Language model call latency in seconds"
    );
    describe_counter!("parla_tts_cache_total", "Audio cache lookups, by result");
    describe_counter!("parla_tts_jobs_total", "Synthesis jobs finalized, by outcome");
    describe_histogram!(
        "parla_synthesis_latency_seconds",
        "Speech synthesis call latency in seconds"
    );
    describe_counter!("parla_enqueue_batches_total", "Batched enqueue calls issued");
    describe_counter!(
        "parla_enqueue_failures_total",
        "Queue entries refused during batched enqueue"
    );
}

/// Record a turn policy decision (`proceed`, `last_turn`, `ended`).
pub fn record_turn(decision: &str) {
    metrics::counter!("parla_turns_total", "decision" => decision.to_string()).increment(1);
}

/// Record a finalized chat job (`completed`, `failed`, `duplicate`).
pub fn record_chat_job(outcome: &str) {
    metrics::counter!("parla_chat_jobs_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record token consumption.
pub fn record_tokens(model: &str, input: u32, output: u32) {
    metrics::counter!("parla_tokens_total", "model" => model.to_string(), "type" => "input")
        .increment(input as u64);
    metrics::counter!("parla_tokens_total", "model" => model.to_string(), "type" => "output")
        .increment(output as u64);
}

/// Record model call latency.
pub fn record_model_latency(seconds: f64) {
    metrics::histogram!("parla_model_latency_seconds").record(seconds);
}

/// Record an audio cache lookup.
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("parla_tts_cache_total", "result" => result).increment(1);
}

/// Record a finalized synthesis job (`completed`, `failed`).
pub fn record_tts_job(outcome: &str) {
    metrics::counter!("parla_tts_jobs_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record synthesis call latency.
pub fn record_synthesis_latency(seconds: f64) {
    metrics::histogram!("parla_synthesis_latency_seconds").record(seconds);
}

/// Record one batched enqueue call and how many of its entries were refused.
pub fn record_enqueue_batch(failed: usize) {
    metrics::counter!("parla_enqueue_batches_total").increment(1);
    if failed > 0 {
        metrics::counter!("parla_enqueue_failures_total").increment(failed as u64);
    }
}
