// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-addressed sentence audio for Parla.
//!
//! Sentences are staged as PENDING records plus queued synthesis jobs. The
//! [`TtsWorker`] fills the blob cache keyed by text and voice, and the
//! [`SessionAudioAggregator`] serves the per-session read model.

pub mod aggregator;
pub mod blob;
pub mod cache_key;
pub mod duration;
pub mod job;
pub mod orchestrator;
pub mod speech;
pub mod worker;

pub use aggregator::{AudioSummary, SentenceAudioView, SessionAudioAggregator, SessionAudioView};
pub use blob::{ObjectBlobStore, UrlSigner};
pub use cache_key::{CacheKey, audio_extension, derive_key, storage_key};
pub use job::TtsJob;
pub use orchestrator::AudioJobOrchestrator;
pub use speech::HttpSpeechSynthesizer;
pub use worker::{TtsJobOutcome, TtsWorker};
