// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat turn processing for the Parla practice backend.
//!
//! - [`TurnLimitPolicy`] bounds conversation length and ends it with a wrap-up
//! - [`ChatJobDispatcher`] writes a PROCESSING job row and enqueues the job
//! - [`ChatWorker`] drains the queue, calls the model and finalizes jobs
//! - [`ChatService`] is the client-facing entry point tying these together
//! - [`SentenceGenerator`] recommends practice sentences for audio staging

pub mod dispatcher;
pub mod job;
pub mod prompt;
pub mod sentences;
pub mod service;
pub mod shutdown;
pub mod ttl;
pub mod turn_policy;
pub mod worker;

pub use dispatcher::ChatJobDispatcher;
pub use job::ChatJobMessage;
pub use prompt::{PromptBuilder, ScenarioCatalog};
pub use sentences::{SentenceGenerator, decode_sentences};
pub use service::{ChatReply, ChatService};
pub use turn_policy::{TurnDecision, TurnLimitPolicy, TurnOutcome};
pub use worker::{ChatJobOutcome, ChatWorker};
