// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parla integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockModel`] - Mock chat model with queued replies and failure injection
//! - [`MockSynthesizer`] - Deterministic speech synthesizer with per-text failures
//! - [`CountingQueue`] - Queue wrapper recording batch sizes
//! - [`TestHarness`] - Fully wired chat and audio stack over a temp database

pub mod counting_queue;
pub mod harness;
pub mod mock_model;
pub mod mock_synthesizer;

pub use counting_queue::CountingQueue;
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_model::MockModel;
pub use mock_synthesizer::MockSynthesizer;
