// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parla practice backend.

use strum::Display;
use thiserror::Error;

/// The primary error type used across all Parla adapter traits and services.
#[derive(Debug, Error)]
pub enum ParlaError {
    /// Malformed request or missing required field. Rejected before any job is created.
    #[error("validation error: {0}")]
    Validation(String),

    /// A conversation, job, or session is absent or expired.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The requester does not own the target resource.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Language model transport or API failure.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Speech synthesis failure. `code` is stable and machine-checkable.
    #[error("synthesis error ({code}): {message}")]
    Synthesis { code: String, message: String },

    /// Upstream model output could not be decoded, even after bounded recovery.
    #[error("malformed upstream response: {message}")]
    MalformedResponse { message: String },

    /// Storage backend errors (database, blob store, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Queue transport errors.
    #[error("queue error: {message}")]
    Queue { message: String },

    /// Some, but not all, jobs of a batch could not be enqueued.
    #[error("{failed} of {total} jobs could not be enqueued")]
    PartialEnqueue { failed: usize, total: usize },

    /// Configuration errors (invalid TOML, missing keys, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Machine-checkable classification of a [`ParlaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    Provider,
    Synthesis,
    MalformedResponse,
    Storage,
    Queue,
    PartialEnqueue,
    Config,
    Timeout,
    Internal,
}

impl ParlaError {
    /// Shorthand for a [`ParlaError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ParlaError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Shorthand for a [`ParlaError::Provider`] without a source.
    pub fn provider(message: impl Into<String>) -> Self {
        ParlaError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`ParlaError::Synthesis`].
    pub fn synthesis(code: impl Into<String>, message: impl Into<String>) -> Self {
        ParlaError::Synthesis {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParlaError::Validation(_) => ErrorKind::Validation,
            ParlaError::NotFound { .. } => ErrorKind::NotFound,
            ParlaError::Unauthorized { .. } => ErrorKind::Unauthorized,
            ParlaError::Provider { .. } => ErrorKind::Provider,
            ParlaError::Synthesis { .. } => ErrorKind::Synthesis,
            ParlaError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            ParlaError::Storage { .. } => ErrorKind::Storage,
            ParlaError::Queue { .. } => ErrorKind::Queue,
            ParlaError::PartialEnqueue { .. } => ErrorKind::PartialEnqueue,
            ParlaError::Config(_) => ErrorKind::Config,
            ParlaError::Timeout { .. } => ErrorKind::Timeout,
            ParlaError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the failure is transient infrastructure trouble worth redelivering.
    ///
    /// Validation, not-found, authorization and decoding failures are terminal:
    /// retrying the same input yields the same outcome. Synthesis failures are
    /// terminal when the provider rejected the request itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            ParlaError::Synthesis { code, .. } => !matches!(
                code.as_str(),
                "UNAUTHORIZED" | "VOICE_NOT_FOUND" | "INVALID_REQUEST" | "EMPTY_AUDIO"
            ),
            ParlaError::Provider { .. }
            | ParlaError::Storage { .. }
            | ParlaError::Queue { .. }
            | ParlaError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Stable error code recorded on failed sentence audio records.
    pub fn code(&self) -> String {
        match self {
            ParlaError::Synthesis { code, .. } => code.clone(),
            other => other.kind().to_string(),
        }
    }
}
