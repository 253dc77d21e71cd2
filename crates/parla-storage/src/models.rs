// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `parla-core::types` for use across
//! adapter trait boundaries. This module re-exports them alongside the
//! row-decoding helpers the query modules share.

use std::str::FromStr;

pub use parla_core::types::{
    ChatJobRecord, Conversation, JobStatus, Message, QueueEntry, Role, SentenceAudioRecord,
    TaggedAppend, TaggedMessage,
};
pub use parla_core::AudioStatus;

/// SQL expression for "now" in the stored timestamp format.
pub(crate) const SQL_NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Rows removed by an expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub conversations: usize,
    pub jobs: usize,
    pub sentence_records: usize,
    pub queue_entries: usize,
}

impl PurgeReport {
    pub fn total(&self) -> usize {
        self.conversations + self.jobs + self.sentence_records + self.queue_entries
    }
}

/// Decode a text column into a strum enum.
pub(crate) fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Decode a nullable non-negative integer column.
pub(crate) fn optional_u64(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<u64>> {
    let raw: Option<i64> = row.get(idx)?;
    raw.map(|v| {
        u64::try_from(v).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
        })
    })
    .transpose()
}
