// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blob store adapter trait for synthesized audio objects.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ParlaError;
use crate::traits::adapter::PluginAdapter;

/// Adapter for content-addressed audio object storage.
///
/// Objects are written once per key; a second write of the same key carries
/// identical content and may simply overwrite.
#[async_trait]
pub trait BlobAdapter: PluginAdapter {
    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool, ParlaError>;

    /// Stores `data` at `key`.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ParlaError>;

    /// Reads the object at `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, ParlaError>;

    /// Mints a read URL for `key` valid for `ttl` from now.
    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String, ParlaError>;
}
