// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blob storage for synthesized audio, with signed time-limited URLs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use parla_config::model::AudioConfig;
use parla_core::ParlaError;
use parla_core::traits::{BlobAdapter, PluginAdapter};
use parla_core::types::{AdapterType, HealthStatus};
use sha2::Sha256;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies `(key, expiry)` pairs.
#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
}

impl UrlSigner {
    pub fn new(secret: &[u8]) -> Result<Self, ParlaError> {
        let mac = <HmacSha256 as Mac>::new_from_slice(secret)
            .map_err(|e| ParlaError::Config(format!("invalid URL signing secret: {e}")))?;
        Ok(Self { mac })
    }

    fn mac(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    /// Hex signature over `key` and the unix expiry.
    pub fn sign(&self, key: &str, expires: i64) -> String {
        hex::encode(self.mac(key, expires).finalize().into_bytes())
    }

    /// Whether `signature` is valid for `key` and has not expired at `now`.
    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: i64) -> bool {
        if expires <= now {
            return false;
        }
        match hex::decode(signature) {
            Ok(raw) => self.mac(key, expires).verify_slice(&raw).is_ok(),
            Err(_) => false,
        }
    }
}

/// [`BlobAdapter`] over an `object_store` backend.
///
/// Objects are written once per content address; a second put of the same
/// key carries identical bytes.
pub struct ObjectBlobStore {
    store: Arc<dyn ObjectStore>,
    backend: &'static str,
    public_base_url: String,
    signer: UrlSigner,
}

impl ObjectBlobStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        backend: &'static str,
        public_base_url: impl Into<String>,
        signer: UrlSigner,
    ) -> Self {
        Self {
            store,
            backend,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            signer,
        }
    }

    /// Process-local store. Contents vanish on exit.
    pub fn in_memory(public_base_url: impl Into<String>, signer: UrlSigner) -> Self {
        Self::new(Arc::new(InMemory::new()), "memory", public_base_url, signer)
    }

    /// Store rooted at a local directory, created if missing.
    pub async fn local(
        root: &str,
        public_base_url: impl Into<String>,
        signer: UrlSigner,
    ) -> Result<Self, ParlaError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| ParlaError::Storage { source: Box::new(e) })?;
        let fs = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| ParlaError::Storage { source: Box::new(e) })?;
        Ok(Self::new(Arc::new(fs), "local", public_base_url, signer))
    }

    /// Build from `[audio]` configuration.
    ///
    /// Without `blob_root` the store is in-memory. Without `url_signing_secret`
    /// a random per-process secret is used, so URLs do not survive a restart.
    pub async fn from_config(config: &AudioConfig) -> Result<Self, ParlaError> {
        let signer = match &config.url_signing_secret {
            Some(secret) if !secret.is_empty() => UrlSigner::new(secret.as_bytes())?,
            _ => {
                warn!("audio.url_signing_secret not set, using an ephemeral secret");
                UrlSigner::new(uuid::Uuid::new_v4().as_bytes())?
            }
        };
        let store = match &config.blob_root {
            Some(root) => Self::local(root, &config.public_base_url, signer).await?,
            None => {
                warn!("audio.blob_root not set, audio is kept in memory");
                Self::in_memory(&config.public_base_url, signer)
            }
        };
        info!(backend = store.backend, "blob store ready");
        Ok(store)
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    fn path(key: &str) -> Result<ObjectPath, ParlaError> {
        ObjectPath::parse(key)
            .map_err(|e| ParlaError::Validation(format!("invalid storage key '{key}': {e}")))
    }
}

fn storage_err(e: object_store::Error) -> ParlaError {
    ParlaError::Storage { source: Box::new(e) }
}

#[async_trait]
impl PluginAdapter for ObjectBlobStore {
    fn name(&self) -> &str {
        "object-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Blob
    }

    async fn health_check(&self) -> Result<HealthStatus, ParlaError> {
        // Probing an absent key exercises the backend without side effects.
        match self.store.head(&ObjectPath::from("health-check")).await {
            Ok(_) | Err(object_store::Error::NotFound { .. }) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), ParlaError> {
        Ok(())
    }
}

#[async_trait]
impl BlobAdapter for ObjectBlobStore {
    async fn exists(&self, key: &str) -> Result<bool, ParlaError> {
        match self.store.head(&Self::path(key)?).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ParlaError> {
        let size = data.len();
        self.store
            .put(&Self::path(key)?, PutPayload::from(data))
            .await
            .map_err(storage_err)?;
        debug!(storage_key = key, size, content_type, "audio object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, ParlaError> {
        match self.store.get(&Self::path(key)?).await {
            Ok(result) => Ok(Some(result.bytes().await.map_err(storage_err)?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String, ParlaError> {
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| ParlaError::Validation(format!("URL TTL {ttl:?} is too long")))?;
        let expires = chrono::Utc::now().timestamp().saturating_add(ttl_secs);
        let signature = self.signer.sign(key, expires);
        Ok(format!(
            "{}/{key}?expires={expires}&signature={signature}",
            self.public_base_url
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ObjectBlobStore {
        ObjectBlobStore::in_memory("https://audio.example.com/", UrlSigner::new(b"secret").unwrap())
    }

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        url.split(['?', '&'])
            .find_map(|part| part.strip_prefix(&format!("{name}=")))
            .unwrap()
    }

    #[tokio::test]
    async fn put_get_and_exists() {
        let store = store();
        let key = "tts/rachel/abc.mp3";
        assert!(!store.exists(key).await.unwrap());
        assert!(store.get(key).await.unwrap().is_none());

        store.put(key, Bytes::from_static(b"audio"), "audio/mpeg").await.unwrap();
        assert!(store.exists(key).await.unwrap());
        assert_eq!(store.get(key).await.unwrap().unwrap(), Bytes::from_static(b"audio"));

        // Same content address, same bytes: overwrite is harmless.
        store.put(key, Bytes::from_static(b"audio"), "audio/mpeg").await.unwrap();
        assert_eq!(store.get(key).await.unwrap().unwrap(), Bytes::from_static(b"audio"));
    }

    #[tokio::test]
    async fn presigned_url_verifies_until_expiry() {
        let store = store();
        let key = "tts/rachel/abc.mp3";
        let url = store.presigned_url(key, Duration::from_secs(600)).await.unwrap();
        assert!(url.starts_with("https://audio.example.com/tts/rachel/abc.mp3?expires="));

        let expires: i64 = query_param(&url, "expires").parse().unwrap();
        let signature = query_param(&url, "signature");
        let now = chrono::Utc::now().timestamp();
        assert!(expires > now + 590 && expires <= now + 601);

        let signer = store.signer();
        assert!(signer.verify(key, expires, signature, now));
        assert!(!signer.verify(key, expires, signature, expires));
        assert!(!signer.verify("tts/rachel/other.mp3", expires, signature, now));
        assert!(!signer.verify(key, expires + 1, signature, now));
        assert!(!signer.verify(key, expires, "zz", now));
    }

    #[tokio::test]
    async fn local_store_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("blobs");
        let store = ObjectBlobStore::local(
            root.to_str().unwrap(),
            "http://localhost",
            UrlSigner::new(b"s").unwrap(),
        )
        .await
        .unwrap();
        store
            .put("tts/v/k.mp3", Bytes::from_static(b"x"), "audio/mpeg")
            .await
            .unwrap();
        assert!(root.join("tts/v/k.mp3").exists());
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn invalid_key_is_a_validation_error() {
        let err = store().exists("tts//bad").await.unwrap_err();
        assert!(matches!(err, ParlaError::Validation(_)));
    }
}
