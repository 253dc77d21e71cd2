// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-addressed cache keys for synthesized audio.
//!
//! A key is a pure function of (normalized text, voice): no salt, no clock, so
//! every process derives the same key for the same inputs.

use std::fmt;

use sha2::{Digest, Sha256};

/// File extension for objects synthesized in `output_format`, such as
/// `mp3_44100_128` or `pcm_16000`. Unknown codecs get `bin`.
pub fn audio_extension(output_format: &str) -> &'static str {
    match output_format.split('_').next() {
        Some("mp3") => "mp3",
        Some("wav") => "wav",
        Some("pcm") => "pcm",
        Some("ulaw") => "ulaw",
        Some("opus") => "opus",
        _ => "bin",
    }
}

/// Hex-encoded SHA-256 cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Object address: `{prefix}/{voice}/{key}.{extension}`.
    pub fn storage_key(&self, prefix: &str, voice: &str, extension: &str) -> String {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{voice}/{}.{extension}", self.0)
        } else {
            format!("{prefix}/{voice}/{}.{extension}", self.0)
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collapse every run of Unicode whitespace to one space and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derive the cache key for `text` spoken by `voice`.
///
/// Each field is hashed with a length prefix, so no two distinct
/// (text, voice) pairs share an encoding.
pub fn derive_key(text: &str, voice: &str) -> CacheKey {
    let text = normalize_text(text);
    let mut hasher = Sha256::new();
    for field in [text.as_str(), voice] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    CacheKey(hex::encode(hasher.finalize()))
}

/// Shorthand for `derive_key(text, voice).storage_key(prefix, voice, extension)`.
pub fn storage_key(prefix: &str, text: &str, voice: &str, extension: &str) -> String {
    derive_key(text, voice).storage_key(prefix, voice, extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_vector_is_stable() {
        let key = derive_key("Hello, world.", "voice-a");
        assert_eq!(key.as_str().len(), 64);
        assert_eq!(key, derive_key("Hello, world.", "voice-a"));
    }

    #[test]
    fn whitespace_is_normalized() {
        assert_eq!(normalize_text("  Hello,\t\n world.\u{3000} "), "Hello, world.");
        assert_eq!(
            derive_key("Hello,   world.", "v"),
            derive_key(" Hello,\nworld. ", "v")
        );
    }

    #[test]
    fn field_boundaries_do_not_collide() {
        assert_ne!(derive_key("ab", "c"), derive_key("a", "bc"));
    }

    #[test]
    fn storage_key_layout() {
        let key = derive_key("Hi.", "rachel");
        assert_eq!(
            key.storage_key("tts/", "rachel", "mp3"),
            format!("tts/rachel/{key}.mp3")
        );
        assert_eq!(key.storage_key("", "rachel", "mp3"), format!("rachel/{key}.mp3"));
        assert_eq!(
            storage_key("tts", "Hi.", "rachel", "wav"),
            key.storage_key("tts", "rachel", "wav")
        );
    }

    #[test]
    fn extension_follows_output_format() {
        assert_eq!(audio_extension("mp3_44100_128"), "mp3");
        assert_eq!(audio_extension("pcm_16000"), "pcm");
        assert_eq!(audio_extension("ulaw_8000"), "ulaw");
        assert_eq!(audio_extension("opus_48000_64"), "opus");
        assert_eq!(audio_extension("flac"), "bin");
    }

    proptest! {
        #[test]
        fn derivation_is_deterministic(text in ".{0,64}", voice in "[a-z0-9-]{1,16}") {
            prop_assert_eq!(derive_key(&text, &voice), derive_key(&text, &voice));
        }

        #[test]
        fn different_voice_gives_different_key(text in ".{1,64}", a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
            prop_assume!(a != b);
            prop_assert_ne!(derive_key(&text, &a), derive_key(&text, &b));
        }
    }
}
