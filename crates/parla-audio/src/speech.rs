// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP text-to-speech client (ElevenLabs-compatible API).

use std::time::Duration;

use async_trait::async_trait;
use parla_config::model::SpeechConfig;
use parla_core::ParlaError;
use parla_core::traits::{PluginAdapter, SpeechAdapter};
use parla_core::types::{AdapterType, HealthStatus, SpeechRequest, SynthesizedAudio};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::{debug, warn};

use crate::duration::wav_duration_ms;

const API_KEY_ENV: &str = "ELEVENLABS_API_KEY";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// [`SpeechAdapter`] calling `POST /v1/text-to-speech/{voice_id}`.
#[derive(Debug, Clone)]
pub struct HttpSpeechSynthesizer {
    client: reqwest::Client,
    base_url: String,
    model_id: String,
    output_format: String,
}

impl HttpSpeechSynthesizer {
    /// The API key comes from config, falling back to `ELEVENLABS_API_KEY`.
    pub fn new(config: &SpeechConfig) -> Result<Self, ParlaError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ParlaError::Config(format!(
                    "speech API key not set (speech.api_key or {API_KEY_ENV})"
                ))
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "xi-api-key",
            HeaderValue::from_str(&api_key)
                .map_err(|e| ParlaError::Config(format!("invalid API key header value: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ParlaError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model_id: config.model_id.clone(),
            output_format: config.output_format.clone(),
        })
    }

    fn content_type(&self) -> &'static str {
        content_type_for(&self.output_format)
    }
}

/// MIME type of an `output_format` such as `mp3_44100_128` or `pcm_16000`.
fn content_type_for(output_format: &str) -> &'static str {
    match output_format.split('_').next() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("pcm") => "audio/pcm",
        Some("ulaw") => "audio/basic",
        Some("opus") => "audio/opus",
        _ => "application/octet-stream",
    }
}

/// Map a non-success response to a synthesis error code.
fn status_error(status: StatusCode, body: &str) -> ParlaError {
    let code = match status.as_u16() {
        401 | 403 => "UNAUTHORIZED",
        404 => "VOICE_NOT_FOUND",
        400 | 422 => "INVALID_REQUEST",
        429 => "RATE_LIMITED",
        500..=599 => "PROVIDER_UNAVAILABLE",
        _ => "TTS_FAILED",
    };
    ParlaError::synthesis(code, format!("speech API returned {status}: {body}"))
}

fn map_send_error(e: reqwest::Error) -> ParlaError {
    if e.is_timeout() {
        ParlaError::Timeout {
            duration: REQUEST_TIMEOUT,
        }
    } else {
        ParlaError::Provider {
            message: format!("speech request failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

#[async_trait]
impl PluginAdapter for HttpSpeechSynthesizer {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Speech
    }

    async fn health_check(&self) -> Result<HealthStatus, ParlaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParlaError> {
        Ok(())
    }
}

#[async_trait]
impl SpeechAdapter for HttpSpeechSynthesizer {
    async fn synthesize(&self, request: SpeechRequest) -> Result<SynthesizedAudio, ParlaError> {
        let url = format!(
            "{}/v1/text-to-speech/{}?output_format={}",
            self.base_url, request.voice_id, self.output_format
        );
        let content_type = self.content_type();

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, content_type)
            .json(&SynthesisBody {
                text: &request.text,
                model_id: &self.model_id,
            })
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        debug!(status = %status, voice_id = request.voice_id.as_str(), "speech response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "speech synthesis rejected");
            return Err(status_error(status, &body));
        }

        let data = response.bytes().await.map_err(map_send_error)?;
        if data.is_empty() {
            return Err(ParlaError::synthesis(
                "EMPTY_AUDIO",
                "speech API returned no audio",
            ));
        }

        // Only WAV carries a header we can measure from.
        let duration_ms = if content_type == "audio/wav" {
            wav_duration_ms(&data)
        } else {
            None
        };

        Ok(SynthesizedAudio {
            data,
            content_type: content_type.to_string(),
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::silent_wav;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn synthesizer(base_url: &str, output_format: &str) -> HttpSpeechSynthesizer {
        HttpSpeechSynthesizer::new(&SpeechConfig {
            api_key: Some("test-key".into()),
            base_url: base_url.to_string(),
            model_id: "eleven_multilingual_v2".into(),
            output_format: output_format.into(),
        })
        .unwrap()
    }

    fn request(text: &str) -> SpeechRequest {
        SpeechRequest {
            text: text.into(),
            voice_id: "rachel".into(),
        }
    }

    #[tokio::test]
    async fn posts_text_and_returns_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/rachel"))
            .and(query_param("output_format", "mp3_44100_128"))
            .and(header("xi-api-key", "test-key"))
            .and(header("accept", "audio/mpeg"))
            .and(body_json(serde_json::json!({
                "text": "Hello there.",
                "model_id": "eleven_multilingual_v2"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3mp3data".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let audio = synthesizer(&server.uri(), "mp3_44100_128")
            .synthesize(request("Hello there."))
            .await
            .unwrap();
        assert_eq!(&audio.data[..], b"ID3mp3data");
        assert_eq!(audio.content_type, "audio/mpeg");
        assert!(audio.duration_ms.is_none());
    }

    #[tokio::test]
    async fn wav_output_reports_duration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(silent_wav(1500, 16_000, 1)))
            .mount(&server)
            .await;

        let audio = synthesizer(&server.uri(), "wav_16000")
            .synthesize(request("Hi."))
            .await
            .unwrap();
        assert_eq!(audio.content_type, "audio/wav");
        assert_eq!(audio.duration_ms, Some(1500));
    }

    #[tokio::test]
    async fn error_statuses_map_to_codes() {
        for (status, code, retryable) in [
            (401, "UNAUTHORIZED", false),
            (404, "VOICE_NOT_FOUND", false),
            (422, "INVALID_REQUEST", false),
            (429, "RATE_LIMITED", true),
            (503, "PROVIDER_UNAVAILABLE", true),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;
            let err = synthesizer(&server.uri(), "mp3_44100_128")
                .synthesize(request("Hi."))
                .await
                .unwrap_err();
            assert_eq!(err.code(), code, "status {status}");
            assert_eq!(err.is_retryable(), retryable);
        }
    }

    #[tokio::test]
    async fn empty_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let err = synthesizer(&server.uri(), "mp3_44100_128")
            .synthesize(request("Hi."))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EMPTY_AUDIO");
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        if std::env::var(API_KEY_ENV).is_ok() {
            return;
        }
        let err = HttpSpeechSynthesizer::new(&SpeechConfig::default()).unwrap_err();
        assert!(matches!(err, ParlaError::Config(_)));
    }

    #[test]
    fn content_types_follow_output_format() {
        assert_eq!(content_type_for("mp3_22050_32"), "audio/mpeg");
        assert_eq!(content_type_for("pcm_16000"), "audio/pcm");
        assert_eq!(content_type_for("ulaw_8000"), "audio/basic");
        assert_eq!(content_type_for("flac"), "application/octet-stream");
    }
}
