//! Voice Vendor Client
//!
//! HTTP client for the hosted TTS/STT vendor. Synthesis is requested as raw
//! 24 kHz mono PCM and wrapped into WAV locally when the caller asked for
//! wav; opus passes through.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    streaming_wav_header, words_from_alignment, wrap_pcm_in_wav, AudioFormat, SttStreamEvent,
    TtsWithTimestamps, VoiceError, VoiceService, STT_SAMPLE_RATE,
};
use crate::config::VoiceConfig;

pub struct VendorVoiceClient {
    http_client: Client,
    api_base: String,
    api_key: String,
    default_voice: String,
    timeout: Duration,
}

impl VendorVoiceClient {
    /// Returns None when no credential is configured: the voice layer is
    /// disabled and its endpoints answer 503.
    pub fn from_config(config: &VoiceConfig) -> Result<Option<Self>, VoiceError> {
        let api_key = match &config.api_key {
            Some(key) if !key.trim().is_empty() => key.clone(),
            _ => return Ok(None),
        };

        let timeout = Duration::from_secs(config.timeout_secs);
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::ApiError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Some(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            default_voice: config.default_voice.clone(),
            timeout,
        }))
    }

    fn voice<'a>(&'a self, voice_id: Option<&'a str>) -> &'a str {
        voice_id.filter(|v| !v.trim().is_empty()).unwrap_or(&self.default_voice)
    }

    /// Vendor output format string. wav is derived from pcm locally.
    fn vendor_format(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::Wav | AudioFormat::Pcm => "pcm_24000",
            AudioFormat::Opus => "opus_48000",
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> VoiceError {
        if e.is_timeout() {
            VoiceError::Timeout(self.timeout.as_secs())
        } else {
            VoiceError::ApiError(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, VoiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(VoiceError::ApiError(format!("vendor error {}: {}", status, body)));
        }
        Ok(response)
    }
}

#[async_trait]
impl VoiceService for VendorVoiceClient {
    async fn tts(
        &self,
        text: &str,
        voice_id: Option<&str>,
        format: AudioFormat,
    ) -> Result<Vec<u8>, VoiceError> {
        let url = format!(
            "{}/v1/text-to-speech/{}?output_format={}",
            self.api_base,
            self.voice(voice_id),
            Self::vendor_format(format)
        );

        let response = self
            .http_client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&TtsRequest { text })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;

        let audio = response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(e))?
            .to_vec();

        Ok(match format {
            AudioFormat::Wav => wrap_pcm_in_wav(&audio, STT_SAMPLE_RATE, 1),
            AudioFormat::Pcm | AudioFormat::Opus => audio,
        })
    }

    async fn tts_stream(
        &self,
        text: &str,
        voice_id: Option<&str>,
        format: AudioFormat,
    ) -> Result<BoxStream<'static, Result<Bytes, VoiceError>>, VoiceError> {
        let url = format!(
            "{}/v1/text-to-speech/{}/stream?output_format={}",
            self.api_base,
            self.voice(voice_id),
            Self::vendor_format(format)
        );

        let response = self
            .http_client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&TtsRequest { text })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;

        let timeout_secs = self.timeout.as_secs();
        let body = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| {
                if e.is_timeout() {
                    VoiceError::Timeout(timeout_secs)
                } else {
                    VoiceError::ApiError(e.to_string())
                }
            })
        });

        // wav callers get a header chunk first; the vendor streams raw pcm
        let stream: BoxStream<'static, Result<Bytes, VoiceError>> = match format {
            AudioFormat::Wav => {
                let header = Bytes::from(streaming_wav_header(STT_SAMPLE_RATE, 1));
                futures::stream::once(async move { Ok::<Bytes, VoiceError>(header) })
                    .chain(body)
                    .boxed()
            },
            AudioFormat::Pcm | AudioFormat::Opus => body.boxed(),
        };

        Ok(stream)
    }

    async fn tts_with_timestamps(
        &self,
        text: &str,
        voice_id: Option<&str>,
        format: AudioFormat,
    ) -> Result<TtsWithTimestamps, VoiceError> {
        let url = format!(
            "{}/v1/text-to-speech/{}/with-timestamps?output_format={}",
            self.api_base,
            self.voice(voice_id),
            Self::vendor_format(format)
        );

        let response = self
            .http_client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&TtsRequest { text })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;

        let body: TtsWithTimestampsResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::ApiError(e.to_string()))?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(&body.audio_base64)
            .map_err(|e| VoiceError::ApiError(format!("vendor audio not base64: {}", e)))?;

        let audio = match format {
            AudioFormat::Wav => wrap_pcm_in_wav(&audio, STT_SAMPLE_RATE, 1),
            AudioFormat::Pcm | AudioFormat::Opus => audio,
        };

        let alignment = body.alignment.unwrap_or_default();
        let timestamps = words_from_alignment(
            &alignment.characters,
            &alignment.character_start_times_seconds,
            &alignment.character_end_times_seconds,
        );

        Ok(TtsWithTimestamps { audio, timestamps })
    }

    async fn stt(&self, audio: &[u8], format: AudioFormat) -> Result<String, VoiceError> {
        let url = format!("{}/v1/speech-to-text?model_id=scribe_v1", self.api_base);

        let response = self
            .http_client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("content-type", format.content_type())
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;

        let body: SttResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::ApiError(e.to_string()))?;
        Ok(body.text)
    }

    async fn stt_stream(
        &self,
        audio: Vec<u8>,
        is_final: bool,
        format: AudioFormat,
    ) -> Result<BoxStream<'static, Result<SttStreamEvent, VoiceError>>, VoiceError> {
        let transcript = self.stt(&audio, format).await?;

        let mut events = vec![Ok(SttStreamEvent::Transcript(transcript))];
        if is_final {
            events.push(Ok(SttStreamEvent::Complete));
        }
        Ok(futures::stream::iter(events).boxed())
    }
}

// ============================================================================
// Vendor API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TtsWithTimestampsResponse {
    audio_base64: String,
    #[serde(default)]
    alignment: Option<Alignment>,
}

#[derive(Debug, Default, Deserialize)]
struct Alignment {
    #[serde(default)]
    characters: Vec<String>,
    #[serde(default)]
    character_start_times_seconds: Vec<f64>,
    #[serde(default)]
    character_end_times_seconds: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct SttResponse {
    text: String,
}
