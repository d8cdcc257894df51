//! Voice Service Module
//!
//! Uniform interface to the TTS/STT vendor: complete, streamed, and
//! timestamp-annotated synthesis plus transcription. The capability trait
//! keeps vendor swaps a drop-in; only the request/response contract is
//! meaningful here.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

mod client;

pub use client::VendorVoiceClient;

/// Expected sample rate for streamed transcription input (mono)
pub const STT_SAMPLE_RATE: u32 = 24_000;

// ============================================================================
// Audio Formats
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Pcm,
    Opus,
}

impl AudioFormat {
    pub fn parse(value: &str) -> Result<Self, VoiceError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(Self::Wav),
            "pcm" => Ok(Self::Pcm),
            "opus" => Ok(Self::Opus),
            other => Err(VoiceError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Pcm => "pcm",
            Self::Opus => "opus",
        }
    }

    /// MIME type for HTTP responses carrying this format
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Pcm => "application/octet-stream",
            Self::Opus => "audio/ogg",
        }
    }
}

// ============================================================================
// TTS / STT Payloads
// ============================================================================

/// Word-level subtitle boundary. The client plays audio and reveals the
/// subtitle prefix whose timestamps have start_s <= playhead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub text: String,
    pub start_s: f64,
    pub stop_s: f64,
}

#[derive(Debug, Clone)]
pub struct TtsWithTimestamps {
    pub audio: Vec<u8>,
    pub timestamps: Vec<WordTimestamp>,
}

/// One frame of a streamed transcription response
#[derive(Debug, Clone, PartialEq)]
pub enum SttStreamEvent {
    Transcript(String),
    Complete,
}

// ============================================================================
// Voice Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("voice vendor error: {0}")]
    ApiError(String),

    #[error("voice request timed out after {0}s")]
    Timeout(u64),

    #[error("malformed audio payload: {0}")]
    BadPayload(String),

    #[error("voice service disabled")]
    Disabled,
}

impl VoiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "UnsupportedFormat",
            Self::ApiError(_) => "VoiceApiError",
            Self::Timeout(_) => "VoiceTimeout",
            Self::BadPayload(_) => "BadPayload",
            Self::Disabled => "VoiceDisabled",
        }
    }
}

// ============================================================================
// Voice Service Trait
// ============================================================================

#[async_trait]
pub trait VoiceService: Send + Sync {
    /// Synthesize `text` and return complete audio bytes
    async fn tts(
        &self,
        text: &str,
        voice_id: Option<&str>,
        format: AudioFormat,
    ) -> Result<Vec<u8>, VoiceError>;

    /// Synthesize `text` as a stream of audio chunks
    async fn tts_stream(
        &self,
        text: &str,
        voice_id: Option<&str>,
        format: AudioFormat,
    ) -> Result<BoxStream<'static, Result<Bytes, VoiceError>>, VoiceError>;

    /// Synthesize with word-level subtitle boundaries
    async fn tts_with_timestamps(
        &self,
        text: &str,
        voice_id: Option<&str>,
        format: AudioFormat,
    ) -> Result<TtsWithTimestamps, VoiceError>;

    /// Blocking transcription of a complete clip
    async fn stt(&self, audio: &[u8], format: AudioFormat) -> Result<String, VoiceError>;

    /// Streamed transcription of one chunk. A final chunk closes with
    /// `Complete` after its transcript.
    async fn stt_stream(
        &self,
        audio: Vec<u8>,
        is_final: bool,
        format: AudioFormat,
    ) -> Result<BoxStream<'static, Result<SttStreamEvent, VoiceError>>, VoiceError>;
}

// ============================================================================
// PCM / WAV helpers
// ============================================================================

/// Wrap raw 16-bit PCM in a standard 44-byte WAV header
pub fn wrap_pcm_in_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * u32::from(channels) * u32::from(bits_per_sample) / 8;
    let block_align = channels * bits_per_sample / 8;
    let data_len = pcm.len() as u32;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

/// Streaming WAV header with unknown-length sentinels, emitted before the
/// first chunk of a streamed synthesis
pub fn streaming_wav_header(sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut header = wrap_pcm_in_wav(&[], sample_rate, channels);
    header[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
    header[40..44].copy_from_slice(&u32::MAX.to_le_bytes());
    header
}

/// Fold the vendor's character-level alignment into word-level boundaries.
/// Word order follows the input text; whitespace separates words.
pub fn words_from_alignment(
    characters: &[String],
    start_times: &[f64],
    stop_times: &[f64],
) -> Vec<WordTimestamp> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut word_start = 0.0;
    let mut word_stop = 0.0;

    for (i, ch) in characters.iter().enumerate() {
        let start = start_times.get(i).copied().unwrap_or(word_stop);
        let stop = stop_times.get(i).copied().unwrap_or(start);

        if ch.chars().all(char::is_whitespace) {
            if !current.is_empty() {
                words.push(WordTimestamp {
                    text: std::mem::take(&mut current),
                    start_s: word_start,
                    stop_s: word_stop,
                });
            }
            continue;
        }

        if current.is_empty() {
            word_start = start;
        }
        current.push_str(ch);
        word_stop = stop;
    }

    if !current.is_empty() {
        words.push(WordTimestamp { text: current, start_s: word_start, stop_s: word_stop });
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_accepts_known_formats() {
        assert_eq!(AudioFormat::parse("wav").unwrap(), AudioFormat::Wav);
        assert_eq!(AudioFormat::parse("PCM").unwrap(), AudioFormat::Pcm);
        assert_eq!(AudioFormat::parse(" opus ").unwrap(), AudioFormat::Opus);
    }

    #[test]
    fn format_parsing_rejects_unknown_formats() {
        let err = AudioFormat::parse("mp3").unwrap_err();
        assert!(matches!(err, VoiceError::UnsupportedFormat(f) if f == "mp3"));
    }

    #[test]
    fn wav_header_is_valid() {
        let pcm = vec![0u8; 480];
        let wav = wrap_pcm_in_wav(&pcm, STT_SAMPLE_RATE, 1);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(wav.len(), 44 + 480);
        let data_len = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_len, 480);
        let rate = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(rate, 24_000);
    }

    #[test]
    fn streaming_header_uses_unknown_length() {
        let header = streaming_wav_header(STT_SAMPLE_RATE, 1);
        assert_eq!(header.len(), 44);
        let riff_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        assert_eq!(riff_len, u32::MAX);
    }

    fn chars_of(text: &str) -> Vec<String> {
        text.chars().map(|c| c.to_string()).collect()
    }

    #[test]
    fn alignment_folds_into_words() {
        let characters = chars_of("Hello world");
        let starts: Vec<f64> = (0..characters.len()).map(|i| i as f64 * 0.1).collect();
        let stops: Vec<f64> = starts.iter().map(|s| s + 0.1).collect();

        let words = words_from_alignment(&characters, &starts, &stops);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "Hello");
        assert_eq!(words[1].text, "world");

        // concatenation matches the input modulo whitespace
        let joined: String = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(joined, "Helloworld");
    }

    #[test]
    fn alignment_timestamps_are_monotonic() {
        let characters = chars_of("the quick brown fox");
        let starts: Vec<f64> = (0..characters.len()).map(|i| i as f64 * 0.05).collect();
        let stops: Vec<f64> = starts.iter().map(|s| s + 0.05).collect();

        let words = words_from_alignment(&characters, &starts, &stops);
        assert_eq!(words.len(), 4);
        for w in &words {
            assert!(w.stop_s >= w.start_s);
        }
        for pair in words.windows(2) {
            assert!(pair[1].start_s >= pair[0].start_s);
        }
    }

    #[test]
    fn alignment_handles_leading_and_double_spaces() {
        let characters = chars_of("  a  b ");
        let starts: Vec<f64> = (0..characters.len()).map(|i| i as f64).collect();
        let stops = starts.clone();

        let words = words_from_alignment(&characters, &starts, &stops);
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }
}
