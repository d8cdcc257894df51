//! Voice API Handlers
//!
//! TTS and STT endpoints proxying the voice vendor. All of them answer 503
//! when no voice credential is configured and 400 on an unsupported audio
//! format.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine;
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;

use super::ApiError;
use crate::models::{
    SttApiRequest, SttApiResponse, SttStreamApiRequest, TtsApiRequest,
    TtsWithTimestampsApiResponse,
};
use crate::services::voice::{AudioFormat, SttStreamEvent, VoiceError, VoiceService};
use crate::AppState;

fn voice_service(state: &AppState) -> Result<Arc<dyn VoiceService>, ApiError> {
    state
        .voice
        .as_ref()
        .map(Arc::clone)
        .ok_or_else(ApiError::voice_disabled)
}

fn decode_audio(audio_base64: &str) -> Result<Vec<u8>, ApiError> {
    base64::engine::general_purpose::STANDARD
        .decode(audio_base64.trim())
        .map_err(|e| VoiceError::BadPayload(format!("audio is not valid base64: {}", e)).into())
}

/// Synthesize speech and return complete audio bytes
/// POST /api/voice/tts
pub async fn tts(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TtsApiRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let voice = voice_service(&state)?;
    let format = AudioFormat::parse(&request.output_format)?;

    let audio = voice
        .tts(&request.text, request.voice_id.as_deref(), format)
        .await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, format.content_type())],
        audio,
    ))
}

/// Synthesize speech as streamed audio chunks
/// POST /api/voice/tts/stream
pub async fn tts_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TtsApiRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let voice = voice_service(&state)?;
    let format = AudioFormat::parse(&request.output_format)?;

    let stream = voice
        .tts_stream(&request.text, request.voice_id.as_deref(), format)
        .await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, format.content_type())],
        Body::from_stream(stream),
    ))
}

/// Synthesize speech with word-level subtitle boundaries
/// POST /api/voice/tts/with-timestamps
pub async fn tts_with_timestamps(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TtsApiRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let voice = voice_service(&state)?;
    let format = AudioFormat::parse(&request.output_format)?;

    let result = voice
        .tts_with_timestamps(&request.text, request.voice_id.as_deref(), format)
        .await?;

    Ok(Json(TtsWithTimestampsApiResponse {
        audio_base64: base64::engine::general_purpose::STANDARD.encode(result.audio),
        timestamps: result.timestamps,
    }))
}

/// Blocking transcription of a complete clip
/// POST /api/voice/stt
pub async fn stt(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SttApiRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let voice = voice_service(&state)?;
    let format = AudioFormat::parse(&request.input_format)?;
    let audio = decode_audio(&request.audio_base64)?;

    let transcript = voice.stt(&audio, format).await?;
    Ok(Json(SttApiResponse { transcript }))
}

/// Streamed transcription: partial transcripts, then a completion marker
/// POST /api/voice/stt/stream
pub async fn stt_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SttStreamApiRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let voice = voice_service(&state)?;
    let format = AudioFormat::parse(&request.input_format)?;
    let audio = decode_audio(&request.audio_chunk)?;

    let stream = voice.stt_stream(audio, request.is_final, format).await?;
    let frames = stream.map(|item| Ok(stt_frame(item)));

    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}

fn stt_frame(item: Result<SttStreamEvent, VoiceError>) -> Event {
    Event::default().data(stt_frame_json(item).to_string())
}

fn stt_frame_json(item: Result<SttStreamEvent, VoiceError>) -> serde_json::Value {
    match item {
        Ok(SttStreamEvent::Transcript(text)) => {
            serde_json::json!({ "type": "transcript", "text": text })
        },
        Ok(SttStreamEvent::Complete) => serde_json::json!({ "type": "complete" }),
        Err(e) => serde_json::json!({ "type": "error", "message": e.to_string() }),
    }
}
