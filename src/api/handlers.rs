use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::{HealthResponse, SynthesizeRequest, VoicesResponse};
use crate::api::routes::AppState;
use crate::core;
use crate::error::AppError;

pub async fn voices() -> Json<VoicesResponse> {
    Json(VoicesResponse {
        voices: core::voices(),
    })
}

pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SynthesizeRequest>,
) -> Result<Response, AppError> {
    let pipeline = state
        .tts
        .as_ref()
        .ok_or_else(|| AppError::ModelNotLoaded("TTS not loaded".to_string()))?;

    let wav = core::synthesize(
        pipeline.as_ref(),
        &request.text,
        &request.voice,
        request.speed,
        pipeline.sample_rate(),
    )?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "audio/wav")], wav).into_response())
}

pub async fn transcribe(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<core::Transcript>, AppError> {
    // Pull the uploaded file out of the multipart body
    let mut upload: Option<(Vec<u8>, Option<String>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().map(|s| s.to_string());
            let content = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
            upload = Some((content.to_vec(), filename));
            break;
        }
    }

    let (content, filename) =
        upload.ok_or_else(|| AppError::BadRequest("Missing 'file' field".to_string()))?;

    let transcript = core::transcribe_upload(state.stt.as_deref(), &content, filename.as_deref())?;

    Ok(Json(transcript))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tts_loaded: state.tts.is_some(),
        stt_loaded: state.stt.is_some(),
    })
}
