//! # Transcription Endpoint
//!
//! `POST /transcriptions` with multipart form data; the audio goes in a field
//! named `audio`.
//!
//! ## Request lifecycle:
//! 1. Count the request
//! 2. Read the `audio` field, enforcing `server.max_upload_bytes`
//! 3. Stage the bytes to a temporary file (removed when the guard drops,
//!    on every exit path including client disconnect)
//! 4. Hand the file to the request handler with `fp16 = false`
//! 5. Observe duration/length histograms and answer
//!
//! ## Responses:
//! - `200 {"transcription": "..."}`
//! - `400 {"error": "No audio file provided"}` (also malformed or oversized uploads)
//! - `500 {"error": "<provider message>"}`

use crate::audio::{estimate_duration_seconds, StagedAudio};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transcription::provider::FP16_OPTION;
use crate::transcription::{TranscriptionOptions, TranscriptionOutcome, TranscriptionRequest};
use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};

/// Multipart field carrying the uploaded audio.
pub const AUDIO_FIELD: &str = "audio";

pub const NO_AUDIO_MESSAGE: &str = "No audio file provided";

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub transcription: String,
}

/// The `audio` file part of an upload.
struct AudioUpload {
    bytes: Vec<u8>,
    filename: String,
}

pub async fn create_transcription(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let metrics = &state.transcription_metrics;
    let remote_addr = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    info!(remote_addr = %remote_addr, "Received transcription request");
    metrics.record_request();

    let upload = match read_audio_field(payload, state.max_upload_bytes).await? {
        Some(upload) => upload,
        None => {
            error!(remote_addr = %remote_addr, "Transcription rejected: {}", NO_AUDIO_MESSAGE);
            return Err(AppError::BadRequest(NO_AUDIO_MESSAGE.to_string()));
        }
    };

    metrics.observe_audio_length(estimate_duration_seconds(upload.bytes.len()));

    let staging_dir = state.staging_dir().to_path_buf();
    let staged = web::block(move || {
        StagedAudio::write(&staging_dir, &upload.bytes, Some(&upload.filename))
    })
    .await??;

    let request = TranscriptionRequest::new(
        staged.path(),
        TranscriptionOptions::new().with(FP16_OPTION, false),
    );

    let started = Instant::now();
    let outcome = state.handler.handle(&request).await;
    metrics.observe_transcribe_duration(started.elapsed());
    drop(staged);

    match outcome {
        TranscriptionOutcome::Success { text } => {
            metrics.observe_result_length(text.chars().count());
            info!(
                remote_addr = %remote_addr,
                duration_ms = started.elapsed().as_millis() as u64,
                chars = text.chars().count(),
                "Transcription completed"
            );
            Ok(HttpResponse::Ok().json(TranscriptionResponse {
                transcription: text,
            }))
        }
        TranscriptionOutcome::Failure { message } => {
            error!(remote_addr = %remote_addr, error = %message, "Transcription failed");
            Err(AppError::Transcription(message))
        }
    }
}

/// Collect the first `audio` field that carries a file name. Plain form
/// values, including an `audio` value without a file name, are drained and
/// ignored.
async fn read_audio_field(
    mut payload: Multipart,
    max_bytes: usize,
) -> AppResult<Option<AudioUpload>> {
    let mut upload: Option<AudioUpload> = None;

    while let Some(item) = payload.next().await {
        let mut field = item?;

        let filename = field
            .content_disposition()
            .filter(|cd| upload.is_none() && cd.get_name() == Some(AUDIO_FIELD))
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let Some(filename) = filename else {
            while let Some(chunk) = field.next().await {
                chunk?;
            }
            continue;
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::ValidationError(format!(
                    "File too large (max: {} bytes)",
                    max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        upload = Some(AudioUpload { bytes, filename });
    }

    Ok(upload)
}
