//! Request handlers for the transcription API.
//!
//! Uploads land in extension-preserving temporary files (classification is
//! extension-driven) owned by the handling request, and the blocking core
//! pipeline runs on the tokio blocking pool.

use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;

use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use voxtext_core::engine::{TranscribeOptions, TranscriptionError, TranscriptionResult};

use crate::state::AppState;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Serialize)]
pub struct TranscribeResponse {
    pub success: bool,
    pub transcription: String,
    pub details: TranscriptionResult,
}

#[derive(Serialize)]
pub struct ModelsResponse {
    pub available_models: Vec<&'static str>,
    pub current_model: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: error.into(),
        }),
    )
        .into_response()
}

pub async fn health_handler(State(state): State<AppState>) -> Response {
    let engine = state.engine.clone();
    match tokio::task::spawn_blocking(move || engine.status()).await {
        Ok(status) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "model": status })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "status task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "status unavailable")
        }
    }
}

pub async fn status_handler(State(state): State<AppState>) -> Response {
    let engine = state.engine.clone();
    match tokio::task::spawn_blocking(move || engine.status()).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "status task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "status unavailable")
        }
    }
}

pub async fn models_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(ModelsResponse {
            available_models: state.engine.available_models(),
            current_model: state.engine.model_size().to_string(),
        }),
    )
        .into_response()
}

/// `POST /api/transcribe` - multipart upload with a `file` part and an
/// optional `language` part.
#[tracing::instrument(skip(state, multipart))]
pub async fn transcribe_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Response {
    match read_upload(multipart, "file").await {
        Ok(Some(upload)) => run_transcription(state, upload).await,
        Ok(None) => error_response(StatusCode::BAD_REQUEST, "no file part in request"),
        Err(response) => response,
    }
}

/// `POST /api/transcribe-blob` - multipart upload with an `audio` part
/// holding a recorded blob.
#[tracing::instrument(skip(state, multipart))]
pub async fn transcribe_blob_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Response {
    match read_upload(multipart, "audio").await {
        Ok(Some(upload)) => run_transcription(state, upload).await,
        Ok(None) => error_response(StatusCode::BAD_REQUEST, "no audio data received"),
        Err(response) => response,
    }
}

struct Upload {
    filename: String,
    data: Vec<u8>,
    language: Option<String>,
}

/// Pull the named media part plus an optional `language` part out of a
/// multipart body.
async fn read_upload(
    mut multipart: Multipart,
    part_name: &str,
) -> Result<Option<Upload>, Response> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut language: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read multipart body");
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("failed to read multipart body: {e}"),
                ));
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(name) if name == part_name => {
                let filename = field
                    .file_name()
                    .filter(|f| !f.is_empty())
                    .unwrap_or("upload.wav")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    tracing::warn!(error = %e, "failed to read upload bytes");
                    error_response(
                        StatusCode::BAD_REQUEST,
                        format!("failed to read upload: {e}"),
                    )
                })?;
                upload = Some((filename, data.to_vec()));
            }
            Some("language") => {
                language = field.text().await.ok().filter(|s| !s.is_empty());
            }
            _ => {}
        }
    }

    Ok(upload.map(|(filename, data)| Upload {
        filename,
        data,
        language,
    }))
}

async fn run_transcription(state: AppState, upload: Upload) -> Response {
    tracing::debug!(
        filename = %upload.filename,
        bytes = upload.data.len(),
        "upload received"
    );

    let engine = state.engine.clone();
    let task = tokio::task::spawn_blocking(move || {
        let temp = persist_upload(&upload.filename, &upload.data)
            .map_err(|e| TranscriptionError::Audio(e.into()))?;

        let options = TranscribeOptions {
            language: upload.language,
            ..TranscribeOptions::default()
        };
        engine.transcribe(&temp, &options)
        // upload temporary reclaimed here, whatever the outcome
    });

    match task.await {
        Ok(Ok(details)) => (
            StatusCode::OK,
            Json(TranscribeResponse {
                success: true,
                transcription: details.text.clone(),
                details,
            }),
        )
            .into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "transcription failed");
            error_response(status_for(&e), e.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "transcription task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "transcription task failed")
        }
    }
}

/// Save an upload to a temporary file that keeps the original extension.
fn persist_upload(filename: &str, data: &[u8]) -> std::io::Result<tempfile::TempPath> {
    let name = Path::new(filename);
    let stem = name
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("upload");

    let prefix = format!("{stem}.");
    let suffix = name
        .extension()
        .and_then(OsStr::to_str)
        .map(|ext| format!(".{ext}"));

    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix);
    if let Some(ref suffix) = suffix {
        builder.suffix(suffix);
    }

    let mut file = builder.tempfile()?;
    file.write_all(data)?;
    Ok(file.into_temp_path())
}

fn status_for(error: &TranscriptionError) -> StatusCode {
    match error {
        TranscriptionError::InputNotFound(_) => StatusCode::BAD_REQUEST,
        TranscriptionError::Backend(_)
        | TranscriptionError::Extraction(_)
        | TranscriptionError::Audio(_)
        | TranscriptionError::Record(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
