use axum::extract::multipart::Field;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::common::error::PipelineError;
use crate::modules::video::dto::UploadVideoRequest;
use crate::modules::video::model::VideoRecord;
use crate::modules::video::service::VideoService;

/// Streams a multipart file field straight into the ingestion pipeline.
pub async fn stream_to_pipeline(
    service: &VideoService,
    user_id: Uuid,
    request: UploadVideoRequest,
    field: Field<'_>,
) -> Result<VideoRecord, PipelineError> {
    let file_name = field.file_name().map(str::to_string);
    let content_type = field
        .content_type()
        .map(str::to_string)
        .or_else(|| {
            file_name
                .as_deref()
                .and_then(|name| mime_guess::from_path(name).first_raw())
                .map(str::to_string)
        })
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

    if !is_video(&content_type) {
        return Err(PipelineError::Validation(format!(
            "Invalid content type {}: only video/* allowed",
            content_type
        )));
    }

    let extension = extension_for(file_name.as_deref(), &content_type);
    info!(
        file_name = file_name.as_deref().unwrap_or("-"),
        %content_type,
        "Starting video upload"
    );

    service
        .submit_upload(user_id, request, Box::pin(field), extension.as_deref())
        .await
}

fn is_video(content_type: &str) -> bool {
    content_type
        .parse::<mime::Mime>()
        .map(|m| m.type_() == mime::VIDEO)
        .unwrap_or(false)
}

/// Keeps the client's extension when it has one, else derives it from the MIME type.
fn extension_for(file_name: Option<&str>, content_type: &str) -> Option<String> {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_string)
        .or_else(|| {
            mime_guess::get_mime_extensions_str(content_type)
                .and_then(|exts| exts.first())
                .map(|ext| ext.to_string())
        })
}
