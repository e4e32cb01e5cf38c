use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::common::upload::stream_to_pipeline;
use crate::middleware::auth::AuthUser;
use crate::modules::video::dto::{UploadVideoRequest, VideoResponse};
use crate::modules::video::model::VideoRecord;
use crate::state::AppState;
use axum::{
    Extension,
    extract::{Multipart, Path, State},
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

/// Upload a video
///
/// Multipart form with `title` and `description` text fields followed by the
/// `video` file field. The file is streamed to disk, transcoded to HLS and
/// published; the request completes once the video is playable.
#[utoipa::path(
    post,
    path = "/api/v1/videos",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Video uploaded and processed", body = ApiResponse<VideoRecord>),
        (status = 400, description = "Bad Request"),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "Upload too large"),
        (status = 422, description = "Transcoding failed"),
        (status = 504, description = "Transcoding timed out"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos",
    security(("bearer_auth" = []))
)]
pub async fn upload_video(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut request = UploadVideoRequest::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return ApiError::bad_request(format!("Malformed multipart body: {}", e)).into_response(),
        };

        match field.name().unwrap_or("") {
            "title" => match field.text().await {
                Ok(text) => request.title = text,
                Err(e) => return ApiError::bad_request(format!("Invalid title field: {}", e)).into_response(),
            },
            "description" => match field.text().await {
                Ok(text) => request.description = text,
                Err(e) => return ApiError::bad_request(format!("Invalid description field: {}", e)).into_response(),
            },
            "video" => {
                info!(user_id = %user.id, "Upload received");
                return match stream_to_pipeline(&state.videos, user.id, request, field).await {
                    Ok(video) => ApiSuccess::created(video, "Video uploaded and processed successfully").into_response(),
                    Err(e) => ApiError::from(e).into_response(),
                };
            }
            _ => continue,
        }
    }

    ApiError::bad_request("No video field found in multipart request").into_response()
}

#[utoipa::path(
    get,
    path = "/api/v1/videos",
    responses(
        (status = 200, description = "List Videos", body = ApiResponse<Vec<VideoResponse>>),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn list_videos(State(state): State<AppState>) -> impl IntoResponse {
    match state.videos.list_catalog().await {
        Ok(videos) => ApiSuccess::ok(videos, "Videos retrieved successfully").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/videos/{id}",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Get Video", body = ApiResponse<VideoResponse>),
        (status = 404, description = "Video Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.videos.get_video(id).await {
        Ok(Some(video)) => ApiSuccess::ok(video, "Video retrieved successfully").into_response(),
        Ok(None) => ApiError::not_found("Video not found").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
