use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::model::{OwnerSummary, VideoRecord};

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UploadVideoRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: String,
}

/// Catalog entry enriched with the owner's display fields.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VideoResponse {
    #[serde(flatten)]
    pub video: VideoRecord,
    pub owner: Option<OwnerSummary>,
}
