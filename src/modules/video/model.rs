use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::PathBuf;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// A published, playable video. Written once, never updated.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq, ToSchema)]
pub struct VideoRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub title: String,
    pub description: String,
    pub user_id: Uuid,
    pub source_path: String,
    pub output_path: String,
    pub manifest_path: String,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewVideoRecord {
    pub job_id: Uuid,
    pub title: String,
    pub description: String,
    pub user_id: Uuid,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub manifest_path: PathBuf,
}

impl NewVideoRecord {
    pub fn into_record(self, id: Uuid, created_at: OffsetDateTime) -> VideoRecord {
        VideoRecord {
            id,
            job_id: self.job_id,
            title: self.title,
            description: self.description,
            user_id: self.user_id,
            source_path: self.source_path.to_string_lossy().into_owned(),
            output_path: self.output_path.to_string_lossy().into_owned(),
            manifest_path: self.manifest_path.to_string_lossy().into_owned(),
            created_at,
        }
    }
}

/// Display fields of a video's owner, supplied by the user-account store.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq, ToSchema)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}
