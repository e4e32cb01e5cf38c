use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::workers::transcoder::{JobOutcome, JobStatus};

/// Where a single upload request currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Receiving,
    Persisted,
    Transcoding,
    Published,
    Rejected,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Receiving => "receiving",
            PipelineStage::Persisted => "persisted",
            PipelineStage::Transcoding => "transcoding",
            PipelineStage::Published => "published",
            PipelineStage::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// One in-flight transcode, owned by the coordinator for the life of a request.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    status: JobStatus,
    error: Option<String>,
}

impl UploadJob {
    pub fn new(id: Uuid, user_id: Uuid, source_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            id,
            user_id,
            source_path,
            output_path,
            status: JobStatus::Pending,
            error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn mark_running(&mut self) {
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Running;
        }
    }

    /// Records the terminal outcome. Returns `false` if one was already recorded.
    pub fn finish(&mut self, outcome: &JobOutcome) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match outcome {
            JobOutcome::Completed(_) => self.status = JobStatus::Succeeded,
            JobOutcome::Failed(reason) => {
                self.status = JobStatus::Failed;
                self.error = Some(reason.to_string());
            }
        }
        true
    }
}
