use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, Span, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::dto::{UploadVideoRequest, VideoResponse};
use super::job::{PipelineStage, UploadJob};
use super::model::{NewVideoRecord, VideoRecord};
use super::repository::{OwnerDirectory, VideoCatalog};
use crate::common::error::{JobFailure, PipelineError};
use crate::infrastructure::storage::local::LocalStorage;
use crate::workers::engine::{MANIFEST_FILE_NAME, TranscodeOptions};
use crate::workers::transcoder::{JobOutcome, TranscodeRunner};

/// Drives one upload from raw bytes to a published catalog entry.
#[derive(Clone)]
pub struct VideoService {
    storage: LocalStorage,
    runner: TranscodeRunner,
    catalog: Arc<dyn VideoCatalog>,
    owners: Arc<dyn OwnerDirectory>,
    options: TranscodeOptions,
}

impl VideoService {
    pub fn new(
        storage: LocalStorage,
        runner: TranscodeRunner,
        catalog: Arc<dyn VideoCatalog>,
        owners: Arc<dyn OwnerDirectory>,
        options: TranscodeOptions,
    ) -> Self {
        Self {
            storage,
            runner,
            catalog,
            owners,
            options,
        }
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    /// Persists `stream`, transcodes it and publishes the result.
    ///
    /// Resolves only once the pipeline reached a terminal stage. After the
    /// bytes are persisted the rest of the pipeline runs on its own task, so
    /// a caller that goes away does not leave a half-finished job behind.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, title = %request.title))]
    pub async fn submit_upload<S, E>(
        &self,
        user_id: Uuid,
        request: UploadVideoRequest,
        stream: S,
        extension: Option<&str>,
    ) -> Result<VideoRecord, PipelineError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let request = UploadVideoRequest {
            title: request.title.trim().to_string(),
            description: request.description.trim().to_string(),
        };
        request
            .validate()
            .map_err(|e| PipelineError::Validation(e.to_string()))?;

        info!(stage = %PipelineStage::Receiving, "Receiving upload");
        let source = match self.storage.persist(stream, extension).await {
            Ok(path) => path,
            Err(e) => {
                warn!(stage = %PipelineStage::Rejected, "Upload rejected: {}", e);
                return Err(e.into());
            }
        };
        info!(stage = %PipelineStage::Persisted, source = %source.display(), "Upload persisted");

        let this = self.clone();
        let pipeline = async move { this.transcode_and_publish(user_id, request, source).await };
        tokio::spawn(pipeline.instrument(Span::current()))
            .await
            .unwrap_or_else(|e| {
                error!("Pipeline task aborted: {}", e);
                Err(PipelineError::Engine(JobFailure::WorkerLost))
            })
    }

    async fn transcode_and_publish(
        &self,
        user_id: Uuid,
        request: UploadVideoRequest,
        source: PathBuf,
    ) -> Result<VideoRecord, PipelineError> {
        let job_id = Uuid::new_v4();

        let output = match self.storage.allocate_output_dir(job_id).await {
            Ok(dir) => dir,
            Err(e) => {
                self.storage.discard_upload(&source).await;
                warn!(%job_id, stage = %PipelineStage::Rejected, "Upload rejected: {}", e);
                return Err(e.into());
            }
        };

        let mut job = UploadJob::new(job_id, user_id, source, output);

        let handle = match self.runner.start(job.id, &job.source_path, &job.output_path, self.options) {
            Ok(handle) => handle,
            Err(failure) => return Err(self.reject(&mut job, failure).await),
        };
        job.mark_running();
        info!(%job_id, stage = %PipelineStage::Transcoding, status = ?handle.status(), "Transcoding");

        let outcome = handle.wait().await;
        job.finish(&outcome);

        let output_dir = match outcome {
            JobOutcome::Completed(dir) => dir,
            JobOutcome::Failed(failure) => return Err(self.reject(&mut job, failure).await),
        };

        let record = NewVideoRecord {
            job_id,
            title: request.title,
            description: request.description,
            user_id,
            source_path: job.source_path.clone(),
            manifest_path: output_dir.join(MANIFEST_FILE_NAME),
            output_path: output_dir,
        };

        match self.catalog.append(record).await {
            Ok(video) => {
                info!(%job_id, video_id = %video.id, stage = %PipelineStage::Published, "🎬 Video published");
                Ok(video)
            }
            Err(e) => {
                // Output stays on disk so the append can be retried for this job id.
                error!(%job_id, stage = %PipelineStage::Rejected, "Catalog write failed after transcode: {}", e);
                Err(e.into())
            }
        }
    }

    async fn reject(&self, job: &mut UploadJob, failure: JobFailure) -> PipelineError {
        job.finish(&JobOutcome::Failed(failure.clone()));
        warn!(
            job_id = %job.id,
            stage = %PipelineStage::Rejected,
            "Transcode rejected: {}",
            job.error().unwrap_or_default()
        );
        self.storage.discard_output(&job.output_path).await;
        self.storage.discard_upload(&job.source_path).await;
        failure.into()
    }

    pub async fn list_catalog(&self) -> Result<Vec<VideoResponse>, PipelineError> {
        let videos: Vec<VideoRecord> = self.catalog.list().try_collect().await?;
        self.enrich(videos).await
    }

    pub async fn get_video(&self, id: Uuid) -> Result<Option<VideoResponse>, PipelineError> {
        let Some(video) = self.catalog.get(id).await? else {
            return Ok(None);
        };
        Ok(self.enrich(vec![video]).await?.pop())
    }

    async fn enrich(&self, videos: Vec<VideoRecord>) -> Result<Vec<VideoResponse>, PipelineError> {
        let mut ids: Vec<Uuid> = videos.iter().map(|v| v.user_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let owners = match self.owners.owners(&ids).await {
            Ok(owners) => owners,
            Err(e) => {
                warn!("Owner lookup failed, listing without owners: {}", e);
                Default::default()
            }
        };

        Ok(videos
            .into_iter()
            .map(|video| VideoResponse {
                owner: owners.get(&video.user_id).cloned(),
                video,
            })
            .collect())
    }
}
