use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::common::error::StorageError;

const NAME_ATTEMPTS: usize = 4;

/// Filesystem storage for raw uploads and per-job segment output.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    upload_root: PathBuf,
    output_root: PathBuf,
    max_upload_bytes: u64,
}

impl LocalStorage {
    pub fn new(upload_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>, max_upload_bytes: u64) -> Self {
        Self {
            upload_root: upload_root.into(),
            output_root: output_root.into(),
            max_upload_bytes,
        }
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Streams an upload to a uniquely named file under the upload root.
    ///
    /// Bytes land in a hidden `.part` file that is renamed into place only once
    /// the whole stream has been written and synced. The partial file is
    /// removed on failure and when the future is dropped mid-write, so a
    /// returned path always names a complete upload.
    pub async fn persist<S, E>(&self, mut stream: S, suggested_extension: Option<&str>) -> Result<PathBuf, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        fs::create_dir_all(&self.upload_root)
            .await
            .map_err(|e| StorageError::io("create upload root", &self.upload_root, e))?;

        let extension = suggested_extension.and_then(sanitize_extension);
        let (final_path, part_path, file) = self.create_unique(extension.as_deref()).await?;
        let part = PartFile::new(part_path);

        let written = write_stream(file, &mut stream, part.path(), self.max_upload_bytes).await?;

        fs::rename(part.path(), &final_path)
            .await
            .map_err(|e| StorageError::io("finalize upload", &final_path, e))?;
        part.keep();

        info!(path = %final_path.display(), bytes = written, "📥 Upload persisted");
        Ok(final_path)
    }

    pub async fn allocate_output_dir(&self, job_id: Uuid) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.output_root)
            .await
            .map_err(|e| StorageError::io("create output root", &self.output_root, e))?;

        let dir = self.output_root.join(job_id.to_string());
        fs::create_dir(&dir)
            .await
            .map_err(|e| StorageError::io("create output directory", &dir, e))?;

        debug!(path = %dir.display(), "Allocated output directory");
        Ok(dir)
    }

    pub async fn discard_upload(&self, path: &Path) {
        discard_file(path).await;
    }

    pub async fn discard_output(&self, dir: &Path) {
        match fs::remove_dir_all(dir).await {
            Ok(()) => debug!(path = %dir.display(), "Removed output directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %dir.display(), "Failed to remove output directory: {}", e),
        }
    }

    async fn create_unique(&self, extension: Option<&str>) -> Result<(PathBuf, PathBuf, fs::File), StorageError> {
        let mut last_err = None;

        for _ in 0..NAME_ATTEMPTS {
            let name = unique_name(extension);
            let final_path = self.upload_root.join(&name);
            let part_path = self.upload_root.join(format!(".{}.part", name));

            if fs::try_exists(&final_path).await.unwrap_or(false) {
                continue;
            }

            match OpenOptions::new().write(true).create_new(true).open(&part_path).await {
                Ok(file) => return Ok((final_path, part_path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => last_err = Some(e),
                Err(e) => return Err(StorageError::io("create upload file", &part_path, e)),
            }
        }

        let err = last_err.unwrap_or_else(|| ErrorKind::AlreadyExists.into());
        Err(StorageError::io("allocate unique upload name in", &self.upload_root, err))
    }
}

/// Removes the hidden partial file unless the upload was finalized.
struct PartFile {
    path: PathBuf,
    finalized: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, finalized: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.finalized = true;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial upload"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove partial upload: {}", e),
        }
    }
}

async fn write_stream<S, E>(file: fs::File, stream: &mut S, path: &Path, limit: u64) -> Result<u64, StorageError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut file = tokio::io::BufWriter::new(file);
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| StorageError::Stream(e.to_string()))?;
        written += chunk.len() as u64;
        if written > limit {
            return Err(StorageError::TooLarge { limit });
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| StorageError::io("write upload", path, e))?;
    }

    if written == 0 {
        return Err(StorageError::Empty);
    }

    file.flush().await.map_err(|e| StorageError::io("flush upload", path, e))?;
    file.get_ref()
        .sync_all()
        .await
        .map_err(|e| StorageError::io("sync upload", path, e))?;

    Ok(written)
}

async fn discard_file(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove file: {}", e),
    }
}

fn unique_name(extension: Option<&str>) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: u64 = rand::random();
    match extension {
        Some(ext) => format!("{}-{:016x}.{}", millis, suffix, ext),
        None => format!("{}-{:016x}", millis, suffix),
    }
}

/// Keeps the client's extension as sent. Anything that is not 1 to 8 ASCII
/// alphanumerics is dropped and the file is stored without an extension.
fn sanitize_extension(raw: &str) -> Option<String> {
    let ext = raw.trim().trim_start_matches('.');
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_string())
}
