use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::env::{self, EnvKey};
use crate::workers::engine::TranscodeOptions;

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
#[error("missing required environment variable {0}")]
pub struct ConfigError(pub &'static str);

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub upload_root: PathBuf,
    pub output_root: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub segment_duration: u32,
    pub hls_list_size: u32,
    pub codec_copy: bool,
    pub transcode_timeout_secs: u64,
    pub transcode_queue_timeout_secs: u64,
    pub transcode_workers: usize,
    pub max_upload_bytes: u64,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: required(EnvKey::DatabaseUrl)?,
            jwt_secret: required(EnvKey::JwtSecret)?,
            upload_root: env::get_or(EnvKey::UploadRoot, "./uploads").into(),
            output_root: env::get_or(EnvKey::OutputRoot, "./hls").into(),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg").into(),
            segment_duration: env::get_parsed(EnvKey::SegmentDuration, 10),
            hls_list_size: env::get_parsed(EnvKey::HlsListSize, 0),
            codec_copy: env::get_parsed(EnvKey::CodecCopy, true),
            transcode_timeout_secs: env::get_parsed(EnvKey::TranscodeTimeoutSecs, 900),
            transcode_queue_timeout_secs: env::get_parsed(EnvKey::TranscodeQueueTimeoutSecs, 600),
            transcode_workers: env::get_parsed(EnvKey::TranscodeWorkers, 2).max(1),
            max_upload_bytes: env::get_parsed(EnvKey::MaxUploadBytes, DEFAULT_MAX_UPLOAD_BYTES),
        })
    }

    pub fn transcode_options(&self) -> TranscodeOptions {
        TranscodeOptions {
            segment_duration: self.segment_duration.max(1),
            list_size: self.hls_list_size,
            codec_copy: self.codec_copy,
        }
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs.max(1))
    }

    /// `0` lets jobs wait for a worker indefinitely.
    pub fn transcode_queue_timeout(&self) -> Option<Duration> {
        (self.transcode_queue_timeout_secs > 0).then(|| Duration::from_secs(self.transcode_queue_timeout_secs))
    }
}

fn required(key: EnvKey) -> Result<String, ConfigError> {
    let name = key.as_str();
    env::get(key).map_err(|_| ConfigError(name))
}
