//! Boundary to the external transcoding engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// File name of the index manifest written into each job's output directory.
pub const MANIFEST_FILE_NAME: &str = "output.m3u8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeOptions {
    pub segment_duration: u32,
    /// Playlist entries to keep; `0` keeps the complete list.
    pub list_size: u32,
    pub codec_copy: bool,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            segment_duration: 10,
            list_size: 0,
            codec_copy: true,
        }
    }
}

/// An external program that turns one source file into an HLS manifest plus
/// segments next to it.
///
/// Implementations only describe the invocation; the job runner owns the
/// process lifecycle (spawn, timeout, kill, exit status, output checks).
pub trait TranscodeEngine: Send + Sync {
    fn name(&self) -> &str;

    fn command(&self, source: &Path, manifest: &Path, options: &TranscodeOptions) -> Command;
}

#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    program: PathBuf,
}

impl FfmpegEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(source: &Path, manifest: &Path, options: &TranscodeOptions) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
        ];

        if options.codec_copy {
            args.extend(["-codec".to_string(), "copy".to_string()]);
        } else {
            args.extend(
                ["-c:v", "libx264", "-preset", "fast", "-c:a", "aac"]
                    .into_iter()
                    .map(String::from),
            );
        }

        args.extend([
            "-start_number".to_string(),
            "0".to_string(),
            "-hls_time".to_string(),
            options.segment_duration.to_string(),
            "-hls_list_size".to_string(),
            options.list_size.to_string(),
            "-f".to_string(),
            "hls".to_string(),
            manifest.to_string_lossy().to_string(),
        ]);

        args
    }
}

impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn command(&self, source: &Path, manifest: &Path, options: &TranscodeOptions) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(source, manifest, options));
        cmd
    }
}
