use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    JwtSecret,
    UploadRoot,
    OutputRoot,
    FfmpegPath,
    SegmentDuration,
    HlsListSize,
    CodecCopy,
    TranscodeTimeoutSecs,
    TranscodeQueueTimeoutSecs,
    TranscodeWorkers,
    MaxUploadBytes,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::JwtSecret => "JWT_SECRET",
            EnvKey::UploadRoot => "UPLOAD_ROOT",
            EnvKey::OutputRoot => "OUTPUT_ROOT",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::SegmentDuration => "HLS_SEGMENT_SECONDS",
            EnvKey::HlsListSize => "HLS_LIST_SIZE",
            EnvKey::CodecCopy => "HLS_CODEC_COPY",
            EnvKey::TranscodeTimeoutSecs => "TRANSCODE_TIMEOUT_SECS",
            EnvKey::TranscodeQueueTimeoutSecs => "TRANSCODE_QUEUE_TIMEOUT_SECS",
            EnvKey::TranscodeWorkers => "TRANSCODE_WORKERS",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
