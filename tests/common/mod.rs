#![allow(dead_code)]

use bytes::Bytes;
use futures_util::{Stream, stream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use vidstream::infrastructure::storage::local::LocalStorage;
use vidstream::modules::video::repository::{OwnerDirectory, VideoCatalog};
use vidstream::modules::video::service::VideoService;
use vidstream::workers::engine::{TranscodeEngine, TranscodeOptions};
use vidstream::workers::transcoder::TranscodeRunner;

pub const MAX_UPLOAD_BYTES: u64 = 1024 * 1024;

/// Stands in for ffmpeg: `$1` is the source, `$2` the manifest, `$3` the segment duration.
pub struct ScriptEngine(pub &'static str);

impl TranscodeEngine for ScriptEngine {
    fn name(&self) -> &str {
        "script"
    }

    fn command(&self, source: &Path, manifest: &Path, options: &TranscodeOptions) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(self.0)
            .arg("engine")
            .arg(source)
            .arg(manifest)
            .arg(options.segment_duration.to_string());
        cmd
    }
}

/// Copies the source into three segments and writes a VOD playlist.
pub const WRITES_HLS: &str = r#"
    test -s "$1" || { echo "source missing" >&2; exit 1; }
    dir=$(dirname "$2")
    for i in 0 1 2; do cp "$1" "$dir/output$i.ts"; done
    printf '#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:%s\n#EXT-X-MEDIA-SEQUENCE:0\n#EXTINF:%s.0,\noutput0.ts\n#EXTINF:%s.0,\noutput1.ts\n#EXTINF:2.5,\noutput2.ts\n#EXT-X-ENDLIST\n' "$3" "$3" "$3" > "$2"
"#;

pub const CODEC_NOT_FOUND: &str = "echo 'codec not found' >&2; exit 1";

pub const NO_OUTPUT: &str = "exit 0";

/// Forks a long-running child like a wrapper script would, recording its pid
/// next to the upload as `engine.pid`.
pub const HANGS: &str = r#"
    sleep 30 &
    echo $! > "$(dirname "$1")/engine.pid"
    wait
"#;

pub struct Harness {
    pub root: tempfile::TempDir,
    pub service: VideoService,
}

impl Harness {
    pub fn upload_root(&self) -> PathBuf {
        self.root.path().join("uploads")
    }

    pub fn output_root(&self) -> PathBuf {
        self.root.path().join("hls")
    }
}

pub fn harness(
    script: &'static str,
    timeout: Duration,
    catalog: Arc<dyn VideoCatalog>,
    owners: Arc<dyn OwnerDirectory>,
) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(root.path().join("uploads"), root.path().join("hls"), MAX_UPLOAD_BYTES);
    let runner = TranscodeRunner::spawn(Arc::new(ScriptEngine(script)), 4, timeout);
    let service = VideoService::new(storage, runner, catalog, owners, TranscodeOptions::default());
    Harness { root, service }
}

pub fn body(data: &'static [u8]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
    stream::iter(data.chunks(7).map(|c| Ok(Bytes::from_static(c))).collect::<Vec<_>>())
}

/// Zombies waiting for init to reap them count as gone.
pub fn is_running(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid.trim())) {
        Ok(stat) => stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| !rest.trim_start().starts_with('Z')),
        Err(_) => false,
    }
}

pub async fn entries(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(mut rd) = tokio::fs::read_dir(dir).await else {
        return out;
    };
    while let Some(entry) = rd.next_entry().await.unwrap() {
        out.push(entry.path());
    }
    out
}
