use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::common::error::JobFailure;
use crate::common::hls::MediaPlaylist;
use crate::workers::engine::{MANIFEST_FILE_NAME, TranscodeEngine, TranscodeOptions};

const STDERR_TAIL_BYTES: usize = 64 * 1024;
const STDERR_TAIL_LINES: usize = 12;
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Terminal signal of one transcode job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Carries the output directory holding the manifest and segments.
    Completed(PathBuf),
    Failed(JobFailure),
}

struct QueuedJob {
    id: Uuid,
    source: PathBuf,
    output_dir: PathBuf,
    options: TranscodeOptions,
    status: watch::Sender<JobStatus>,
    outcome: oneshot::Sender<JobOutcome>,
    cancel: CancellationToken,
}

pub struct JobHandle {
    status: watch::Receiver<JobStatus>,
    outcome: oneshot::Receiver<JobOutcome>,
    cancel: CancellationToken,
    queue_deadline: Option<tokio::time::Instant>,
}

impl JobHandle {
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Terminates the engine process; the job then ends as `Failed(cancelled)`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves with the terminal outcome. A job still queued at its queue
    /// deadline is cancelled and reported as a timeout.
    pub async fn wait(mut self) -> JobOutcome {
        if let Some(deadline) = self.queue_deadline {
            let picked_up = self.status.wait_for(|s| *s != JobStatus::Pending);
            if tokio::time::timeout_at(deadline, picked_up).await.is_err() {
                self.cancel.cancel();
                return JobOutcome::Failed(JobFailure::Timeout);
            }
        }

        self.outcome
            .await
            .unwrap_or(JobOutcome::Failed(JobFailure::WorkerLost))
    }
}

/// Pool of workers driving the transcoding engine.
#[derive(Clone)]
pub struct TranscodeRunner {
    queue: async_channel::Sender<QueuedJob>,
    queue_timeout: Option<Duration>,
}

impl TranscodeRunner {
    pub fn spawn(engine: Arc<dyn TranscodeEngine>, workers: usize, timeout: Duration) -> Self {
        let (tx, rx) = async_channel::unbounded();

        for worker_id in 0..workers.max(1) {
            tokio::spawn(run_worker(worker_id, engine.clone(), rx.clone(), timeout));
        }

        info!("🎥 Transcoder started with {} worker(s), timeout {:?}", workers.max(1), timeout);
        Self {
            queue: tx,
            queue_timeout: None,
        }
    }

    /// Bounds how long a job may wait for a free worker. `None` waits indefinitely.
    pub fn with_queue_timeout(mut self, queue_timeout: Option<Duration>) -> Self {
        self.queue_timeout = queue_timeout;
        self
    }

    pub fn start(
        &self,
        id: Uuid,
        source: &Path,
        output_dir: &Path,
        options: TranscodeOptions,
    ) -> Result<JobHandle, JobFailure> {
        let (status_tx, status_rx) = watch::channel(JobStatus::Pending);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let job = QueuedJob {
            id,
            source: source.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            options,
            status: status_tx,
            outcome: outcome_tx,
            cancel: cancel.clone(),
        };

        self.queue
            .try_send(job)
            .map_err(|_| JobFailure::Engine("transcode queue is closed".to_string()))?;

        Ok(JobHandle {
            status: status_rx,
            outcome: outcome_rx,
            cancel,
            queue_deadline: self.queue_timeout.map(|t| tokio::time::Instant::now() + t),
        })
    }

    /// Stops accepting jobs. Workers exit once the queue drains.
    pub fn shutdown(&self) {
        self.queue.close();
    }
}

async fn run_worker(
    worker_id: usize,
    engine: Arc<dyn TranscodeEngine>,
    queue: async_channel::Receiver<QueuedJob>,
    timeout: Duration,
) {
    while let Ok(job) = queue.recv().await {
        let job_id = job.id;
        info!(worker_id, %job_id, "📦 Picked up transcode job");

        // A panic inside one job must not take the worker down with it.
        let task = tokio::spawn(process_job(engine.clone(), job, timeout));
        if let Err(e) = task.await {
            error!(worker_id, %job_id, "❌ Transcode task aborted: {}", e);
        }
    }

    info!(worker_id, "Transcode worker stopped");
}

async fn process_job(engine: Arc<dyn TranscodeEngine>, job: QueuedJob, timeout: Duration) {
    let outcome = if job.cancel.is_cancelled() {
        JobOutcome::Failed(JobFailure::Cancelled)
    } else {
        job.status.send_replace(JobStatus::Running);
        execute(engine.as_ref(), &job, timeout).await
    };

    match &outcome {
        JobOutcome::Completed(dir) => {
            job.status.send_replace(JobStatus::Succeeded);
            info!(job_id = %job.id, output = %dir.display(), "✅ Transcode completed");
        }
        JobOutcome::Failed(reason) => {
            job.status.send_replace(JobStatus::Failed);
            warn!(job_id = %job.id, "❌ Transcode failed: {}", reason);
        }
    }

    // The caller may have gone away; the terminal status above still stands.
    let _ = job.outcome.send(outcome);
}

enum Exit {
    Finished(std::io::Result<ExitStatus>),
    Stopped(JobFailure),
}

async fn execute(engine: &dyn TranscodeEngine, job: &QueuedJob, timeout: Duration) -> JobOutcome {
    let manifest = job.output_dir.join(MANIFEST_FILE_NAME);

    let mut cmd = engine.command(&job.source, &manifest, &job.options);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so wrapper scripts and their children die together.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return JobOutcome::Failed(JobFailure::Engine(format!(
                "failed to start {}: {}",
                engine.name(),
                e
            )));
        }
    };

    let stderr_task = child.stderr.take().map(|pipe| tokio::spawn(read_tail(pipe)));

    let exit = tokio::select! {
        status = child.wait() => Exit::Finished(status),
        _ = tokio::time::sleep(timeout) => Exit::Stopped(JobFailure::Timeout),
        _ = job.cancel.cancelled() => Exit::Stopped(JobFailure::Cancelled),
    };

    let status = match exit {
        Exit::Finished(Ok(status)) => status,
        Exit::Finished(Err(e)) => {
            terminate(&mut child, job.id).await;
            abort(stderr_task);
            return JobOutcome::Failed(JobFailure::Engine(format!(
                "failed waiting for {}: {}",
                engine.name(),
                e
            )));
        }
        Exit::Stopped(reason) => {
            terminate(&mut child, job.id).await;
            abort(stderr_task);
            return JobOutcome::Failed(reason);
        }
    };

    let stderr = drain(stderr_task).await;

    if !status.success() {
        let detail = last_lines(&stderr);
        let reason = if detail.is_empty() {
            format!("{} exited with {}", engine.name(), status)
        } else {
            format!("{} exited with {}: {}", engine.name(), status, detail)
        };
        return JobOutcome::Failed(JobFailure::Engine(reason));
    }

    if has_segments(&job.output_dir, &manifest).await {
        JobOutcome::Completed(job.output_dir.clone())
    } else {
        JobOutcome::Failed(JobFailure::MissingOutput(manifest))
    }
}

async fn terminate(child: &mut tokio::process::Child, job_id: Uuid) {
    if let Some(pid) = child.id() {
        kill_group(pid, job_id);
    }
    if let Err(e) = child.kill().await {
        warn!(%job_id, "Failed to kill transcoder process: {}", e);
    }
}

#[cfg(unix)]
fn kill_group(pid: u32, job_id: Uuid) {
    // SAFETY: plain syscall. The group id is the engine's pid, which stays
    // reserved until the engine is reaped.
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if rc != 0 {
        warn!(%job_id, "Failed to kill transcoder process group: {}", std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32, _job_id: Uuid) {}

fn abort(task: Option<JoinHandle<Vec<u8>>>) {
    if let Some(task) = task {
        task.abort();
    }
}

async fn drain(task: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => String::new(),
    }
}

async fn read_tail<R: AsyncRead + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut tail = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    let excess = tail.len() - STDERR_TAIL_BYTES;
                    tail.drain(..excess);
                }
            }
        }
    }
    tail
}

fn last_lines(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// A reported success only counts if the manifest exists and every local
/// segment it lists is present.
async fn has_segments(output_dir: &Path, manifest: &Path) -> bool {
    let playlist = match MediaPlaylist::read(manifest).await {
        Ok(Some(playlist)) => playlist,
        _ => return false,
    };
    if playlist.segments.is_empty() {
        return false;
    }
    for segment in &playlist.segments {
        if segment.uri.contains("://") {
            continue;
        }
        if !tokio::fs::try_exists(output_dir.join(&segment.uri)).await.unwrap_or(false) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::process::Command;

    /// Stands in for ffmpeg: `$1` is the source, `$2` the manifest, `$3` the segment duration.
    struct ScriptEngine(&'static str);

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

    const WRITES_HLS: &str = r#"
        dir=$(dirname "$2")
        printf 'a' > "$dir/output0.ts"
        printf 'b' > "$dir/output1.ts"
        printf '#EXTM3U\n#EXT-X-TARGETDURATION:%s\n#EXTINF:10.0,\noutput0.ts\n#EXTINF:4.0,\noutput1.ts\n#EXT-X-ENDLIST\n' "$3" > "$2"
    "#;

    fn runner(script: &'static str, timeout: Duration) -> TranscodeRunner {
        TranscodeRunner::spawn(Arc::new(ScriptEngine(script)), 2, timeout)
    }

    async fn run(script: &'static str, timeout: Duration) -> (JobOutcome, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let handle = runner(script, timeout)
            .start(Uuid::new_v4(), &tmp.path().join("in.mp4"), tmp.path(), TranscodeOptions::default())
            .unwrap();
        (handle.wait().await, tmp)
    }

    #[tokio::test]
    async fn successful_engine_completes_with_output_dir() {
        let (outcome, tmp) = run(WRITES_HLS, Duration::from_secs(10)).await;
        assert_eq!(outcome, JobOutcome::Completed(tmp.path().to_path_buf()));
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr() {
        let (outcome, _tmp) = run("echo 'codec not found' >&2; exit 1", Duration::from_secs(10)).await;
        match outcome {
            JobOutcome::Failed(JobFailure::Engine(reason)) => assert!(reason.contains("codec not found"), "{reason}"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_without_manifest_is_a_failure() {
        let (outcome, tmp) = run("exit 0", Duration::from_secs(10)).await;
        assert_eq!(
            outcome,
            JobOutcome::Failed(JobFailure::MissingOutput(tmp.path().join(MANIFEST_FILE_NAME)))
        );
    }

    #[tokio::test]
    async fn manifest_without_segments_is_a_failure() {
        let (outcome, _tmp) = run(r#"printf '#EXTM3U\n#EXT-X-ENDLIST\n' > "$2""#, Duration::from_secs(10)).await;
        assert!(matches!(outcome, JobOutcome::Failed(JobFailure::MissingOutput(_))));
    }

    #[tokio::test]
    async fn hung_engine_times_out_and_is_killed() {
        let started = Instant::now();
        let (outcome, _tmp) = run("exec sleep 30", Duration::from_millis(200)).await;
        assert_eq!(outcome, JobOutcome::Failed(JobFailure::Timeout));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timeout_kills_processes_forked_by_the_engine() {
        let script = r#"
            sleep 30 &
            echo $! > "$(dirname "$2")/child.pid"
            wait
        "#;
        let (outcome, tmp) = run(script, Duration::from_millis(500)).await;
        assert_eq!(outcome, JobOutcome::Failed(JobFailure::Timeout));

        let pid = std::fs::read_to_string(tmp.path().join("child.pid")).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while is_running(pid.trim()) {
            assert!(Instant::now() < deadline, "forked child {} survived the timeout", pid.trim());
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Zombies waiting for init to reap them count as gone.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| !rest.trim_start().starts_with('Z')),
            Err(_) => false,
        }
    }

    async fn wait_for_status(handle: &JobHandle, wanted: impl Fn(JobStatus) -> bool) -> JobStatus {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let status = handle.status();
                if wanted(status) {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn cancel_terminates_running_job() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = runner("exec sleep 30", Duration::from_secs(60))
            .start(Uuid::new_v4(), Path::new("in.mp4"), tmp.path(), TranscodeOptions::default())
            .unwrap();

        wait_for_status(&handle, |s| s == JobStatus::Running).await;
        handle.cancel();

        assert_eq!(handle.wait().await, JobOutcome::Failed(JobFailure::Cancelled));
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        struct Missing;
        impl TranscodeEngine for Missing {
            fn name(&self) -> &str {
                "missing"
            }
            fn command(&self, _: &Path, _: &Path, _: &TranscodeOptions) -> Command {
                Command::new("/nonexistent/transcoder-xyz")
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let runner = TranscodeRunner::spawn(Arc::new(Missing), 1, Duration::from_secs(5));
        let handle = runner
            .start(Uuid::new_v4(), Path::new("in.mp4"), tmp.path(), TranscodeOptions::default())
            .unwrap();

        match handle.wait().await {
            JobOutcome::Failed(JobFailure::Engine(reason)) => assert!(reason.contains("failed to start")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_reaches_terminal_state() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = runner(WRITES_HLS, Duration::from_secs(10))
            .start(Uuid::new_v4(), Path::new("in.mp4"), tmp.path(), TranscodeOptions::default())
            .unwrap();

        let status = wait_for_status(&handle, JobStatus::is_terminal).await;
        assert_eq!(status, JobStatus::Succeeded);
        assert_eq!(handle.wait().await, JobOutcome::Completed(tmp.path().to_path_buf()));
    }

    #[tokio::test]
    async fn job_stuck_in_queue_times_out() {
        let busy_dir = tempfile::tempdir().unwrap();
        let queued_dir = tempfile::tempdir().unwrap();
        let runner = TranscodeRunner::spawn(Arc::new(ScriptEngine("exec sleep 30")), 1, Duration::from_secs(60))
            .with_queue_timeout(Some(Duration::from_millis(200)));

        let busy = runner
            .start(Uuid::new_v4(), Path::new("in.mp4"), busy_dir.path(), TranscodeOptions::default())
            .unwrap();
        wait_for_status(&busy, |s| s == JobStatus::Running).await;

        let started = Instant::now();
        let queued = runner
            .start(Uuid::new_v4(), Path::new("in.mp4"), queued_dir.path(), TranscodeOptions::default())
            .unwrap();
        assert_eq!(queued.status(), JobStatus::Pending);
        assert_eq!(queued.wait().await, JobOutcome::Failed(JobFailure::Timeout));
        assert!(started.elapsed() < Duration::from_secs(5));

        busy.cancel();
        assert_eq!(busy.wait().await, JobOutcome::Failed(JobFailure::Cancelled));
    }

    #[tokio::test]
    async fn closed_runner_rejects_new_jobs() {
        let runner = runner(WRITES_HLS, Duration::from_secs(10));
        runner.shutdown();
        let err = runner
            .start(Uuid::new_v4(), Path::new("in.mp4"), Path::new("out"), TranscodeOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, JobFailure::Engine(_)));
    }

    #[test]
    fn last_lines_keeps_the_tail() {
        let text = (0..20).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let tail = last_lines(&text);
        assert!(tail.starts_with("line 8"));
        assert!(tail.ends_with("line 19"));
    }
}
