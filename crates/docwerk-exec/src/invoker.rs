// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process invoker — run one external executable to completion or deadline.
//
// The child is placed in its own process group so a timeout can signal the
// whole tree: SIGTERM first, SIGKILL after the grace period. Output pipes are
// drained concurrently so a chatty engine can never block on a full pipe.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use docwerk_core::EngineError;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::workspace::PathGuard;

/// Bytes of stderr kept for diagnostics.
const STDERR_TAIL: usize = 4096;

/// Limits and environment for a single invocation.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    /// Deadline for this invocation. `None` uses the invoker's default.
    pub timeout: Option<Duration>,
    /// Time between SIGTERM and SIGKILL once the deadline has passed.
    pub kill_grace: Duration,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Files or directories removed when the invocation finishes, whatever
    /// the outcome.
    pub owned_paths: Vec<PathBuf>,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            kill_grace: Duration::from_secs(5),
            cwd: None,
            env: Vec::new(),
            owned_paths: Vec::new(),
        }
    }
}

/// A fully described external command.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub options: InvokeOptions,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            options: InvokeOptions::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.options.kill_grace = grace;
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.push((key.into(), value.into()));
        self
    }

    pub fn owns(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.owned_paths.push(path.into());
        self
    }

    /// Short name used in logs and job labels.
    pub fn label(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// What a successful process left behind.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Always `Some(0)` for a successful invocation.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Runs external commands. Implementations resolve `Ok` only for a zero exit
/// status; every other outcome is one of the typed `EngineError` variants.
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    async fn invoke(&self, invocation: Invocation) -> Result<ProcessOutput, EngineError>;
}

/// Deadline for invocations that do not set their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// The real OS-backed invoker.
#[derive(Debug, Clone)]
pub struct SystemInvoker {
    default_timeout: Duration,
}

impl SystemInvoker {
    pub fn new() -> Self {
        Self::with_default_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

impl Default for SystemInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessInvoker for SystemInvoker {
    #[instrument(skip_all, fields(
        program = %invocation.label(),
        timeout_ms = invocation.options.timeout.unwrap_or(self.default_timeout).as_millis() as u64,
    ))]
    async fn invoke(&self, invocation: Invocation) -> Result<ProcessOutput, EngineError> {
        let Invocation {
            program,
            args,
            options,
        } = invocation;
        let deadline = options.timeout.unwrap_or(self.default_timeout);
        let _cleanup = PathGuard::new(options.owned_paths.clone());
        let started = Instant::now();

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &options.env {
            command.env(key, value);
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| EngineError::Spawn {
            program: program.display().to_string(),
            source,
        })?;
        debug!(pid = child.id(), "process started");

        let stdout_task = child.stdout.take().map(|pipe| tokio::spawn(drain(pipe)));
        let stderr_task = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe)));

        let waited = tokio::time::timeout(deadline, child.wait()).await;
        match waited {
            Ok(Ok(status)) => {
                let stdout = collect(stdout_task, options.kill_grace).await;
                let stderr = tail_text(&collect(stderr_task, options.kill_grace).await);
                let elapsed = started.elapsed();
                debug!(code = status.code(), elapsed_ms = elapsed.as_millis() as u64, "process exited");

                if status.success() {
                    Ok(ProcessOutput {
                        exit_code: status.code(),
                        stdout,
                        stderr,
                        elapsed,
                    })
                } else {
                    Err(EngineError::ExecutionFailed {
                        exit_code: status.code(),
                        stderr,
                    })
                }
            }
            Ok(Err(err)) => {
                abort(stdout_task);
                abort(stderr_task);
                Err(EngineError::failed(format!(
                    "waiting for {} failed: {err}",
                    program.display()
                )))
            }
            Err(_) => {
                warn!(
                    after_ms = deadline.as_millis() as u64,
                    "deadline passed, terminating process tree"
                );
                terminate(&mut child, options.kill_grace).await;
                abort(stdout_task);
                abort(stderr_task);
                Err(EngineError::Timeout {
                    after_ms: deadline.as_millis() as u64,
                })
            }
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    buf
}

/// Collect a drained pipe. A grandchild that inherited the pipe can hold it
/// open after the child exits, so the wait is bounded.
async fn collect(task: Option<JoinHandle<Vec<u8>>>, limit: Duration) -> Vec<u8> {
    let Some(task) = task else {
        return Vec::new();
    };
    let abort_handle = task.abort_handle();
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            abort_handle.abort();
            Vec::new()
        }
    }
}

fn abort(task: Option<JoinHandle<Vec<u8>>>) {
    if let Some(task) = task {
        task.abort();
    }
}

fn tail_text(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_TAIL);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

/// SIGTERM the process group, wait out the grace period, then SIGKILL.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let group = Pid::from_raw(pid as i32);
            let _ = killpg(group, Signal::SIGTERM);
            if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                // The leader is gone; sweep any stragglers left in its group.
                let _ = killpg(group, Signal::SIGKILL);
                return;
            }
            let _ = killpg(group, Signal::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("/bin/sh", ["-c", script])
    }

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let out = SystemInvoker::new()
            .invoke(sh("printf hello"))
            .await
            .expect("invoke");
        assert_eq!(out.stdout_text(), "hello");
        assert_eq!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr() {
        let err = SystemInvoker::new()
            .invoke(sh("echo broken xref >&2; exit 3"))
            .await
            .expect_err("must fail");
        match err {
            EngineError::ExecutionFailed { exit_code, stderr } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "broken xref");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = SystemInvoker::new()
            .invoke(Invocation::new("/nonexistent/docwerk-engine", ["--version"]))
            .await
            .expect_err("must fail");
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[tokio::test]
    async fn hung_process_is_killed_within_deadline_plus_grace() {
        let started = Instant::now();
        let err = SystemInvoker::new()
            .invoke(
                sh("sleep 30")
                    .timeout(Duration::from_millis(200))
                    .kill_grace(Duration::from_millis(200)),
            )
            .await
            .expect_err("must time out");
        assert!(matches!(err, EngineError::Timeout { after_ms: 200 }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn invocation_without_deadline_uses_invoker_default() {
        let invoker = SystemInvoker::with_default_timeout(Duration::from_millis(150));
        let err = invoker
            .invoke(sh("sleep 30").kill_grace(Duration::from_millis(200)))
            .await
            .expect_err("must time out");
        assert!(matches!(err, EngineError::Timeout { after_ms: 150 }));

        let own = invoker
            .invoke(sh("sleep 0.3").timeout(Duration::from_secs(10)))
            .await
            .expect("explicit deadline wins");
        assert_eq!(own.exit_code, Some(0));
        assert_eq!(SystemInvoker::new().default_timeout(), DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn sigterm_ignoring_process_is_force_killed() {
        let started = Instant::now();
        let err = SystemInvoker::new()
            .invoke(
                sh("trap '' TERM; while true; do sleep 1; done")
                    .timeout(Duration::from_millis(200))
                    .kill_grace(Duration::from_millis(300)),
            )
            .await
            .expect_err("must time out");
        assert!(matches!(err, EngineError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn owned_paths_removed_on_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scratch = dir.path().join("input.pdf");
        std::fs::write(&scratch, b"%PDF-1.4").expect("write");

        let _ = SystemInvoker::new()
            .invoke(sh("exit 1").owns(scratch.clone()))
            .await;
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn env_and_cwd_are_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = SystemInvoker::new()
            .invoke(sh("printf \"$DOCWERK_TEST:$(pwd)\"").env("DOCWERK_TEST", "on").cwd(dir.path()))
            .await
            .expect("invoke");
        let text = out.stdout_text();
        assert!(text.starts_with("on:"));
        let reported = std::fs::canonicalize(&text[3..]).expect("canonical");
        assert_eq!(reported, std::fs::canonicalize(dir.path()).expect("canonical"));
    }
}
