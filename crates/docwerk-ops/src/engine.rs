// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared plumbing for strategies that shell out to an external engine.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use docwerk_core::EngineError;
use docwerk_exec::{ExecutableLocator, Invocation, JobWorkspace, ProcessInvoker, ToolSpec};
use tracing::debug;

/// Paths of one staged engine run.
#[derive(Debug, Clone)]
pub struct StagedFiles {
    pub input: PathBuf,
    pub output: PathBuf,
    /// The job's private directory.
    pub dir: PathBuf,
}

/// Everything an external strategy needs: where to find engines, how to run
/// them, and where to put scratch files.
#[derive(Clone)]
pub struct EngineContext {
    pub invoker: Arc<dyn ProcessInvoker>,
    pub locator: Arc<ExecutableLocator>,
    pub temp_root: Option<PathBuf>,
    pub kill_grace: Duration,
}

/// One external-engine run described without executing anything.
pub struct EngineRun<'a> {
    pub tool: &'a ToolSpec,
    pub input: &'a [u8],
    pub input_name: String,
    /// Output path relative to the job directory.
    pub output_name: String,
    pub timeout: Duration,
    pub env: Vec<(String, String)>,
}

impl EngineContext {
    /// Locate the engine, stage the input in a fresh workspace, run the engine
    /// through the invoker, and read the output back. The workspace is
    /// removed on every path out of this function.
    pub async fn run_file_engine<F>(&self, run: EngineRun<'_>, build_args: F) -> Result<Vec<u8>, EngineError>
    where
        F: FnOnce(&StagedFiles) -> Vec<OsString>,
    {
        let tool = self.locator.locate(run.tool).await?;
        let workspace = JobWorkspace::create(self.temp_root.as_deref())?;
        let input = workspace.write_input(&run.input_name, run.input).await?;
        let output = workspace.file(&run.output_name);
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::failed(format!("cannot prepare output dir: {e}")))?;
        }

        let staged = StagedFiles {
            input,
            output,
            dir: workspace.path().to_path_buf(),
        };
        let args = build_args(&staged);
        debug!(engine = %tool.name, argc = args.len(), "running engine");

        let mut invocation = Invocation::new(&tool.path, args)
            .timeout(run.timeout)
            .kill_grace(self.kill_grace)
            .cwd(workspace.path());
        for (key, value) in run.env {
            invocation = invocation.env(key, value);
        }

        self.invoker.invoke(invocation).await?;
        workspace.read_output(&staged.output, &tool.name).await
    }
}

/// Convert a path to an argv entry.
pub fn arg(path: &Path) -> OsString {
    path.as_os_str().to_os_string()
}

/// Build a `-Dname=value` style argument from a path.
pub fn prefixed(prefix: &str, path: &Path) -> OsString {
    let mut s = OsString::from(prefix);
    s.push(path.as_os_str());
    s
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use docwerk_exec::SystemInvoker;
    use std::os::unix::fs::PermissionsExt;

    /// Install a shell script standing in for an engine.
    pub(crate) fn fake_engine(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = std::fs::metadata(&path).expect("meta").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod");
    }

    pub(crate) fn context_with_dir(dir: &Path) -> EngineContext {
        let invoker: Arc<dyn ProcessInvoker> = Arc::new(SystemInvoker::new());
        EngineContext {
            locator: Arc::new(ExecutableLocator::new(
                invoker.clone(),
                vec![dir.to_path_buf()],
                Duration::from_secs(5),
            )),
            invoker,
            temp_root: None,
            kill_grace: Duration::from_millis(200),
        }
    }

    const COPIER: ToolSpec = ToolSpec {
        name: "copier",
        candidates: &["docwerk-test-copier"],
        probe_args: &["--version"],
    };

    fn run<'a>(input: &'a [u8]) -> EngineRun<'a> {
        EngineRun {
            tool: &COPIER,
            input,
            input_name: "input.bin".into(),
            output_name: "out/result.bin".into(),
            timeout: Duration::from_secs(5),
            env: vec![("DOCWERK_MARK".into(), "x".into())],
        }
    }

    #[tokio::test]
    async fn stages_input_and_reads_output() {
        let bin = tempfile::tempdir().expect("bin");
        fake_engine(
            bin.path(),
            "docwerk-test-copier",
            r#"[ "$1" = "--version" ] && { echo copier 1.0; exit 0; }
cat "$1" > "$2"; printf "$DOCWERK_MARK" >> "$2""#,
        );
        let ctx = context_with_dir(bin.path());
        let out = ctx
            .run_file_engine(run(b"payload"), |f| vec![arg(&f.input), arg(&f.output)])
            .await
            .expect("engine ran");
        assert_eq!(out, b"payloadx");
    }

    #[tokio::test]
    async fn zero_exit_without_output_is_execution_failure() {
        let bin = tempfile::tempdir().expect("bin");
        fake_engine(bin.path(), "docwerk-test-copier", "exit 0");
        let ctx = context_with_dir(bin.path());
        let err = ctx
            .run_file_engine(run(b"payload"), |f| vec![arg(&f.input), arg(&f.output)])
            .await
            .expect_err("no output");
        assert!(matches!(err, EngineError::ExecutionFailed { .. }));
    }
}
