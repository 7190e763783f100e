// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-job scratch space and cleanup guards.

use std::path::{Path, PathBuf};

use docwerk_core::EngineError;
use tempfile::TempDir;
use tracing::{debug, warn};

/// A private temp directory for one strategy attempt, removed on drop.
///
/// Directory names carry a millisecond timestamp and a random suffix, so
/// concurrent jobs never share paths.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Create a workspace under `root`, or the OS temp dir when `None`.
    pub fn create(root: Option<&Path>) -> Result<Self, EngineError> {
        let prefix = format!("docwerk-{}-", chrono::Utc::now().timestamp_millis());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).rand_bytes(8);
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| EngineError::failed(format!("cannot create job workspace: {e}")))?;
        debug!(path = %dir.path().display(), "job workspace created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the workspace (not created).
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write the job input and return its path.
    pub async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, EngineError> {
        if bytes.is_empty() {
            return Err(EngineError::InvalidInput("input is empty".into()));
        }
        let path = self.file(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| EngineError::failed(format!("cannot stage input {}: {e}", path.display())))?;
        Ok(path)
    }

    /// Read an engine's output file. A missing or zero-length file is an
    /// execution failure even if the process exited cleanly.
    pub async fn read_output(&self, path: &Path, engine: &str) -> Result<Vec<u8>, EngineError> {
        match tokio::fs::read(path).await {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            Ok(_) => Err(EngineError::empty_output(engine)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::empty_output(engine))
            }
            Err(e) => Err(EngineError::failed(format!(
                "cannot read {engine} output {}: {e}",
                path.display()
            ))),
        }
    }
}

/// Removes the listed files or directories when dropped.
#[derive(Debug, Default)]
pub struct PathGuard {
    paths: Vec<PathBuf>,
}

impl PathGuard {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            match result {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "temp cleanup failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn workspace_removed_on_drop() {
        let root = tempfile::tempdir().expect("root");
        let path = {
            let ws = JobWorkspace::create(Some(root.path())).expect("workspace");
            ws.write_input("in.pdf", b"%PDF-1.4").await.expect("write");
            assert!(ws.file("in.pdf").exists());
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_workspaces_do_not_collide() {
        let root = tempfile::tempdir().expect("root");
        let a = JobWorkspace::create(Some(root.path())).expect("a");
        let b = JobWorkspace::create(Some(root.path())).expect("b");
        assert_ne!(a.path(), b.path());
        let name = a.path().file_name().expect("name").to_string_lossy().into_owned();
        assert!(name.starts_with("docwerk-"));
    }

    #[tokio::test]
    async fn empty_or_missing_output_is_execution_failure() {
        let ws = JobWorkspace::create(None).expect("workspace");
        let missing = ws.read_output(&ws.file("out.pdf"), "gs").await;
        assert!(matches!(missing, Err(EngineError::ExecutionFailed { .. })));

        std::fs::write(ws.file("empty.pdf"), b"").expect("write");
        let empty = ws.read_output(&ws.file("empty.pdf"), "gs").await;
        assert!(matches!(empty, Err(EngineError::ExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn empty_input_rejected() {
        let ws = JobWorkspace::create(None).expect("workspace");
        let err = ws.write_input("in.pdf", b"").await.expect_err("empty");
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn guard_removes_files_and_dirs() {
        let root = tempfile::tempdir().expect("root");
        let file = root.path().join("a.tmp");
        let dir = root.path().join("nested");
        std::fs::write(&file, b"x").expect("write");
        std::fs::create_dir_all(dir.join("deeper")).expect("mkdir");
        drop(PathGuard::new(vec![file.clone(), dir.clone(), root.path().join("never-existed")]));
        assert!(!file.exists());
        assert!(!dir.exists());
    }
}
