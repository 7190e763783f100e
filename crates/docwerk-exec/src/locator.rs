// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine discovery — PATH first, then well-known install directories, then a
// version probe. "Not found" and "probe failed" are both `ToolUnavailable`;
// anything that goes wrong after that is the strategy's problem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use docwerk_core::EngineError;
use tracing::{debug, info, instrument};

use crate::invoker::{Invocation, ProcessInvoker};

/// How to find and probe one external engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSpec {
    /// Stable name used in logs, errors, and install hints.
    pub name: &'static str,
    /// Executable names tried in order.
    pub candidates: &'static [&'static str],
    pub probe_args: &'static [&'static str],
}

impl ToolSpec {
    pub const GHOSTSCRIPT: ToolSpec = ToolSpec {
        name: "ghostscript",
        candidates: &["gs", "gswin64c", "gswin32c", "ghostscript"],
        probe_args: &["--version"],
    };

    pub const QPDF: ToolSpec = ToolSpec {
        name: "qpdf",
        candidates: &["qpdf"],
        probe_args: &["--version"],
    };

    pub const LIBREOFFICE: ToolSpec = ToolSpec {
        name: "libreoffice",
        candidates: &["soffice", "libreoffice"],
        probe_args: &["--version"],
    };

    pub const PDF2DOCX: ToolSpec = ToolSpec {
        name: "pdf2docx",
        candidates: &["pdf2docx"],
        probe_args: &["--help"],
    };

    pub const ALL: [ToolSpec; 4] = [
        ToolSpec::GHOSTSCRIPT,
        ToolSpec::QPDF,
        ToolSpec::LIBREOFFICE,
        ToolSpec::PDF2DOCX,
    ];
}

/// A located, probed executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedTool {
    pub name: String,
    pub path: PathBuf,
    /// First non-empty line of the probe output.
    pub version: String,
}

/// Finds engines and remembers the ones that probed successfully.
///
/// Probes run through the supplied invoker, so a governed invoker counts
/// them against capacity like any other process.
pub struct ExecutableLocator {
    invoker: Arc<dyn ProcessInvoker>,
    search_dirs: Vec<PathBuf>,
    probe_timeout: Duration,
    found: Mutex<HashMap<&'static str, LocatedTool>>,
}

impl ExecutableLocator {
    pub fn new(
        invoker: Arc<dyn ProcessInvoker>,
        search_dirs: Vec<PathBuf>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            invoker,
            search_dirs,
            probe_timeout,
            found: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the first candidate present on PATH or in a search directory.
    pub fn find(&self, spec: &ToolSpec) -> Option<PathBuf> {
        for candidate in spec.candidates {
            if let Ok(path) = which::which(candidate) {
                return Some(path);
            }
        }
        for dir in &self.search_dirs {
            for candidate in spec.candidates {
                if let Some(path) = executable_in(dir, candidate) {
                    return Some(path);
                }
            }
        }
        None
    }

    /// Locate and probe `spec`. Successful results are cached; failures are
    /// not, so an engine installed later is picked up on the next call.
    #[instrument(skip(self), fields(tool = spec.name))]
    pub async fn locate(&self, spec: &ToolSpec) -> Result<LocatedTool, EngineError> {
        if let Some(hit) = self.cached(spec.name) {
            return Ok(hit);
        }

        let path = self.find(spec).ok_or_else(|| {
            EngineError::unavailable(
                spec.name,
                format!("none of {:?} found on PATH or in known locations", spec.candidates),
            )
        })?;
        debug!(path = %path.display(), "executable found, probing");

        let probe = Invocation::new(&path, spec.probe_args.iter().copied())
            .timeout(self.probe_timeout)
            .kill_grace(Duration::from_secs(1));
        let output = self
            .invoker
            .invoke(probe)
            .await
            .map_err(|e| EngineError::unavailable(spec.name, format!("probe failed: {e}")))?;

        let text = output.stdout_text();
        let version = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("unknown")
            .to_string();
        let tool = LocatedTool {
            name: spec.name.to_string(),
            path,
            version,
        };
        info!(path = %tool.path.display(), version = %tool.version, "engine available");

        if let Ok(mut found) = self.found.lock() {
            found.insert(spec.name, tool.clone());
        }
        Ok(tool)
    }

    fn cached(&self, name: &str) -> Option<LocatedTool> {
        self.found.lock().ok()?.get(name).cloned()
    }
}

fn executable_in(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut names = vec![dir.join(name)];
    if cfg!(windows) {
        names.push(dir.join(format!("{name}.exe")));
    }
    names.into_iter().find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::invoker::SystemInvoker;
    use std::os::unix::fs::PermissionsExt;

    const FAKE: ToolSpec = ToolSpec {
        name: "fake-engine",
        candidates: &["docwerk-test-fake-engine"],
        probe_args: &["--version"],
    };

    fn install_script(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = std::fs::metadata(&path).expect("meta").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod");
    }

    fn locator(dirs: Vec<PathBuf>) -> ExecutableLocator {
        ExecutableLocator::new(Arc::new(SystemInvoker::new()), dirs, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn finds_engine_in_search_dir_and_reads_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        install_script(dir.path(), "docwerk-test-fake-engine", "echo 'Fake Engine 9.56.1'; echo extra");

        let tool = locator(vec![dir.path().to_path_buf()])
            .locate(&FAKE)
            .await
            .expect("locate");
        assert_eq!(tool.version, "Fake Engine 9.56.1");
        assert_eq!(tool.path, dir.path().join("docwerk-test-fake-engine"));
    }

    #[tokio::test]
    async fn missing_engine_is_tool_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = locator(vec![dir.path().to_path_buf()])
            .locate(&FAKE)
            .await
            .expect_err("absent");
        assert!(matches!(err, EngineError::ToolUnavailable { ref tool, .. } if tool == "fake-engine"));
    }

    #[tokio::test]
    async fn failing_probe_is_tool_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        install_script(dir.path(), "docwerk-test-fake-engine", "exit 127");
        let err = locator(vec![dir.path().to_path_buf()])
            .locate(&FAKE)
            .await
            .expect_err("probe fails");
        assert!(matches!(err, EngineError::ToolUnavailable { .. }));
    }

    #[test]
    fn non_executable_file_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("docwerk-test-fake-engine"), "not a program").expect("write");
        assert!(locator(vec![dir.path().to_path_buf()]).find(&FAKE).is_none());
    }

    #[tokio::test]
    async fn successful_probe_is_cached() {
        let dir = tempfile::tempdir().expect("tempdir");
        install_script(dir.path(), "docwerk-test-fake-engine", "echo v1");
        let locator = locator(vec![dir.path().to_path_buf()]);
        locator.locate(&FAKE).await.expect("first");

        // Removing the script does not matter once the engine is cached.
        std::fs::remove_file(dir.path().join("docwerk-test-fake-engine")).expect("rm");
        assert_eq!(locator.locate(&FAKE).await.expect("cached").version, "v1");
    }
}
