// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine diagnostics: probe every known engine and report what is usable.

use std::path::PathBuf;
use std::sync::Arc;

use docwerk_core::human_errors::install_hint;
use docwerk_exec::{ExecutableLocator, ToolSpec};
use serde::Serialize;
use tracing::{info, instrument};

/// Availability of one external engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineReport {
    pub name: String,
    pub available: bool,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
    /// Why the engine is unusable, when it is.
    pub problem: Option<String>,
    pub install_hint: Option<String>,
}

pub struct EngineDoctor {
    locator: Arc<ExecutableLocator>,
    tools: Vec<ToolSpec>,
}

impl EngineDoctor {
    pub fn new(locator: Arc<ExecutableLocator>) -> Self {
        Self::with_tools(locator, ToolSpec::ALL.to_vec())
    }

    pub fn with_tools(locator: Arc<ExecutableLocator>, tools: Vec<ToolSpec>) -> Self {
        Self { locator, tools }
    }

    /// Probe each engine in turn. Missing engines are reported, not raised.
    #[instrument(skip(self), fields(engines = self.tools.len()))]
    pub async fn report(&self) -> Vec<EngineReport> {
        let mut reports = Vec::with_capacity(self.tools.len());
        for spec in &self.tools {
            let report = match self.locator.locate(spec).await {
                Ok(tool) => EngineReport {
                    name: spec.name.to_string(),
                    available: true,
                    path: Some(tool.path),
                    version: Some(tool.version),
                    problem: None,
                    install_hint: None,
                },
                Err(err) => EngineReport {
                    name: spec.name.to_string(),
                    available: false,
                    path: None,
                    version: None,
                    problem: Some(err.to_string()),
                    install_hint: install_hint(spec.name).map(str::to_string),
                },
            };
            reports.push(report);
        }

        let available = reports.iter().filter(|r| r.available).count();
        info!(available, total = reports.len(), "engine check complete");
        reports
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::tests::{context_with_dir, fake_engine};

    #[tokio::test]
    async fn reports_present_and_missing_engines() {
        let bin = tempfile::tempdir().expect("bin");
        fake_engine(bin.path(), "docwerk-test-qpdf", "echo 'qpdf version 11.9.0'");
        let ctx = context_with_dir(bin.path());

        let present = ToolSpec {
            name: "qpdf",
            candidates: &["docwerk-test-qpdf"],
            probe_args: &["--version"],
        };
        let missing = ToolSpec {
            name: "ghostscript",
            candidates: &["docwerk-test-gs-absent"],
            probe_args: &["--version"],
        };
        let reports = EngineDoctor::with_tools(ctx.locator, vec![present, missing])
            .report()
            .await;

        assert_eq!(reports.len(), 2);
        assert!(reports[0].available);
        assert_eq!(reports[0].version.as_deref(), Some("qpdf version 11.9.0"));
        assert!(!reports[1].available);
        assert!(reports[1].problem.is_some());
        assert!(reports[1].install_hint.is_some());
    }
}
