// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Docwerk execution layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Unique identifier for a governed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a job.
///
/// The only valid path is `Queued -> Running -> {Done | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a free slot in the governor.
    Queued,
    /// Holding a slot; its external process may be alive.
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error, a timeout, or a panic.
    Failed,
}

impl JobStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

/// Classification of a strategy failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Executable not found, or its probe failed.
    ToolUnavailable,
    /// The OS refused to start the process.
    SpawnError,
    /// Non-zero exit or empty/missing output.
    ExecutionFailed,
    /// The deadline passed before the process exited.
    Timeout,
    /// Empty or unreadable input.
    InvalidInput,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolUnavailable => "ToolUnavailable",
            Self::SpawnError => "SpawnError",
            Self::ExecutionFailed => "ExecutionFailed",
            Self::Timeout => "Timeout",
            Self::InvalidInput => "InvalidInput",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one strategy in a fallback chain did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Name of the strategy that failed.
    pub strategy: String,
    pub kind: ErrorKind,
    /// Diagnostic text (usually the engine's stderr or the error display).
    pub detail: String,
    /// Engine that was missing, when `kind` is `ToolUnavailable`.
    pub engine: Option<String>,
}

impl FailureReason {
    /// Build a reason from the error a strategy returned.
    pub fn from_error(strategy: impl Into<String>, err: &EngineError) -> Self {
        let engine = match err {
            EngineError::ToolUnavailable { tool, .. } => Some(tool.clone()),
            _ => None,
        };
        Self {
            strategy: strategy.into(),
            kind: err.kind(),
            detail: err.to_string(),
            engine,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.strategy, self.kind, self.detail)
    }
}

/// Size and timing figures for one completed operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub original_size: u64,
    pub output_size: u64,
    /// `(original - output) / original * 100`, rounded to one decimal.
    /// Negative when the output grew.
    pub ratio: f64,
    /// `original - output`; negative when the output grew.
    pub size_saved: i64,
    pub elapsed_ms: u64,
}

impl OperationStats {
    pub fn compute(original_size: u64, output_size: u64, elapsed_ms: u64) -> Self {
        let ratio = if original_size == 0 {
            0.0
        } else {
            let raw = (original_size as f64 - output_size as f64) / original_size as f64 * 100.0;
            (raw * 10.0).round() / 10.0
        };
        Self {
            original_size,
            output_size,
            ratio,
            size_saved: original_size as i64 - output_size as i64,
            elapsed_ms,
        }
    }
}

/// The outcome of a fallback chain that found a working strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    /// Name of the first strategy that did not fail.
    pub method: String,
    #[serde(skip)]
    pub output: Vec<u8>,
    /// Whether the output carries real content encryption (protection only).
    pub encrypted: bool,
    pub stats: OperationStats,
    /// Failures of the strategies tried before `method`, in order.
    pub prior_failures: Vec<FailureReason>,
}

impl StrategyResult {
    /// True when at least one preferred strategy was skipped.
    pub fn degraded(&self) -> bool {
        !self.prior_failures.is_empty()
    }
}

/// Operation families, each with its own fixed fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Compression,
    Protection,
    Conversion,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compression => "compression",
            Self::Protection => "protection",
            Self::Conversion => "conversion",
        })
    }
}

/// Compression quality tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityTier {
    HighFidelity,
    Balanced,
    MaximumReduction,
}

impl QualityTier {
    pub const ALL: [QualityTier; 3] = [
        QualityTier::HighFidelity,
        QualityTier::Balanced,
        QualityTier::MaximumReduction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighFidelity => "high-fidelity",
            Self::Balanced => "balanced",
            Self::MaximumReduction => "maximum-reduction",
        }
    }
}

impl Default for QualityTier {
    fn default() -> Self {
        Self::Balanced
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high-fidelity" | "light" | "high-quality" => Ok(Self::HighFidelity),
            "balanced" | "medium" => Ok(Self::Balanced),
            "maximum-reduction" | "high" | "max" => Ok(Self::MaximumReduction),
            other => Err(EngineError::InvalidInput(format!(
                "unknown quality tier '{other}'"
            ))),
        }
    }
}

/// Document formats handled by the conversion chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Doc,
    Odt,
    Rtf,
    Txt,
    Html,
    Xlsx,
    Pptx,
}

impl DocumentFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Doc => "doc",
            Self::Odt => "odt",
            Self::Rtf => "rtf",
            Self::Txt => "txt",
            Self::Html => "html",
            Self::Xlsx => "xlsx",
            Self::Pptx => "pptx",
        }
    }

    /// Infer the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "doc" => Some(Self::Doc),
            "odt" => Some(Self::Odt),
            "rtf" => Some(Self::Rtf),
            "txt" | "text" => Some(Self::Txt),
            "html" | "htm" => Some(Self::Html),
            "xlsx" => Some(Self::Xlsx),
            "pptx" => Some(Self::Pptx),
            _ => None,
        }
    }

    /// Formats whose content is plain text we can lay out ourselves.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Txt | Self::Html | Self::Rtf)
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Permissions granted to a user who opens a protected document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub printing: bool,
    pub editing: bool,
    pub copying: bool,
    pub filling: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            printing: true,
            editing: false,
            copying: false,
            filling: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_only_moves_forward() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Done));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));

        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Done));
        assert!(!JobStatus::Done.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn ratio_rounds_to_one_decimal() {
        let stats = OperationStats::compute(3000, 1000, 12);
        assert_eq!(stats.ratio, 66.7);
        assert_eq!(stats.size_saved, 2000);
    }

    #[test]
    fn ratio_may_be_negative() {
        let stats = OperationStats::compute(1000, 1100, 0);
        assert_eq!(stats.ratio, -10.0);
        assert_eq!(stats.size_saved, -100);
    }

    #[test]
    fn tier_parses_legacy_names() {
        assert_eq!("medium".parse::<QualityTier>().unwrap(), QualityTier::Balanced);
        assert_eq!(
            "maximum-reduction".parse::<QualityTier>().unwrap(),
            QualityTier::MaximumReduction
        );
        assert!("ultra".parse::<QualityTier>().is_err());
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(DocumentFormat::from_extension(".DOCX"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("htm"), Some(DocumentFormat::Html));
        assert_eq!(DocumentFormat::from_extension("exe"), None);
    }

    #[test]
    fn failure_reason_records_missing_engine() {
        let err = EngineError::ToolUnavailable {
            tool: "qpdf".into(),
            detail: "not found on PATH".into(),
        };
        let reason = FailureReason::from_error("command-line-strong-encryption", &err);
        assert_eq!(reason.kind, ErrorKind::ToolUnavailable);
        assert_eq!(reason.engine.as_deref(), Some("qpdf"));
    }
}
