// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Docwerk.

use thiserror::Error;

use crate::types::{DocumentFormat, ErrorKind, FailureReason, OperationKind};

/// Errors raised while running a single external engine or strategy.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{tool} is not available: {detail}")]
    ToolUnavailable { tool: String, detail: String },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed { exit_code: Option<i32>, stderr: String },

    #[error("engine timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ToolUnavailable { .. } => ErrorKind::ToolUnavailable,
            Self::Spawn { .. } => ErrorKind::SpawnError,
            Self::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    pub fn unavailable(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ToolUnavailable {
            tool: tool.into(),
            detail: detail.into(),
        }
    }

    /// A process that exited zero but left nothing usable behind.
    pub fn empty_output(what: impl std::fmt::Display) -> Self {
        Self::ExecutionFailed {
            exit_code: Some(0),
            stderr: format!("{what} produced an empty or missing output file"),
        }
    }

    /// A failure that did not come from a process exit status.
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            exit_code: None,
            stderr: detail.into(),
        }
    }
}

/// Top-level error type for all Docwerk operations.
#[derive(Debug, Error)]
pub enum DocwerkError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Every strategy in a fallback chain failed.
    #[error("every {operation} strategy failed: {}", join_reasons(.reasons))]
    ChainExhausted {
        operation: OperationKind,
        reasons: Vec<FailureReason>,
    },

    #[error("no conversion path from {from} to {to}")]
    UnsupportedConversion {
        from: DocumentFormat,
        to: DocumentFormat,
    },

    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DocwerkError {
    /// The ordered failure list of an exhausted chain, if this is one.
    pub fn failure_reasons(&self) -> Option<&[FailureReason]> {
        match self {
            Self::ChainExhausted { reasons, .. } => Some(reasons),
            _ => None,
        }
    }
}

fn join_reasons(reasons: &[FailureReason]) -> String {
    if reasons.is_empty() {
        return "no strategies configured".into();
    }
    reasons
        .iter()
        .map(|r| format!("{}: {}", r.strategy, r.detail))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocwerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_chain_lists_every_reason_in_order() {
        let err = DocwerkError::ChainExhausted {
            operation: OperationKind::Compression,
            reasons: vec![
                FailureReason::from_error(
                    "ghostscript-balanced",
                    &EngineError::unavailable("ghostscript", "not installed"),
                ),
                FailureReason::from_error("qpdf-balanced", &EngineError::Timeout { after_ms: 60000 }),
            ],
        };
        let text = err.to_string();
        let gs = text.find("ghostscript-balanced").unwrap();
        let qpdf = text.find("qpdf-balanced").unwrap();
        assert!(gs < qpdf);
        assert!(text.contains("timed out after 60000ms"));
        assert_eq!(err.failure_reasons().map(|r| r.len()), Some(2));
    }

    #[test]
    fn kinds_match_taxonomy() {
        assert_eq!(EngineError::empty_output("soffice").kind(), ErrorKind::ExecutionFailed);
        assert_eq!(EngineError::InvalidInput("empty".into()).kind(), ErrorKind::InvalidInput);
        let spawn = EngineError::Spawn {
            program: "gs".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(spawn.kind(), ErrorKind::SpawnError);
    }
}
