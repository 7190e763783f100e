// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for operators and end users.
//
// A failed operation should tell the reader which engine to install, not just
// that something went wrong.

use crate::error::{DocwerkError, EngineError};
use crate::types::{ErrorKind, FailureReason};

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Timeout or a busy machine; retrying may help.
    Transient,
    /// The caller must change the request (different file, different format).
    ActionRequired,
    /// Cannot be fixed by retrying.
    Permanent,
    /// An external engine has to be installed first.
    InstallRequired,
}

/// A human-readable error with a plain message and an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

/// Platform-specific install command for a known engine.
pub fn install_hint(tool: &str) -> Option<&'static str> {
    let linux = cfg!(target_os = "linux");
    let macos = cfg!(target_os = "macos");
    match tool {
        "ghostscript" | "gs" => Some(if linux {
            "sudo apt-get install ghostscript (Debian/Ubuntu) or sudo yum install ghostscript (RHEL/CentOS)"
        } else if macos {
            "brew install ghostscript"
        } else {
            "download the installer from https://ghostscript.com/releases/"
        }),
        "qpdf" => Some(if linux {
            "sudo apt-get install qpdf"
        } else if macos {
            "brew install qpdf"
        } else {
            "download qpdf from https://github.com/qpdf/qpdf/releases"
        }),
        "libreoffice" | "soffice" => Some(if linux {
            "sudo apt-get install libreoffice-core"
        } else if macos {
            "brew install --cask libreoffice"
        } else {
            "download LibreOffice from https://www.libreoffice.org/download/"
        }),
        "pdf2docx" => Some("pip install pdf2docx"),
        _ => None,
    }
}

/// Convert a `DocwerkError` into a `HumanError`.
pub fn humanize_error(err: &DocwerkError) -> HumanError {
    match err {
        DocwerkError::Engine(engine) => humanize_engine_error(engine),

        DocwerkError::ChainExhausted { operation, reasons } => {
            let missing = missing_engines(reasons);
            let all_missing = !reasons.is_empty()
                && reasons.iter().all(|r| r.kind == ErrorKind::ToolUnavailable);
            if all_missing && !missing.is_empty() {
                let hints = missing
                    .iter()
                    .filter_map(|tool| install_hint(tool).map(|h| format!("{tool}: {h}")))
                    .collect::<Vec<_>>()
                    .join("\n");
                HumanError {
                    message: format!("No {operation} engine is installed."),
                    suggestion: format!("Install at least one of the following, then retry.\n{hints}"),
                    retriable: false,
                    severity: Severity::InstallRequired,
                }
            } else if reasons.iter().all(|r| r.kind == ErrorKind::Timeout) && !reasons.is_empty() {
                HumanError {
                    message: format!("The {operation} took too long."),
                    suggestion: "The document may be very large. Try again when the machine is less busy, or split the file.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            } else {
                HumanError {
                    message: format!("The {operation} could not be completed."),
                    suggestion: "Every available engine rejected the document. Check that the file opens correctly, then try again.".into(),
                    retriable: false,
                    severity: Severity::Permanent,
                }
            }
        }

        DocwerkError::UnsupportedConversion { from, to } => HumanError {
            message: format!("We can't convert {from} files to {to}."),
            suggestion: "Choose a different target format, or convert to PDF first.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        DocwerkError::Pdf(_) => HumanError {
            message: "There's a problem with this PDF file.".into(),
            suggestion: "The file may be damaged. Try opening it in a viewer first to check it works.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        DocwerkError::Encryption(_) => HumanError {
            message: "The document could not be encrypted.".into(),
            suggestion: "Try a different password, or install qpdf for standard PDF encryption.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        DocwerkError::Database(_) => HumanError {
            message: "The usage store had a problem.".into(),
            suggestion: "Try again. If this keeps happening, the store file may be locked by another process.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        DocwerkError::Config(detail) => HumanError {
            message: "The configuration is invalid.".into(),
            suggestion: format!("Fix the configuration file and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        DocwerkError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "The file couldn't be found.".into(),
                suggestion: "It may have been moved or deleted. Check the path and try again.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "Permission denied while reading or writing a file.".into(),
                suggestion: "Check the file permissions, or write the output somewhere else.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "There was a problem reading or writing a file.".into(),
                suggestion: "Try again. If this keeps happening, the disk may be full.".into(),
                retriable: true,
                severity: Severity::Transient,
            },
        },

        DocwerkError::Serialization(_) => HumanError {
            message: "Some stored data could not be read.".into(),
            suggestion: "The file may be from a newer version. Try again, or remove the file to start fresh.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}

/// Convert a single engine failure into a `HumanError`.
pub fn humanize_engine_error(err: &EngineError) -> HumanError {
    match err {
        EngineError::ToolUnavailable { tool, .. } => HumanError {
            message: format!("{tool} is not installed."),
            suggestion: install_hint(tool)
                .map(|h| format!("Install it with: {h}"))
                .unwrap_or_else(|| format!("Install {tool} and make sure it is on your PATH.")),
            retriable: false,
            severity: Severity::InstallRequired,
        },
        EngineError::Spawn { program, .. } => HumanError {
            message: format!("{program} could not be started."),
            suggestion: "Check that the program is executable and the system is not out of resources.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        EngineError::ExecutionFailed { .. } => HumanError {
            message: "The document engine reported an error.".into(),
            suggestion: "The file may be damaged or use features the engine does not support.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },
        EngineError::Timeout { after_ms } => HumanError {
            message: "The document engine took too long.".into(),
            suggestion: format!("It was stopped after {} seconds. Try a smaller file.", after_ms / 1000),
            retriable: true,
            severity: Severity::Transient,
        },
        EngineError::InvalidInput(detail) => HumanError {
            message: "The input can't be processed.".into(),
            suggestion: format!("Choose a different file. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}

fn missing_engines(reasons: &[FailureReason]) -> Vec<String> {
    let mut tools: Vec<String> = Vec::new();
    for tool in reasons.iter().filter_map(|r| r.engine.as_ref()) {
        if !tools.contains(tool) {
            tools.push(tool.clone());
        }
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationKind;

    #[test]
    fn all_missing_engines_ask_for_install() {
        let err = DocwerkError::ChainExhausted {
            operation: OperationKind::Compression,
            reasons: vec![
                FailureReason::from_error(
                    "ghostscript-balanced",
                    &EngineError::unavailable("ghostscript", "not found"),
                ),
                FailureReason::from_error("qpdf-balanced", &EngineError::unavailable("qpdf", "not found")),
            ],
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::InstallRequired);
        assert!(human.suggestion.contains("ghostscript"));
        assert!(human.suggestion.contains("qpdf"));
    }

    #[test]
    fn mixed_failures_are_permanent() {
        let err = DocwerkError::ChainExhausted {
            operation: OperationKind::Protection,
            reasons: vec![
                FailureReason::from_error("a", &EngineError::unavailable("qpdf", "not found")),
                FailureReason::from_error("b", &EngineError::failed("bad xref")),
            ],
        };
        assert_eq!(humanize_error(&err).severity, Severity::Permanent);
    }

    #[test]
    fn timeout_is_retriable() {
        let human = humanize_engine_error(&EngineError::Timeout { after_ms: 60_000 });
        assert!(human.retriable);
        assert!(human.suggestion.contains("60 seconds"));
    }

    #[test]
    fn known_engines_have_hints() {
        for tool in ["ghostscript", "qpdf", "libreoffice", "pdf2docx"] {
            assert!(install_hint(tool).is_some(), "{tool} should have a hint");
        }
        assert!(install_hint("nonexistent").is_none());
    }
}
