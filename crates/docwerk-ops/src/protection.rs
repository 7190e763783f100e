// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Protection strategy set.
//
// Three strategies attempt real encryption: AES-256 in process through
// lopdf, then qpdf, then Ghostscript. The last one only writes
// password-derived markers into the metadata and cannot fail, so a
// protection chain always produces a document. `encrypted` in the outcome
// says which kind the caller got.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use docwerk_core::config::ProtectionConfig;
use docwerk_core::{EngineError, FailureReason, OperationKind, OperationStats, Permissions};
use docwerk_document::{PdfReader, append_comment, is_encrypted};
use docwerk_exec::ToolSpec;
use docwerk_security::ProtectionMarkers;
use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::{EngineContext, EngineRun, arg, prefixed};
use crate::orchestrator::{FallbackChain, OperationRequest, Strategy, StrategyOutput};

pub const LIBRARY: &str = "library-based-strong-encryption";
pub const COMMAND_LINE: &str = "command-line-strong-encryption";
pub const ALTERNATE_ENGINE: &str = "alternate-engine-encryption";
pub const METADATA_ONLY: &str = "metadata-only-fallback";

/// A document to protect with `password`.
pub struct ProtectionRequest {
    pub input: Vec<u8>,
    pub password: String,
    pub permissions: Permissions,
}

impl OperationRequest for ProtectionRequest {
    fn input_len(&self) -> u64 {
        self.input.len() as u64
    }
}

/// What `protect` hands back. Never an error once the input is valid.
#[derive(Debug, Clone, Serialize)]
pub struct ProtectionOutcome {
    #[serde(skip)]
    pub output: Vec<u8>,
    pub method: String,
    pub encrypted: bool,
    pub stats: OperationStats,
    /// Why each stronger strategy was passed over, in chain order.
    pub prior_failures: Vec<FailureReason>,
}

// ---------------------------------------------------------------------------
// Argument builders
// ---------------------------------------------------------------------------

/// PDF standard security handler permission word (ISO 32000 table 22).
///
/// Bits 7-8 and 13-32 are always set; each granted permission adds its bits.
/// Everything granted gives `-4`.
pub fn pdf_permission_bits(permissions: &Permissions) -> i32 {
    let mut bits: i32 = -3904;
    if permissions.printing {
        bits |= 4 | 2048;
    }
    if permissions.editing {
        bits |= 8 | 32 | 1024;
    }
    if permissions.copying {
        bits |= 16 | 512;
    }
    if permissions.filling {
        bits |= 256;
    }
    bits
}

pub fn qpdf_encrypt_args(
    password: &str,
    permissions: &Permissions,
    input: &Path,
    output: &Path,
) -> Vec<OsString> {
    let modify = if permissions.editing {
        "all"
    } else if permissions.filling {
        "form"
    } else {
        "none"
    };
    let mut args: Vec<OsString> = vec![
        "--encrypt".into(),
        password.into(),
        password.into(),
        "256".into(),
        format!("--print={}", if permissions.printing { "full" } else { "none" }).into(),
        format!("--modify={modify}").into(),
        format!("--extract={}", if permissions.copying { "y" } else { "n" }).into(),
        "--".into(),
    ];
    args.push(arg(input));
    args.push(arg(output));
    args
}

pub fn ghostscript_encrypt_args(
    password: &str,
    permissions: &Permissions,
    input: &Path,
    output: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-q".into(),
        "-dNOPAUSE".into(),
        "-dBATCH".into(),
        "-dSAFER".into(),
        "-sDEVICE=pdfwrite".into(),
        "-dEncryptionR=5".into(),
        "-dKeyLength=256".into(),
        format!("-sOwnerPassword={password}").into(),
        format!("-sUserPassword={password}").into(),
        format!("-dPermissions={}", pdf_permission_bits(permissions)).into(),
    ];
    args.push(prefixed("-sOutputFile=", output));
    args.push(arg(input));
    args
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// The protection strategies, in chain order.
pub enum ProtectionStrategy {
    /// AES-256 standard security handler, in process.
    Library,
    /// qpdf AES-256.
    CommandLine {
        ctx: EngineContext,
        tool: ToolSpec,
        timeout: Duration,
    },
    /// Ghostscript pdfwrite with a security handler.
    AlternateEngine {
        ctx: EngineContext,
        tool: ToolSpec,
        timeout: Duration,
    },
    /// Password markers in the Info dictionary. Never fails.
    MetadataOnly,
}

impl ProtectionStrategy {
    pub fn command_line(ctx: EngineContext, timeout: Duration) -> Self {
        Self::CommandLine {
            ctx,
            tool: ToolSpec::QPDF,
            timeout,
        }
    }

    pub fn alternate_engine(ctx: EngineContext, timeout: Duration) -> Self {
        Self::AlternateEngine {
            ctx,
            tool: ToolSpec::GHOSTSCRIPT,
            timeout,
        }
    }

    /// Resolve a command-line engine through a different spec.
    pub fn with_tool(self, spec: ToolSpec) -> Self {
        match self {
            Self::CommandLine { ctx, timeout, .. } => Self::CommandLine {
                ctx,
                tool: spec,
                timeout,
            },
            Self::AlternateEngine { ctx, timeout, .. } => Self::AlternateEngine {
                ctx,
                tool: spec,
                timeout,
            },
            other => other,
        }
    }

    async fn run_engine(
        ctx: &EngineContext,
        tool: &ToolSpec,
        timeout: Duration,
        request: &ProtectionRequest,
        build: fn(&str, &Permissions, &Path, &Path) -> Vec<OsString>,
    ) -> Result<StrategyOutput, EngineError> {
        let run = EngineRun {
            tool,
            input: &request.input,
            input_name: "input.pdf".into(),
            output_name: "protected.pdf".into(),
            timeout,
            env: Vec::new(),
        };
        let bytes = ctx
            .run_file_engine(run, |files| {
                build(&request.password, &request.permissions, &files.input, &files.output)
            })
            .await?;

        // Some builds silently drop the security handler.
        if !is_encrypted(&bytes) {
            return Err(EngineError::failed("encryption not applied"));
        }
        Ok(StrategyOutput::encrypted(bytes))
    }
}

#[async_trait]
impl Strategy<ProtectionRequest> for ProtectionStrategy {
    fn name(&self) -> String {
        match self {
            Self::Library => LIBRARY,
            Self::CommandLine { .. } => COMMAND_LINE,
            Self::AlternateEngine { .. } => ALTERNATE_ENGINE,
            Self::MetadataOnly => METADATA_ONLY,
        }
        .to_string()
    }

    async fn execute(&self, request: &ProtectionRequest) -> Result<StrategyOutput, EngineError> {
        match self {
            Self::Library => {
                let input = request.input.clone();
                let password = request.password.clone();
                let bits = pdf_permission_bits(&request.permissions);
                let bytes = tokio::task::spawn_blocking(move || {
                    PdfReader::from_bytes(&input)?.encrypt_aes256(&password, &password, bits)
                })
                .await
                .map_err(|e| EngineError::failed(format!("encryption task aborted: {e}")))?
                .map_err(|e| EngineError::failed(e.to_string()))?;

                if !is_encrypted(&bytes) {
                    return Err(EngineError::failed("encryption not applied"));
                }
                Ok(StrategyOutput::encrypted(bytes))
            }
            Self::CommandLine { ctx, tool, timeout } => {
                Self::run_engine(ctx, tool, *timeout, request, qpdf_encrypt_args).await
            }
            Self::AlternateEngine { ctx, tool, timeout } => {
                Self::run_engine(ctx, tool, *timeout, request, ghostscript_encrypt_args).await
            }
            Self::MetadataOnly => {
                let markers = ProtectionMarkers::derive(&request.password, request.permissions, Utc::now());
                let input = request.input.clone();
                let fallback_input = request.input.clone();
                let encoded = markers
                    .encode()
                    .map_err(|e| EngineError::failed(format!("cannot encode markers: {e}")))?;
                let comment = encoded.clone();

                let bytes = tokio::task::spawn_blocking(move || embed_markers(&input, encoded))
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "marker task aborted, appending comment");
                        append_comment(&fallback_input, &comment)
                    });
                Ok(StrategyOutput::plain(bytes))
            }
        }
    }
}

/// Write markers into the Info dictionary, or append them as a trailing
/// comment when the document cannot be parsed.
fn embed_markers(input: &[u8], encoded: String) -> Vec<u8> {
    let rewritten = PdfReader::from_bytes(input).and_then(|reader| {
        let title = match reader.info_entry("Title") {
            Some(existing) if !existing.trim().is_empty() => format!("{existing} (Protected)"),
            _ => "Protected Document".to_string(),
        };
        reader.with_info_entries(&[
            ("Title", title),
            ("Subject", "Password protected (metadata markers, not encrypted)".to_string()),
            ("Keywords", encoded.clone()),
        ])
    });

    match rewritten {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(error = %err, "info dictionary unavailable, appending marker comment");
            append_comment(input, &encoded)
        }
    }
}

/// Whether `bytes` carry protection markers produced with `password`.
pub fn verify_markers(bytes: &[u8], password: &str) -> bool {
    let from_info = PdfReader::from_bytes(bytes)
        .ok()
        .and_then(|reader| reader.info_entry("Keywords"))
        .and_then(|raw| ProtectionMarkers::decode(&raw));

    from_info
        .or_else(|| ProtectionMarkers::find_in(bytes))
        .map(|markers| markers.matches(password))
        .unwrap_or(false)
}

/// The protection chain in its fixed order.
pub fn protection_chain(config: &ProtectionConfig, ctx: &EngineContext) -> FallbackChain<ProtectionRequest> {
    let timeout = config.timeout();
    FallbackChain::new(OperationKind::Protection)
        .with(ProtectionStrategy::Library)
        .with(ProtectionStrategy::command_line(ctx.clone(), timeout))
        .with(ProtectionStrategy::alternate_engine(ctx.clone(), timeout))
        .with(ProtectionStrategy::MetadataOnly)
}
