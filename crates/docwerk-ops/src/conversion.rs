// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Format conversion strategy set.
//
// Order: office suite in headless mode, then the layout-aware PDF→DOCX
// converter, then an in-process rebuild from extracted text. A chain only
// contains the strategies that declare support for the requested pair.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use docwerk_core::error::{DocwerkError, Result};
use docwerk_core::{DocumentFormat, EngineError, OperationKind};
use docwerk_document::text::{html_to_text, rtf_to_text, text_to_html, text_to_rtf};
use docwerk_document::{PdfReader, PdfWriter};
use docwerk_exec::ToolSpec;
use tracing::debug;

use crate::engine::{EngineContext, EngineRun, arg};
use crate::orchestrator::{FallbackChain, OperationRequest, Strategy, StrategyOutput};

/// Documents the office suite opens with its Writer component.
const WRITER_FAMILY: [DocumentFormat; 6] = [
    DocumentFormat::Docx,
    DocumentFormat::Doc,
    DocumentFormat::Odt,
    DocumentFormat::Rtf,
    DocumentFormat::Txt,
    DocumentFormat::Html,
];

pub struct ConversionRequest {
    pub input: Vec<u8>,
    pub source: DocumentFormat,
    pub target: DocumentFormat,
}

impl OperationRequest for ConversionRequest {
    fn input_len(&self) -> u64 {
        self.input.len() as u64
    }
}

// ---------------------------------------------------------------------------
// Office suite arguments
// ---------------------------------------------------------------------------

/// `--convert-to` value: target extension plus, where it matters, the export
/// filter.
pub fn office_filter(source: DocumentFormat, target: DocumentFormat) -> &'static str {
    match (source, target) {
        (DocumentFormat::Xlsx, DocumentFormat::Pdf) => "pdf:calc_pdf_Export",
        (DocumentFormat::Pptx, DocumentFormat::Pdf) => "pdf:impress_pdf_Export",
        (_, DocumentFormat::Pdf) => "pdf:writer_pdf_Export",
        (_, DocumentFormat::Docx) => "docx:MS Word 2007 XML",
        (_, DocumentFormat::Doc) => "doc:MS Word 97",
        (_, DocumentFormat::Txt) => "txt:Text (encoded):UTF8",
        (_, DocumentFormat::Html) => "html:XHTML Writer File:UTF8",
        (_, other) => other.extension(),
    }
}

/// A `file://` URL for a local directory.
fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    if raw.starts_with('/') {
        format!("file://{raw}")
    } else {
        format!("file:///{raw}")
    }
}

/// Office suite argv. The profile directory lives inside the job directory
/// so concurrent conversions never share (or lock) a user profile.
pub fn office_args(
    source: DocumentFormat,
    target: DocumentFormat,
    input: &Path,
    outdir: &Path,
    profile_dir: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        format!("-env:UserInstallation={}", file_url(profile_dir)).into(),
        "--headless".into(),
        "--norestore".into(),
        "--convert-to".into(),
        office_filter(source, target).into(),
    ];
    if source == DocumentFormat::Pdf {
        args.push("--infilter=writer_pdf_import".into());
    }
    args.push("--outdir".into());
    args.push(arg(outdir));
    args.push(arg(input));
    args
}

pub fn layout_aware_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec!["convert".into(), arg(input), arg(output)]
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

pub enum ConversionStrategy {
    OfficeHeadless {
        ctx: EngineContext,
        tool: ToolSpec,
        timeout: Duration,
    },
    LayoutAware {
        ctx: EngineContext,
        tool: ToolSpec,
        timeout: Duration,
    },
    TextReconstruction,
}

impl ConversionStrategy {
    pub fn office_headless(ctx: EngineContext, timeout: Duration) -> Self {
        Self::OfficeHeadless {
            ctx,
            tool: ToolSpec::LIBREOFFICE,
            timeout,
        }
    }

    pub fn layout_aware(ctx: EngineContext, timeout: Duration) -> Self {
        Self::LayoutAware {
            ctx,
            tool: ToolSpec::PDF2DOCX,
            timeout,
        }
    }

    pub fn with_tool(self, spec: ToolSpec) -> Self {
        match self {
            Self::OfficeHeadless { ctx, timeout, .. } => Self::OfficeHeadless {
                ctx,
                tool: spec,
                timeout,
            },
            Self::LayoutAware { ctx, timeout, .. } => Self::LayoutAware {
                ctx,
                tool: spec,
                timeout,
            },
            other => other,
        }
    }

    pub fn supports(&self, source: DocumentFormat, target: DocumentFormat) -> bool {
        use DocumentFormat::*;
        if source == target {
            return false;
        }
        match self {
            Self::OfficeHeadless { .. } => {
                (WRITER_FAMILY.contains(&source) && (WRITER_FAMILY.contains(&target) || target == Pdf))
                    || (matches!(source, Xlsx | Pptx) && target == Pdf)
                    || (source == Pdf && matches!(target, Docx | Odt | Doc))
            }
            Self::LayoutAware { .. } => source == Pdf && target == Docx,
            Self::TextReconstruction => {
                (source == Pdf && target.is_textual())
                    || (source.is_textual() && (target == Pdf || target.is_textual()))
            }
        }
    }
}

#[async_trait]
impl Strategy<ConversionRequest> for ConversionStrategy {
    fn name(&self) -> String {
        match self {
            Self::OfficeHeadless { .. } => "office-headless",
            Self::LayoutAware { .. } => "layout-aware",
            Self::TextReconstruction => "text-reconstruction",
        }
        .to_string()
    }

    async fn execute(&self, request: &ConversionRequest) -> std::result::Result<StrategyOutput, EngineError> {
        let (source, target) = (request.source, request.target);
        match self {
            Self::OfficeHeadless { ctx, tool, timeout } => {
                let run = EngineRun {
                    tool,
                    input: &request.input,
                    input_name: format!("input.{}", source.extension()),
                    output_name: format!("out/input.{}", target.extension()),
                    timeout: *timeout,
                    env: Vec::new(),
                };
                let bytes = ctx
                    .run_file_engine(run, |files| {
                        let outdir = files.dir.join("out");
                        let profile = files.dir.join("profile");
                        office_args(source, target, &files.input, &outdir, &profile)
                    })
                    .await?;
                Ok(StrategyOutput::plain(bytes))
            }
            Self::LayoutAware { ctx, tool, timeout } => {
                let run = EngineRun {
                    tool,
                    input: &request.input,
                    input_name: "input.pdf".into(),
                    output_name: "output.docx".into(),
                    timeout: *timeout,
                    env: Vec::new(),
                };
                let bytes = ctx
                    .run_file_engine(run, |files| layout_aware_args(&files.input, &files.output))
                    .await?;
                Ok(StrategyOutput::plain(bytes))
            }
            Self::TextReconstruction => {
                let input = request.input.clone();
                let bytes = tokio::task::spawn_blocking(move || rebuild_from_text(&input, source, target))
                    .await
                    .map_err(|e| EngineError::failed(format!("text rebuild aborted: {e}")))??;
                Ok(StrategyOutput::plain(bytes))
            }
        }
    }
}

/// Pull plain text out of `input` and lay it out again as `target`.
fn rebuild_from_text(
    input: &[u8],
    source: DocumentFormat,
    target: DocumentFormat,
) -> std::result::Result<Vec<u8>, EngineError> {
    let text = match source {
        DocumentFormat::Pdf => PdfReader::from_bytes(input)
            .and_then(|reader| reader.extract_text())
            .map_err(|e| EngineError::failed(e.to_string()))?,
        DocumentFormat::Html => html_to_text(&String::from_utf8_lossy(input)),
        DocumentFormat::Rtf => rtf_to_text(&String::from_utf8_lossy(input)),
        DocumentFormat::Txt => String::from_utf8_lossy(input).into_owned(),
        other => {
            return Err(EngineError::InvalidInput(format!(
                "text reconstruction cannot read {other}"
            )));
        }
    };
    if text.trim().is_empty() {
        return Err(EngineError::failed("no extractable text in source document"));
    }
    debug!(chars = text.len(), %source, %target, "rebuilding from text");

    match target {
        DocumentFormat::Pdf => {
            let mut writer = PdfWriter::a4();
            writer.set_title("Converted Document");
            writer
                .create_from_text(&text)
                .map_err(|e| EngineError::failed(e.to_string()))
        }
        DocumentFormat::Html => Ok(text_to_html(&text, "Converted Document").into_bytes()),
        DocumentFormat::Rtf => Ok(text_to_rtf(&text).into_bytes()),
        DocumentFormat::Txt => Ok(text.into_bytes()),
        other => Err(EngineError::InvalidInput(format!(
            "text reconstruction cannot write {other}"
        ))),
    }
}

/// The conversion chain for `source → target`, restricted to the strategies
/// that support the pair.
pub fn conversion_chain(
    source: DocumentFormat,
    target: DocumentFormat,
    ctx: &EngineContext,
    timeout: Duration,
) -> Result<FallbackChain<ConversionRequest>> {
    chain_from(
        source,
        target,
        [
            ConversionStrategy::office_headless(ctx.clone(), timeout),
            ConversionStrategy::layout_aware(ctx.clone(), timeout),
            ConversionStrategy::TextReconstruction,
        ],
    )
}

fn chain_from(
    source: DocumentFormat,
    target: DocumentFormat,
    strategies: impl IntoIterator<Item = ConversionStrategy>,
) -> Result<FallbackChain<ConversionRequest>> {
    if source == target {
        return Err(DocwerkError::Engine(EngineError::InvalidInput(format!(
            "source and target are both {source}"
        ))));
    }

    let mut chain = FallbackChain::new(OperationKind::Conversion);
    for strategy in strategies {
        if strategy.supports(source, target) {
            chain.push(Box::new(strategy));
        }
    }
    if chain.is_empty() {
        return Err(DocwerkError::UnsupportedConversion {
            from: source,
            to: target,
        });
    }
    Ok(chain)
}
