// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compression strategy set.
//
// A tier is a fixed parameter table. Argument vectors are pure functions of
// the table and the staged paths, so they are tested without spawning
// anything. Ghostscript re-renders images at the tier's resolution; qpdf is a
// lossless structural fallback (object streams plus flate recompression).

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use docwerk_core::config::CompressionEngine;
use docwerk_core::{EngineError, OperationKind, QualityTier};
use docwerk_exec::ToolSpec;
use serde::Serialize;

use crate::engine::{EngineContext, EngineRun, arg, prefixed};
use crate::orchestrator::{FallbackChain, OperationRequest, Strategy, StrategyOutput};

/// Parameter table for one quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierProfile {
    pub tier: QualityTier,
    /// Ghostscript `-dPDFSETTINGS` preset.
    pub preset: &'static str,
    /// Target resolution for colour and grey images.
    pub dpi: u32,
    /// Target resolution for monochrome images.
    pub mono_dpi: u32,
    pub jpeg_quality: u8,
    /// Images are only downsampled when above `dpi * threshold`.
    pub downsample_threshold: f32,
    /// Re-encode colour and grey images as JPEG.
    pub force_dct: bool,
    /// zlib level for the qpdf fallback.
    pub flate_level: u8,
    pub expected_reduction: &'static str,
    pub description: &'static str,
}

impl TierProfile {
    pub const fn for_tier(tier: QualityTier) -> Self {
        match tier {
            QualityTier::MaximumReduction => Self {
                tier,
                preset: "/screen",
                dpi: 72,
                mono_dpi: 72,
                jpeg_quality: 40,
                downsample_threshold: 1.2,
                force_dct: true,
                flate_level: 9,
                expected_reduction: "70-85%",
                description: "Maximum compression for web sharing and email",
            },
            QualityTier::Balanced => Self {
                tier,
                preset: "/ebook",
                dpi: 150,
                mono_dpi: 300,
                jpeg_quality: 60,
                downsample_threshold: 1.2,
                force_dct: true,
                flate_level: 9,
                expected_reduction: "50-70%",
                description: "Optimal balance of size and quality",
            },
            QualityTier::HighFidelity => Self {
                tier,
                preset: "/printer",
                dpi: 300,
                mono_dpi: 600,
                jpeg_quality: 85,
                downsample_threshold: 1.1,
                force_dct: false,
                flate_level: 6,
                expected_reduction: "30-50%",
                description: "Light compression preserving print quality",
            },
        }
    }

    pub fn all() -> [TierProfile; 3] {
        QualityTier::ALL.map(Self::for_tier)
    }
}

/// Ghostscript argv: base switches, tier parameters, then the input.
pub fn ghostscript_args(profile: &TierProfile, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-q",
        "-dNOPAUSE",
        "-dBATCH",
        "-dSAFER",
        "-sDEVICE=pdfwrite",
        "-dCompatibilityLevel=1.4",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(prefixed("-sOutputFile=", output));

    let threshold = format!("{:.1}", profile.downsample_threshold);
    let mut params = vec![
        format!("-dPDFSETTINGS={}", profile.preset),
        "-dDownsampleColorImages=true".to_string(),
        "-dDownsampleGrayImages=true".to_string(),
        "-dDownsampleMonoImages=true".to_string(),
        "-dColorImageDownsampleType=/Bicubic".to_string(),
        format!("-dColorImageResolution={}", profile.dpi),
        "-dGrayImageDownsampleType=/Bicubic".to_string(),
        format!("-dGrayImageResolution={}", profile.dpi),
        "-dMonoImageDownsampleType=/Bicubic".to_string(),
        format!("-dMonoImageResolution={}", profile.mono_dpi),
        format!("-dColorImageDownsampleThreshold={threshold}"),
        format!("-dGrayImageDownsampleThreshold={threshold}"),
        format!("-dMonoImageDownsampleThreshold={threshold}"),
        format!("-dJPEGQ={}", profile.jpeg_quality),
        "-dCompressPages=true".to_string(),
        "-dUseFlateCompression=true".to_string(),
        "-dOptimize=true".to_string(),
    ];
    if profile.force_dct {
        params.extend([
            "-dAutoFilterColorImages=false".to_string(),
            "-dAutoFilterGrayImages=false".to_string(),
            "-dColorImageFilter=/DCTEncode".to_string(),
            "-dGrayImageFilter=/DCTEncode".to_string(),
        ]);
    } else {
        params.push("-dPreserveHalftoneInfo=true".to_string());
    }
    args.extend(params.into_iter().map(OsString::from));
    args.push(arg(input));
    args
}

/// qpdf argv for lossless structural compression.
pub fn qpdf_args(profile: &TierProfile, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--object-streams=generate".into(),
        "--compress-streams=y".into(),
        "--recompress-flate".into(),
        format!("--compression-level={}", profile.flate_level).into(),
    ];
    args.push(arg(input));
    args.push(arg(output));
    args
}

/// A PDF to shrink.
pub struct CompressionRequest {
    pub input: Vec<u8>,
    pub tier: QualityTier,
}

impl OperationRequest for CompressionRequest {
    fn input_len(&self) -> u64 {
        self.input.len() as u64
    }
}

/// One engine at one tier.
pub struct CompressionStrategy {
    engine: CompressionEngine,
    tool: ToolSpec,
    profile: TierProfile,
    ctx: EngineContext,
    timeout: Duration,
}

impl CompressionStrategy {
    pub fn new(
        engine: CompressionEngine,
        tier: QualityTier,
        ctx: EngineContext,
        timeout: Duration,
    ) -> Self {
        let tool = match engine {
            CompressionEngine::Ghostscript => ToolSpec::GHOSTSCRIPT,
            CompressionEngine::Qpdf => ToolSpec::QPDF,
        };
        Self {
            engine,
            tool,
            profile: TierProfile::for_tier(tier),
            ctx,
            timeout,
        }
    }

    /// Resolve the engine through a different spec (vendored builds, tests).
    pub fn with_tool(mut self, tool: ToolSpec) -> Self {
        self.tool = tool;
        self
    }

    pub fn profile(&self) -> &TierProfile {
        &self.profile
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        match self.engine {
            CompressionEngine::Ghostscript => ghostscript_args(&self.profile, input, output),
            CompressionEngine::Qpdf => qpdf_args(&self.profile, input, output),
        }
    }
}

#[async_trait]
impl Strategy<CompressionRequest> for CompressionStrategy {
    fn name(&self) -> String {
        let engine = match self.engine {
            CompressionEngine::Ghostscript => "ghostscript",
            CompressionEngine::Qpdf => "qpdf",
        };
        format!("{engine}-{}", self.profile.tier)
    }

    async fn execute(&self, request: &CompressionRequest) -> Result<StrategyOutput, EngineError> {
        let run = EngineRun {
            tool: &self.tool,
            input: &request.input,
            input_name: "input.pdf".into(),
            output_name: "output.pdf".into(),
            timeout: self.timeout,
            env: Vec::new(),
        };
        let bytes = self
            .ctx
            .run_file_engine(run, |files| self.build_args(&files.input, &files.output))
            .await?;
        Ok(StrategyOutput::plain(bytes))
    }
}

/// The compression chain for `tier`: one strategy per configured engine, in
/// configured order.
pub fn compression_chain(
    tier: QualityTier,
    engines: &[CompressionEngine],
    ctx: &EngineContext,
    timeout: Duration,
) -> FallbackChain<CompressionRequest> {
    let mut chain = FallbackChain::new(OperationKind::Compression);
    for engine in engines {
        chain.push(Box::new(CompressionStrategy::new(*engine, tier, ctx.clone(), timeout)));
    }
    chain
}
