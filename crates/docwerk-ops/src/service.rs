// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DocumentOperations — the single entry point a route layer or CLI talks to.
//
// Wiring: process invoker → governor → governed invoker → locator and
// strategies. Every process, probes included, goes through the governor.

use std::sync::Arc;

use docwerk_core::error::{DocwerkError, Result};
use docwerk_core::{DocumentFormat, EngineConfig, EngineError, Permissions, QualityTier, StrategyResult};
use docwerk_document::looks_like_pdf;
use docwerk_exec::{
    ExecutableLocator, GovernedInvoker, Governor, ProcessInvoker, ProgressSink, QueueSnapshot,
    SystemInvoker,
};
use docwerk_security::PassphraseEnvelope;
use tracing::{info, instrument};

use crate::compression::{CompressionRequest, compression_chain};
use crate::conversion::{ConversionRequest, conversion_chain};
use crate::diagnostics::{EngineDoctor, EngineReport};
use crate::engine::EngineContext;
use crate::protection::{ProtectionOutcome, ProtectionRequest, protection_chain};

pub struct DocumentOperations {
    config: EngineConfig,
    governor: Governor,
    ctx: EngineContext,
}

impl DocumentOperations {
    /// Build the operations layer on top of real OS processes.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let inner = SystemInvoker::with_default_timeout(config.invoker.default_timeout());
        Self::with_invoker(config, Arc::new(inner), None)
    }

    /// Build on top of `inner`, optionally reporting every job's status
    /// changes to `progress`.
    pub fn with_invoker(
        config: EngineConfig,
        inner: Arc<dyn ProcessInvoker>,
        progress: Option<ProgressSink>,
    ) -> Result<Self> {
        config.validate()?;

        let governor = Governor::new(config.governor.capacity);
        let mut governed = GovernedInvoker::new(governor.clone(), inner);
        if let Some(sink) = progress {
            governed = governed.with_progress(sink);
        }
        let invoker: Arc<dyn ProcessInvoker> = Arc::new(governed);

        let locator = Arc::new(ExecutableLocator::new(
            Arc::clone(&invoker),
            config.invoker.search_dirs.clone(),
            config.invoker.probe_timeout(),
        ));
        let ctx = EngineContext {
            invoker,
            locator,
            temp_root: config.invoker.temp_root.clone(),
            kill_grace: config.invoker.kill_grace(),
        };

        Ok(Self {
            config,
            governor,
            ctx,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shrink a PDF. Fails with the aggregate error when no engine works.
    #[instrument(skip(self, input), fields(input_len = input.len(), %tier))]
    pub async fn compress(&self, input: Vec<u8>, tier: QualityTier) -> Result<StrategyResult> {
        require_pdf(&input)?;
        let chain = compression_chain(
            tier,
            &self.config.compression.engines,
            &self.ctx,
            self.config.compression.timeout(),
        );
        let result = chain.run(&CompressionRequest { input, tier }).await?;
        info!(method = %result.method, ratio = result.stats.ratio, "compression finished");
        Ok(result)
    }

    /// Protect a PDF with `password`. Once the input is accepted this always
    /// returns a document; `encrypted` is false when only markers were added.
    #[instrument(skip(self, input, password), fields(input_len = input.len()))]
    pub async fn protect(
        &self,
        input: Vec<u8>,
        password: &str,
        permissions: Permissions,
    ) -> Result<ProtectionOutcome> {
        require_pdf(&input)?;
        require_passphrase(password)?;

        let chain = protection_chain(&self.config.protection, &self.ctx);
        let result = chain
            .run(&ProtectionRequest {
                input,
                password: password.to_string(),
                permissions,
            })
            .await?;
        info!(method = %result.method, encrypted = result.encrypted, "protection finished");
        Ok(ProtectionOutcome {
            output: result.output,
            method: result.method,
            encrypted: result.encrypted,
            stats: result.stats,
            prior_failures: result.prior_failures,
        })
    }

    /// Wrap any document in a passphrase envelope. The result is not a PDF;
    /// only [`unseal`](Self::unseal) with the same passphrase opens it.
    #[instrument(skip(self, input, passphrase), fields(input_len = input.len()))]
    pub async fn seal(&self, input: Vec<u8>, passphrase: &str) -> Result<Vec<u8>> {
        if input.is_empty() {
            return Err(EngineError::InvalidInput("input document is empty".into()).into());
        }
        require_passphrase(passphrase)?;
        let envelope = PassphraseEnvelope::new(passphrase);
        let sealed = tokio::task::spawn_blocking(move || envelope.seal(&input))
            .await
            .map_err(|e| DocwerkError::Encryption(format!("envelope task aborted: {e}")))??;
        info!(output_len = sealed.len(), "document sealed");
        Ok(sealed)
    }

    /// Open an envelope produced by [`seal`](Self::seal).
    #[instrument(skip(self, sealed, passphrase), fields(input_len = sealed.len()))]
    pub async fn unseal(&self, sealed: Vec<u8>, passphrase: &str) -> Result<Vec<u8>> {
        if !PassphraseEnvelope::is_sealed(&sealed) {
            return Err(EngineError::InvalidInput("input is not a sealed envelope".into()).into());
        }
        require_passphrase(passphrase)?;
        let envelope = PassphraseEnvelope::new(passphrase);
        tokio::task::spawn_blocking(move || envelope.open(&sealed))
            .await
            .map_err(|e| DocwerkError::Encryption(format!("envelope task aborted: {e}")))?
    }

    /// Convert between document formats.
    #[instrument(skip(self, input), fields(input_len = input.len(), %source, %target))]
    pub async fn convert(
        &self,
        input: Vec<u8>,
        source: DocumentFormat,
        target: DocumentFormat,
    ) -> Result<StrategyResult> {
        if input.is_empty() {
            return Err(EngineError::InvalidInput("input document is empty".into()).into());
        }
        if source == DocumentFormat::Pdf {
            require_pdf(&input)?;
        }

        let chain = conversion_chain(source, target, &self.ctx, self.config.conversion.timeout())?;
        let result = chain
            .run(&ConversionRequest {
                input,
                source,
                target,
            })
            .await?;
        info!(method = %result.method, output_len = result.output.len(), "conversion finished");
        Ok(result)
    }

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        self.governor.snapshot()
    }

    /// Probe every known engine.
    pub async fn doctor(&self) -> Vec<EngineReport> {
        EngineDoctor::new(Arc::clone(&self.ctx.locator)).report().await
    }
}

fn require_passphrase(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(EngineError::InvalidInput("password must not be empty".into()).into());
    }
    Ok(())
}

fn require_pdf(input: &[u8]) -> Result<()> {
    if input.is_empty() {
        return Err(EngineError::InvalidInput("input document is empty".into()).into());
    }
    if !looks_like_pdf(input) {
        return Err(DocwerkError::Engine(EngineError::InvalidInput(
            "input is not a PDF document".into(),
        )));
    }
    Ok(())
}
