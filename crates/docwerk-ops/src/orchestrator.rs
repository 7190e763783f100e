// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fallback orchestrator — one loop over a declared list of strategies.

use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use docwerk_core::error::{DocwerkError, Result};
use docwerk_core::{EngineError, FailureReason, OperationKind, OperationStats, StrategyResult};
use tracing::{info, instrument, warn};

/// Bytes produced by a strategy.
#[derive(Debug, Clone)]
pub struct StrategyOutput {
    pub bytes: Vec<u8>,
    /// True only when the content itself was encrypted.
    pub encrypted: bool,
}

impl StrategyOutput {
    pub fn plain(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            encrypted: false,
        }
    }

    pub fn encrypted(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            encrypted: true,
        }
    }
}

/// Anything a chain can be run against.
pub trait OperationRequest: Send + Sync {
    /// Size of the input document in bytes.
    fn input_len(&self) -> u64;
}

/// One named way of carrying out an operation. A strategy either returns
/// output or fails cleanly; it never retries itself.
#[async_trait]
pub trait Strategy<R: OperationRequest>: Send + Sync {
    fn name(&self) -> String;

    async fn execute(&self, request: &R) -> std::result::Result<StrategyOutput, EngineError>;
}

/// The fixed, ordered strategy list for one operation type.
pub struct FallbackChain<R: OperationRequest> {
    operation: OperationKind,
    strategies: Vec<Box<dyn Strategy<R>>>,
}

impl<R: OperationRequest> FallbackChain<R> {
    pub fn new(operation: OperationKind) -> Self {
        Self {
            operation,
            strategies: Vec::new(),
        }
    }

    pub fn with(mut self, strategy: impl Strategy<R> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Box<dyn Strategy<R>>) {
        self.strategies.push(strategy);
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Try each strategy once, in order, and return the first success.
    ///
    /// An `Ok` with empty bytes counts as `ExecutionFailed`. When every
    /// strategy fails the error carries one `FailureReason` per strategy.
    #[instrument(skip_all, fields(operation = %self.operation, strategies = self.strategies.len()))]
    pub async fn run(&self, request: &R) -> Result<StrategyResult> {
        let started = Instant::now();
        let original_size = request.input_len();
        let mut failures: Vec<FailureReason> = Vec::new();

        for strategy in &self.strategies {
            let name = strategy.name();
            let outcome = match strategy.execute(request).await {
                Ok(output) if output.bytes.is_empty() => Err(EngineError::empty_output(&name)),
                other => other,
            };

            match outcome {
                Ok(output) => {
                    let stats = OperationStats::compute(
                        original_size,
                        output.bytes.len() as u64,
                        started.elapsed().as_millis() as u64,
                    );
                    info!(
                        method = %name,
                        degraded = !failures.is_empty(),
                        original_size,
                        output_size = stats.output_size,
                        ratio = stats.ratio,
                        "strategy succeeded"
                    );
                    return Ok(StrategyResult {
                        method: name,
                        output: output.bytes,
                        encrypted: output.encrypted,
                        stats,
                        prior_failures: failures,
                    });
                }
                Err(err) => {
                    warn!(strategy = %name, kind = %err.kind(), error = %err, "strategy failed, falling back");
                    failures.push(FailureReason::from_error(name, &err));
                }
            }
        }

        Err(DocwerkError::ChainExhausted {
            operation: self.operation,
            reasons: failures,
        })
    }
}

impl<R: OperationRequest> fmt::Debug for FallbackChain<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackChain")
            .field("operation", &self.operation)
            .field("strategies", &self.names())
            .finish()
    }
}
