// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docwerk-ops — Resilient document operations.
//
// Each operation type owns a fixed, ordered chain of strategies. The
// orchestrator walks the chain once, records why each failed strategy failed,
// and returns the first success tagged with the strategy's name.

pub mod compression;
pub mod conversion;
pub mod diagnostics;
pub mod engine;
pub mod orchestrator;
pub mod protection;
pub mod service;

pub use compression::{CompressionRequest, CompressionStrategy, TierProfile};
pub use conversion::{ConversionRequest, ConversionStrategy};
pub use diagnostics::{EngineDoctor, EngineReport};
pub use engine::EngineContext;
pub use orchestrator::{FallbackChain, OperationRequest, Strategy, StrategyOutput};
pub use protection::{ProtectionOutcome, ProtectionRequest, ProtectionStrategy, verify_markers};
pub use service::DocumentOperations;
