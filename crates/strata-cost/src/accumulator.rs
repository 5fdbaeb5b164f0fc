// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-run cost accumulator.
//!
//! One accumulator is created per ingestion or evaluation run, mutated by
//! every provider call made during that run, and summarized at run end.
//! Counters are atomic so concurrent batch workers within a run can record
//! without locking; the accumulator itself is never shared across runs.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::pricing::{embedding_cost_usd, generation_cost_usd, PriceTable};

/// Estimate tokens from character length (length / 4).
///
/// An approximation, not billing-grade: it will not match provider-billed
/// tokens exactly and is only used for run cost estimation.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

/// Accumulates token and call counters for a single run.
#[derive(Debug, Default)]
pub struct CostAccumulator {
    embedding_input_tokens: AtomicU64,
    embedding_call_count: AtomicU64,
    llm_input_tokens: AtomicU64,
    llm_output_tokens: AtomicU64,
    llm_call_count: AtomicU64,
}

impl CostAccumulator {
    /// New accumulator with zero counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one embedding provider call with its estimated input tokens.
    pub fn record_embedding_call(&self, input_tokens: u64) {
        self.embedding_input_tokens
            .fetch_add(input_tokens, Ordering::Relaxed);
        self.embedding_call_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one generation call with provider-reported token usage.
    pub fn record_generation_call(&self, input_tokens: u64, output_tokens: u64) {
        self.llm_input_tokens
            .fetch_add(input_tokens, Ordering::Relaxed);
        self.llm_output_tokens
            .fetch_add(output_tokens, Ordering::Relaxed);
        self.llm_call_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds another accumulator's counters into this one. A process-level
    /// aggregate absorbs each finished run without the runs ever sharing
    /// an accumulator.
    pub fn absorb(&self, other: &Self) {
        self.embedding_input_tokens.fetch_add(
            other.embedding_input_tokens.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
        self.embedding_call_count.fetch_add(
            other.embedding_call_count.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
        self.llm_input_tokens.fetch_add(
            other.llm_input_tokens.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
        self.llm_output_tokens.fetch_add(
            other.llm_output_tokens.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
        self.llm_call_count
            .fetch_add(other.llm_call_count.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    /// Snapshot the counters and compute dollar costs.
    pub fn summary(&self, table: &PriceTable) -> CostSummary {
        let embedding_input_tokens = self.embedding_input_tokens.load(Ordering::Relaxed);
        let llm_input_tokens = self.llm_input_tokens.load(Ordering::Relaxed);
        let llm_output_tokens = self.llm_output_tokens.load(Ordering::Relaxed);

        let llm_cost_usd = generation_cost_usd(table, llm_input_tokens, llm_output_tokens);
        let embedding_cost_usd = embedding_cost_usd(table, embedding_input_tokens);

        CostSummary {
            llm_input_tokens,
            llm_output_tokens,
            llm_call_count: self.llm_call_count.load(Ordering::Relaxed),
            embedding_input_tokens,
            embedding_call_count: self.embedding_call_count.load(Ordering::Relaxed),
            llm_cost_usd,
            embedding_cost_usd,
            total_cost_usd: llm_cost_usd + embedding_cost_usd,
        }
    }
}

/// JSON-serializable summary of a run's provider spend.
#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    pub llm_input_tokens: u64,
    pub llm_output_tokens: u64,
    pub llm_call_count: u64,
    pub embedding_input_tokens: u64,
    pub embedding_call_count: u64,
    pub llm_cost_usd: f64,
    pub embedding_cost_usd: f64,
    pub total_cost_usd: f64,
}
