// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed per-unit pricing for provider calls.
//!
//! Generation pricing matches the extraction model tier (input $1.00/MTok,
//! output $5.00/MTok); embedding input is $0.02/MTok with no output charge.

/// Per-unit prices in USD per million tokens.
#[derive(Debug, Clone, Copy)]
pub struct PriceTable {
    /// Cost per million generation input tokens.
    pub gen_input_per_mtok: f64,
    /// Cost per million generation output tokens.
    pub gen_output_per_mtok: f64,
    /// Cost per million embedding input tokens (no output charge).
    pub embed_input_per_mtok: f64,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            gen_input_per_mtok: 1.00,
            gen_output_per_mtok: 5.00,
            embed_input_per_mtok: 0.02,
        }
    }
}

/// Cost of generation calls in USD.
///
/// Computed as a single division so the per-million scaling introduces
/// exactly one rounding step.
pub fn generation_cost_usd(table: &PriceTable, input_tokens: u64, output_tokens: u64) -> f64 {
    (input_tokens as f64 * table.gen_input_per_mtok
        + output_tokens as f64 * table.gen_output_per_mtok)
        / 1_000_000.0
}

/// Cost of embedding calls in USD.
pub fn embedding_cost_usd(table: &PriceTable, input_tokens: u64) -> f64 {
    (input_tokens as f64 * table.embed_input_per_mtok) / 1_000_000.0
}
