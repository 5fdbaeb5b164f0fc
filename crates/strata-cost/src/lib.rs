// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost tracking for Strata ingestion and evaluation runs.
//!
//! This crate provides:
//! - **CostAccumulator**: per-run atomic counters for provider calls
//! - **Pricing**: fixed per-unit price table and pure cost functions

pub mod accumulator;
pub mod pricing;

pub use accumulator::{estimate_tokens, CostAccumulator, CostSummary};
pub use pricing::PriceTable;
