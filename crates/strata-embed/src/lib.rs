// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batched embedding with retry, bounded concurrency, and cost accounting.
//!
//! The pipeline sits between callers (ingestion, retrieval, learning) and a
//! raw [`EmbeddingBackend`]. Document embedding is partial-failure tolerant:
//! a batch that exhausts its retries yields `None` markers for its texts and
//! the rest of the run continues. Query embedding is all-or-nothing since a
//! single query has nothing to degrade to.

pub mod pipeline;

pub use pipeline::{BatchOutcome, EmbeddingPipeline};
