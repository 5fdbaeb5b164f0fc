// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hierarchical retrieval over the layered chunk index.
//!
//! A query cascades through the layers coarse to fine, each stage with its
//! own similarity threshold and result cap, then merges across layers with
//! finer-granularity matches weighted ahead of coarser ones. When the
//! semantic path cannot complete, retrieval degrades to the user's most
//! recent chunks rather than failing the caller.

pub mod retriever;

pub use retriever::HierarchicalRetriever;
