// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation chunking for layered memory.
//!
//! Each conversation is chunked independently at five granularity tiers,
//! from [`strata_core::Layer::Micro`] up to [`strata_core::Layer::Macro`].
//! Coarser tiers carry more context per chunk; finer tiers pinpoint detail.

pub mod chunker;
pub mod layer;

pub use chunker::Chunker;
pub use layer::{spec_for, LayerSpec, LAYER_SPECS};
