// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the seams to external services.
//!
//! The embedding provider, the generative LLM, and the vector index are
//! external collaborators. Each gets a trait here so production HTTP
//! clients and the SQLite-backed index are constructor-injected, and
//! tests run against fakes.

use async_trait::async_trait;

use crate::error::StrataError;
use crate::types::{EmbedKind, Layer, LearnedFact, RetrievalResult, TokenUsage, UserId};

/// Raw embedding backend: one provider call per batch.
///
/// Batching, retry, and cost accounting live above this seam in the
/// embedding pipeline; implementations only translate one batch.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a batch of texts. Must return exactly one vector per input,
    /// in input order.
    async fn embed_batch(
        &self,
        texts: &[String],
        kind: EmbedKind,
    ) -> Result<Vec<Vec<f32>>, StrataError>;

    /// Dimensionality of the vector space. Document and query embeddings
    /// share it.
    fn dimensions(&self) -> usize;
}

/// A completed generative call: text plus token usage for cost tracking.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Generative LLM backend, used only for fact extraction.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, StrataError>;
}

/// Which record kind a similarity search targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Chunks,
    Facts,
}

/// A scoped similarity query against the index.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Mandatory owner scope. The index must never return another
    /// user's records; this is a security invariant, not an optimization.
    pub user_id: UserId,
    pub embedding: Vec<f32>,
    pub kind: SearchKind,
    /// `Some` restricts a chunk search to one layer. Ignored for facts.
    pub layer: Option<Layer>,
    /// Minimum similarity, inclusive.
    pub threshold: f32,
    pub limit: usize,
}

/// The vector index seam: persistence plus scoped similarity search.
///
/// The store adapter is the sole writer of chunk and fact records; the
/// retriever and the learner go through this trait and never touch
/// storage internals.
#[async_trait]
pub trait ChunkIndex: Send + Sync {
    /// Idempotent on chunk id: re-ingesting a conversation overwrites
    /// rather than duplicates.
    async fn upsert_chunks(&self, chunks: &[crate::types::Chunk]) -> Result<(), StrataError>;

    async fn upsert_facts(&self, facts: &[LearnedFact]) -> Result<(), StrataError>;

    async fn search(&self, request: SearchRequest) -> Result<Vec<RetrievalResult>, StrataError>;

    /// Non-semantic fallback: most recent chunks for a user by timestamp.
    async fn recent_chunks(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>, StrataError>;

    /// Active (non-retracted) facts, for the synthesis consumer. Synthesis
    /// reads these and never mutates confidence.
    async fn active_facts(&self, user_id: &UserId) -> Result<Vec<LearnedFact>, StrataError>;
}
