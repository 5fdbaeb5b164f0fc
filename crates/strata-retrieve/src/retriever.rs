// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The hierarchical retriever: cascade, floor, merge, fallback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use strata_config::RetrievalConfig;
use strata_core::{
    ChunkIndex, RetrievalResult, RetrievedContext, SearchKind, SearchRequest, StrataError, UserId,
};
use strata_cost::CostAccumulator;
use strata_embed::EmbeddingPipeline;
use tracing::{debug, warn};

/// Cascading retrieval over the layered index.
///
/// `retrieve` is infallible by contract: the caller is assembling prompt
/// context and an empty or recency-only result is always better than an
/// error. Every failure path inside (query embedding, a layer search, a
/// timeout) degrades instead of propagating.
#[derive(Clone)]
pub struct HierarchicalRetriever {
    index: Arc<dyn ChunkIndex>,
    pipeline: EmbeddingPipeline,
    config: RetrievalConfig,
}

impl HierarchicalRetriever {
    pub fn new(
        index: Arc<dyn ChunkIndex>,
        pipeline: EmbeddingPipeline,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            pipeline,
            config,
        }
    }

    /// Retrieves context for a query.
    ///
    /// Runs the semantic cascade under the aggregate timeout; on any
    /// failure or expiry, falls back to the user's most recent chunks with
    /// `degraded` set. Identical inputs against an unchanged store produce
    /// identical output either way.
    pub async fn retrieve(
        &self,
        user_id: &UserId,
        query: &str,
        top_k: usize,
        costs: &CostAccumulator,
    ) -> RetrievedContext {
        metrics::counter!("strata_retrieval_total").increment(1);
        let total = Duration::from_millis(self.config.total_timeout_ms);

        let semantic = tokio::time::timeout(total, self.semantic(user_id, query, top_k, costs));
        match semantic.await {
            Ok(Ok(context)) => context,
            Ok(Err(err)) => {
                warn!(user_id = %user_id, error = %err, "semantic retrieval failed, using recency fallback");
                self.fallback(user_id, top_k).await
            }
            Err(_) => {
                warn!(user_id = %user_id, timeout_ms = self.config.total_timeout_ms, "retrieval timed out, using recency fallback");
                self.fallback(user_id, top_k).await
            }
        }
    }

    /// The semantic path: embed the query, cascade coarse to fine, broaden
    /// if below the floor, then search facts and merge.
    async fn semantic(
        &self,
        user_id: &UserId,
        query: &str,
        top_k: usize,
        costs: &CostAccumulator,
    ) -> Result<RetrievedContext, StrataError> {
        let embedding = self.pipeline.embed_query(query, costs).await?;

        let mut chunks: Vec<RetrievalResult> = Vec::new();
        for stage in self.config.cascade() {
            let found = self
                .staged_search(SearchRequest {
                    user_id: user_id.clone(),
                    embedding: embedding.clone(),
                    kind: SearchKind::Chunks,
                    layer: Some(stage.layer),
                    threshold: stage.threshold,
                    limit: stage.limit,
                })
                .await?;
            debug!(layer = %stage.layer, found = found.len(), "cascade stage complete");
            chunks.extend(found);
        }

        // Floor: thresholds can starve a sparse store. One unfiltered
        // all-layer pass fills in before giving up on semantics.
        if dedup_count(&chunks) < self.config.floor_min_results {
            metrics::counter!("strata_retrieval_floor_total").increment(1);
            let broadened = self
                .staged_search(SearchRequest {
                    user_id: user_id.clone(),
                    embedding: embedding.clone(),
                    kind: SearchKind::Chunks,
                    layer: None,
                    threshold: 0.0,
                    limit: top_k.max(self.config.floor_min_results),
                })
                .await?;
            debug!(found = broadened.len(), "floor broadening pass complete");
            chunks.extend(broadened);
        }

        // A fact-stage failure costs the facts, not the chunks.
        let (facts, degraded) = match self
            .staged_search(SearchRequest {
                user_id: user_id.clone(),
                embedding,
                kind: SearchKind::Facts,
                layer: None,
                threshold: self.config.fact_threshold,
                limit: self.config.fact_limit,
            })
            .await
        {
            Ok(facts) => (facts, false),
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "fact search failed, continuing without facts");
                (Vec::new(), true)
            }
        };

        Ok(RetrievedContext {
            chunks: merge_and_rank(chunks, top_k),
            facts,
            degraded,
        })
    }

    /// One index search under the per-stage timeout.
    async fn staged_search(
        &self,
        request: SearchRequest,
    ) -> Result<Vec<RetrievalResult>, StrataError> {
        let stage = Duration::from_millis(self.config.stage_timeout_ms);
        tokio::time::timeout(stage, self.index.search(request))
            .await
            .map_err(|_| StrataError::Timeout { duration: stage })?
    }

    /// Deterministic non-semantic fallback: newest coarse chunks, no facts.
    /// Bounded by the stage timeout; a wedged store yields an empty
    /// degraded context rather than a hung turn.
    async fn fallback(&self, user_id: &UserId, top_k: usize) -> RetrievedContext {
        metrics::counter!("strata_retrieval_degraded_total").increment(1);
        let stage = Duration::from_millis(self.config.stage_timeout_ms);
        let recent = tokio::time::timeout(stage, self.index.recent_chunks(user_id, top_k));
        let chunks = match recent.await {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(err)) => {
                warn!(user_id = %user_id, error = %err, "recency fallback failed, returning empty context");
                Vec::new()
            }
            Err(_) => {
                warn!(user_id = %user_id, timeout_ms = self.config.stage_timeout_ms, "recency fallback timed out, returning empty context");
                Vec::new()
            }
        };
        RetrievedContext {
            chunks,
            facts: Vec::new(),
            degraded: true,
        }
    }
}

/// Weighted score used for cross-layer ranking. Zero-weight never happens:
/// every stored layer has a weight, and fallback results bypass ranking.
fn weighted_score(result: &RetrievalResult) -> f32 {
    let weight = result.layer.map(|l| l.weight()).unwrap_or(1.0);
    weight * result.score
}

fn dedup_count(chunks: &[RetrievalResult]) -> usize {
    let mut seen = std::collections::HashSet::new();
    chunks.iter().filter(|c| seen.insert(c.id.as_str())).count()
}

/// Deduplicates by chunk id keeping the best-weighted copy, then sorts by
/// weighted score descending with newer-first tie-breaking, and truncates.
fn merge_and_rank(chunks: Vec<RetrievalResult>, top_k: usize) -> Vec<RetrievalResult> {
    let mut best: HashMap<String, RetrievalResult> = HashMap::new();
    for chunk in chunks {
        match best.get(&chunk.id) {
            Some(existing) if weighted_score(existing) >= weighted_score(&chunk) => {}
            _ => {
                best.insert(chunk.id.clone(), chunk);
            }
        }
    }
    let mut merged: Vec<RetrievalResult> = best.into_values().collect();
    merged.sort_by(|a, b| {
        weighted_score(b)
            .partial_cmp(&weighted_score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    merged.truncate(top_k);
    merged
}
