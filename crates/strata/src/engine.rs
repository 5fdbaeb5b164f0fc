// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory engine: ingestion, retrieval, learning, and bookkeeping
//! wired together behind one facade.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strata_chunk::Chunker;
use strata_config::StrataConfig;
use strata_core::{
    ChunkIndex, CompletionBackend, EmbeddingBackend, RetrievedContext, StrataError, TaskStatus,
    UserId,
};
use strata_cost::{CostAccumulator, CostSummary, PriceTable};
use strata_embed::EmbeddingPipeline;
use strata_learn::FactLearner;
use strata_provider::{HttpCompletionClient, HttpEmbeddingClient};
use strata_retrieve::HierarchicalRetriever;
use strata_store::SqliteChunkStore;
use tracing::{info, warn};

use crate::export::parse_export;
use crate::tasks::{BackgroundTasks, SingleFlight};

/// What one ingestion run did, for the caller and the CLI.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub user_id: String,
    pub conversations: usize,
    pub skipped_conversations: usize,
    pub chunks_written: usize,
    /// Chunks persisted without a vector because their batch failed;
    /// `reembed` picks them up later.
    pub chunks_pending_embedding: usize,
    pub failed_batches: usize,
    pub cost: CostSummary,
}

/// Facade over the full subsystem. One engine per process. Each
/// ingestion run and learning task meters its own accumulator and folds
/// it into the engine-lifetime aggregate behind `cost_summary`.
pub struct MemoryEngine {
    config: StrataConfig,
    chunker: Chunker,
    pipeline: EmbeddingPipeline,
    retriever: HierarchicalRetriever,
    learner: FactLearner,
    store: Arc<SqliteChunkStore>,
    costs: Arc<CostAccumulator>,
    prices: PriceTable,
    tasks: BackgroundTasks,
    inflight: SingleFlight,
}

impl MemoryEngine {
    /// Builds the production engine: HTTP providers and on-disk SQLite.
    pub async fn from_config(config: StrataConfig) -> Result<Self, StrataError> {
        let api_key = config.provider.api_key.clone().ok_or_else(|| {
            StrataError::Config(
                "provider.api_key is required (set STRATA_PROVIDER_API_KEY)".to_string(),
            )
        })?;

        let embedding = HttpEmbeddingClient::new(
            config.provider.embedding_url.clone(),
            Some(&api_key),
            config.provider.embedding_model.clone(),
            config.provider.dimensions,
        )?;
        let completion = HttpCompletionClient::new(
            config.provider.completion_url.clone(),
            &api_key,
            config.provider.extraction_model.clone(),
            config.provider.extraction_max_tokens,
        )?;
        let store =
            Arc::new(SqliteChunkStore::open(Path::new(&config.storage.database_path)).await?);

        Ok(Self::with_parts(
            config,
            store,
            Arc::new(embedding),
            Arc::new(completion),
        ))
    }

    /// Assembles an engine from injected collaborators. Tests pass fakes
    /// here; `from_config` passes the real providers.
    pub fn with_parts(
        config: StrataConfig,
        store: Arc<SqliteChunkStore>,
        embedding: Arc<dyn EmbeddingBackend>,
        completion: Arc<dyn CompletionBackend>,
    ) -> Self {
        let pipeline = EmbeddingPipeline::new(
            embedding,
            config.embedding.batch_size,
            config.embedding.max_attempts,
            Duration::from_millis(config.embedding.base_backoff_ms),
            config.embedding.max_parallel_batches,
            config.embedding.max_chars_per_text,
        );
        let index: Arc<dyn ChunkIndex> = store.clone();
        let retriever = HierarchicalRetriever::new(
            index.clone(),
            pipeline.clone(),
            config.retrieval.clone(),
        );
        let learner = FactLearner::new(
            completion,
            pipeline.clone(),
            index,
            config.learning.min_confidence,
        );
        let chunker = Chunker::new(config.chunking.overlap_chars, config.chunking.min_messages);

        Self {
            config,
            chunker,
            pipeline,
            retriever,
            learner,
            store,
            costs: Arc::new(CostAccumulator::new()),
            prices: PriceTable::default(),
            tasks: BackgroundTasks::new(),
            inflight: SingleFlight::new(),
        }
    }

    /// Ingests a conversation export for one user.
    ///
    /// Chunks every conversation at all five layers, embeds the chunk
    /// texts in batches, and upserts the results. A failed embedding batch
    /// leaves its chunks stored vector-less for a later `reembed` pass.
    /// Rejects with [`StrataError::IngestInFlight`] when a run for this
    /// user is already active.
    pub async fn ingest(&self, user_id: &UserId, raw_export: &str) -> Result<IngestReport, StrataError> {
        let _guard = self.inflight.begin(user_id)?;
        let parsed = parse_export(raw_export)?;
        let now = chrono::Utc::now();

        let mut chunks = Vec::new();
        for conversation in &parsed.conversations {
            let created_at = conversation
                .messages
                .last()
                .map(|m| m.timestamp.clone())
                .unwrap_or_else(|| now.to_rfc3339());
            let is_recent = within_recent_window(
                &created_at,
                now,
                self.config.chunking.recent_window_days,
            );
            chunks.extend(
                self.chunker
                    .chunk_all_layers(user_id, conversation, is_recent, &created_at),
            );
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        // The report carries this run's spend only, so the accumulator is
        // fresh and folded into the lifetime aggregate at the end.
        let run_costs = CostAccumulator::new();
        let outcome = self.pipeline.embed_documents(&texts, &run_costs).await;
        let mut pending = 0;
        for (chunk, embedding) in chunks.iter_mut().zip(outcome.embeddings) {
            if embedding.is_none() {
                pending += 1;
            }
            chunk.embedding = embedding;
        }
        if outcome.failed_batches > 0 {
            warn!(
                user_id = %user_id,
                failed_batches = outcome.failed_batches,
                pending,
                "some embedding batches failed; chunks stored for re-embedding"
            );
        }

        self.store.upsert_chunks(&chunks).await?;
        metrics::counter!("strata_chunks_ingested_total").increment(chunks.len() as u64);
        info!(
            user_id = %user_id,
            conversations = parsed.conversations.len(),
            chunks = chunks.len(),
            pending,
            "ingestion complete"
        );

        let cost = run_costs.summary(&self.prices);
        self.costs.absorb(&run_costs);
        Ok(IngestReport {
            user_id: user_id.0.clone(),
            conversations: parsed.conversations.len(),
            skipped_conversations: parsed.skipped,
            chunks_written: chunks.len(),
            chunks_pending_embedding: pending,
            failed_batches: outcome.failed_batches,
            cost,
        })
    }

    /// Retrieves context for a query. Infallible; degrades internally.
    pub async fn retrieve_context(
        &self,
        user_id: &UserId,
        query: &str,
        top_k: usize,
    ) -> RetrievedContext {
        self.retriever
            .retrieve(user_id, query, top_k, &self.costs)
            .await
    }

    /// Schedules a background learning pass over conversation text.
    ///
    /// Returns the task id, or `None` when learning is disabled. The task
    /// itself never fails the caller; extraction problems are logged.
    pub fn schedule_learning(&self, user_id: &UserId, conversation_text: String) -> Option<String> {
        if !self.config.learning.enabled {
            return None;
        }
        let learner = self.learner.clone();
        let totals = self.costs.clone();
        let user = user_id.clone();
        Some(self.tasks.spawn("learning", async move {
            let run_costs = CostAccumulator::new();
            learner.learn(&user, &conversation_text, &run_costs).await;
            totals.absorb(&run_costs);
            Ok(())
        }))
    }

    /// Embeds chunks whose batches failed during ingestion. Returns how
    /// many chunks gained a vector.
    pub async fn reembed_pending(&self, user_id: &UserId) -> Result<usize, StrataError> {
        let rows = self.store.chunks_missing_embeddings(user_id, 1024).await?;
        if rows.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = rows.iter().map(|(_, content)| content.clone()).collect();
        let outcome = self.pipeline.embed_documents(&texts, &self.costs).await;

        let mut updated = 0;
        for ((chunk_id, _), embedding) in rows.iter().zip(outcome.embeddings) {
            if let Some(embedding) = embedding {
                self.store
                    .update_chunk_embedding(chunk_id, &embedding)
                    .await?;
                updated += 1;
            }
        }
        info!(user_id = %user_id, updated, "re-embedding pass complete");
        Ok(updated)
    }

    /// Marks a learned fact retracted. Returns false when nothing matched.
    pub async fn retract_fact(
        &self,
        user_id: &UserId,
        fact_id: &str,
    ) -> Result<bool, StrataError> {
        self.store.retract_fact(user_id, fact_id).await
    }

    /// (chunk count, active fact count) for a user.
    pub async fn counts(&self, user_id: &UserId) -> Result<(u64, u64), StrataError> {
        self.store.counts(user_id).await
    }

    pub fn cost_summary(&self) -> CostSummary {
        self.costs.summary(&self.prices)
    }

    pub fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks.status(task_id)
    }

    /// Waits for in-flight background tasks before exit.
    pub async fn shutdown(&self) {
        self.tasks.shutdown().await;
    }
}

/// True when `timestamp` parses and falls within the recency window.
/// Unparseable timestamps are treated as old, not recent.
fn within_recent_window(
    timestamp: &str,
    now: chrono::DateTime<chrono::Utc>,
    window_days: i64,
) -> bool {
    match chrono::DateTime::parse_from_rfc3339(timestamp) {
        Ok(parsed) => now.signed_duration_since(parsed) <= chrono::Duration::days(window_days),
        Err(_) => false,
    }
}
