// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Strata memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};
use strata_core::Layer;

/// Top-level Strata configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with `STRATA_*`
/// environment variable overrides. All sections default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StrataConfig {
    /// Process-level settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// External embedding and LLM provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chunker settings.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding pipeline settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Hierarchical retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Fact learning settings.
    #[serde(default)]
    pub learning: LearningConfig,
}

/// Process-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// External provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// API key for both provider endpoints. `None` requires an env override.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Embedding service endpoint URL.
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,

    /// Embedding model identifier.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Vector dimensionality requested from the embedding provider.
    /// Fixed per provider version; all stored vectors share it.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Generative LLM endpoint URL (fact extraction only).
    #[serde(default = "default_completion_url")]
    pub completion_url: String,

    /// Model used for fact extraction.
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,

    /// Max generated tokens per extraction call.
    #[serde(default = "default_extraction_max_tokens")]
    pub extraction_max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            dimensions: default_dimensions(),
            completion_url: default_completion_url(),
            extraction_model: default_extraction_model(),
            extraction_max_tokens: default_extraction_max_tokens(),
        }
    }
}

fn default_embedding_url() -> String {
    "https://api.example.com/v1/embeddings".to_string()
}

fn default_embedding_model() -> String {
    "titan-embed-text-v2".to_string()
}

fn default_dimensions() -> usize {
    768
}

fn default_completion_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_extraction_model() -> String {
    "claude-haiku-4-5-20250901".to_string()
}

fn default_extraction_max_tokens() -> u32 {
    2048
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("strata").join("strata.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("strata.db"))
        .to_string_lossy()
        .into_owned()
}

/// Chunker configuration. Layer tier boundaries are fixed in code; only
/// the cross-tier knobs live here.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkingConfig {
    /// Characters carried from the tail of one chunk into the head of
    /// the next.
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,

    /// Minimum message count baseline. Conversations with fewer than
    /// twice this many messages are emitted as a single chunk per layer.
    #[serde(default = "default_min_messages")]
    pub min_messages: usize,

    /// Days within which a conversation's chunks are flagged recent.
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: i64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            overlap_chars: default_overlap_chars(),
            min_messages: default_min_messages(),
            recent_window_days: default_recent_window_days(),
        }
    }
}

fn default_overlap_chars() -> usize {
    200
}

fn default_min_messages() -> usize {
    3
}

fn default_recent_window_days() -> i64 {
    30
}

/// Embedding pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Texts per provider batch call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Total attempts per batch before it is marked pending-retry.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds; doubles per attempt with jitter.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Batches embedded concurrently during ingestion.
    #[serde(default = "default_max_parallel_batches")]
    pub max_parallel_batches: usize,

    /// Per-text character cap before embedding (provider input limit).
    #[serde(default = "default_max_chars_per_text")]
    pub max_chars_per_text: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_parallel_batches: default_max_parallel_batches(),
            max_chars_per_text: default_max_chars_per_text(),
        }
    }
}

fn default_batch_size() -> usize {
    96
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_backoff_ms() -> u64 {
    250
}

fn default_max_parallel_batches() -> usize {
    4
}

fn default_max_chars_per_text() -> usize {
    8000
}

/// Hierarchical retrieval configuration.
///
/// The per-layer thresholds and caps are empirically tuned for one
/// embedding model; they are configuration, not fixed law, and should be
/// re-tuned when the provider changes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Broad topical pass: loose threshold, small cap.
    #[serde(default = "default_macro_threshold")]
    pub macro_threshold: f32,
    #[serde(default = "default_macro_limit")]
    pub macro_limit: usize,

    /// Mid pass.
    #[serde(default = "default_theme_threshold")]
    pub theme_threshold: f32,
    #[serde(default = "default_theme_limit")]
    pub theme_limit: usize,

    /// Precise fact-level pass: tight threshold, largest cap.
    #[serde(default = "default_micro_threshold")]
    pub micro_threshold: f32,
    #[serde(default = "default_micro_limit")]
    pub micro_limit: usize,

    /// Learned-fact search.
    #[serde(default = "default_fact_threshold")]
    pub fact_threshold: f32,
    #[serde(default = "default_fact_limit")]
    pub fact_limit: usize,

    /// Below this combined chunk count, an unfiltered all-layer pass runs.
    #[serde(default = "default_floor_min_results")]
    pub floor_min_results: usize,

    /// Per-layer search timeout in milliseconds.
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,

    /// Aggregate retrieval timeout in milliseconds; past it, the call
    /// short-circuits to the recency fallback.
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,
}

/// One chunk stage of the retrieval cascade.
#[derive(Debug, Clone, Copy)]
pub struct CascadeStage {
    pub layer: Layer,
    pub threshold: f32,
    pub limit: usize,
}

impl RetrievalConfig {
    /// The chunk cascade, coarse to fine. Coarser stages run looser
    /// thresholds with smaller caps; finer stages the reverse.
    pub fn cascade(&self) -> [CascadeStage; 3] {
        [
            CascadeStage {
                layer: Layer::Macro,
                threshold: self.macro_threshold,
                limit: self.macro_limit,
            },
            CascadeStage {
                layer: Layer::Theme,
                threshold: self.theme_threshold,
                limit: self.theme_limit,
            },
            CascadeStage {
                layer: Layer::Micro,
                threshold: self.micro_threshold,
                limit: self.micro_limit,
            },
        ]
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            macro_threshold: default_macro_threshold(),
            macro_limit: default_macro_limit(),
            theme_threshold: default_theme_threshold(),
            theme_limit: default_theme_limit(),
            micro_threshold: default_micro_threshold(),
            micro_limit: default_micro_limit(),
            fact_threshold: default_fact_threshold(),
            fact_limit: default_fact_limit(),
            floor_min_results: default_floor_min_results(),
            stage_timeout_ms: default_stage_timeout_ms(),
            total_timeout_ms: default_total_timeout_ms(),
        }
    }
}

fn default_macro_threshold() -> f32 {
    0.25
}

fn default_macro_limit() -> usize {
    2
}

fn default_theme_threshold() -> f32 {
    0.35
}

fn default_theme_limit() -> usize {
    3
}

fn default_micro_threshold() -> f32 {
    0.45
}

fn default_micro_limit() -> usize {
    4
}

fn default_fact_threshold() -> f32 {
    0.40
}

fn default_fact_limit() -> usize {
    10
}

fn default_floor_min_results() -> usize {
    3
}

fn default_stage_timeout_ms() -> u64 {
    2000
}

fn default_total_timeout_ms() -> u64 {
    5000
}

/// Fact learning configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LearningConfig {
    /// Enable post-turn fact extraction.
    #[serde(default = "default_learning_enabled")]
    pub enabled: bool,

    /// Candidates below this confidence are discarded, not stored.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: default_learning_enabled(),
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_learning_enabled() -> bool {
    true
}

fn default_min_confidence() -> f64 {
    0.7
}
