// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common domain types used across the Strata workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for the user who owns stored memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a source conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message in a conversation export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One message from a conversation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    /// ISO 8601 timestamp from the export. Kept as a string; sorting and
    /// recency checks rely on ISO ordering.
    pub timestamp: String,
}

/// An ordered conversation from a user's history export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
}

/// Granularity tier of a stored chunk, ordered from finest to coarsest.
///
/// The tier boundaries are fixed; a chunk's layer is determined solely by
/// which tier it was produced for, never re-derived from content.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Micro,
    Flow,
    Theme,
    Narrative,
    Macro,
}

impl Layer {
    /// All layers, finest first.
    pub const ALL: [Layer; 5] = [
        Layer::Micro,
        Layer::Flow,
        Layer::Theme,
        Layer::Narrative,
        Layer::Macro,
    ];

    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Micro => "micro",
            Layer::Flow => "flow",
            Layer::Theme => "theme",
            Layer::Narrative => "narrative",
            Layer::Macro => "macro",
        }
    }

    /// Parse from SQLite string. Unknown values map to the coarsest tier
    /// rather than failing a whole result set.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "micro" => Layer::Micro,
            "flow" => Layer::Flow,
            "theme" => Layer::Theme,
            "narrative" => Layer::Narrative,
            _ => Layer::Macro,
        }
    }

    /// Ranking weight applied to similarity scores when merging layers.
    /// Finer layers carry more weight: a precise match beats a topical one.
    pub fn weight(&self) -> f32 {
        match self {
            Layer::Micro => 1.0,
            Layer::Flow => 0.9,
            Layer::Theme => 0.8,
            Layer::Narrative => 0.7,
            Layer::Macro => 0.6,
        }
    }
}

/// A stored unit of conversational text with its embedding and layer tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic identifier derived from (conversation id, layer, index).
    pub id: String,
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub layer: Layer,
    pub content: String,
    /// `None` when the embedding batch failed and is pending retry; such
    /// chunks are stored but excluded from vector search.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// Number of whole messages covered by this chunk (overlap excluded).
    pub message_count: u32,
    /// Part number within the conversation, 1-based. `None` for
    /// single-chunk conversations.
    pub part_index: Option<u32>,
    pub part_total: Option<u32>,
    pub is_recent: bool,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

/// Category of a learned fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FactCategory {
    Preference,
    Relationship,
    Milestone,
    Belief,
    Decision,
    Event,
}

/// Lifecycle status of a learned fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactStatus {
    /// Available for retrieval and synthesis.
    Active,
    /// Excluded from retrieval but retained for audit.
    Retracted,
}

impl FactStatus {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            FactStatus::Active => "active",
            FactStatus::Retracted => "retracted",
        }
    }

    /// Parse from SQLite string.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "retracted" => FactStatus::Retracted,
            _ => FactStatus::Active,
        }
    }
}

/// An atomic, confidence-scored durable statement about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedFact {
    pub id: String,
    pub user_id: UserId,
    pub category: FactCategory,
    pub fact: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    /// In [0, 1]. Facts below the configured threshold are never persisted.
    pub confidence: f64,
    pub status: FactStatus,
    pub created_at: String,
}

/// Whether a text will be stored as a document or used as a search query.
///
/// The two kinds may use different provider-side instructions but share
/// one vector space, so document/query similarities stay comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Document,
    Query,
}

impl EmbedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedKind::Document => "document",
            EmbedKind::Query => "query",
        }
    }
}

/// Token usage reported by a generative provider call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One retrieved chunk or fact with its similarity score. Ephemeral,
/// never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub id: String,
    pub content: String,
    /// Cosine similarity in the provider's vector space. Zero on the
    /// recency fallback path, where no embedding comparison happened.
    pub score: f32,
    /// `Some` for chunk results, `None` for fact results.
    pub layer: Option<Layer>,
    pub created_at: String,
}

/// Response of a context retrieval: chunks and facts as separate
/// collections, never interleaved.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievedContext {
    pub chunks: Vec<RetrievalResult>,
    pub facts: Vec<RetrievalResult>,
    /// True when the semantic path failed and recency fallback was used.
    /// Internal telemetry only; the response shape is identical.
    pub degraded: bool,
}

/// Status of a tracked background task (ingestion run, post-turn learning).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn layer_roundtrip_and_order() {
        for layer in Layer::ALL {
            assert_eq!(Layer::from_str_value(layer.as_str()), layer);
            assert_eq!(Layer::from_str(layer.as_str()).unwrap(), layer);
        }
        assert!(Layer::Micro < Layer::Macro);
    }

    #[test]
    fn layer_weights_favor_finer_tiers() {
        let weights: Vec<f32> = Layer::ALL.iter().map(|l| l.weight()).collect();
        for pair in weights.windows(2) {
            assert!(pair[0] > pair[1], "weights must strictly decrease: {weights:?}");
        }
    }

    #[test]
    fn fact_status_roundtrip() {
        assert_eq!(FactStatus::from_str_value("active"), FactStatus::Active);
        assert_eq!(FactStatus::from_str_value("retracted"), FactStatus::Retracted);
        assert_eq!(FactStatus::from_str_value("garbage"), FactStatus::Active);
    }

    #[test]
    fn fact_category_parses_lowercase() {
        assert_eq!(FactCategory::from_str("preference").unwrap(), FactCategory::Preference);
        assert_eq!(FactCategory::from_str("milestone").unwrap(), FactCategory::Milestone);
        assert!(FactCategory::from_str("opinion").is_err());
    }

    #[test]
    fn message_deserializes_from_export_shape() {
        let json = r#"{"role": "user", "text": "hello", "timestamp": "2025-06-01T10:00:00Z"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn embed_kind_strings() {
        assert_eq!(EmbedKind::Document.as_str(), "document");
        assert_eq!(EmbedKind::Query.as_str(), "query");
    }
}
