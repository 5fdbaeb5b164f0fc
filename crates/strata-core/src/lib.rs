// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Strata memory engine.
//!
//! Provides the error type, shared domain types (users, conversations,
//! chunks, learned facts, retrieval results), and the adapter traits at
//! the seams to external services (embedding provider, generative LLM,
//! vector index).

pub mod error;
pub mod traits;
pub mod types;

pub use error::StrataError;
pub use traits::{
    ChunkIndex, Completion, CompletionBackend, EmbeddingBackend, SearchKind, SearchRequest,
};
pub use types::{
    Chunk, Conversation, ConversationId, EmbedKind, FactCategory, FactStatus, Layer, LearnedFact,
    Message, RetrievalResult, RetrievedContext, Role, TaskStatus, TokenUsage, UserId,
};
