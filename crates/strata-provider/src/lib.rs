// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP adapters for the two external providers: the embedding service and
//! the generative LLM used for fact extraction. Both implement the
//! corresponding `strata-core` traits, so everything above them is tested
//! against in-process fakes.

pub mod completion;
pub mod embedding;
pub mod retry;

pub use completion::HttpCompletionClient;
pub use embedding::HttpEmbeddingClient;
pub use retry::{is_transient_status, status_error};
