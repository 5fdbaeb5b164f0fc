// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed persistence for chunks and learned facts.
//!
//! Embeddings live in BLOB columns next to their rows; similarity search
//! is a user-scoped brute-force cosine scan, which is fast enough at
//! per-user corpus sizes.

pub mod schema;
pub mod store;
pub mod vector;

pub use store::SqliteChunkStore;
pub use vector::{blob_to_vec, cosine_similarity, vec_to_blob};
