// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background fact learning.
//!
//! After ingestion or a conversation turn, the learner asks the generative
//! model for durable facts about the user, gates them by confidence, embeds
//! the survivors, and persists them as searchable records. The whole path
//! is best-effort: extraction failure costs the new facts, never the run.

pub mod learner;

pub use learner::{gate_candidates, parse_extraction_response, ExtractedCandidate, FactLearner};
