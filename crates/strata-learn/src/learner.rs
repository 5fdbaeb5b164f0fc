// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based fact extraction with confidence gating.

use std::sync::Arc;

use serde::Deserialize;
use strata_core::{
    ChunkIndex, CompletionBackend, FactCategory, FactStatus, LearnedFact, UserId,
};
use strata_cost::CostAccumulator;
use strata_embed::EmbeddingPipeline;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prompt for durable-fact extraction.
const EXTRACTION_PROMPT: &str = r#"Extract durable facts about the user from this conversation. Output as JSON array.

For each fact:
- "fact": The fact as a standalone statement (e.g., "The user's sister is named Dana")
- "category": One of: preference, relationship, milestone, belief, decision, event
- "confidence": How certain the conversation supports this fact, 0.0 to 1.0

Only include facts that are:
1. About the user, stated or clearly implied by the user
2. Durable (still true weeks later, not transient context)
3. Specific enough to be useful in future conversations

If no durable facts, return an empty array: []

Conversation:
{conversation}

Output JSON array only, no explanation:"#;

/// One candidate from the extraction model, before gating.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedCandidate {
    pub fact: String,
    pub category: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Extracts facts from conversation text and persists the confident ones.
#[derive(Clone)]
pub struct FactLearner {
    completion: Arc<dyn CompletionBackend>,
    pipeline: EmbeddingPipeline,
    index: Arc<dyn ChunkIndex>,
    min_confidence: f64,
}

impl FactLearner {
    pub fn new(
        completion: Arc<dyn CompletionBackend>,
        pipeline: EmbeddingPipeline,
        index: Arc<dyn ChunkIndex>,
        min_confidence: f64,
    ) -> Self {
        Self {
            completion,
            pipeline,
            index,
            min_confidence,
        }
    }

    /// Extracts and stores facts from one conversation.
    ///
    /// Learning is a background enrichment: any failure is logged and
    /// yields zero facts, never an error surfaced to the caller. Returns
    /// the facts that were persisted.
    pub async fn learn(
        &self,
        user_id: &UserId,
        conversation_text: &str,
        costs: &CostAccumulator,
    ) -> Vec<LearnedFact> {
        let prompt = EXTRACTION_PROMPT.replace("{conversation}", conversation_text);

        let completion = match self.completion.complete(&prompt).await {
            Ok(completion) => completion,
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "fact extraction call failed");
                return Vec::new();
            }
        };
        costs.record_generation_call(
            completion.usage.input_tokens,
            completion.usage.output_tokens,
        );

        let candidates = parse_extraction_response(&completion.text);
        let gated = gate_candidates(candidates, self.min_confidence);
        if gated.is_empty() {
            debug!(user_id = %user_id, "no facts passed the confidence gate");
            return Vec::new();
        }

        let texts: Vec<String> = gated.iter().map(|(_, fact, _)| fact.clone()).collect();
        let outcome = self.pipeline.embed_documents(&texts, costs).await;

        let created_at = chrono::Utc::now().to_rfc3339();
        let mut facts = Vec::with_capacity(gated.len());
        for ((category, fact, confidence), embedding) in
            gated.into_iter().zip(outcome.embeddings)
        {
            match embedding {
                Some(embedding) => facts.push(LearnedFact {
                    id: Uuid::new_v4().to_string(),
                    user_id: user_id.clone(),
                    category,
                    fact,
                    embedding,
                    confidence,
                    status: FactStatus::Active,
                    created_at: created_at.clone(),
                }),
                None => {
                    // A fact without a vector is unreachable by search;
                    // drop it rather than storing dead weight.
                    warn!(user_id = %user_id, fact = %fact, "dropping fact whose embedding failed");
                }
            }
        }

        if facts.is_empty() {
            return Vec::new();
        }
        if let Err(err) = self.index.upsert_facts(&facts).await {
            warn!(user_id = %user_id, error = %err, "failed to persist learned facts");
            return Vec::new();
        }
        metrics::counter!("strata_facts_learned_total").increment(facts.len() as u64);
        debug!(user_id = %user_id, stored = facts.len(), "fact learning complete");
        facts
    }
}

/// Pulls the JSON array out of a model response that may be wrapped in a
/// markdown fence or surrounding prose.
pub fn parse_extraction_response(response: &str) -> Vec<ExtractedCandidate> {
    let trimmed = response.trim();
    let start = trimmed.find('[').unwrap_or(0);
    let end = trimmed.rfind(']').map(|i| i + 1).unwrap_or(trimmed.len());
    let json_str = &trimmed[start..end];

    match serde_json::from_str::<Vec<ExtractedCandidate>>(json_str) {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!("failed to parse extraction response: {err}");
            debug!("raw response: {response}");
            Vec::new()
        }
    }
}

/// Applies the confidence gate and category validation.
///
/// Candidates with an unknown category or empty text are skipped with a
/// warning; one malformed candidate never sinks the rest.
pub fn gate_candidates(
    candidates: Vec<ExtractedCandidate>,
    min_confidence: f64,
) -> Vec<(FactCategory, String, f64)> {
    candidates
        .into_iter()
        .filter_map(|candidate| {
            let fact = candidate.fact.trim().to_owned();
            if fact.is_empty() {
                return None;
            }
            if candidate.confidence < min_confidence {
                debug!(
                    fact = %fact,
                    confidence = candidate.confidence,
                    "candidate below confidence gate"
                );
                return None;
            }
            match candidate.category.trim().to_lowercase().parse::<FactCategory>() {
                Ok(category) => Some((category, fact, candidate.confidence)),
                Err(_) => {
                    warn!(
                        fact = %fact,
                        category = %candidate.category,
                        "skipping fact with unknown category"
                    );
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use strata_core::{
        Chunk, Completion, EmbedKind, EmbeddingBackend, RetrievalResult, SearchRequest,
        StrataError, TokenUsage,
    };

    struct CannedCompletion {
        response: Result<(String, u64, u64), String>,
    }

    #[async_trait]
    impl CompletionBackend for CannedCompletion {
        async fn complete(&self, _prompt: &str) -> Result<Completion, StrataError> {
            match &self.response {
                Ok((text, input, output)) => Ok(Completion {
                    text: text.clone(),
                    usage: TokenUsage {
                        input_tokens: *input,
                        output_tokens: *output,
                    },
                }),
                Err(message) => Err(StrataError::Provider {
                    message: message.clone(),
                    source: None,
                }),
            }
        }
    }

    struct UnitBackend;

    #[async_trait]
    impl EmbeddingBackend for UnitBackend {
        async fn embed_batch(
            &self,
            texts: &[String],
            _kind: EmbedKind,
        ) -> Result<Vec<Vec<f32>>, StrataError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct BrokenBackend;

    #[async_trait]
    impl EmbeddingBackend for BrokenBackend {
        async fn embed_batch(
            &self,
            _texts: &[String],
            _kind: EmbedKind,
        ) -> Result<Vec<Vec<f32>>, StrataError> {
            Err(StrataError::Internal("embedder down".into()))
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[derive(Default)]
    struct CapturingIndex {
        facts: Mutex<Vec<LearnedFact>>,
    }

    #[async_trait]
    impl ChunkIndex for CapturingIndex {
        async fn upsert_chunks(&self, _chunks: &[Chunk]) -> Result<(), StrataError> {
            Ok(())
        }

        async fn upsert_facts(&self, facts: &[LearnedFact]) -> Result<(), StrataError> {
            self.facts.lock().unwrap().extend_from_slice(facts);
            Ok(())
        }

        async fn search(
            &self,
            _request: SearchRequest,
        ) -> Result<Vec<RetrievalResult>, StrataError> {
            Ok(Vec::new())
        }

        async fn recent_chunks(
            &self,
            _user_id: &UserId,
            _limit: usize,
        ) -> Result<Vec<RetrievalResult>, StrataError> {
            Ok(Vec::new())
        }

        async fn active_facts(&self, user_id: &UserId) -> Result<Vec<LearnedFact>, StrataError> {
            Ok(self
                .facts
                .lock()
                .unwrap()
                .iter()
                .filter(|f| &f.user_id == user_id)
                .cloned()
                .collect())
        }
    }

    fn learner(
        completion: CannedCompletion,
        backend: Arc<dyn EmbeddingBackend>,
        index: Arc<CapturingIndex>,
    ) -> FactLearner {
        let pipeline = EmbeddingPipeline::new(backend, 96, 1, Duration::ZERO, 1, 8000);
        FactLearner::new(Arc::new(completion), pipeline, index, 0.7)
    }

    fn user() -> UserId {
        UserId("u1".to_string())
    }

    const FENCED_RESPONSE: &str = "```json\n[\n  {\"fact\": \"The user's sister is named Dana\", \"category\": \"relationship\", \"confidence\": 0.95},\n  {\"fact\": \"The user is considering a move to Lisbon\", \"category\": \"decision\", \"confidence\": 0.5},\n  {\"fact\": \"The user dislikes early meetings\", \"category\": \"preference\", \"confidence\": 0.8}\n]\n```";

    #[tokio::test]
    async fn stores_only_confident_facts() {
        let index = Arc::new(CapturingIndex::default());
        let costs = CostAccumulator::default();
        let stored = learner(
            CannedCompletion {
                response: Ok((FENCED_RESPONSE.to_string(), 300, 90)),
            },
            Arc::new(UnitBackend),
            index.clone(),
        )
        .learn(&user(), "conversation text", &costs)
        .await;

        assert_eq!(stored.len(), 2);
        let facts = index.facts.lock().unwrap();
        // What comes back is exactly what was persisted.
        let returned: Vec<&str> = stored.iter().map(|f| f.id.as_str()).collect();
        let persisted: Vec<&str> = facts.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(returned, persisted);
        assert!(facts.iter().all(|f| f.confidence >= 0.7));
        assert!(facts.iter().any(|f| f.category == FactCategory::Relationship));
        assert!(facts.iter().all(|f| f.status == FactStatus::Active));
        assert!(facts.iter().all(|f| !f.embedding.is_empty()));
    }

    #[tokio::test]
    async fn extraction_usage_is_billed() {
        let index = Arc::new(CapturingIndex::default());
        let costs = CostAccumulator::default();
        learner(
            CannedCompletion {
                response: Ok((FENCED_RESPONSE.to_string(), 300, 90)),
            },
            Arc::new(UnitBackend),
            index,
        )
        .learn(&user(), "conversation text", &costs)
        .await;

        let summary = costs.summary(&strata_cost::PriceTable::default());
        assert_eq!(summary.llm_input_tokens, 300);
        assert_eq!(summary.llm_output_tokens, 90);
        assert_eq!(summary.llm_call_count, 1);
        assert!(summary.embedding_call_count >= 1);
    }

    #[tokio::test]
    async fn extraction_failure_is_non_fatal() {
        let index = Arc::new(CapturingIndex::default());
        let costs = CostAccumulator::default();
        let stored = learner(
            CannedCompletion {
                response: Err("model overloaded".to_string()),
            },
            Arc::new(UnitBackend),
            index.clone(),
        )
        .learn(&user(), "conversation text", &costs)
        .await;

        assert!(stored.is_empty());
        assert!(index.facts.lock().unwrap().is_empty());
        assert_eq!(
            costs
                .summary(&strata_cost::PriceTable::default())
                .llm_call_count,
            0
        );
    }

    #[tokio::test]
    async fn garbage_response_yields_zero_facts() {
        let index = Arc::new(CapturingIndex::default());
        let stored = learner(
            CannedCompletion {
                response: Ok(("I could not find any facts, sorry!".to_string(), 50, 10)),
            },
            Arc::new(UnitBackend),
            index.clone(),
        )
        .learn(&user(), "text", &CostAccumulator::default())
        .await;
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_drops_the_facts() {
        let index = Arc::new(CapturingIndex::default());
        let stored = learner(
            CannedCompletion {
                response: Ok((FENCED_RESPONSE.to_string(), 300, 90)),
            },
            Arc::new(BrokenBackend),
            index.clone(),
        )
        .learn(&user(), "text", &CostAccumulator::default())
        .await;

        assert!(stored.is_empty());
        assert!(index.facts.lock().unwrap().is_empty());
    }

    #[test]
    fn parses_a_bare_array() {
        let candidates =
            parse_extraction_response("[{\"fact\": \"x\", \"category\": \"event\", \"confidence\": 0.9}]");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].fact, "x");
    }

    #[test]
    fn parses_an_array_with_surrounding_prose() {
        let candidates = parse_extraction_response(
            "Here you go:\n[{\"fact\": \"x\", \"category\": \"event\", \"confidence\": 0.9}]\nHope that helps.",
        );
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn empty_array_is_fine() {
        assert!(parse_extraction_response("[]").is_empty());
        assert!(parse_extraction_response("```json\n[]\n```").is_empty());
    }

    #[test]
    fn unknown_categories_are_skipped_not_fatal() {
        let gated = gate_candidates(
            vec![
                ExtractedCandidate {
                    fact: "a".into(),
                    category: "astrology".into(),
                    confidence: 0.9,
                },
                ExtractedCandidate {
                    fact: "b".into(),
                    category: "belief".into(),
                    confidence: 0.9,
                },
            ],
            0.7,
        );
        assert_eq!(gated.len(), 1);
        assert_eq!(gated[0].0, FactCategory::Belief);
    }

    proptest! {
        /// No candidate below the gate ever survives, whatever the model
        /// hands back.
        #[test]
        fn gate_is_airtight(confidences in proptest::collection::vec(0.0f64..1.0, 0..20)) {
            let candidates: Vec<ExtractedCandidate> = confidences
                .iter()
                .map(|&confidence| ExtractedCandidate {
                    fact: "some fact".into(),
                    category: "event".into(),
                    confidence,
                })
                .collect();
            let gated = gate_candidates(candidates, 0.7);
            prop_assert!(gated.iter().all(|(_, _, confidence)| *confidence >= 0.7));
            let expected = confidences.iter().filter(|&&c| c >= 0.7).count();
            prop_assert_eq!(gated.len(), expected);
        }
    }
}
