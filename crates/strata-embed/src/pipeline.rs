// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The embedding pipeline: batching, truncation, retry, and cost.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use rand::Rng;
use strata_core::{EmbedKind, EmbeddingBackend, StrataError};
use strata_cost::{estimate_tokens, CostAccumulator};
use tracing::{debug, warn};

/// Result of embedding a document set.
///
/// `embeddings[i]` is `None` when text `i` belonged to a batch that failed
/// after all retries. Callers persist such records without a vector and
/// re-embed them later.
#[derive(Debug)]
pub struct BatchOutcome {
    pub embeddings: Vec<Option<Vec<f32>>>,
    pub failed_batches: usize,
}

/// Batched front-end over a raw [`EmbeddingBackend`].
#[derive(Clone)]
pub struct EmbeddingPipeline {
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
    max_attempts: u32,
    base_backoff: Duration,
    max_parallel_batches: usize,
    max_chars: usize,
}

impl EmbeddingPipeline {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        batch_size: usize,
        max_attempts: u32,
        base_backoff: Duration,
        max_parallel_batches: usize,
        max_chars: usize,
    ) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
            max_attempts: max_attempts.max(1),
            base_backoff,
            max_parallel_batches: max_parallel_batches.max(1),
            max_chars,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.backend.dimensions()
    }

    /// Embeds a document set, batch by batch with bounded concurrency.
    ///
    /// Never fails as a whole: output order matches input order, with
    /// `None` in place of every text whose batch exhausted its retries.
    pub async fn embed_documents(
        &self,
        texts: &[String],
        costs: &CostAccumulator,
    ) -> BatchOutcome {
        if texts.is_empty() {
            return BatchOutcome {
                embeddings: Vec::new(),
                failed_batches: 0,
            };
        }

        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_chars(t, self.max_chars))
            .collect();
        let total_texts = truncated.len();
        // Each future owns its batch; a borrowed slice here would pin the
        // whole stream to this stack frame and keep callers from spawning
        // the work onto a runtime task.
        let batches: Vec<Vec<String>> = truncated
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();
        let total_batches = batches.len();

        let results: Vec<(usize, Option<Vec<Vec<f32>>>)> = stream::iter(batches)
            .map(|batch| async move {
                let len = batch.len();
                let outcome = self
                    .embed_with_retry(&batch, EmbedKind::Document, costs)
                    .await;
                (len, outcome.ok())
            })
            .buffered(self.max_parallel_batches)
            .collect()
            .await;

        let mut embeddings = Vec::with_capacity(total_texts);
        let mut failed_batches = 0;
        for (batch_len, vectors) in results {
            match vectors {
                Some(vectors) => embeddings.extend(vectors.into_iter().map(Some)),
                None => {
                    failed_batches += 1;
                    embeddings.extend(std::iter::repeat_with(|| None).take(batch_len));
                }
            }
        }

        debug!(
            texts = total_texts,
            batches = total_batches,
            failed_batches,
            "document embedding finished"
        );
        BatchOutcome {
            embeddings,
            failed_batches,
        }
    }

    /// Embeds a single query string. All-or-nothing.
    pub async fn embed_query(
        &self,
        text: &str,
        costs: &CostAccumulator,
    ) -> Result<Vec<f32>, StrataError> {
        let truncated = truncate_chars(text, self.max_chars);
        let mut vectors = self
            .embed_with_retry(std::slice::from_ref(&truncated), EmbedKind::Query, costs)
            .await?;
        vectors.pop().ok_or_else(|| StrataError::Provider {
            message: "embedding provider returned no vector for query".into(),
            source: None,
        })
    }

    /// One batch through the backend, retrying transient failures with
    /// exponential backoff and jitter. Cost is recorded per attempt: the
    /// provider bills retried input again.
    async fn embed_with_retry(
        &self,
        batch: &[String],
        kind: EmbedKind,
        costs: &CostAccumulator,
    ) -> Result<Vec<Vec<f32>>, StrataError> {
        let batch_tokens: u64 = batch.iter().map(|t| estimate_tokens(t)).sum();
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(self.base_backoff, attempt - 1)).await;
            }
            costs.record_embedding_call(batch_tokens);
            match self.backend.embed_batch(batch, kind).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    warn!(attempt, error = %err, "transient embedding failure, will retry");
                    last_error = Some(err);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "embedding batch failed");
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| StrataError::Provider {
            message: "embedding batch failed after retries".into(),
            source: None,
        }))
    }
}

/// Exponential backoff with jitter: `base * 2^attempt` plus up to half of
/// `base` at random, so concurrent batches do not retry in lockstep.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt));
    let half_ms = base.as_millis() as u64 / 2;
    let jitter = if half_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=half_ms)
    };
    exp + Duration::from_millis(jitter)
}

/// Truncates to at most `max_chars` characters, on a char boundary.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => s[..i].to_owned(),
        None => s.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strata_cost::PriceTable;

    /// Fails the first `fail_first` calls with a transient error, then
    /// returns unit vectors.
    struct FlakyBackend {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl EmbeddingBackend for FlakyBackend {
        async fn embed_batch(
            &self,
            texts: &[String],
            _kind: EmbedKind,
        ) -> Result<Vec<Vec<f32>>, StrataError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(StrataError::Provider {
                    message: "rate limited".into(),
                    source: None,
                });
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct PermanentFailBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingBackend for PermanentFailBackend {
        async fn embed_batch(
            &self,
            _texts: &[String],
            _kind: EmbedKind,
        ) -> Result<Vec<Vec<f32>>, StrataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StrataError::Internal("bad request".into()))
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn pipeline(backend: Arc<dyn EmbeddingBackend>, batch_size: usize) -> EmbeddingPipeline {
        EmbeddingPipeline::new(backend, batch_size, 4, Duration::ZERO, 4, 8000)
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text number {i}")).collect()
    }

    #[tokio::test]
    async fn recovers_from_transient_failures() {
        let backend = Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        });
        let costs = CostAccumulator::default();
        let outcome = pipeline(backend.clone(), 10)
            .embed_documents(&texts(3), &costs)
            .await;

        assert_eq!(outcome.failed_batches, 0);
        assert!(outcome.embeddings.iter().all(Option::is_some));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        // Every attempt was billed, not just the one that succeeded.
        let summary = costs.summary(&PriceTable::default());
        assert_eq!(summary.embedding_call_count, 3);
    }

    #[tokio::test]
    async fn exhausted_retries_leave_none_markers() {
        let backend = Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
        });
        let costs = CostAccumulator::default();
        let input = texts(5);
        let outcome = pipeline(backend, 2).embed_documents(&input, &costs).await;

        assert_eq!(outcome.embeddings.len(), 5);
        assert_eq!(outcome.failed_batches, 3);
        assert!(outcome.embeddings.iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn one_flaky_batch_does_not_sink_the_others() {
        // Batch size 2 over 4 texts: two batches, one needs a retry.
        let backend = Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
            fail_first: 1,
        });
        let costs = CostAccumulator::default();
        let outcome = pipeline(backend, 2).embed_documents(&texts(4), &costs).await;
        assert_eq!(outcome.failed_batches, 0);
        assert_eq!(outcome.embeddings.len(), 4);
    }

    #[tokio::test]
    async fn document_embedding_runs_on_a_spawned_task() {
        // Background learning hands this work to tokio::spawn, so the
        // whole future must be Send and self-contained.
        let backend = Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let pipeline = pipeline(backend, 2);
        let handle = tokio::spawn(async move {
            let costs = CostAccumulator::default();
            pipeline.embed_documents(&texts(5), &costs).await
        });
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.embeddings.len(), 5);
        assert!(outcome.embeddings.iter().all(Option::is_some));
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let backend = Arc::new(PermanentFailBackend {
            calls: AtomicUsize::new(0),
        });
        let costs = CostAccumulator::default();
        let outcome = pipeline(backend.clone(), 10)
            .embed_documents(&texts(2), &costs)
            .await;
        assert_eq!(outcome.failed_batches, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn query_embedding_surfaces_exhaustion() {
        let backend = Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
        });
        let costs = CostAccumulator::default();
        let err = pipeline(backend, 10)
            .embed_query("what did we plan?", &costs)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn query_embedding_succeeds() {
        let backend = Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let costs = CostAccumulator::default();
        let vector = pipeline(backend, 10)
            .embed_query("what did we plan?", &costs)
            .await
            .unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn backoff_grows_exponentially() {
        let base = Duration::from_millis(100);
        let d0 = backoff_delay(base, 0);
        let d2 = backoff_delay(base, 2);
        assert!(d0 >= Duration::from_millis(100) && d0 <= Duration::from_millis(150));
        assert!(d2 >= Duration::from_millis(400) && d2 <= Duration::from_millis(450));
    }
}
