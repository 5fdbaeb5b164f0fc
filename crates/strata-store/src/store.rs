// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed implementation of the [`ChunkIndex`] trait.
//!
//! Similarity search is a brute-force cosine scan over the owner's rows,
//! run inside the connection's blocking closure so row blobs never cross
//! the async boundary. Every query is scoped by `user_id` in SQL, and the
//! results are checked again after the scan; a cross-user row aborts the
//! whole call rather than leaking.

use std::path::Path;

use async_trait::async_trait;
use strata_core::{
    Chunk, ChunkIndex, FactCategory, FactStatus, Layer, LearnedFact, RetrievalResult, SearchKind,
    SearchRequest, StrataError, UserId,
};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::schema::SCHEMA;
use crate::vector::{blob_to_vec, cosine_similarity, vec_to_blob};

/// Converts tokio_rusqlite errors into StrataError::Storage.
fn storage_err(e: tokio_rusqlite::Error) -> StrataError {
    StrataError::Storage {
        source: Box::new(e),
    }
}

/// `Connection::open` surfaces the raw rusqlite error, not the wrapper.
fn open_err(e: rusqlite::Error) -> StrataError {
    StrataError::Storage {
        source: Box::new(e),
    }
}

/// A scored row still carrying its owner, for the post-scan scope check.
struct ScopedResult {
    owner: String,
    result: RetrievalResult,
}

fn check_scope(
    rows: Vec<ScopedResult>,
    user_id: &UserId,
) -> Result<Vec<RetrievalResult>, StrataError> {
    rows.into_iter()
        .map(|row| {
            if row.owner == user_id.0 {
                Ok(row.result)
            } else {
                Err(StrataError::Internal(format!(
                    "query for user {user_id} returned a row owned by another user"
                )))
            }
        })
        .collect()
}

/// Persistent store for chunks and learned facts.
pub struct SqliteChunkStore {
    conn: Connection,
}

impl SqliteChunkStore {
    /// Opens (creating if needed) the database at `path` and applies the
    /// schema.
    pub async fn open(path: &Path) -> Result<Self, StrataError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StrataError::Storage {
                source: Box::new(e),
            })?;
        }
        let conn = Connection::open(path).await.map_err(open_err)?;
        Self::init(conn).await
    }

    /// In-memory database, for tests.
    pub async fn open_in_memory() -> Result<Self, StrataError> {
        let conn = Connection::open_in_memory().await.map_err(open_err)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StrataError> {
        conn.call(move |conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(storage_err)?;
        Ok(Self { conn })
    }

    /// Chunks stored without an embedding, oldest first, for re-embedding.
    pub async fn chunks_missing_embeddings(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<(String, String)>, StrataError> {
        let user = user_id.0.clone();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, content FROM chunks
                     WHERE user_id = ?1 AND embedding IS NULL
                     ORDER BY created_at ASC LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![user, limit as i64], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)
    }

    /// Attaches an embedding to a previously stored chunk.
    pub async fn update_chunk_embedding(
        &self,
        chunk_id: &str,
        embedding: &[f32],
    ) -> Result<(), StrataError> {
        let id = chunk_id.to_string();
        let blob = vec_to_blob(embedding);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE chunks SET embedding = ?1 WHERE id = ?2",
                    rusqlite::params![blob, id],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Marks a fact retracted. Returns false when no active fact matched.
    /// The row is kept for audit; retraction never deletes.
    pub async fn retract_fact(
        &self,
        user_id: &UserId,
        fact_id: &str,
    ) -> Result<bool, StrataError> {
        let user = user_id.0.clone();
        let id = fact_id.to_string();
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE facts SET status = 'retracted'
                     WHERE id = ?1 AND user_id = ?2 AND status = 'active'",
                    rusqlite::params![id, user],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(storage_err)
    }

    /// Per-user row counts, for the CLI status output.
    pub async fn counts(&self, user_id: &UserId) -> Result<(u64, u64), StrataError> {
        let user = user_id.0.clone();
        self.conn
            .call(move |conn| {
                let chunks: u64 = conn.query_row(
                    "SELECT COUNT(*) FROM chunks WHERE user_id = ?1",
                    rusqlite::params![user],
                    |row| row.get(0),
                )?;
                let facts: u64 = conn.query_row(
                    "SELECT COUNT(*) FROM facts WHERE user_id = ?1 AND status = 'active'",
                    rusqlite::params![user],
                    |row| row.get(0),
                )?;
                Ok((chunks, facts))
            })
            .await
            .map_err(storage_err)
    }
}

#[async_trait]
impl ChunkIndex for SqliteChunkStore {
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<(), StrataError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let chunks = chunks.to_vec();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO chunks
                           (id, user_id, conversation_id, layer, content, embedding,
                            message_count, part_index, part_total, is_recent, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                         ON CONFLICT(id) DO UPDATE SET
                           content = excluded.content,
                           embedding = excluded.embedding,
                           message_count = excluded.message_count,
                           part_index = excluded.part_index,
                           part_total = excluded.part_total,
                           is_recent = excluded.is_recent,
                           created_at = excluded.created_at",
                    )?;
                    for chunk in &chunks {
                        let blob = chunk.embedding.as_deref().map(vec_to_blob);
                        stmt.execute(rusqlite::params![
                            chunk.id,
                            chunk.user_id.0,
                            chunk.conversation_id.0,
                            chunk.layer.as_str(),
                            chunk.content,
                            blob,
                            chunk.message_count,
                            chunk.part_index,
                            chunk.part_total,
                            chunk.is_recent,
                            chunk.created_at,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn upsert_facts(&self, facts: &[LearnedFact]) -> Result<(), StrataError> {
        if facts.is_empty() {
            return Ok(());
        }
        let facts = facts.to_vec();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO facts
                           (id, user_id, category, fact, embedding, confidence, status, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                         ON CONFLICT(id) DO UPDATE SET
                           fact = excluded.fact,
                           category = excluded.category,
                           embedding = excluded.embedding,
                           confidence = excluded.confidence,
                           status = excluded.status",
                    )?;
                    for fact in &facts {
                        stmt.execute(rusqlite::params![
                            fact.id,
                            fact.user_id.0,
                            fact.category.to_string(),
                            fact.fact,
                            vec_to_blob(&fact.embedding),
                            fact.confidence,
                            fact.status.as_str(),
                            fact.created_at,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<RetrievalResult>, StrataError> {
        let user = request.user_id.0.clone();
        let query = request.embedding.clone();
        let threshold = request.threshold;
        let limit = request.limit;

        let rows = match request.kind {
            SearchKind::Chunks => {
                let layer = request.layer;
                self.conn
                    .call(move |conn| {
                        let sql = match layer {
                            Some(_) => {
                                "SELECT id, user_id, layer, content, embedding, created_at
                                 FROM chunks
                                 WHERE user_id = ?1 AND layer = ?2 AND embedding IS NOT NULL"
                            }
                            None => {
                                "SELECT id, user_id, layer, content, embedding, created_at
                                 FROM chunks
                                 WHERE user_id = ?1 AND embedding IS NOT NULL"
                            }
                        };
                        let mut stmt = conn.prepare(sql)?;
                        let map_row = |row: &rusqlite::Row<'_>| {
                            let blob: Vec<u8> = row.get(4)?;
                            Ok(ScopedResult {
                                owner: row.get(1)?,
                                result: RetrievalResult {
                                    id: row.get(0)?,
                                    content: row.get(3)?,
                                    score: cosine_similarity(&query, &blob_to_vec(&blob)),
                                    layer: Some(Layer::from_str_value(
                                        &row.get::<_, String>(2)?,
                                    )),
                                    created_at: row.get(5)?,
                                },
                            })
                        };
                        let scored = match layer {
                            Some(layer) => stmt
                                .query_map(rusqlite::params![user, layer.as_str()], map_row)?
                                .collect::<Result<Vec<_>, _>>()?,
                            None => stmt
                                .query_map(rusqlite::params![user], map_row)?
                                .collect::<Result<Vec<_>, _>>()?,
                        };
                        Ok(rank(scored, threshold, limit))
                    })
                    .await
                    .map_err(storage_err)?
            }
            SearchKind::Facts => {
                self.conn
                    .call(move |conn| {
                        let mut stmt = conn.prepare(
                            "SELECT id, user_id, fact, embedding, created_at
                             FROM facts
                             WHERE user_id = ?1 AND status = 'active'",
                        )?;
                        let scored = stmt
                            .query_map(rusqlite::params![user], |row| {
                                let blob: Vec<u8> = row.get(3)?;
                                Ok(ScopedResult {
                                    owner: row.get(1)?,
                                    result: RetrievalResult {
                                        id: row.get(0)?,
                                        content: row.get(2)?,
                                        score: cosine_similarity(&query, &blob_to_vec(&blob)),
                                        layer: None,
                                        created_at: row.get(4)?,
                                    },
                                })
                            })?
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(rank(scored, threshold, limit))
                    })
                    .await
                    .map_err(storage_err)?
            }
        };

        debug!(
            user_id = %request.user_id,
            kind = ?request.kind,
            results = rows.len(),
            "similarity search complete"
        );
        check_scope(rows, &request.user_id)
    }

    async fn recent_chunks(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>, StrataError> {
        let user = user_id.0.clone();
        // Only the coarsest tier; returning all five tiers of the same
        // conversation would hand back five near-duplicates.
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, layer, content, created_at FROM chunks
                     WHERE user_id = ?1 AND layer = 'macro'
                     ORDER BY created_at DESC, id ASC LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![user, limit as i64], |row| {
                        Ok(ScopedResult {
                            owner: row.get(1)?,
                            result: RetrievalResult {
                                id: row.get(0)?,
                                content: row.get(3)?,
                                score: 0.0,
                                layer: Some(Layer::from_str_value(&row.get::<_, String>(2)?)),
                                created_at: row.get(4)?,
                            },
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)?;
        check_scope(rows, user_id)
    }

    async fn active_facts(&self, user_id: &UserId) -> Result<Vec<LearnedFact>, StrataError> {
        let user = user_id.0.clone();
        let facts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, category, fact, embedding, confidence, status, created_at
                     FROM facts
                     WHERE user_id = ?1 AND status = 'active'
                     ORDER BY created_at DESC",
                )?;
                let facts = stmt
                    .query_map(rusqlite::params![user], |row| {
                        let category: String = row.get(2)?;
                        let blob: Vec<u8> = row.get(4)?;
                        Ok(LearnedFact {
                            id: row.get(0)?,
                            user_id: UserId(row.get(1)?),
                            category: category
                                .parse::<FactCategory>()
                                .unwrap_or(FactCategory::Event),
                            fact: row.get(3)?,
                            embedding: blob_to_vec(&blob),
                            confidence: row.get(5)?,
                            status: FactStatus::from_str_value(&row.get::<_, String>(6)?),
                            created_at: row.get(7)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(facts)
            })
            .await
            .map_err(storage_err)?;
        // Same redundant ownership check the scan paths apply.
        for fact in &facts {
            if fact.user_id != *user_id {
                return Err(StrataError::Internal(format!(
                    "query for user {user_id} returned a fact owned by another user"
                )));
            }
        }
        Ok(facts)
    }
}

/// Threshold filter, descending score sort, and truncation for a scan.
fn rank(mut rows: Vec<ScopedResult>, threshold: f32, limit: usize) -> Vec<ScopedResult> {
    rows.retain(|row| row.result.score >= threshold);
    rows.sort_by(|a, b| {
        b.result
            .score
            .partial_cmp(&a.result.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.result.created_at.cmp(&a.result.created_at))
    });
    rows.truncate(limit);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::ConversationId;

    fn chunk(user: &str, id: &str, layer: Layer, embedding: Option<Vec<f32>>, at: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            user_id: UserId(user.to_string()),
            conversation_id: ConversationId("conv-1".to_string()),
            layer,
            content: format!("content of {id}"),
            embedding,
            message_count: 3,
            part_index: None,
            part_total: None,
            is_recent: false,
            created_at: at.to_string(),
        }
    }

    fn fact(user: &str, id: &str, embedding: Vec<f32>, confidence: f64) -> LearnedFact {
        LearnedFact {
            id: id.to_string(),
            user_id: UserId(user.to_string()),
            category: FactCategory::Preference,
            fact: format!("fact {id}"),
            embedding,
            confidence,
            status: FactStatus::Active,
            created_at: "2026-08-01T00:00:00Z".to_string(),
        }
    }

    fn chunk_query(user: &str, embedding: Vec<f32>, threshold: f32) -> SearchRequest {
        SearchRequest {
            user_id: UserId(user.to_string()),
            embedding,
            kind: SearchKind::Chunks,
            layer: None,
            threshold,
            limit: 10,
        }
    }

    #[tokio::test]
    async fn search_never_crosses_users() {
        let store = SqliteChunkStore::open_in_memory().await.unwrap();
        store
            .upsert_chunks(&[
                chunk("alice", "a1", Layer::Micro, Some(vec![1.0, 0.0]), "2026-08-01"),
                chunk("bob", "b1", Layer::Micro, Some(vec![1.0, 0.0]), "2026-08-01"),
            ])
            .await
            .unwrap();

        let results = store
            .search(chunk_query("alice", vec![1.0, 0.0], 0.0))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a1");
    }

    #[tokio::test]
    async fn reingest_overwrites_instead_of_duplicating() {
        let store = SqliteChunkStore::open_in_memory().await.unwrap();
        let first = chunk("alice", "a1", Layer::Micro, Some(vec![1.0, 0.0]), "2026-08-01");
        let mut second = first.clone();
        second.content = "updated".to_string();

        store.upsert_chunks(&[first]).await.unwrap();
        store.upsert_chunks(&[second]).await.unwrap();

        let (chunks, _) = store.counts(&UserId("alice".into())).await.unwrap();
        assert_eq!(chunks, 1);
        let results = store
            .search(chunk_query("alice", vec![1.0, 0.0], 0.0))
            .await
            .unwrap();
        assert_eq!(results[0].content, "updated");
    }

    #[tokio::test]
    async fn threshold_is_inclusive_and_order_is_by_score() {
        let store = SqliteChunkStore::open_in_memory().await.unwrap();
        store
            .upsert_chunks(&[
                chunk("u", "close", Layer::Micro, Some(vec![1.0, 0.0]), "2026-08-01"),
                chunk("u", "mid", Layer::Micro, Some(vec![1.0, 1.0]), "2026-08-01"),
                chunk("u", "far", Layer::Micro, Some(vec![-1.0, 0.0]), "2026-08-01"),
            ])
            .await
            .unwrap();

        let results = store
            .search(chunk_query("u", vec![1.0, 0.0], 0.7))
            .await
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        // cos(mid) is ~0.707, just over the threshold.
        assert_eq!(ids, vec!["close", "mid"]);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn layer_filter_restricts_chunk_search() {
        let store = SqliteChunkStore::open_in_memory().await.unwrap();
        store
            .upsert_chunks(&[
                chunk("u", "m1", Layer::Micro, Some(vec![1.0, 0.0]), "2026-08-01"),
                chunk("u", "t1", Layer::Theme, Some(vec![1.0, 0.0]), "2026-08-01"),
            ])
            .await
            .unwrap();

        let mut request = chunk_query("u", vec![1.0, 0.0], 0.0);
        request.layer = Some(Layer::Theme);
        let results = store.search(request).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "t1");
        assert_eq!(results[0].layer, Some(Layer::Theme));
    }

    #[tokio::test]
    async fn unembedded_chunks_are_invisible_to_search_but_listed_for_reembed() {
        let store = SqliteChunkStore::open_in_memory().await.unwrap();
        store
            .upsert_chunks(&[
                chunk("u", "ok", Layer::Micro, Some(vec![1.0, 0.0]), "2026-08-01"),
                chunk("u", "pending", Layer::Micro, None, "2026-08-02"),
            ])
            .await
            .unwrap();

        let results = store
            .search(chunk_query("u", vec![1.0, 0.0], 0.0))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let pending = store
            .chunks_missing_embeddings(&UserId("u".into()), 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, "pending");

        store
            .update_chunk_embedding("pending", &[0.0, 1.0])
            .await
            .unwrap();
        let results = store
            .search(chunk_query("u", vec![0.0, 1.0], 0.9))
            .await
            .unwrap();
        assert_eq!(results[0].id, "pending");
    }

    #[tokio::test]
    async fn recent_chunks_come_back_newest_first() {
        let store = SqliteChunkStore::open_in_memory().await.unwrap();
        store
            .upsert_chunks(&[
                chunk("u", "old", Layer::Macro, None, "2026-07-01T00:00:00Z"),
                chunk("u", "new", Layer::Macro, None, "2026-08-01T00:00:00Z"),
                chunk("u", "fine-grained", Layer::Micro, None, "2026-08-20T00:00:00Z"),
            ])
            .await
            .unwrap();

        let results = store.recent_chunks(&UserId("u".into()), 5).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        // Coarsest tier only, newest first, similarity score pinned to zero.
        assert_eq!(ids, vec!["new", "old"]);
        assert!(results.iter().all(|r| r.score == 0.0));
    }

    #[tokio::test]
    async fn retracted_facts_leave_search_and_synthesis() {
        let store = SqliteChunkStore::open_in_memory().await.unwrap();
        store
            .upsert_facts(&[
                fact("u", "f1", vec![1.0, 0.0], 0.9),
                fact("u", "f2", vec![1.0, 0.0], 0.8),
            ])
            .await
            .unwrap();

        assert!(store.retract_fact(&UserId("u".into()), "f1").await.unwrap());
        // Second retraction is a no-op.
        assert!(!store.retract_fact(&UserId("u".into()), "f1").await.unwrap());
        assert!(!store.retract_fact(&UserId("u".into()), "missing").await.unwrap());

        let active = store.active_facts(&UserId("u".into())).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "f2");

        let request = SearchRequest {
            user_id: UserId("u".into()),
            embedding: vec![1.0, 0.0],
            kind: SearchKind::Facts,
            layer: None,
            threshold: 0.0,
            limit: 10,
        };
        let results = store.search(request).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "f2");
        assert_eq!(results[0].layer, None);
    }

    #[tokio::test]
    async fn retract_is_scoped_to_the_owner() {
        let store = SqliteChunkStore::open_in_memory().await.unwrap();
        store
            .upsert_facts(&[fact("alice", "f1", vec![1.0, 0.0], 0.9)])
            .await
            .unwrap();
        assert!(!store.retract_fact(&UserId("bob".into()), "f1").await.unwrap());
        assert_eq!(
            store.active_facts(&UserId("alice".into())).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn active_facts_are_scoped_to_the_owner() {
        let store = SqliteChunkStore::open_in_memory().await.unwrap();
        store
            .upsert_facts(&[
                fact("alice", "f1", vec![1.0, 0.0], 0.9),
                fact("bob", "f2", vec![0.0, 1.0], 0.8),
            ])
            .await
            .unwrap();

        let facts = store.active_facts(&UserId("alice".into())).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].id, "f1");
    }

    #[tokio::test]
    async fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("strata.db");
        let store = SqliteChunkStore::open(&path).await.unwrap();
        store
            .upsert_chunks(&[chunk("u", "a", Layer::Micro, None, "2026-08-01")])
            .await
            .unwrap();
        assert!(path.exists());
    }
}
