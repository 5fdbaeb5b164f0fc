// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Greedy whole-message chunking across the five granularity tiers.
//!
//! Messages are never split across chunks: a chunk is a run of consecutive
//! whole messages accumulated until the tier's target size is reached, plus
//! a short overlap tail carried from the previous chunk for continuity.
//! Chunk identifiers are derived from (conversation, layer, index), so the
//! same export always produces the same ids and re-ingestion overwrites in
//! place instead of duplicating.

use sha2::{Digest, Sha256};
use strata_core::{Chunk, Conversation, Layer, Message, UserId};

use crate::layer::{LayerSpec, LAYER_SPECS};

/// Splits conversations into layered chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    overlap_chars: usize,
    min_messages: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(200, 2)
    }
}

impl Chunker {
    pub fn new(overlap_chars: usize, min_messages: usize) -> Self {
        Self {
            overlap_chars,
            min_messages,
        }
    }

    /// Produces chunks for every layer of one conversation.
    pub fn chunk_all_layers(
        &self,
        user_id: &UserId,
        conversation: &Conversation,
        is_recent: bool,
        created_at: &str,
    ) -> Vec<Chunk> {
        let mut out = Vec::new();
        for spec in LAYER_SPECS {
            out.extend(self.chunk_layer(user_id, conversation, spec, is_recent, created_at));
        }
        tracing::debug!(
            conversation_id = %conversation.id,
            chunks = out.len(),
            "chunked conversation"
        );
        out
    }

    /// Produces chunks for a single layer.
    ///
    /// Conversations shorter than 1.5x the tier target, or with fewer than
    /// twice the minimum message count, come out as one chunk: splitting
    /// them would only produce fragments below the tier minimum.
    pub fn chunk_layer(
        &self,
        user_id: &UserId,
        conversation: &Conversation,
        spec: LayerSpec,
        is_recent: bool,
        created_at: &str,
    ) -> Vec<Chunk> {
        if conversation
            .messages
            .iter()
            .all(|m| m.text.trim().is_empty())
        {
            return Vec::new();
        }
        let rendered: Vec<String> = conversation
            .messages
            .iter()
            .map(render_message)
            .collect();

        let total_chars: usize =
            rendered.iter().map(String::len).sum::<usize>() + 2 * rendered.len().saturating_sub(1);
        let single = total_chars < spec.target_chars + spec.target_chars / 2
            || conversation.messages.len() < 2 * self.min_messages;

        let segments = if single {
            vec![Segment {
                start: 0,
                end: rendered.len(),
            }]
        } else {
            self.split_segments(&rendered, &spec)
        };

        let part_total = segments.len();
        let mut chunks = Vec::with_capacity(part_total);
        for (idx, seg) in segments.iter().enumerate() {
            let body = rendered[seg.start..seg.end].join("\n\n");
            let mut content = if part_total > 1 {
                format!(
                    "[Conversation: {}] [Part {}]\n",
                    conversation.title,
                    idx + 1
                )
            } else {
                format!("[Conversation: {}]\n", conversation.title)
            };
            if idx > 0 && self.overlap_chars > 0 {
                let prev_body = rendered[segments[idx - 1].start..segments[idx - 1].end]
                    .join("\n\n");
                let tail = tail_chars(&prev_body, self.overlap_chars);
                if !tail.is_empty() {
                    content.push_str(tail);
                    content.push_str("\n\n");
                }
            }
            content.push_str(&body);

            chunks.push(Chunk {
                id: chunk_id(&conversation.id.0, spec.layer, idx),
                user_id: user_id.clone(),
                conversation_id: conversation.id.clone(),
                layer: spec.layer,
                content,
                embedding: None,
                message_count: (seg.end - seg.start) as u32,
                part_index: (part_total > 1).then_some((idx + 1) as u32),
                part_total: (part_total > 1).then_some(part_total as u32),
                is_recent,
                created_at: created_at.to_owned(),
            });
        }
        chunks
    }

    /// Greedy accumulation: each segment takes whole messages until the
    /// target is reached, always advancing by at least one message. A
    /// trailing segment below the tier minimum is merged into its
    /// predecessor.
    fn split_segments(&self, rendered: &[String], spec: &LayerSpec) -> Vec<Segment> {
        let mut segments: Vec<Segment> = Vec::new();
        let mut start = 0;
        while start < rendered.len() {
            let mut end = start;
            let mut running = 0usize;
            while end < rendered.len() && (running < spec.target_chars || end == start) {
                running += rendered[end].len() + 2;
                end += 1;
            }
            segments.push(Segment { start, end });
            start = end;
        }
        if segments.len() > 1 {
            let last = segments.last().copied().unwrap_or(Segment { start: 0, end: 0 });
            let last_len: usize = rendered[last.start..last.end].iter().map(String::len).sum();
            if last_len < spec.min_chars {
                segments.pop();
                if let Some(prev) = segments.last_mut() {
                    prev.end = last.end;
                }
            }
        }
        segments
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
}

fn render_message(message: &Message) -> String {
    format!("{}: {}", message.role, message.text)
}

/// Last `n` characters of `s`, on a char boundary.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}

/// Deterministic chunk id: truncated hex sha256 of the coordinate triple.
fn chunk_id(conversation_id: &str, layer: Layer, index: usize) -> String {
    let digest = Sha256::digest(format!("{conversation_id}/{layer}/{index}"));
    let mut hex = String::with_capacity(32);
    for byte in &digest[..16] {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::spec_for;
    use strata_core::{ConversationId, Role};

    fn msg(role: Role, text: &str) -> Message {
        Message {
            role,
            text: text.to_owned(),
            timestamp: "2026-08-01T12:00:00Z".to_owned(),
        }
    }

    fn conv(id: &str, messages: Vec<Message>) -> Conversation {
        Conversation {
            id: ConversationId(id.to_owned()),
            title: "Trip planning".to_owned(),
            messages,
        }
    }

    fn user() -> UserId {
        UserId("u1".to_owned())
    }

    #[test]
    fn empty_conversation_yields_no_chunks() {
        let c = conv("c0", vec![]);
        let chunks = Chunker::default().chunk_all_layers(&user(), &c, false, "2026-08-01");
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_conversation_is_one_chunk_per_layer() {
        let c = conv(
            "c1",
            vec![
                msg(Role::User, "hello there"),
                msg(Role::Assistant, "hi, how can I help?"),
                msg(Role::User, "just saying hi"),
            ],
        );
        let chunks = Chunker::default().chunk_all_layers(&user(), &c, true, "2026-08-01");
        assert_eq!(chunks.len(), Layer::ALL.len());
        for chunk in &chunks {
            assert_eq!(chunk.message_count, 3);
            assert_eq!(chunk.part_index, None);
            assert_eq!(chunk.part_total, None);
            assert!(chunk.content.starts_with("[Conversation: Trip planning]"));
            assert!(chunk.is_recent);
        }
    }

    #[test]
    fn long_conversation_splits_with_overlap_and_part_headers() {
        let spec = spec_for(Layer::Micro);
        let body = "x".repeat(250);
        let messages: Vec<Message> = (0..12).map(|_| msg(Role::User, &body)).collect();
        let c = conv("c2", messages);

        let chunker = Chunker::default();
        let chunks = chunker.chunk_layer(&user(), &c, spec, false, "2026-08-01");
        assert!(chunks.len() > 1);

        let total: u32 = chunks.iter().map(|c| c.message_count).sum();
        assert_eq!(total, 12, "every message lands in exactly one chunk");

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.part_index, Some((i + 1) as u32));
            assert_eq!(chunk.part_total, Some(chunks.len() as u32));
            assert!(chunk
                .content
                .starts_with(&format!("[Conversation: Trip planning] [Part {}]", i + 1)));
        }
        // Each later part opens with the tail of the previous part's body.
        assert!(chunks[1].content.contains(&"x".repeat(200)));
    }

    #[test]
    fn oversized_single_message_gets_its_own_chunk() {
        let spec = spec_for(Layer::Micro);
        let huge = "y".repeat(spec.target_chars * 3);
        let mut messages = vec![msg(Role::User, &huge)];
        messages.extend((0..6).map(|_| msg(Role::Assistant, &"z".repeat(300))));
        let c = conv("c3", messages);

        let chunks = Chunker::default().chunk_layer(&user(), &c, spec, false, "2026-08-01");
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].message_count, 1);
        assert!(chunks[0].content.contains(&huge));
    }

    #[test]
    fn chunk_ids_are_deterministic_across_runs() {
        let c = conv(
            "c4",
            (0..10)
                .map(|i| msg(Role::User, &format!("message number {i} {}", "w".repeat(200))))
                .collect(),
        );
        let chunker = Chunker::default();
        let a = chunker.chunk_all_layers(&user(), &c, false, "2026-08-01");
        let b = chunker.chunk_all_layers(&user(), &c, false, "2026-08-01");
        let ids_a: Vec<&str> = a.iter().map(|c| c.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        for id in &ids_a {
            assert_eq!(id.len(), 32);
        }
    }

    #[test]
    fn ids_differ_across_layers_and_indexes() {
        assert_ne!(chunk_id("c", Layer::Micro, 0), chunk_id("c", Layer::Flow, 0));
        assert_ne!(chunk_id("c", Layer::Micro, 0), chunk_id("c", Layer::Micro, 1));
        assert_ne!(chunk_id("c", Layer::Micro, 0), chunk_id("d", Layer::Micro, 0));
    }

    #[test]
    fn tail_chars_respects_utf8_boundaries() {
        let s = "héllo wörld";
        let tail = tail_chars(s, 4);
        assert_eq!(tail, "örld");
        assert_eq!(tail_chars(s, 100), s);
        assert_eq!(tail_chars(s, 0), "");
    }

    #[test]
    fn trailing_fragment_merges_into_previous_chunk() {
        let spec = spec_for(Layer::Micro);
        // Ten messages filling chunks evenly, then one tiny trailing message.
        let mut messages: Vec<Message> =
            (0..10).map(|_| msg(Role::User, &"a".repeat(300))).collect();
        messages.push(msg(Role::Assistant, "ok"));
        let c = conv("c5", messages);

        let chunks = Chunker::default().chunk_layer(&user(), &c, spec, false, "2026-08-01");
        let total: u32 = chunks.iter().map(|c| c.message_count).sum();
        assert_eq!(total, 11);
        let last = chunks.last().unwrap();
        assert!(last.message_count >= 2, "tiny tail rides with its predecessor");
    }
}
