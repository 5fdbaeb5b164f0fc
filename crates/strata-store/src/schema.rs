// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite schema for the chunk and fact tables.

/// Idempotent schema setup, applied on every open.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    layer           TEXT NOT NULL,
    content         TEXT NOT NULL,
    embedding       BLOB,
    message_count   INTEGER NOT NULL,
    part_index      INTEGER,
    part_total      INTEGER,
    is_recent       INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_user_layer
    ON chunks(user_id, layer);
CREATE INDEX IF NOT EXISTS idx_chunks_user_created
    ON chunks(user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS facts (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    category    TEXT NOT NULL,
    fact        TEXT NOT NULL,
    embedding   BLOB NOT NULL,
    confidence  REAL NOT NULL,
    status      TEXT NOT NULL DEFAULT 'active',
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_facts_user_status
    ON facts(user_id, status);
";
