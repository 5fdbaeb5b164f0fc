// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation export parsing.
//!
//! Accepts either a bare JSON array of conversations or an object with a
//! `conversations` key, the two shapes real history exports come in.
//! Individual malformed conversations are skipped and counted rather than
//! failing the whole file.

use serde_json::Value;
use strata_core::{Conversation, StrataError};
use tracing::warn;

/// A parsed export: the usable conversations plus how many were dropped.
#[derive(Debug)]
pub struct ExportParse {
    pub conversations: Vec<Conversation>,
    pub skipped: usize,
}

/// Parses an export file's contents.
pub fn parse_export(raw: &str) -> Result<ExportParse, StrataError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| StrataError::Config(format!("export file is not valid JSON: {e}")))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("conversations") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(StrataError::Config(
                    "export object has no `conversations` array".to_string(),
                ));
            }
        },
        _ => {
            return Err(StrataError::Config(
                "export must be a JSON array or an object with a `conversations` array"
                    .to_string(),
            ));
        }
    };

    let mut conversations = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<Conversation>(item) {
            Ok(conversation) if conversation.id.0.is_empty() => {
                warn!(index, "skipping conversation with empty id");
                skipped += 1;
            }
            Ok(conversation) => conversations.push(conversation),
            Err(err) => {
                warn!(index, error = %err, "skipping malformed conversation");
                skipped += 1;
            }
        }
    }

    Ok(ExportParse {
        conversations,
        skipped,
    })
}
