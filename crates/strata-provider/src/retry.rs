// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP status classification shared by both provider clients.
//!
//! The clients themselves make exactly one attempt per call; the embedding
//! pipeline above them decides whether to retry based on
//! [`StrataError::is_transient`]. The mapping here is what makes that
//! decision meaningful: rate limits and provider outages come back as
//! `Provider` errors (transient), auth failures as `Config`, and anything
//! else the provider rejected outright as `Internal` (never retried).

use reqwest::StatusCode;
use strata_core::StrataError;

/// Statuses that indicate a transient provider condition worth retrying.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503 | 529)
}

/// Maps a non-success HTTP response to a [`StrataError`].
pub fn status_error(context: &str, status: StatusCode, body: &str) -> StrataError {
    if is_transient_status(status) {
        return StrataError::Provider {
            message: format!("{context} returned {status}: {body}"),
            source: None,
        };
    }
    match status.as_u16() {
        401 | 403 => StrataError::Config(format!("{context} rejected credentials ({status})")),
        _ => StrataError::Internal(format!("{context} returned {status}: {body}")),
    }
}

/// Wraps a reqwest transport failure as a transient provider error.
pub fn transport_error(context: &str, err: reqwest::Error) -> StrataError {
    StrataError::Provider {
        message: format!("{context} request failed: {err}"),
        source: Some(Box::new(err)),
    }
}
