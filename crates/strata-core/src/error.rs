// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Strata memory engine.

use thiserror::Error;

/// The primary error type used across all Strata adapter traits and core operations.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Configuration errors (invalid TOML, missing required fields, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// External provider errors (embedding service, generative LLM).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// An ingestion run is already in flight for this user.
    #[error("ingestion already in flight for user {user_id}")]
    IngestInFlight { user_id: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StrataError {
    /// True for failures worth retrying (rate limits, timeouts, transient
    /// provider outages). Config and internal errors are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StrataError::Provider { .. } | StrataError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_variants_construct() {
        let _config = StrataError::Config("bad".into());
        let _storage = StrataError::Storage {
            source: Box::new(std::io::Error::other("disk")),
        };
        let _provider = StrataError::Provider {
            message: "429".into(),
            source: None,
        };
        let _timeout = StrataError::Timeout {
            duration: std::time::Duration::from_secs(2),
        };
        let _busy = StrataError::IngestInFlight {
            user_id: "u-1".into(),
        };
        let _internal = StrataError::Internal("oops".into());
    }

    #[test]
    fn transient_classification() {
        assert!(
            StrataError::Provider {
                message: "rate limited".into(),
                source: None,
            }
            .is_transient()
        );
        assert!(
            StrataError::Timeout {
                duration: std::time::Duration::from_millis(100),
            }
            .is_transient()
        );
        assert!(!StrataError::Config("bad".into()).is_transient());
        assert!(!StrataError::Internal("bug".into()).is_transient());
    }
}
