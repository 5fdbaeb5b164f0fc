// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Strata memory engine.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), XDG file hierarchy lookup, and environment
//! variable overrides via the `STRATA_` prefix.

pub mod loader;
pub mod model;

use strata_core::StrataError;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    CascadeStage, ChunkingConfig, EmbeddingConfig, EngineConfig, LearningConfig, ProviderConfig,
    RetrievalConfig, StorageConfig, StrataConfig,
};

/// Load configuration from the XDG hierarchy and validate it.
pub fn load_and_validate() -> Result<StrataConfig, StrataError> {
    let config = loader::load_config().map_err(|e| StrataError::Config(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

/// Load configuration from a TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<StrataConfig, StrataError> {
    let config =
        loader::load_config_from_str(toml_content).map_err(|e| StrataError::Config(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

/// Post-deserialization validation of value ranges.
pub fn validate(config: &StrataConfig) -> Result<(), StrataError> {
    let r = &config.retrieval;
    for (name, value) in [
        ("retrieval.macro_threshold", r.macro_threshold),
        ("retrieval.theme_threshold", r.theme_threshold),
        ("retrieval.micro_threshold", r.micro_threshold),
        ("retrieval.fact_threshold", r.fact_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(StrataError::Config(format!(
                "{name} must be in [0.0, 1.0], got {value}"
            )));
        }
    }

    if !(0.0..=1.0).contains(&config.learning.min_confidence) {
        return Err(StrataError::Config(format!(
            "learning.min_confidence must be in [0.0, 1.0], got {}",
            config.learning.min_confidence
        )));
    }

    if config.embedding.batch_size == 0 {
        return Err(StrataError::Config(
            "embedding.batch_size must be at least 1".to_string(),
        ));
    }

    if config.embedding.max_attempts == 0 {
        return Err(StrataError::Config(
            "embedding.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.embedding.max_parallel_batches == 0 {
        return Err(StrataError::Config(
            "embedding.max_parallel_batches must be at least 1".to_string(),
        ));
    }

    if config.provider.dimensions == 0 {
        return Err(StrataError::Config(
            "provider.dimensions must be at least 1".to_string(),
        ));
    }

    if config.retrieval.total_timeout_ms < config.retrieval.stage_timeout_ms {
        return Err(StrataError::Config(format!(
            "retrieval.total_timeout_ms ({}) must not be below stage_timeout_ms ({})",
            config.retrieval.total_timeout_ms, config.retrieval.stage_timeout_ms
        )));
    }

    Ok(())
}
