// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the embedding provider.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use strata_core::{EmbedKind, EmbeddingBackend, StrataError};
use tracing::debug;

use crate::retry::{status_error, transport_error};

/// HTTP client implementing [`EmbeddingBackend`].
///
/// One provider call per batch; the caller owns batching, retry, and
/// cost accounting.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    input_type: &'a str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl HttpEmbeddingClient {
    pub fn new(
        url: String,
        api_key: Option<&str>,
        model: String,
        dimensions: usize,
    ) -> Result<Self, StrataError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| StrataError::Config(format!("invalid API key header value: {e}")))?;
            headers.insert("authorization", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| StrataError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            url,
            model,
            dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingClient {
    async fn embed_batch(
        &self,
        texts: &[String],
        kind: EmbedKind,
    ) -> Result<Vec<Vec<f32>>, StrataError> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
            input_type: kind.as_str(),
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("embedding provider", e))?;

        let status = response.status();
        debug!(status = %status, batch = texts.len(), "embedding response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("embedding provider", status, &body));
        }

        let body: EmbedResponse = response.json().await.map_err(|e| StrataError::Provider {
            message: format!("failed to parse embedding response: {e}"),
            source: Some(Box::new(e)),
        })?;

        if body.embeddings.len() != texts.len() {
            return Err(StrataError::Provider {
                message: format!(
                    "embedding count mismatch: sent {} texts, got {} vectors",
                    texts.len(),
                    body.embeddings.len()
                ),
                source: None,
            });
        }
        Ok(body.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
