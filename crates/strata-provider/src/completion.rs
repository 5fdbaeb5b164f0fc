// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the generative provider, used only by fact extraction.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use strata_core::{Completion, CompletionBackend, StrataError, TokenUsage};
use tracing::debug;

use crate::retry::{status_error, transport_error};

/// Messages-API version header sent with every completion request.
const API_VERSION: &str = "2023-06-01";

/// HTTP client implementing [`CompletionBackend`] against a messages-style
/// API. Single attempt per call; the learner treats extraction failure as
/// non-fatal rather than retrying.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    client: reqwest::Client,
    url: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [RequestMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    usage: UsageBlock,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    input_tokens: u64,
    output_tokens: u64,
}

impl HttpCompletionClient {
    pub fn new(
        url: String,
        api_key: &str,
        model: String,
        max_tokens: u32,
    ) -> Result<Self, StrataError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| StrataError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| StrataError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            url,
            model,
            max_tokens,
        })
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<Completion, StrataError> {
        let request = MessageRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("generative provider", e))?;

        let status = response.status();
        debug!(status = %status, "completion response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("generative provider", status, &body));
        }

        let body: MessageResponse = response.json().await.map_err(|e| StrataError::Provider {
            message: format!("failed to parse completion response: {e}"),
            source: Some(Box::new(e)),
        })?;

        let text = body
            .content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            text,
            usage: TokenUsage {
                input_tokens: body.usage.input_tokens,
                output_tokens: body.usage.output_tokens,
            },
        })
    }
}
