use super::{SummaryContext, Summarizer};
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

/// Summarizer backed by a generic JSON-over-HTTP endpoint.
///
/// Posts `{"context": ..., "input": ...}` and returns the response body as
/// text. Whether that text is the documented JSON shape or free prose is
/// the caller's problem; this adapter just moves bytes.
pub struct HttpSummarizer {
    client: Client,
    endpoint: String,
}

impl HttpSummarizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, context: &SummaryContext, input: &str) -> Result<String> {
        let body = serde_json::json!({
            "context": context,
            "input": input,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("summarizer request failed")?
            .error_for_status()
            .context("summarizer returned an error status")?;

        let text = response
            .text()
            .await
            .context("summarizer response was unreadable")?;
        Ok(text)
    }
}
