//! Upstream Cloud Code transport.
//!
//! Thin wrapper over reqwest: POSTs a Google-dialect request and hands back
//! the SSE byte stream. Authentication is whatever the surrounding program
//! configured; the proxy forwards the token without interpreting it.

use crate::error::{ProxyError, Result};
use crate::translate::google_types::GenerateContentRequest;
use bytes::Bytes;
use futures::Stream;

pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl UpstreamClient {
    pub fn new(client: reqwest::Client, base_url: String, access_token: Option<String>) -> Self {
        Self {
            client,
            base_url,
            access_token,
        }
    }

    /// Issue a streaming generate call and return the raw SSE byte stream.
    /// Non-2xx responses are captured as typed failures before any byte is
    /// handed to the pipeline.
    pub async fn stream_generate(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static> {
        let url = format!(
            "{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/')
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(request);

        if let Some(ref token) = self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProxyError::upstream(502, format!("upstream request failed: {e}")))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, "upstream rejected request");
            return Err(ProxyError::upstream(status, truncate(&body, 500).to_string()));
        }

        Ok(response.bytes_stream())
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        // Multi-byte character straddling the cut point
        assert_eq!(truncate("héllo", 2), "h");
    }
}
