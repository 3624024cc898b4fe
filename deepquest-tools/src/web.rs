//! Web search adapter for SearxNG-compatible JSON endpoints

use crate::RetrievalTool;
use async_trait::async_trait;
use deepquest_core::{DeepquestError, DeepquestResult, ErrorContext, RetrievalConfig, Snippet};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f32>,
}

/// Web search over a SearxNG-style `/search?format=json` endpoint
pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(endpoint: impl Into<String>, config: &RetrievalConfig) -> DeepquestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| DeepquestError::Retrieval {
                message: format!("Failed to build HTTP client: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("web_search").with_operation("build_client"),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            max_results: config.max_results,
        })
    }

    fn to_snippets(&self, response: SearchResponse) -> Vec<Snippet> {
        response
            .results
            .into_iter()
            .filter(|r| !r.content.is_empty() || !r.title.is_empty())
            .take(self.max_results)
            .enumerate()
            .map(|(rank, r)| Snippet {
                text: if r.content.is_empty() {
                    r.title.clone()
                } else if r.title.is_empty() {
                    r.content.clone()
                } else {
                    format!("{}: {}", r.title, r.content)
                },
                source: r.url,
                // Endpoints without scores still need a rank-stable order
                score: r.score.unwrap_or_else(|| 1.0 / (rank + 1) as f32),
            })
            .collect()
    }
}

#[async_trait]
impl RetrievalTool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    async fn search(&self, query: &str) -> DeepquestResult<Vec<Snippet>> {
        debug!(query = %query, "Querying web search endpoint");

        let response = self
            .client
            .get(format!("{}/search", self.endpoint))
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| DeepquestError::Retrieval {
                message: format!("Web search request failed: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("web_search").with_operation("request"),
            })?;

        let response = response.error_for_status().map_err(|e| DeepquestError::Retrieval {
            message: format!("Web search returned error status: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("web_search").with_operation("status"),
        })?;

        let parsed: SearchResponse =
            response.json().await.map_err(|e| DeepquestError::Retrieval {
                message: format!("Web search returned malformed JSON: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("web_search").with_operation("parse"),
            })?;

        Ok(self.to_snippets(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(max_results: usize) -> WebSearchTool {
        let config = RetrievalConfig {
            max_results,
            ..RetrievalConfig::default()
        };
        WebSearchTool::new("http://localhost:8888/", &config).unwrap()
    }

    #[test]
    fn endpoint_is_normalized() {
        assert_eq!(tool(5).endpoint, "http://localhost:8888");
    }

    #[test]
    fn response_maps_to_ranked_snippets() {
        let raw = r#"{
            "results": [
                {"title": "Tokio", "url": "https://tokio.rs", "content": "An async runtime", "score": 3.2},
                {"title": "", "url": "https://example.com", "content": "Second hit"},
                {"title": "Empty", "url": "https://empty.example", "content": ""}
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        let snippets = tool(5).to_snippets(parsed);

        assert_eq!(snippets.len(), 3);
        assert_eq!(snippets[0].text, "Tokio: An async runtime");
        assert_eq!(snippets[0].source, "https://tokio.rs");
        assert_eq!(snippets[0].score, 3.2);
        assert_eq!(snippets[1].text, "Second hit");
        // Unscored results fall back to rank-based scores
        assert!(snippets[1].score > snippets[2].score);
    }

    #[test]
    fn result_count_is_bounded() {
        let raw = r#"{"results": [
            {"title": "a", "url": "u", "content": "1"},
            {"title": "b", "url": "u", "content": "2"},
            {"title": "c", "url": "u", "content": "3"}
        ]}"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(tool(2).to_snippets(parsed).len(), 2);
    }

    #[test]
    fn missing_results_field_is_empty() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(tool(5).to_snippets(parsed).is_empty());
    }
}
