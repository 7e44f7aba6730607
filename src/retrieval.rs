//! Knowledge-base retrieval capability.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RetrievalError;
use crate::llm::ToolDefinition;

/// Name of the retrieval tool offered to the drafter.
pub const RETRIEVAL_TOOL_NAME: &str = "search_knowledge_base";

/// A ranked knowledge snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Maps a free-text query to ranked knowledge snippets.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Search the knowledge base. No match is an empty vec, not an error.
    async fn search(&self, query: &str) -> Result<Vec<Snippet>, RetrievalError>;
}

/// Tool definition the drafter binds for the first drafting pass.
pub fn retrieval_tool() -> ToolDefinition {
    ToolDefinition {
        name: RETRIEVAL_TOOL_NAME.to_string(),
        description: "Search and return information about products or services."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Free-text query against the knowledge base"
                }
            },
            "required": ["query"]
        }),
    }
}

/// Render snippets into the transcript text consumed by the second
/// drafting pass.
pub fn format_snippets(snippets: &[Snippet]) -> String {
    if snippets.is_empty() {
        return "No relevant information found in the knowledge base.".to_string();
    }
    snippets
        .iter()
        .enumerate()
        .map(|(i, s)| match &s.source {
            Some(source) => format!("[{}] ({}) {}", i + 1, source, s.content),
            None => format!("[{}] {}", i + 1, s.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── HTTP knowledge-base client ──────────────────────────────────────

/// Configuration for the knowledge-base endpoint.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub endpoint: String,
    pub api_key: Option<SecretString>,
    /// Number of results requested per query.
    pub top_k: usize,
    /// Results scoring below this are dropped client-side.
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            top_k: 4,
            min_score: 0.5,
        }
    }
}

/// Remote knowledge-base retriever over HTTP.
///
/// POSTs `{"query": ..., "top_k": ...}` and expects
/// `{"results": [{"content", "source", "score"}]}` back.
pub struct KnowledgeBaseClient {
    config: RetrievalConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Snippet>,
}

impl KnowledgeBaseClient {
    pub fn new(config: RetrievalConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Drop results below the configured score threshold. Unscored results
    /// are kept — not every backend reports confidence.
    fn apply_min_score(&self, snippets: Vec<Snippet>) -> Vec<Snippet> {
        snippets
            .into_iter()
            .filter(|s| s.score.is_none_or(|score| score >= self.config.min_score))
            .collect()
    }
}

#[async_trait]
impl Retriever for KnowledgeBaseClient {
    async fn search(&self, query: &str) -> Result<Vec<Snippet>, RetrievalError> {
        let body = serde_json::json!({
            "query": query,
            "top_k": self.config.top_k,
        });

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| RetrievalError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RetrievalError::RequestFailed(format!(
                "HTTP {status}: {text}"
            )));
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| RetrievalError::InvalidResponse(e.to_string()))?;

        let snippets = self.apply_min_score(parsed.results);
        debug!(query, count = snippets.len(), "Knowledge base search");
        Ok(snippets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definition_shape() {
        let tool = retrieval_tool();
        assert_eq!(tool.name, RETRIEVAL_TOOL_NAME);
        assert_eq!(tool.parameters["required"][0], "query");
        assert_eq!(tool.parameters["properties"]["query"]["type"], "string");
    }

    #[test]
    fn format_snippets_numbers_and_sources() {
        let snippets = vec![
            Snippet {
                content: "The X200 costs $499.".into(),
                source: Some("pricing.md".into()),
                score: Some(0.9),
            },
            Snippet {
                content: "The X200 ships worldwide.".into(),
                source: None,
                score: None,
            },
        ];
        let text = format_snippets(&snippets);
        assert!(text.contains("[1] (pricing.md) The X200 costs $499."));
        assert!(text.contains("[2] The X200 ships worldwide."));
    }

    #[test]
    fn format_snippets_empty_result() {
        let text = format_snippets(&[]);
        assert!(text.contains("No relevant information"));
    }

    #[test]
    fn min_score_filter_keeps_unscored() {
        let client = KnowledgeBaseClient::new(RetrievalConfig {
            min_score: 0.5,
            ..RetrievalConfig::default()
        });
        let filtered = client.apply_min_score(vec![
            Snippet {
                content: "keep".into(),
                source: None,
                score: Some(0.9),
            },
            Snippet {
                content: "drop".into(),
                source: None,
                score: Some(0.2),
            },
            Snippet {
                content: "unscored".into(),
                source: None,
                score: None,
            },
        ]);
        let contents: Vec<&str> = filtered.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["keep", "unscored"]);
    }

    #[test]
    fn search_response_parses_with_missing_fields() {
        let json = r#"{"results": [{"content": "text only"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert!(parsed.results[0].source.is_none());
        assert!(parsed.results[0].score.is_none());
    }

    #[test]
    fn search_response_parses_empty_object() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }
}
