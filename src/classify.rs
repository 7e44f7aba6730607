//! Email classification capability.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, extract_json_object};
use crate::prompts;
use crate::workflow::state::Category;

/// Max tokens for the classification call (runs on every email, kept tight).
const CLASSIFY_MAX_TOKENS: u32 = 128;

/// Temperature for classification (deterministic-ish).
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Maps raw email text to a support category.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify an email body. There is no fallback category: failures
    /// propagate and unknown labels are rejected.
    async fn classify(&self, email_body: &str) -> Result<Category, LlmError>;
}

/// LLM-backed classifier.
pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, email_body: &str) -> Result<Category, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompts::categorizer_system_prompt()),
            ChatMessage::user(prompts::categorizer_user_prompt(email_body)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        let category = parse_category_response(&response.content).map_err(|reason| {
            LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason,
            }
        })?;

        debug!(category = category.label(), "Email classified");
        Ok(category)
    }
}

/// Response shape for the categorizer call.
#[derive(Debug, serde::Deserialize)]
struct CategoryResponse {
    category: String,
}

/// Parse the classifier output, rejecting unknown category labels.
fn parse_category_response(raw: &str) -> Result<Category, String> {
    let json = extract_json_object(raw);
    let response: CategoryResponse =
        serde_json::from_str(&json).map_err(|e| format!("JSON parse error: {e}"))?;
    Category::parse_external(&response.category)
        .ok_or_else(|| format!("unknown category: '{}'", response.category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{
        CompletionResponse, FinishReason, ToolCompletionRequest, ToolCompletionResponse,
    };

    struct FixedLlm {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for FixedLlm {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.response.clone(),
                input_tokens: 10,
                output_tokens: 5,
                finish_reason: FinishReason::Stop,
            })
        }

        async fn complete_with_tools(
            &self,
            _request: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            unimplemented!("classifier never offers tools")
        }
    }

    #[tokio::test]
    async fn classify_parses_plain_json() {
        let classifier = LlmClassifier::new(Arc::new(FixedLlm {
            response: r#"{"category": "product_enquiry"}"#.into(),
        }));
        let category = classifier.classify("How much is the X200?").await.unwrap();
        assert_eq!(category, Category::ProductEnquiry);
    }

    #[tokio::test]
    async fn classify_parses_markdown_wrapped_json() {
        let classifier = LlmClassifier::new(Arc::new(FixedLlm {
            response: "```json\n{\"category\": \"customer_feedback\"}\n```".into(),
        }));
        let category = classifier.classify("Thanks, love it!").await.unwrap();
        assert_eq!(category, Category::CustomerFeedback);
    }

    #[tokio::test]
    async fn classify_rejects_unknown_category() {
        let classifier = LlmClassifier::new(Arc::new(FixedLlm {
            response: r#"{"category": "billing"}"#.into(),
        }));
        let err = classifier.classify("...").await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn classify_rejects_sentinel_from_model() {
        let classifier = LlmClassifier::new(Arc::new(FixedLlm {
            response: r#"{"category": "no_email"}"#.into(),
        }));
        assert!(classifier.classify("...").await.is_err());
    }

    #[test]
    fn parse_category_response_requires_json() {
        assert!(parse_category_response("product_enquiry").is_err());
    }
}
