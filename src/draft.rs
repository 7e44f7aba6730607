//! Response drafting capability.
//!
//! Two passes per run: a tool-enabled first pass that may request one
//! knowledge-base lookup, and a structured second pass that always produces
//! the final subject/body reply.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::{
    ChatMessage, CompletionRequest, LlmProvider, ToolCall, ToolCompletionRequest,
    extract_json_object,
};
use crate::prompts;
use crate::retrieval::retrieval_tool;
use crate::workflow::state::{Category, ReplyDraft};

/// Max tokens for drafting calls.
const DRAFT_MAX_TOKENS: u32 = 1024;

/// Outcome of the tool-enabled drafting pass.
///
/// The tag is what the workflow router matches on — stages never inspect
/// message text to detect a tool call.
#[derive(Debug, Clone)]
pub enum DraftOutcome {
    /// The model produced a final draft without requesting a tool.
    Final(String),
    /// The model wants a knowledge-base lookup before answering.
    ToolRequest {
        call: ToolCall,
        /// Text the model produced alongside the tool request, if any.
        preamble: Option<String>,
    },
}

/// Drafts reply emails given category, original body, and optional context.
#[async_trait]
pub trait Drafter: Send + Sync {
    /// Tool-enabled drafting pass. Single shot — any tool request is
    /// resolved by the workflow, not by looping here.
    async fn draft(
        &self,
        category: Category,
        email_body: &str,
        context: &str,
    ) -> Result<DraftOutcome, LlmError>;

    /// Structured drafting pass producing the authoritative reply.
    async fn draft_reply(
        &self,
        category: Category,
        email_body: &str,
        context: &str,
    ) -> Result<ReplyDraft, LlmError>;
}

/// LLM-backed drafter with the retrieval tool bound for the first pass.
pub struct LlmDrafter {
    llm: Arc<dyn LlmProvider>,
}

impl LlmDrafter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Drafter for LlmDrafter {
    async fn draft(
        &self,
        category: Category,
        email_body: &str,
        context: &str,
    ) -> Result<DraftOutcome, LlmError> {
        let messages = vec![
            ChatMessage::system(prompts::writer_system_prompt()),
            ChatMessage::user(prompts::writer_user_prompt(category, email_body, context)),
        ];
        let request = ToolCompletionRequest::new(messages, vec![retrieval_tool()])
            .with_max_tokens(DRAFT_MAX_TOKENS);

        let response = self.llm.complete_with_tools(request).await?;

        let mut calls = response.tool_calls.into_iter();
        match calls.next() {
            Some(call) => {
                // One retrieval round per run; extra requests are dropped.
                let extra = calls.count();
                if extra > 0 {
                    warn!(dropped = extra, "Drafter requested multiple tool calls");
                }
                debug!(tool = %call.name, "Drafter requested a tool call");
                Ok(DraftOutcome::ToolRequest {
                    call,
                    preamble: response.content,
                })
            }
            None => Ok(DraftOutcome::Final(response.content.unwrap_or_default())),
        }
    }

    async fn draft_reply(
        &self,
        category: Category,
        email_body: &str,
        context: &str,
    ) -> Result<ReplyDraft, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompts::writer_structured_system_prompt()),
            ChatMessage::user(prompts::writer_user_prompt(category, email_body, context)),
        ])
        .with_max_tokens(DRAFT_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        parse_reply_draft(&response.content).map_err(|reason| LlmError::InvalidResponse {
            provider: self.llm.model_name().to_string(),
            reason,
        })
    }
}

/// Parse the structured `{subject, body}` reply.
fn parse_reply_draft(raw: &str) -> Result<ReplyDraft, String> {
    let json = extract_json_object(raw);
    let draft: ReplyDraft =
        serde_json::from_str(&json).map_err(|e| format!("JSON parse error: {e}"))?;
    if draft.subject.trim().is_empty() {
        return Err("reply draft has an empty subject".into());
    }
    if draft.body.trim().is_empty() {
        return Err("reply draft has an empty body".into());
    }
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{
        CompletionResponse, FinishReason, ToolCompletionResponse,
    };

    struct ScriptedLlm {
        text: String,
        tool_calls: Vec<ToolCall>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.text.clone(),
                input_tokens: 10,
                output_tokens: 10,
                finish_reason: FinishReason::Stop,
            })
        }

        async fn complete_with_tools(
            &self,
            request: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            assert!(
                request.tools.iter().any(|t| t.name == "search_knowledge_base"),
                "retrieval tool must be bound"
            );
            Ok(ToolCompletionResponse {
                content: if self.text.is_empty() {
                    None
                } else {
                    Some(self.text.clone())
                },
                tool_calls: self.tool_calls.clone(),
                input_tokens: 10,
                output_tokens: 10,
            })
        }
    }

    fn search_call(id: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "search_knowledge_base".into(),
            arguments: serde_json::json!({"query": "X200 pricing"}),
        }
    }

    #[tokio::test]
    async fn draft_without_tool_call_is_final() {
        let drafter = LlmDrafter::new(Arc::new(ScriptedLlm {
            text: "Thanks for the kind words!".into(),
            tool_calls: vec![],
        }));
        let outcome = drafter
            .draft(Category::CustomerFeedback, "Love the product!", "")
            .await
            .unwrap();
        match outcome {
            DraftOutcome::Final(text) => assert_eq!(text, "Thanks for the kind words!"),
            other => panic!("expected Final, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn draft_with_tool_call_is_tagged() {
        let drafter = LlmDrafter::new(Arc::new(ScriptedLlm {
            text: String::new(),
            tool_calls: vec![search_call("c1")],
        }));
        let outcome = drafter
            .draft(Category::ProductEnquiry, "Price of the X200?", "")
            .await
            .unwrap();
        match outcome {
            DraftOutcome::ToolRequest { call, preamble } => {
                assert_eq!(call.name, "search_knowledge_base");
                assert!(preamble.is_none());
            }
            other => panic!("expected ToolRequest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn draft_honors_only_first_tool_call() {
        let drafter = LlmDrafter::new(Arc::new(ScriptedLlm {
            text: String::new(),
            tool_calls: vec![search_call("c1"), search_call("c2")],
        }));
        let outcome = drafter
            .draft(Category::ProductEnquiry, "Price?", "")
            .await
            .unwrap();
        match outcome {
            DraftOutcome::ToolRequest { call, .. } => assert_eq!(call.id, "c1"),
            other => panic!("expected ToolRequest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn draft_reply_parses_structured_output() {
        let drafter = LlmDrafter::new(Arc::new(ScriptedLlm {
            text: r#"{"subject": "Re: X200 pricing", "body": "The X200 costs $499."}"#.into(),
            tool_calls: vec![],
        }));
        let draft = drafter
            .draft_reply(Category::ProductEnquiry, "Price?", "The X200 costs $499.")
            .await
            .unwrap();
        assert_eq!(draft.subject, "Re: X200 pricing");
        assert_eq!(draft.body, "The X200 costs $499.");
    }

    #[tokio::test]
    async fn draft_reply_rejects_missing_fields() {
        let drafter = LlmDrafter::new(Arc::new(ScriptedLlm {
            text: r#"{"subject": "Re: hi"}"#.into(),
            tool_calls: vec![],
        }));
        let err = drafter
            .draft_reply(Category::Unrelated, "hi", "")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[test]
    fn parse_reply_draft_rejects_blank_body() {
        assert!(parse_reply_draft(r#"{"subject": "Re: x", "body": "  "}"#).is_err());
    }

    #[test]
    fn parse_reply_draft_handles_markdown_wrapping() {
        let raw = "```json\n{\"subject\": \"Re: x\", \"body\": \"y\"}\n```";
        let draft = parse_reply_draft(raw).unwrap();
        assert_eq!(draft.subject, "Re: x");
    }
}
