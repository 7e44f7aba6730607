//! Workflow state — the record threaded through every stage of a run.

use serde::{Deserialize, Serialize};

use crate::llm::ToolCall;

// ── Email ───────────────────────────────────────────────────────────

/// An email value. Immutable once constructed — a reply is a new value,
/// never a mutation of the original.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Opaque provider identifier.
    pub id: String,
    pub subject: String,
    /// Sender address.
    pub sender: String,
    /// Display string; not parsed.
    pub date: String,
    /// Plain-text body.
    pub body: String,
    /// Message-ID header; may be empty.
    #[serde(default)]
    pub message_id: String,
    /// References header; may be empty.
    #[serde(default)]
    pub references: String,
    /// Provider thread id; empty until the mail transport populates it.
    #[serde(default)]
    pub thread_id: String,
}

// ── Category ────────────────────────────────────────────────────────

/// Closed set of support categories.
///
/// `NoEmail` is assigned internally when a run starts with no input email;
/// it is never a valid classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ProductEnquiry,
    CustomerComplaint,
    CustomerFeedback,
    Unrelated,
    NoEmail,
}

impl Category {
    /// Parse a classifier-produced category label. Rejects unknown labels
    /// and the internal `no_email` sentinel.
    pub fn parse_external(label: &str) -> Option<Self> {
        match label.trim() {
            "product_enquiry" => Some(Self::ProductEnquiry),
            "customer_complaint" => Some(Self::CustomerComplaint),
            "customer_feedback" => Some(Self::CustomerFeedback),
            "unrelated" => Some(Self::Unrelated),
            _ => None,
        }
    }

    /// Label used in prompts and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProductEnquiry => "product_enquiry",
            Self::CustomerComplaint => "customer_complaint",
            Self::CustomerFeedback => "customer_feedback",
            Self::Unrelated => "unrelated",
            Self::NoEmail => "no_email",
        }
    }
}

// ── Response drafts ─────────────────────────────────────────────────

/// Structured reply produced by the with-context drafting pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyDraft {
    pub subject: String,
    pub body: String,
}

/// The drafted response. The first pass stores a raw candidate; the second
/// pass overwrites it with the authoritative structured reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseDraft {
    Raw { text: String },
    Structured { draft: ReplyDraft },
}

// ── Transcript ──────────────────────────────────────────────────────

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    Assistant,
    Tool,
}

/// One drafting turn: an assistant draft (optionally carrying a typed tool
/// request) or a tool result appended by the retrieval stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_request: Option<ToolCall>,
}

impl TranscriptEntry {
    pub fn assistant(content: impl Into<String>, tool_request: Option<ToolCall>) -> Self {
        Self {
            role: TranscriptRole::Assistant,
            content: content.into(),
            tool_request,
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::Tool,
            content: content.into(),
            tool_request: None,
        }
    }
}

// ── Workflow state ──────────────────────────────────────────────────

/// The single mutable record passed through the workflow graph.
///
/// Field ownership: `current_email` is written once by the loader,
/// `email_category` once by the categorizer, `email_response` by the drafting
/// stages (last write wins), `delivered` by the delivery stage. `messages` is
/// append-only — entries are added with `push_message` and never replaced.
/// Reading a field before its owning stage ran yields `None`, not a panic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    pub current_email: Option<Email>,
    pub email_category: Option<Category>,
    pub email_response: Option<ResponseDraft>,
    pub messages: Vec<TranscriptEntry>,
    /// Delivery outcome; `Some(false)` when the send failed or was skipped.
    pub delivered: Option<bool>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a run with an already-loaded email (used by tests and callers
    /// that fetch out of band).
    pub fn with_email(email: Email) -> Self {
        Self {
            current_email: Some(email),
            ..Self::default()
        }
    }

    /// Append a drafting turn. The transcript only ever grows.
    pub fn push_message(&mut self, entry: TranscriptEntry) {
        self.messages.push(entry);
    }

    /// The tool request carried by the most recent transcript entry, if any.
    pub fn pending_tool_request(&self) -> Option<&ToolCall> {
        self.messages.last().and_then(|m| m.tool_request.as_ref())
    }

    /// Context for the with-context drafting pass: the content of the most
    /// recent transcript entry when it is a tool (retrieval) result,
    /// otherwise empty. Exactly one retrieval round is supported per run.
    pub fn retrieval_context(&self) -> &str {
        match self.messages.last() {
            Some(entry) if entry.role == TranscriptRole::Tool => &entry.content,
            _ => "",
        }
    }

    /// Body of the current email, or empty when no email was loaded.
    pub fn email_body(&self) -> &str {
        self.current_email.as_ref().map_or("", |e| e.body.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_external_accepts_the_four_public_labels() {
        assert_eq!(
            Category::parse_external("product_enquiry"),
            Some(Category::ProductEnquiry)
        );
        assert_eq!(
            Category::parse_external("customer_complaint"),
            Some(Category::CustomerComplaint)
        );
        assert_eq!(
            Category::parse_external("customer_feedback"),
            Some(Category::CustomerFeedback)
        );
        assert_eq!(
            Category::parse_external("unrelated"),
            Some(Category::Unrelated)
        );
    }

    #[test]
    fn category_parse_external_rejects_sentinel_and_unknown() {
        assert_eq!(Category::parse_external("no_email"), None);
        assert_eq!(Category::parse_external("billing"), None);
        assert_eq!(Category::parse_external(""), None);
    }

    #[test]
    fn category_serde_uses_snake_case() {
        let json = serde_json::to_value(Category::ProductEnquiry).unwrap();
        assert_eq!(json, "product_enquiry");
    }

    #[test]
    fn fresh_state_reads_are_empty_not_panics() {
        let state = WorkflowState::new();
        assert!(state.current_email.is_none());
        assert!(state.email_category.is_none());
        assert!(state.email_response.is_none());
        assert!(state.messages.is_empty());
        assert!(state.pending_tool_request().is_none());
        assert_eq!(state.retrieval_context(), "");
        assert_eq!(state.email_body(), "");
    }

    #[test]
    fn push_message_appends() {
        let mut state = WorkflowState::new();
        state.push_message(TranscriptEntry::assistant("first", None));
        state.push_message(TranscriptEntry::tool("snippets"));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].content, "first");
        assert_eq!(state.messages[1].role, TranscriptRole::Tool);
    }

    #[test]
    fn pending_tool_request_reads_last_entry_only() {
        let call = ToolCall {
            id: "c1".into(),
            name: "search_knowledge_base".into(),
            arguments: serde_json::json!({"query": "q"}),
        };
        let mut state = WorkflowState::new();
        state.push_message(TranscriptEntry::assistant("draft", Some(call)));
        assert!(state.pending_tool_request().is_some());

        state.push_message(TranscriptEntry::tool("results"));
        assert!(state.pending_tool_request().is_none());
    }

    #[test]
    fn retrieval_context_only_from_tool_entries() {
        let mut state = WorkflowState::new();
        state.push_message(TranscriptEntry::assistant("a draft", None));
        assert_eq!(state.retrieval_context(), "");

        state.push_message(TranscriptEntry::tool("snippet text"));
        assert_eq!(state.retrieval_context(), "snippet text");
    }

    #[test]
    fn email_response_overwrites() {
        let mut state = WorkflowState::new();
        state.email_response = Some(ResponseDraft::Raw {
            text: "candidate".into(),
        });
        state.email_response = Some(ResponseDraft::Structured {
            draft: ReplyDraft {
                subject: "Re: X200".into(),
                body: "Final answer".into(),
            },
        });
        match state.email_response {
            Some(ResponseDraft::Structured { ref draft }) => {
                assert_eq!(draft.subject, "Re: X200");
            }
            _ => panic!("expected structured draft"),
        }
    }
}
