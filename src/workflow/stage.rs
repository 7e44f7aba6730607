//! Workflow stages — one named implementation per processing step.
//!
//! Stages are registered explicitly in the graph's fixed topology; there is
//! no string-keyed dispatch. Each stage consumes and returns the whole
//! `WorkflowState`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::classify::Classifier;
use crate::draft::{DraftOutcome, Drafter};
use crate::error::WorkflowError;
use crate::mail::{Mailer, reply_subject};
use crate::retrieval::{Retriever, format_snippets};
use crate::workflow::state::{
    Category, ReplyDraft, ResponseDraft, TranscriptEntry, WorkflowState,
};

/// Names of the workflow stages, in topology order. `Done` is the terminal
/// marker emitted after the last stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageName {
    LoadEmail,
    Categorize,
    DraftNoContext,
    RetrieveContext,
    DraftWithContext,
    Deliver,
    Done,
}

impl StageName {
    pub fn label(&self) -> &'static str {
        match self {
            Self::LoadEmail => "load_email",
            Self::Categorize => "categorize",
            Self::DraftNoContext => "draft_no_context",
            Self::RetrieveContext => "retrieve_context",
            Self::DraftWithContext => "draft_with_context",
            Self::Deliver => "deliver",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The capability clients a workflow run depends on. Constructed by the
/// caller and shared read-only across concurrent runs.
#[derive(Clone)]
pub struct Capabilities {
    pub classifier: Arc<dyn Classifier>,
    pub retriever: Arc<dyn Retriever>,
    pub drafter: Arc<dyn Drafter>,
    pub mailer: Arc<dyn Mailer>,
}

/// One step in the workflow graph.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    /// Run the stage, consuming and returning the whole state.
    async fn apply(&self, state: WorkflowState) -> Result<WorkflowState, WorkflowError>;
}

// ── LoadEmail ───────────────────────────────────────────────────────

/// Fetches the newest inbound email. Nothing available is a valid outcome;
/// the rest of the topology still runs.
#[derive(Clone)]
pub struct LoadEmail {
    mailer: Arc<dyn Mailer>,
}

impl LoadEmail {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl Stage for LoadEmail {
    fn name(&self) -> StageName {
        StageName::LoadEmail
    }

    async fn apply(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        // A pre-seeded email (e.g. from a caller that fetched out of band)
        // is kept; the loader writes the field at most once.
        if state.current_email.is_none() {
            state.current_email = self.mailer.fetch_latest().await;
        }
        match &state.current_email {
            Some(email) => info!(id = %email.id, sender = %email.sender, "Email loaded"),
            None => info!("No inbound email available"),
        }
        Ok(state)
    }
}

// ── Categorize ──────────────────────────────────────────────────────

/// Classifies the email body. With no input email it writes the `NoEmail`
/// sentinel and returns — the topology has no early-exit edge, so later
/// stages still run against the empty state.
#[derive(Clone)]
pub struct Categorize {
    classifier: Arc<dyn Classifier>,
}

impl Categorize {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl Stage for Categorize {
    fn name(&self) -> StageName {
        StageName::Categorize
    }

    async fn apply(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let Some(email) = &state.current_email else {
            state.email_category = Some(Category::NoEmail);
            return Ok(state);
        };

        let category = self
            .classifier
            .classify(&email.body)
            .await
            .map_err(WorkflowError::Classification)?;

        info!(category = category.label(), "Email categorized");
        state.email_category = Some(category);
        Ok(state)
    }
}

// ── DraftNoContext ──────────────────────────────────────────────────

/// First drafting pass, tool-enabled, empty context. Single shot: a tool
/// request is recorded for the router, not resolved here.
#[derive(Clone)]
pub struct DraftNoContext {
    drafter: Arc<dyn Drafter>,
}

impl DraftNoContext {
    pub fn new(drafter: Arc<dyn Drafter>) -> Self {
        Self { drafter }
    }
}

#[async_trait]
impl Stage for DraftNoContext {
    fn name(&self) -> StageName {
        StageName::DraftNoContext
    }

    async fn apply(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        // No-email runs pass through every stage but never call out.
        if state.current_email.is_none() {
            return Ok(state);
        }

        let category = state.email_category.unwrap_or(Category::NoEmail);
        let body = state.email_body().to_string();

        let outcome = self
            .drafter
            .draft(category, &body, "")
            .await
            .map_err(WorkflowError::Drafting)?;

        match outcome {
            DraftOutcome::Final(text) => {
                state.push_message(TranscriptEntry::assistant(text.clone(), None));
                state.email_response = Some(ResponseDraft::Raw { text });
            }
            DraftOutcome::ToolRequest { call, preamble } => {
                let text = preamble.unwrap_or_default();
                state.push_message(TranscriptEntry::assistant(text.clone(), Some(call)));
                state.email_response = Some(ResponseDraft::Raw { text });
            }
        }
        Ok(state)
    }
}

// ── RetrieveContext ─────────────────────────────────────────────────

/// Executes the drafter's pending tool request against the knowledge base
/// and appends the result to the transcript. At most one round per run.
#[derive(Clone)]
pub struct RetrieveContext {
    retriever: Arc<dyn Retriever>,
}

impl RetrieveContext {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Stage for RetrieveContext {
    fn name(&self) -> StageName {
        StageName::RetrieveContext
    }

    async fn apply(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let Some(call) = state.pending_tool_request() else {
            return Err(WorkflowError::MissingToolRequest);
        };

        let query = call
            .arguments
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or(state.email_body())
            .to_string();

        let snippets = self
            .retriever
            .search(&query)
            .await
            .map_err(WorkflowError::Retrieval)?;

        info!(count = snippets.len(), "Context retrieved");
        state.push_message(TranscriptEntry::tool(format_snippets(&snippets)));
        Ok(state)
    }
}

// ── DraftWithContext ────────────────────────────────────────────────

/// Second drafting pass: structured subject/body output, context taken from
/// the retrieval result when one exists. Writes only `email_response` — the
/// transcript stays as the first pass left it.
#[derive(Clone)]
pub struct DraftWithContext {
    drafter: Arc<dyn Drafter>,
}

impl DraftWithContext {
    pub fn new(drafter: Arc<dyn Drafter>) -> Self {
        Self { drafter }
    }
}

#[async_trait]
impl Stage for DraftWithContext {
    fn name(&self) -> StageName {
        StageName::DraftWithContext
    }

    async fn apply(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        if state.current_email.is_none() {
            return Ok(state);
        }

        let category = state.email_category.unwrap_or(Category::NoEmail);
        let body = state.email_body().to_string();
        let context = state.retrieval_context().to_string();

        let draft = self
            .drafter
            .draft_reply(category, &body, &context)
            .await
            .map_err(WorkflowError::Drafting)?;

        state.email_response = Some(ResponseDraft::Structured { draft });
        Ok(state)
    }
}

// ── Deliver ─────────────────────────────────────────────────────────

/// Sends the threaded reply. Send failure is caught and recorded as a
/// boolean outcome; it never fails the run. A run with no email or no
/// response records a non-delivery instead of attempting an empty send.
#[derive(Clone)]
pub struct Deliver {
    mailer: Arc<dyn Mailer>,
}

impl Deliver {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl Stage for Deliver {
    fn name(&self) -> StageName {
        StageName::Deliver
    }

    async fn apply(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let (Some(email), Some(response)) = (&state.current_email, &state.email_response) else {
            warn!("Nothing to deliver: missing email or response");
            state.delivered = Some(false);
            return Ok(state);
        };

        let reply = match response {
            ResponseDraft::Structured { draft } => draft.clone(),
            ResponseDraft::Raw { text } => ReplyDraft {
                subject: reply_subject(&email.subject),
                body: text.clone(),
            },
        };

        match self.mailer.send_reply(email, &reply).await {
            Ok(()) => {
                info!(to = %email.sender, "Reply delivered");
                state.delivered = Some(true);
            }
            Err(e) => {
                warn!(error = %e, "Delivery failed");
                state.delivered = Some(false);
            }
        }
        Ok(state)
    }
}
