//! The workflow graph: fixed topology, one conditional edge.
//!
//! ```text
//! load_email -> categorize -> draft_no_context -+-> retrieve_context -+
//!                                               |                     v
//!                                               +---------> draft_with_context -> deliver -> done
//! ```
//!
//! The single branch keys on the typed tool-request tag left by the first
//! drafting pass. A run either executes the retrieval stage exactly once or
//! not at all.

use std::pin::Pin;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::WorkflowError;
use crate::workflow::stage::{
    Capabilities, Categorize, Deliver, DraftNoContext, DraftWithContext, LoadEmail,
    RetrieveContext, Stage, StageName,
};
use crate::workflow::state::WorkflowState;

/// Where the run goes after the first drafting pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The drafter requested a knowledge-base lookup.
    Retrieve,
    /// No tool request; proceed with empty context.
    Direct,
}

/// Routing decision after `draft_no_context`. Matches the typed tag on the
/// last transcript entry; message text is never inspected.
pub fn route_after_draft(state: &WorkflowState) -> Route {
    if state.pending_tool_request().is_some() {
        Route::Retrieve
    } else {
        Route::Direct
    }
}

/// A state snapshot emitted after each stage transition.
#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub stage: StageName,
    pub state: WorkflowState,
}

/// Stream of per-transition snapshots.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = StageSnapshot> + Send>>;

/// The support workflow executor. Cheap to clone; stages share the
/// capability clients behind `Arc`.
#[derive(Clone)]
pub struct SupportGraph {
    load: LoadEmail,
    categorize: Categorize,
    draft_no_context: DraftNoContext,
    retrieve: RetrieveContext,
    draft_with_context: DraftWithContext,
    deliver: Deliver,
}

impl SupportGraph {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            load: LoadEmail::new(caps.mailer.clone()),
            categorize: Categorize::new(caps.classifier),
            draft_no_context: DraftNoContext::new(caps.drafter.clone()),
            retrieve: RetrieveContext::new(caps.retriever),
            draft_with_context: DraftWithContext::new(caps.drafter),
            deliver: Deliver::new(caps.mailer),
        }
    }

    /// Run the workflow to completion and return the final state.
    pub async fn run(&self, seed: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        self.run_with_observer(seed, |_, _| {}).await
    }

    /// Run the workflow, invoking `observe` with a name and the state after
    /// every transition. The final invocation carries `StageName::Done`.
    pub async fn run_with_observer<F>(
        &self,
        mut state: WorkflowState,
        mut observe: F,
    ) -> Result<WorkflowState, WorkflowError>
    where
        F: FnMut(StageName, &WorkflowState),
    {
        state = self.step(&self.load, state, &mut observe).await?;
        state = self.step(&self.categorize, state, &mut observe).await?;
        state = self.step(&self.draft_no_context, state, &mut observe).await?;

        match route_after_draft(&state) {
            Route::Retrieve => {
                state = self.step(&self.retrieve, state, &mut observe).await?;
            }
            Route::Direct => {
                debug!("No tool request; drafting with empty context");
            }
        }

        state = self.step(&self.draft_with_context, state, &mut observe).await?;
        state = self.step(&self.deliver, state, &mut observe).await?;

        observe(StageName::Done, &state);
        Ok(state)
    }

    async fn step<S, F>(
        &self,
        stage: &S,
        state: WorkflowState,
        observe: &mut F,
    ) -> Result<WorkflowState, WorkflowError>
    where
        S: Stage,
        F: FnMut(StageName, &WorkflowState),
    {
        debug!(stage = %stage.name(), "Running stage");
        let state = stage.apply(state).await?;
        observe(stage.name(), &state);
        Ok(state)
    }

    /// Run the workflow on a background task, streaming a snapshot after
    /// every transition. The join handle resolves to the final state.
    pub fn stream(
        &self,
        seed: WorkflowState,
    ) -> (SnapshotStream, JoinHandle<Result<WorkflowState, WorkflowError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let graph = self.clone();

        let handle = tokio::spawn(async move {
            graph
                .run_with_observer(seed, move |stage, state| {
                    // Receiver gone means the caller stopped listening; the
                    // run still completes.
                    let _ = tx.send(StageSnapshot {
                        stage,
                        state: state.clone(),
                    });
                })
                .await
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|snapshot| (snapshot, rx))
        });

        (Box::pin(stream), handle)
    }
}
