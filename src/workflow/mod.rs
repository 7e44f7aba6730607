//! The support workflow: state, stages, and the graph that runs them.

pub mod graph;
pub mod stage;
pub mod state;

pub use graph::{Route, SnapshotStream, StageSnapshot, SupportGraph, route_after_draft};
pub use stage::{Capabilities, Stage, StageName};
pub use state::{
    Category, Email, ReplyDraft, ResponseDraft, TranscriptEntry, TranscriptRole, WorkflowState,
};
