//! support-flow — an email support workflow.
//!
//! Fetches the newest inbound support email, classifies it, drafts a reply
//! with an optional knowledge-base retrieval round, and sends the reply back
//! on the original thread. The whole run is a fixed-topology state machine
//! with one conditional edge; see [`workflow::SupportGraph`].

pub mod classify;
pub mod config;
pub mod draft;
pub mod error;
pub mod llm;
pub mod mail;
pub mod prompts;
pub mod retrieval;
pub mod workflow;

pub use error::{Error, Result};
