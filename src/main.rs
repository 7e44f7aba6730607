//! Binary entry point: wire up the capability clients from the environment
//! and run one workflow pass, printing a snapshot after each stage.

use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use support_flow::classify::LlmClassifier;
use support_flow::config::AppConfig;
use support_flow::draft::LlmDrafter;
use support_flow::llm::create_provider;
use support_flow::mail::SmtpImapMailer;
use support_flow::retrieval::KnowledgeBaseClient;
use support_flow::workflow::{Capabilities, SupportGraph, WorkflowState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // rustls backend for the IMAP connection.
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let mail_config = config
        .mail
        .clone()
        .context("Mail transport not configured; set EMAIL_IMAP_HOST")?;

    let categorizer_llm =
        create_provider(&config.categorizer_llm).context("Failed to create categorizer LLM")?;
    let writer_llm = create_provider(&config.writer_llm).context("Failed to create writer LLM")?;

    let caps = Capabilities {
        classifier: Arc::new(LlmClassifier::new(categorizer_llm)),
        retriever: Arc::new(KnowledgeBaseClient::new(config.retrieval.clone())),
        drafter: Arc::new(LlmDrafter::new(writer_llm)),
        mailer: Arc::new(SmtpImapMailer::new(mail_config)),
    };

    let graph = SupportGraph::new(caps);
    let (mut snapshots, handle) = graph.stream(WorkflowState::new());

    while let Some(snapshot) = snapshots.next().await {
        println!("--- {} ---", snapshot.stage);
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot.state).unwrap_or_default()
        );
    }

    let final_state = handle.await.context("Workflow task panicked")??;

    match final_state.delivered {
        Some(true) => info!("Run complete: reply delivered"),
        Some(false) => info!("Run complete: nothing delivered"),
        None => info!("Run complete"),
    }
    Ok(())
}
