//! Error types for support-flow.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors (the classifier and drafter both ride on these).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Knowledge-base retrieval errors.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Knowledge base request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid knowledge base response: {0}")]
    InvalidResponse(String),
}

/// Mail transport errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to send mail: {0}")]
    SendFailed(String),

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Run-level workflow failures.
///
/// Everything here is fatal to the run: the executor performs no retries and
/// has no fallback path. Delivery failure is not represented; the delivery
/// stage catches it and records a boolean outcome instead.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Classification failed: {0}")]
    Classification(#[source] LlmError),

    #[error("Drafting failed: {0}")]
    Drafting(#[source] LlmError),

    #[error("Context retrieval failed: {0}")]
    Retrieval(#[source] RetrievalError),

    #[error("Routed to retrieval without a pending tool request")]
    MissingToolRequest,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
