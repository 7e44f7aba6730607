//! Application configuration, read from environment variables.

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::mail::MailConfig;
use crate::retrieval::RetrievalConfig;

/// Everything the binary needs to wire up a workflow run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// LLM used for classification.
    pub categorizer_llm: LlmConfig,
    /// LLM used for both drafting passes.
    pub writer_llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    /// `None` when the mail transport is not configured.
    pub mail: Option<MailConfig>,
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// `SUPPORT_FLOW_BACKEND` selects the provider (`anthropic` default,
    /// `openai`); the matching `*_API_KEY` variable is required.
    /// `KNOWLEDGE_BASE_URL` is required. Mail variables are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match std::env::var("SUPPORT_FLOW_BACKEND")
            .unwrap_or_else(|_| "anthropic".to_string())
            .to_lowercase()
            .as_str()
        {
            "anthropic" => LlmBackend::Anthropic,
            "openai" => LlmBackend::OpenAi,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "SUPPORT_FLOW_BACKEND".into(),
                    message: format!("unknown backend {other:?}, expected anthropic or openai"),
                });
            }
        };

        let key_var = match backend {
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
        };
        let api_key = SecretString::from(require_env(key_var)?);

        let default_model = match backend {
            LlmBackend::Anthropic => "claude-sonnet-4-20250514",
            LlmBackend::OpenAi => "gpt-4o-mini",
        };
        let categorizer_model = std::env::var("SUPPORT_FLOW_CATEGORIZER_MODEL")
            .unwrap_or_else(|_| default_model.to_string());
        let writer_model = std::env::var("SUPPORT_FLOW_WRITER_MODEL")
            .unwrap_or_else(|_| categorizer_model.clone());

        let categorizer_llm = LlmConfig {
            backend,
            api_key: api_key.clone(),
            model: categorizer_model,
        };
        let writer_llm = LlmConfig {
            backend,
            api_key,
            model: writer_model,
        };

        let retrieval = RetrievalConfig {
            endpoint: require_env("KNOWLEDGE_BASE_URL")?,
            api_key: std::env::var("KNOWLEDGE_BASE_API_KEY")
                .ok()
                .map(SecretString::from),
            top_k: parse_env("KNOWLEDGE_BASE_TOP_K", RetrievalConfig::default().top_k)?,
            min_score: parse_env(
                "KNOWLEDGE_BASE_MIN_SCORE",
                RetrievalConfig::default().min_score,
            )?,
        };

        Ok(Self {
            categorizer_llm,
            writer_llm,
            retrieval,
            mail: MailConfig::from_env(),
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parse an optional env var; unset falls back, unparseable is an error.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; each uses its own variable names
    // where possible and runs with `--test-threads=1` if they ever flake.

    #[test]
    fn parse_env_falls_back_when_unset() {
        // SAFETY: no other thread reads this variable concurrently.
        unsafe { std::env::remove_var("SUPPORT_FLOW_TEST_UNSET") };
        let v: usize = parse_env("SUPPORT_FLOW_TEST_UNSET", 4).unwrap();
        assert_eq!(v, 4);
    }

    #[test]
    fn parse_env_rejects_garbage() {
        // SAFETY: variable is private to this test.
        unsafe { std::env::set_var("SUPPORT_FLOW_TEST_GARBAGE", "not-a-number") };
        let result: Result<usize, _> = parse_env("SUPPORT_FLOW_TEST_GARBAGE", 4);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        unsafe { std::env::remove_var("SUPPORT_FLOW_TEST_GARBAGE") };
    }

    #[test]
    fn require_env_reports_missing_variable() {
        // SAFETY: variable is private to this test.
        unsafe { std::env::remove_var("SUPPORT_FLOW_TEST_MISSING") };
        let err = require_env("SUPPORT_FLOW_TEST_MISSING").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(k) if k == "SUPPORT_FLOW_TEST_MISSING"));
    }
}
