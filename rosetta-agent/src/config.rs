//! Workflow configuration loaded from TOML.

use crate::verdict::MAX_TOP_RECOMMENDATIONS;
use crate::verify::AggregationPolicy;
use rosetta_error::{Error, Result};
use rosetta_llm::{ProviderConfig, ProviderType, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub provider: ProviderSection,
    pub retry: RetrySection,
    pub workflow: WorkflowSection,
    pub aggregation: AggregationSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub kind: ProviderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: ProviderType::OpenAI,
            model: None,
            base_url: None,
            api_key_env: None,
            timeout_secs: 300,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    pub max_iterations: u32,
    /// Upper bound on leaf verifier calls in flight
    pub concurrency: usize,
    /// Extra attempts for a failed leaf verifier call
    pub leaf_retries: u32,
    pub bidirectional: bool,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_iterations: 4,
            concurrency: 4,
            leaf_retries: 1,
            bidirectional: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSection {
    pub major_issue_fraction: f64,
    pub inconsistency_is_major: bool,
    pub max_recommendations: usize,
}

impl Default for AggregationSection {
    fn default() -> Self {
        Self {
            major_issue_fraction: 0.5,
            inconsistency_is_major: true,
            max_recommendations: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl WorkflowConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| {
            Error::config_invalid(format!("invalid configuration: {}", e))
                .with_operation("WorkflowConfig::from_toml")
                .set_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("WorkflowConfig::load")
                .with_context("path", path.display().to_string())
        })?;
        Self::from_toml(&text)
            .map_err(|e| e.with_context("path", path.display().to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            Error::new(rosetta_error::ErrorKind::SerializationFailed, e.to_string())
                .with_operation("WorkflowConfig::to_toml")
        })
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &'static str, message: String| {
            Err(Error::config_invalid(message)
                .with_operation("WorkflowConfig::validate")
                .with_context("field", field))
        };

        if self.workflow.concurrency == 0 {
            return invalid("workflow.concurrency", "concurrency must be at least 1".into());
        }
        let fraction = self.aggregation.major_issue_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return invalid(
                "aggregation.major_issue_fraction",
                format!("major_issue_fraction must be in (0, 1], got {}", fraction),
            );
        }
        if !(1..=MAX_TOP_RECOMMENDATIONS).contains(&self.aggregation.max_recommendations) {
            return invalid(
                "aggregation.max_recommendations",
                format!(
                    "max_recommendations must be between 1 and {}, got {}",
                    MAX_TOP_RECOMMENDATIONS, self.aggregation.max_recommendations
                ),
            );
        }
        if self.provider.timeout_secs == 0 {
            return invalid("provider.timeout_secs", "timeout_secs must be positive".into());
        }
        Ok(())
    }

    /// Provider settings with the API key resolved from the environment
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let section = &self.provider;
        let key_env = section
            .api_key_env
            .as_deref()
            .or_else(|| section.kind.default_key_env());
        let api_key = key_env.and_then(|name| std::env::var(name).ok());

        let mut config = match section.kind {
            ProviderType::OpenAI => ProviderConfig::openai(api_key.clone().unwrap_or_default()),
            ProviderType::Anthropic => {
                ProviderConfig::anthropic(api_key.clone().unwrap_or_default())
            }
            ProviderType::Bridge => ProviderConfig::bridge(),
            ProviderType::Local => {
                let base_url = section.base_url.clone().ok_or_else(|| {
                    Error::config_invalid("local provider requires provider.base_url")
                        .with_operation("WorkflowConfig::provider_config")
                })?;
                let model = section.model.clone().ok_or_else(|| {
                    Error::config_invalid("local provider requires provider.model")
                        .with_operation("WorkflowConfig::provider_config")
                })?;
                ProviderConfig::local(base_url, model)
            }
        };

        if matches!(section.kind, ProviderType::OpenAI | ProviderType::Anthropic) {
            config.api_key = api_key.filter(|k| !k.is_empty());
        }
        if let Some(model) = &section.model {
            config = config.with_model(model);
        }
        if let Some(base_url) = &section.base_url {
            config = config.with_base_url(base_url);
        }
        Ok(config.with_timeout(section.timeout_secs))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }

    pub fn aggregation_policy(&self) -> AggregationPolicy {
        AggregationPolicy {
            major_issue_fraction: self.aggregation.major_issue_fraction,
            inconsistency_is_major: self.aggregation.inconsistency_is_major,
            max_recommendations: self.aggregation.max_recommendations,
        }
    }
}
