//! # Reasoning capability
//!
//! The solver treats the language model as an opaque, fallible, possibly
//! slow function: prompt in, text (and optionally a JSON object) out.
//! `ReasoningModel` is that seam. `ProviderModel` implements it over any
//! `LlmProvider`, adding a per-call deadline, bounded retry of transient
//! faults, JSON extraction, and token accounting.

use crate::json::extract_json;
use crate::provider::{ChatMessage, CompletionRequest, LlmProvider, Usage, UsageTracker};
use crate::retry::RetryPolicy;
use rosetta_error::{Error, Result};
use serde::de::DeserializeOwned;
use std::sync::Mutex;
use std::time::Duration;

/// One call to the reasoning capability
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Stable identifier of the calling agent, used for logs and stubs
    pub agent: String,
    pub system: Option<String>,
    pub prompt: String,
    /// The reply must contain a JSON object or array
    pub expect_json: bool,
    /// Overrides the model's default deadline
    pub timeout: Option<Duration>,
}

impl GenerateRequest {
    /// Free-text request
    pub fn text(agent: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            system: None,
            prompt: prompt.into(),
            expect_json: false,
            timeout: None,
        }
    }

    /// Request whose reply must be structured
    pub fn json(agent: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            expect_json: true,
            ..Self::text(agent, prompt)
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The reply to a `GenerateRequest`
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub text: String,
    /// Present when JSON was requested (and found)
    pub object: Option<serde_json::Value>,
    pub usage: Usage,
}

impl Generation {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn from_object(object: serde_json::Value) -> Self {
        Self {
            text: object.to_string(),
            object: Some(object),
            usage: Usage::default(),
        }
    }
}

/// The opaque prompt-in, structure-out capability
#[allow(async_fn_in_trait)]
pub trait ReasoningModel: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<Generation>;
}

/// Deserialize the structured part of a generation.
///
/// Any mismatch is a schema failure: retrying the same call rarely fixes it.
pub fn parse_structured<T: DeserializeOwned>(generation: &Generation) -> Result<T> {
    let object = generation.object.clone().ok_or_else(|| {
        Error::schema_invalid("reply carried no JSON object").with_operation("model::parse_structured")
    })?;
    serde_json::from_value(object).map_err(|e| {
        Error::schema_invalid(format!("reply did not match expected structure: {}", e))
            .with_operation("model::parse_structured")
            .with_context("type", std::any::type_name::<T>())
            .set_source(e)
    })
}

/// `ReasoningModel` backed by a chat-completion provider
pub struct ProviderModel<P> {
    provider: P,
    retry: RetryPolicy,
    timeout: Duration,
    temperature: Option<f32>,
    usage: Mutex<UsageTracker>,
}

impl<P: LlmProvider> ProviderModel<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(300),
            temperature: None,
            usage: Mutex::new(UsageTracker::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Snapshot of token usage so far
    pub fn usage(&self) -> UsageTracker {
        self.usage.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn completion(&self, request: &GenerateRequest) -> CompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(&request.prompt));

        let mut completion = CompletionRequest::new(messages).with_json_mode(request.expect_json);
        if let Some(temperature) = self.temperature {
            completion = completion.with_temperature(temperature);
        }
        completion
    }
}

impl<P: LlmProvider> ReasoningModel for ProviderModel<P> {
    async fn generate(&self, request: GenerateRequest) -> Result<Generation> {
        let deadline = request.timeout.unwrap_or(self.timeout);

        let (text, usage, finish_reason) = self
            .retry
            .run("model::generate", |attempt| {
                let completion = self.completion(&request);
                let agent = request.agent.as_str();
                async move {
                    tracing::debug!(agent, attempt, "model call");
                    let response = tokio::time::timeout(deadline, self.provider.complete(completion))
                        .await
                        .map_err(|_| Error::timeout(deadline.as_secs()))??;

                    if let Ok(mut tracker) = self.usage.lock() {
                        tracker.track(&response.model, &response.usage);
                    }

                    match response.content {
                        Some(text) if !text.trim().is_empty() => {
                            Ok((text, response.usage, response.finish_reason))
                        }
                        _ => Err(Error::empty_response()),
                    }
                }
            })
            .await
            .map_err(|e| {
                e.with_operation("model::generate")
                    .with_context("agent", request.agent.clone())
            })?;

        let object = if request.expect_json {
            let value = extract_json(&text).ok_or_else(|| {
                Error::schema_invalid("expected a JSON object in the reply")
                    .with_operation("model::generate")
                    .with_context("agent", request.agent.clone())
                    .with_context("reply_chars", text.len().to_string())
                    .with_context("finish_reason", finish_reason.as_str())
            })?;
            Some(value)
        } else {
            None
        };

        Ok(Generation { text, object, usage })
    }
}
