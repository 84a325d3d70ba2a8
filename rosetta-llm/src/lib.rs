//! # rosetta-llm
//!
//! Language-model access for the rosetta solver.
//!
//! ## Core Concepts
//! - **Provider**: Trait-based LLM communication (OpenAI-compatible, Anthropic)
//! - **ReasoningModel**: The opaque prompt-in, structure-out capability the
//!   solver consumes, with deadline, retry, and JSON extraction
//! - **RetryPolicy**: Bounded exponential backoff for transient failures

pub mod json;
pub mod model;
pub mod provider;
pub mod retry;

pub use json::extract_json;
pub use model::{parse_structured, GenerateRequest, Generation, ProviderModel, ReasoningModel};
pub use provider::{
    AnthropicProvider, AnyProvider, ChatMessage, CompletionRequest, CompletionResponse,
    FinishReason, LlmProvider, OpenAIProvider, ProviderConfig, ProviderType, Role, Usage,
    UsageTracker,
};
pub use retry::RetryPolicy;
pub use rosetta_error::{Error, ErrorKind, ErrorStatus, Result};
