//! Error kinds for rosetta operations

use std::fmt;

/// The kind of error that occurred.
///
/// Kinds are grouped the way the pipeline treats them: terminal step
/// failures bail the whole run, schema failures are terminal but logged
/// apart from them, infrastructure faults are retried, and leaf
/// verification failures only reduce coverage of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Terminal step failures
    // =========================================================================
    /// No usable dataset and questions could be identified in the input
    ExtractionFailed,

    /// The initial rule hypothesis could not be produced
    HypothesisFailed,

    /// The rule improver could not produce a revised rule set
    ImprovementFailed,

    /// Questions could not be resolved with the final rules
    AnswerFailed,

    /// Model output did not satisfy the expected structure
    SchemaInvalid,

    // =========================================================================
    // Verification
    // =========================================================================
    /// A single rule or sentence test could not be completed
    VerificationFailed,

    /// The run was aborted by the caller
    Cancelled,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// The model returned no content
    EmptyResponse,

    /// A model call exceeded its deadline
    Timeout,

    /// Provider not available
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    /// Credentials were rejected
    AuthenticationFailed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Serialization/deserialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Steps
            ErrorKind::ExtractionFailed => "ExtractionFailed",
            ErrorKind::HypothesisFailed => "HypothesisFailed",
            ErrorKind::ImprovementFailed => "ImprovementFailed",
            ErrorKind::AnswerFailed => "AnswerFailed",
            ErrorKind::SchemaInvalid => "SchemaInvalid",

            // Verification
            ErrorKind::VerificationFailed => "VerificationFailed",
            ErrorKind::Cancelled => "Cancelled",

            // Inference
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::EmptyResponse => "EmptyResponse",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::EmptyResponse
                | ErrorKind::Timeout
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
        )
    }

    /// Terminal failure of one of the bail-on-failure pipeline steps
    pub fn is_step_failure(&self) -> bool {
        matches!(
            self,
            ErrorKind::ExtractionFailed
                | ErrorKind::HypothesisFailed
                | ErrorKind::ImprovementFailed
                | ErrorKind::AnswerFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
