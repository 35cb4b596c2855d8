//! Error classification for pipeline steps.
//!
//! Retry and abort decisions are driven by the error kind, never by which
//! call site produced it.

use thiserror::Error;

use crate::core::artifact::ArtifactKind;

#[derive(Debug, Error)]
pub enum StepError {
    /// A required external tool is not installed.
    #[error("{tool} not found: {hint}")]
    Environment { tool: String, hint: String },

    #[error("{command} exited with status {code:?}: {stderr}")]
    Exit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("unexpected error: {0}")]
    Unexpected(String),

    /// Working copy is in a condition the requested strategy does not accept.
    #[error("working copy state: {0}")]
    State(String),

    #[error("no {kind} found in tool output")]
    Extraction { kind: ArtifactKind },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StepError {
    /// Transient tool failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Exit { .. } | Self::Timeout { .. } | Self::Unexpected(_)
        )
    }
}
