//! Engine error types.
//!
//! Defined as a typed enum so the orchestrator and the CLI can downcast
//! `anyhow` errors and tell recoverable outcomes (deferred BTS scoring, an
//! exhausted item bank) apart from defects and misconfiguration.

use thiserror::Error;

/// Errors raised by the IRT engine, the BTS engine and the session orchestrator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Invalid configuration bounds. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An item carries parameters the model cannot score.
    #[error("item '{item_id}' failed integrity check: {reason}")]
    DataIntegrity { item_id: String, reason: String },

    /// Not enough community samples to score peer predictions yet.
    #[error("case '{case_id}' has {sample_count} community samples, {required} required")]
    InsufficientData {
        case_id: String,
        sample_count: u32,
        required: u32,
    },

    /// No eligible items remain for the domain.
    #[error("no eligible items remain in domain '{domain}'")]
    ExhaustedBank { domain: String },

    /// A value object was constructed out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A submission referenced a case other than the one presented.
    #[error("expected a response for case '{expected}', got '{got}'")]
    UnexpectedCase { expected: String, got: String },

    /// The session already reached a terminal state.
    #[error("session {0} has already finished")]
    SessionFinished(uuid::Uuid),
}

impl EngineError {
    /// Returns `true` for outcomes a caller is expected to handle and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientData { .. } | EngineError::ExhaustedBank { .. }
        )
    }

    pub(crate) fn data_integrity(item_id: &str, reason: impl Into<String>) -> Self {
        EngineError::DataIntegrity {
            item_id: item_id.to_string(),
            reason: reason.into(),
        }
    }
}
