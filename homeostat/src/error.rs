//! Error taxonomy for the remediation pipeline.
//!
//! Propagation policy: nothing below the orchestrator boundary may raise
//! past it. [`NormalizationError`] auto-escalates to human; every
//! [`TierError`] is caught at the tier boundary and converted into a failed
//! `TierAttempt`. Callers of `process()` always receive a well-formed
//! `Outcome`, never an error.

use crate::event::SourceKind;

/// A raw payload could not yield the minimum `{source, kind, severity}`.
#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    #[error("{source} payload is not a JSON object")]
    NotAnObject { source: SourceKind },

    #[error("{source} payload missing required field `{field}`")]
    MissingField {
        source: SourceKind,
        field: &'static str,
    },

    #[error("malformed {source} payload: {reason}")]
    Malformed { source: SourceKind, reason: String },
}

/// Internal tier failures. Never surfaced past the tier boundary.
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    /// The tier's deadline elapsed before a decision was made.
    #[error("tier deadline exceeded")]
    DeadlineExceeded,

    /// A remediation action raised during execution.
    #[error("action `{action}` failed: {reason}")]
    ExecutionFailed { action: String, reason: String },

    /// The reasoning collaborator is unreachable or returned garbage.
    /// Adaptive tier only.
    #[error("reasoning collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
}
