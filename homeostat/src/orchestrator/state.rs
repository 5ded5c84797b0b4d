//! Pipeline state machine: explicit states and legal transition guards.
//!
//! Gives each event's pipeline a typed state model so that every
//! transition is auditable and logged, and illegal sequences are caught
//! by the guard rather than silently walked past.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The per-event pipeline states.
///
/// Every pipeline starts at `Received` and terminates at either
/// `Resolved` or `Escalated`; both produce exactly one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Raw payload accepted, not yet normalized.
    Received,
    /// Canonical event produced.
    Normalized,
    /// Reflex tier attempt recorded.
    ReflexDone,
    /// Swarm tier attempt recorded.
    SwarmDone,
    /// Adaptive tier attempt recorded.
    AdaptiveDone,
    /// A tier resolved the incident. Terminal.
    Resolved,
    /// All applicable tiers failed, or normalization failed. Terminal.
    Escalated,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Escalated)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Normalized => write!(f, "normalized"),
            Self::ReflexDone => write!(f, "reflex_done"),
            Self::SwarmDone => write!(f, "swarm_done"),
            Self::AdaptiveDone => write!(f, "adaptive_done"),
            Self::Resolved => write!(f, "resolved"),
            Self::Escalated => write!(f, "escalated"),
        }
    }
}

/// Legal edges of the state graph:
/// ```text
/// Received → Normalized | Escalated (malformed_event)
/// Normalized → ReflexDone
/// ReflexDone → Resolved | SwarmDone
/// SwarmDone → Resolved | AdaptiveDone
/// AdaptiveDone → Resolved | Escalated
/// ```
pub fn is_legal_transition(from: PipelineState, to: PipelineState) -> bool {
    use PipelineState::*;
    matches!(
        (from, to),
        (Received, Normalized)
            | (Received, Escalated)
            | (Normalized, ReflexDone)
            | (ReflexDone, Resolved)
            | (ReflexDone, SwarmDone)
            | (SwarmDone, Resolved)
            | (SwarmDone, AdaptiveDone)
            | (AdaptiveDone, Resolved)
            | (AdaptiveDone, Escalated)
    )
}

/// Tracks one pipeline's state and its transition history.
#[derive(Debug, Clone)]
pub struct StateTrack {
    event_id: String,
    current: PipelineState,
    transitions: Vec<(PipelineState, PipelineState)>,
}

impl StateTrack {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            current: PipelineState::Received,
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> PipelineState {
        self.current
    }

    pub fn transitions(&self) -> &[(PipelineState, PipelineState)] {
        &self.transitions
    }

    /// Advance to `to`, recording the edge. An illegal edge is logged and
    /// still taken; the orchestrator's control flow is the real guard and
    /// this track exists for audit, not for control.
    pub fn advance(&mut self, to: PipelineState) {
        if !is_legal_transition(self.current, to) {
            warn!(
                event_id = %self.event_id,
                from = %self.current,
                to = %to,
                "Illegal pipeline state transition"
            );
        } else {
            debug!(event_id = %self.event_id, from = %self.current, to = %to, "Pipeline transition");
        }
        self.transitions.push((self.current, to));
        self.current = to;
    }
}
