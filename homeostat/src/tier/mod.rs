//! Escalation ladder tiers and their shared attempt record.

pub mod adaptive;
pub mod reflex;
pub mod swarm;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::TierError;
use crate::event::Event;

/// One stage of the escalation ladder, cheapest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Reflex,
    Swarm,
    Adaptive,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reflex => write!(f, "reflex"),
            Self::Swarm => write!(f, "swarm"),
            Self::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// The highest tier whose attempt succeeded, or `Human` if none did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    Human,
    Reflex,
    /// The swarm tier's autonomy level (innate immunity in the ladder's
    /// biological framing).
    Innate,
    Adaptive,
}

impl From<Tier> for AutonomyLevel {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Reflex => Self::Reflex,
            Tier::Swarm => Self::Innate,
            Tier::Adaptive => Self::Adaptive,
        }
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Reflex => write!(f, "reflex"),
            Self::Innate => write!(f, "innate"),
            Self::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Record of one tier actually executed for an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierAttempt {
    pub tier: Tier,
    pub succeeded: bool,
    /// Side effects actually executed, in order.
    pub actions: Vec<String>,
    /// Reflex/adaptive confidence; absent for the swarm tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Swarm containment verdict; absent for other tiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contained: Option<bool>,
    /// Wall-clock time for this tier only.
    pub latency: Duration,
    /// Reason / diagnosis / learned lesson.
    pub detail: String,
}

impl TierAttempt {
    /// A failed attempt carrying only a reason string.
    pub fn failed(tier: Tier, detail: impl Into<String>) -> Self {
        Self {
            tier,
            succeeded: false,
            actions: Vec::new(),
            confidence: None,
            contained: None,
            latency: Duration::ZERO,
            detail: detail.into(),
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Sentinel details mark mechanical failures with nothing worth
    /// persisting as a memory.
    pub fn is_sentinel_detail(&self) -> bool {
        matches!(
            self.detail.as_str(),
            "no_match"
                | "deadline_exceeded"
                | "low_confidence"
                | "no_applicable_cells"
                | "no_containment"
                | "adaptive_unavailable"
        )
    }
}

/// Executes a named remediation action against an event's resource.
///
/// The catalog of actions is external configuration; the runner is the
/// seam where those names become side effects. Implementations must be
/// idempotent; the reflex tier may retry an action for the same event.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, action: &str, event: &Event) -> Result<(), TierError>;
}

/// Runner that logs the action and reports success. Default for demos and
/// dry-run deployments where actions are audited but not executed.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingActionRunner;

#[async_trait]
impl ActionRunner for LoggingActionRunner {
    async fn run(&self, action: &str, event: &Event) -> Result<(), TierError> {
        info!(action, event_id = %event.id, resource = %event.resource, "Executing action (log-only)");
        Ok(())
    }
}
