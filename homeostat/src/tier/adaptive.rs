//! Adaptive tier: thin call boundary to the cognitive-reasoning
//! collaborator.
//!
//! The collaborator's internals (prompting, model invocation, learning)
//! live elsewhere; this gateway only frames the call: event plus the
//! reflex/swarm attempt history as context, one deadline, and graceful
//! degradation when the collaborator is unreachable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::error::TierError;
use crate::event::Event;
use crate::tier::{Tier, TierAttempt};

/// What the collaborator returns from one reflection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    /// Diagnosis or learned lesson.
    pub detail: String,
    /// Whether the collaborator resolved the incident.
    pub succeeded: bool,
    /// Confidence in [0,1].
    pub confidence: f64,
}

/// The external cognitive-reasoning capability, seen only at its boundary.
#[async_trait]
pub trait ReasoningCollaborator: Send + Sync {
    async fn reflect(
        &self,
        event: &Event,
        attempts: &[TierAttempt],
    ) -> Result<Reflection, TierError>;
}

/// Tier 3: one collaborator call under its own deadline.
pub struct AdaptiveGateway {
    collaborator: Arc<dyn ReasoningCollaborator>,
    deadline: Duration,
}

impl AdaptiveGateway {
    pub fn new(collaborator: Arc<dyn ReasoningCollaborator>, config: &PipelineConfig) -> Self {
        Self {
            collaborator,
            deadline: config.adaptive_deadline,
        }
    }

    /// Ask the collaborator to reflect on the event and the prior attempt
    /// history. Unreachable, timed out, or erroring collaborators yield a
    /// normal failed attempt, never a pipeline error.
    pub async fn attempt(&self, event: &Event, prior_attempts: &[TierAttempt]) -> TierAttempt {
        let started = Instant::now();
        let result = timeout(
            self.deadline,
            self.collaborator.reflect(event, prior_attempts),
        )
        .await;

        let attempt = match result {
            Ok(Ok(reflection)) => TierAttempt {
                tier: Tier::Adaptive,
                succeeded: reflection.succeeded,
                actions: Vec::new(),
                confidence: Some(reflection.confidence.clamp(0.0, 1.0)),
                contained: None,
                latency: Duration::ZERO,
                detail: reflection.detail,
            },
            Ok(Err(e)) => {
                warn!(event_id = %event.id, error = %e, "Reasoning collaborator failed");
                TierAttempt::failed(Tier::Adaptive, "adaptive_unavailable")
            }
            Err(_) => {
                warn!(
                    event_id = %event.id,
                    deadline_secs = self.deadline.as_secs(),
                    "Reasoning collaborator timed out"
                );
                TierAttempt::failed(Tier::Adaptive, "adaptive_unavailable")
            }
        };
        attempt.with_latency(started.elapsed())
    }
}

/// HTTP-backed collaborator client: posts `{event, attempts}` as JSON and
/// expects a [`Reflection`] body back.
pub struct HttpCollaborator {
    client: reqwest::Client,
    url: String,
}

impl HttpCollaborator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[derive(Serialize)]
struct ReflectRequest<'a> {
    event: &'a Event,
    attempts: &'a [TierAttempt],
}

#[async_trait]
impl ReasoningCollaborator for HttpCollaborator {
    async fn reflect(
        &self,
        event: &Event,
        attempts: &[TierAttempt],
    ) -> Result<Reflection, TierError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ReflectRequest { event, attempts })
            .send()
            .await
            .map_err(|e| TierError::CollaboratorUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| TierError::CollaboratorUnavailable(e.to_string()))?;

        response
            .json::<Reflection>()
            .await
            .map_err(|e| TierError::CollaboratorUnavailable(format!("bad reflection body: {e}")))
    }
}
