//! Escalation orchestrator: sequences the tier ladder per event.
//!
//! One logical pipeline per incoming event, processed concurrently with
//! other events' pipelines; within one pipeline the tiers run strictly
//! sequentially and a later tier is never started once an earlier one has
//! resolved the incident. Every terminal outcome is pushed into the shared
//! [`HomeostasisTracker`], and memories are persisted fire-and-forget.

pub mod state;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::event::normalizer::EventNormalizer;
use crate::event::{Event, SourceKind};
use crate::homeostasis::HomeostasisTracker;
use crate::memory::MemoryStore;
use crate::signal::SignalHistory;
use crate::tier::adaptive::AdaptiveGateway;
use crate::tier::reflex::ReflexTier;
use crate::tier::swarm::CellSwarm;
use crate::tier::{AutonomyLevel, Tier, TierAttempt};

use state::{PipelineState, StateTrack};

/// The orchestrator's sole output per event. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub event_id: String,
    /// True iff any tier attempt succeeded.
    pub resolved: bool,
    /// Highest tier that succeeded, or `human` if none did.
    pub autonomy_level: AutonomyLevel,
    /// Execution order, append-only.
    pub attempts: Vec<TierAttempt>,
    /// Sum of tier latencies plus orchestration overhead.
    pub total_latency: Duration,
    /// True iff any tier produced a detail worth persisting.
    pub memory_formed: bool,
    /// True iff unresolved after all applicable tiers, or normalization
    /// failed.
    pub escalated_to_human: bool,
}

/// Explicitly constructed, dependency-injected pipeline. Lifecycle is
/// owned by the caller: no global singleton, no lazy init.
pub struct EscalationOrchestrator {
    config: PipelineConfig,
    normalizer: EventNormalizer,
    history: SignalHistory,
    reflex: ReflexTier,
    swarm: CellSwarm,
    adaptive: AdaptiveGateway,
    tracker: Arc<HomeostasisTracker>,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl EscalationOrchestrator {
    pub fn new(
        config: PipelineConfig,
        reflex: ReflexTier,
        swarm: CellSwarm,
        adaptive: AdaptiveGateway,
    ) -> Self {
        let history = SignalHistory::new(&config);
        let tracker = Arc::new(HomeostasisTracker::new(config.tracker_window));
        Self {
            config,
            normalizer: EventNormalizer::new(),
            history,
            reflex,
            swarm,
            adaptive,
            tracker,
            memory: None,
        }
    }

    /// Attach a memory store; outcomes with `memory_formed` are persisted
    /// fire-and-forget after finalization.
    pub fn with_memory_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    /// The shared homeostasis aggregator, for metrics endpoints.
    pub fn tracker(&self) -> Arc<HomeostasisTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Normalize one raw payload and run its pipeline. A payload that
    /// cannot be normalized escalates straight to human with zero tier
    /// attempts; it never crashes the caller.
    pub async fn process_raw(&self, source: SourceKind, raw: &Value) -> Outcome {
        match self.normalizer.normalize(source, raw) {
            Ok(event) => self.process(event).await,
            Err(e) => {
                let mut track = StateTrack::new(format!("{source}-malformed"));
                warn!(source = %source, error = %e, "Normalization failed; escalating to human");
                track.advance(PipelineState::Escalated);
                let outcome = Outcome {
                    event_id: format!("{source}-malformed-{}", Uuid::new_v4()),
                    resolved: false,
                    autonomy_level: AutonomyLevel::Human,
                    attempts: Vec::new(),
                    total_latency: Duration::ZERO,
                    memory_formed: false,
                    escalated_to_human: true,
                };
                self.tracker.record(&outcome);
                outcome
            }
        }
    }

    /// Run one event through the ladder. Always returns exactly one
    /// well-formed [`Outcome`]; nothing below this boundary raises past it.
    pub async fn process(&self, event: Event) -> Outcome {
        let started = Instant::now();
        let mut track = StateTrack::new(event.id.clone());
        track.advance(PipelineState::Normalized);

        self.history.record(&event);
        let spike = self.history.classify(&event.resource);
        info!(
            event_id = %event.id,
            kind = %event.kind,
            severity = %event.severity,
            resource = %event.resource,
            spike = %spike,
            "Processing event"
        );

        let mut attempts = Vec::new();

        let reflex_attempt = self.reflex.attempt(&event, spike).await;
        let reflex_ok = reflex_attempt.succeeded;
        attempts.push(reflex_attempt);
        track.advance(PipelineState::ReflexDone);
        if reflex_ok {
            track.advance(PipelineState::Resolved);
            return self.finalize(&event, attempts, Some(Tier::Reflex), started);
        }

        let swarm_attempt = self.swarm.attempt(&event).await;
        let swarm_ok = swarm_attempt.succeeded;
        attempts.push(swarm_attempt);
        track.advance(PipelineState::SwarmDone);
        if swarm_ok {
            track.advance(PipelineState::Resolved);
            return self.finalize(&event, attempts, Some(Tier::Swarm), started);
        }

        let adaptive_attempt = self.adaptive.attempt(&event, &attempts).await;
        let adaptive_ok = adaptive_attempt.succeeded;
        attempts.push(adaptive_attempt);
        track.advance(PipelineState::AdaptiveDone);
        if adaptive_ok {
            track.advance(PipelineState::Resolved);
            return self.finalize(&event, attempts, Some(Tier::Adaptive), started);
        }

        track.advance(PipelineState::Escalated);
        self.finalize(&event, attempts, None, started)
    }

    fn finalize(
        &self,
        event: &Event,
        attempts: Vec<TierAttempt>,
        resolved_by: Option<Tier>,
        started: Instant,
    ) -> Outcome {
        let resolved = resolved_by.is_some();
        let autonomy_level = resolved_by.map_or(AutonomyLevel::Human, AutonomyLevel::from);
        let memory_formed = attempts
            .iter()
            .any(|a| !a.detail.is_empty() && !a.is_sentinel_detail());

        let outcome = Outcome {
            event_id: event.id.clone(),
            resolved,
            autonomy_level,
            attempts,
            total_latency: started.elapsed(),
            memory_formed,
            escalated_to_human: !resolved,
        };

        info!(
            event_id = %outcome.event_id,
            resolved,
            autonomy = %outcome.autonomy_level,
            attempts = outcome.attempts.len(),
            latency_ms = outcome.total_latency.as_millis() as u64,
            memory_formed,
            "Pipeline finished"
        );

        self.tracker.record(&outcome);

        if memory_formed {
            if let Some(store) = &self.memory {
                // Fire-and-forget: persistence failure is logged, never
                // reflected in the returned outcome.
                let store = Arc::clone(store);
                let snapshot = outcome.clone();
                tokio::spawn(async move {
                    if let Err(e) = store.persist(&snapshot).await {
                        warn!(event_id = %snapshot.event_id, error = %e, "Memory persistence failed");
                    }
                });
            }
        }

        outcome
    }
}
