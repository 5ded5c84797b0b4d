//! Autonomous incident remediation pipeline.
//!
//! This library provides:
//! - Normalization of heterogeneous cloud operational signals (log events,
//!   pub/sub messages, monitoring alerts) into one canonical [`Event`].
//! - A tiered escalation ladder: deterministic reflex rules, a swarm of
//!   narrow remediation cells, and a cognitive-reasoning fallback, each
//!   under its own deadline, attempted in strict cost order.
//! - A rolling homeostasis aggregator tracking the autonomous resolution
//!   rate and per-tier latency percentiles.
//!
//! Control flow: raw payload → [`EventNormalizer`] → [`Event`] →
//! [`EscalationOrchestrator::process`], which consults the per-resource
//! [`SignalHistory`] before walking the ladder. Every terminal outcome is
//! pushed into the shared [`HomeostasisTracker`].

pub mod config;
pub mod error;
pub mod event;
pub mod homeostasis;
pub mod memory;
pub mod orchestrator;
pub mod signal;
pub mod tier;

pub use config::PipelineConfig;
pub use error::{NormalizationError, TierError};
pub use event::normalizer::EventNormalizer;
pub use event::{Event, ResourceRef, Severity, SourceKind};
pub use homeostasis::{AlertSeverity, HomeostasisSnapshot, HomeostasisTracker, ResolutionSlo};
pub use memory::{InMemoryStore, MemoryStore};
pub use orchestrator::{EscalationOrchestrator, Outcome};
pub use signal::{SignalHistory, SpikeLabel};
pub use tier::adaptive::{AdaptiveGateway, HttpCollaborator, ReasoningCollaborator, Reflection};
pub use tier::reflex::{ReflexRule, ReflexTier, RuleTable};
pub use tier::swarm::{CellCategory, CellResult, CellSwarm, RemediationCell};
pub use tier::{ActionRunner, AutonomyLevel, LoggingActionRunner, Tier, TierAttempt};
