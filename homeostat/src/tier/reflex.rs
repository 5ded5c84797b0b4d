//! Reflex tier: deterministic, rule-table-driven matching under a hard
//! deadline.
//!
//! The rule table is external configuration data (TOML or built in code);
//! this module only implements the matching shape: candidates keyed by
//! `(kind, spike_label)` with severity as a secondary filter, highest
//! confidence wins, ties broken by the most specific resource-type match.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::event::{Event, Severity};
use crate::signal::SpikeLabel;
use crate::tier::{ActionRunner, Tier, TierAttempt};

/// One externally configured reflex rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflexRule {
    /// Event kind this rule applies to (exact match).
    pub kind: String,
    /// Spike label filter; `None` matches any label.
    #[serde(default)]
    pub spike: Option<SpikeLabel>,
    /// Secondary severity filter; `None` matches any severity.
    #[serde(default)]
    pub severity: Option<Severity>,
    /// Resource-type filter; a populated filter is a more specific match
    /// and wins confidence ties.
    #[serde(default)]
    pub resource_type: Option<String>,
    /// Action name handed to the [`ActionRunner`].
    pub action: String,
    /// Confidence in [0,1] that the action resolves this signature.
    pub confidence: f64,
    /// Execute the action even below the confidence threshold. The attempt
    /// still only counts as succeeded above the threshold.
    #[serde(default)]
    pub bypass_escalation: bool,
}

impl ReflexRule {
    fn matches(&self, event: &Event, spike: SpikeLabel) -> bool {
        self.kind == event.kind
            && self.spike.map_or(true, |s| s == spike)
            && self.severity.map_or(true, |s| s == event.severity)
            && self
                .resource_type
                .as_deref()
                .map_or(true, |rt| rt == event.resource.rtype)
    }

    /// Tie-break rank: an explicit resource-type filter is narrower, and a
    /// longer type string narrower still.
    fn specificity(&self) -> usize {
        self.resource_type.as_deref().map_or(0, |rt| 1 + rt.len())
    }
}

/// The externally supplied reflex rule catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(default)]
    pub rules: Vec<ReflexRule>,
}

impl RuleTable {
    pub fn new(rules: Vec<ReflexRule>) -> Self {
        Self { rules }
    }

    /// Load a rule table from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading rule table {}", path.display()))?;
        let table: RuleTable = toml::from_str(&raw)
            .with_context(|| format!("parsing rule table {}", path.display()))?;
        Ok(table)
    }

    /// The winning rule for this event, if any candidate matches.
    pub fn select<'a>(&'a self, event: &Event, spike: SpikeLabel) -> Option<&'a ReflexRule> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(event, spike))
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.specificity().cmp(&b.specificity()))
            })
    }
}

/// Tier 1: table lookup plus one action, never past the deadline.
pub struct ReflexTier {
    table: RuleTable,
    runner: Arc<dyn ActionRunner>,
    deadline: Duration,
    confidence_threshold: f64,
}

impl ReflexTier {
    pub fn new(table: RuleTable, runner: Arc<dyn ActionRunner>, config: &PipelineConfig) -> Self {
        Self {
            table,
            runner,
            deadline: config.reflex_deadline,
            confidence_threshold: config.reflex_confidence_threshold,
        }
    }

    /// Attempt a reflex resolution. Always returns within the deadline;
    /// a timeout is recorded as a normal failed attempt.
    pub async fn attempt(&self, event: &Event, spike: SpikeLabel) -> TierAttempt {
        let started = Instant::now();
        match timeout(self.deadline, self.evaluate(event, spike)).await {
            Ok(attempt) => attempt.with_latency(started.elapsed()),
            Err(_) => {
                warn!(event_id = %event.id, "Reflex tier deadline exceeded");
                TierAttempt::failed(Tier::Reflex, "deadline_exceeded")
                    .with_latency(started.elapsed())
            }
        }
    }

    async fn evaluate(&self, event: &Event, spike: SpikeLabel) -> TierAttempt {
        let Some(rule) = self.table.select(event, spike) else {
            debug!(event_id = %event.id, kind = %event.kind, spike = %spike, "No reflex rule matched");
            return TierAttempt::failed(Tier::Reflex, "no_match");
        };

        let confident = rule.confidence > self.confidence_threshold;
        if !confident && !rule.bypass_escalation {
            debug!(
                event_id = %event.id,
                action = %rule.action,
                confidence = rule.confidence,
                "Reflex match below confidence threshold; not executing"
            );
            return TierAttempt {
                tier: Tier::Reflex,
                succeeded: false,
                actions: Vec::new(),
                confidence: Some(rule.confidence),
                contained: None,
                latency: Duration::ZERO,
                detail: "low_confidence".to_string(),
            };
        }

        // Execute the action; bypass rules execute even when low-confidence
        // but can only be recorded as succeeded above the threshold.
        let run_result = self.runner.run(&rule.action, event).await;
        let (succeeded, detail) = match run_result {
            Ok(()) if confident => (
                true,
                format!("reflex rule resolved `{}` via {}", event.kind, rule.action),
            ),
            Ok(()) => (false, "low_confidence".to_string()),
            Err(e) => {
                warn!(event_id = %event.id, action = %rule.action, error = %e, "Reflex action failed");
                (false, e.to_string())
            }
        };

        TierAttempt {
            tier: Tier::Reflex,
            succeeded,
            actions: vec![rule.action.clone()],
            confidence: Some(rule.confidence),
            contained: None,
            latency: Duration::ZERO,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TierError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    fn event(kind: &str, rtype: &str) -> Event {
        Event {
            id: "e1".into(),
            source: crate::event::SourceKind::EventLog,
            kind: kind.into(),
            severity: Severity::Error,
            resource: crate::event::ResourceRef::new(rtype, "checkout"),
            observed_at: Utc::now(),
            payload: Default::default(),
            metrics: Default::default(),
        }
    }

    fn rule(kind: &str, action: &str, confidence: f64) -> ReflexRule {
        ReflexRule {
            kind: kind.into(),
            spike: None,
            severity: None,
            resource_type: None,
            action: action.into(),
            confidence,
            bypass_escalation: false,
        }
    }

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActionRunner for RecordingRunner {
        async fn run(&self, action: &str, _event: &Event) -> Result<(), TierError> {
            self.calls.lock().unwrap().push(action.to_string());
            Ok(())
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl ActionRunner for FailingRunner {
        async fn run(&self, action: &str, _event: &Event) -> Result<(), TierError> {
            Err(TierError::ExecutionFailed {
                action: action.to_string(),
                reason: "quota exhausted".to_string(),
            })
        }
    }

    struct SlowRunner;

    #[async_trait]
    impl ActionRunner for SlowRunner {
        async fn run(&self, _action: &str, _event: &Event) -> Result<(), TierError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    fn tier_with(table: RuleTable, runner: Arc<dyn ActionRunner>) -> ReflexTier {
        ReflexTier::new(table, runner, &PipelineConfig::default())
    }

    #[test]
    fn select_prefers_highest_confidence() {
        let table = RuleTable::new(vec![
            rule("cpu_spike", "throttle", 0.5),
            rule("cpu_spike", "scale_out", 0.9),
        ]);
        let winner = table.select(&event("cpu_spike", "vm"), SpikeLabel::Burst).unwrap();
        assert_eq!(winner.action, "scale_out");
    }

    #[test]
    fn select_breaks_confidence_ties_by_resource_specificity() {
        let mut narrow = rule("cpu_spike", "restart_vm", 0.8);
        narrow.resource_type = Some("gce_instance".into());
        let table = RuleTable::new(vec![rule("cpu_spike", "generic_fix", 0.8), narrow]);
        let winner = table
            .select(&event("cpu_spike", "gce_instance"), SpikeLabel::Tonic)
            .unwrap();
        assert_eq!(winner.action, "restart_vm");
    }

    #[test]
    fn select_filters_by_spike_and_severity() {
        let mut burst_only = rule("cpu_spike", "emergency_scale", 0.9);
        burst_only.spike = Some(SpikeLabel::Burst);
        let mut critical_only = rule("cpu_spike", "page_capacity", 0.95);
        critical_only.severity = Some(Severity::Critical);
        let table = RuleTable::new(vec![burst_only, critical_only]);

        // Event is severity=Error with a tonic window: neither rule applies.
        assert!(table.select(&event("cpu_spike", "vm"), SpikeLabel::Tonic).is_none());
        assert!(table.select(&event("cpu_spike", "vm"), SpikeLabel::Burst).is_some());
    }

    #[tokio::test]
    async fn confident_match_executes_and_succeeds() {
        let runner = Arc::new(RecordingRunner::default());
        let tier = tier_with(
            RuleTable::new(vec![rule("cpu_spike", "scale_out", 0.9)]),
            runner.clone(),
        );
        let attempt = tier.attempt(&event("cpu_spike", "vm"), SpikeLabel::Burst).await;
        assert!(attempt.succeeded);
        assert_eq!(attempt.actions, vec!["scale_out"]);
        assert_eq!(attempt.confidence, Some(0.9));
        assert_eq!(runner.calls.lock().unwrap().as_slice(), ["scale_out"]);
    }

    #[tokio::test]
    async fn low_confidence_without_bypass_does_not_execute() {
        let runner = Arc::new(RecordingRunner::default());
        let tier = tier_with(
            RuleTable::new(vec![rule("cpu_spike", "scale_out", 0.3)]),
            runner.clone(),
        );
        let attempt = tier.attempt(&event("cpu_spike", "vm"), SpikeLabel::Tonic).await;
        assert!(!attempt.succeeded);
        assert_eq!(attempt.detail, "low_confidence");
        assert!(attempt.actions.is_empty());
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bypass_executes_but_still_fails_below_threshold() {
        let runner = Arc::new(RecordingRunner::default());
        let mut low = rule("cpu_spike", "scale_out", 0.3);
        low.bypass_escalation = true;
        let tier = tier_with(RuleTable::new(vec![low]), runner.clone());
        let attempt = tier.attempt(&event("cpu_spike", "vm"), SpikeLabel::Tonic).await;
        assert!(!attempt.succeeded);
        assert_eq!(attempt.actions, vec!["scale_out"]);
        assert_eq!(runner.calls.lock().unwrap().as_slice(), ["scale_out"]);
    }

    #[tokio::test]
    async fn action_error_becomes_failed_attempt_with_message() {
        let tier = tier_with(
            RuleTable::new(vec![rule("cpu_spike", "scale_out", 0.9)]),
            Arc::new(FailingRunner),
        );
        let attempt = tier.attempt(&event("cpu_spike", "vm"), SpikeLabel::Tonic).await;
        assert!(!attempt.succeeded);
        assert!(attempt.detail.contains("quota exhausted"));
    }

    #[tokio::test]
    async fn no_match_is_reported_as_such() {
        let tier = tier_with(RuleTable::default(), Arc::new(RecordingRunner::default()));
        let attempt = tier.attempt(&event("unseen_kind", "vm"), SpikeLabel::Silent).await;
        assert!(!attempt.succeeded);
        assert_eq!(attempt.detail, "no_match");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_action_hits_the_deadline() {
        let tier = tier_with(
            RuleTable::new(vec![rule("cpu_spike", "slow_fix", 0.9)]),
            Arc::new(SlowRunner),
        );
        let attempt = tier.attempt(&event("cpu_spike", "vm"), SpikeLabel::Tonic).await;
        assert!(!attempt.succeeded);
        assert_eq!(attempt.detail, "deadline_exceeded");
    }

    #[test]
    fn rule_table_loads_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(
            &path,
            r#"
[[rules]]
kind = "cpu_spike"
spike = "burst"
action = "scale_out"
confidence = 0.9

[[rules]]
kind = "disk_pressure"
resource_type = "gce_instance"
action = "purge_tmp"
confidence = 0.7
bypass_escalation = true
"#,
        )
        .unwrap();

        let table = RuleTable::from_toml_file(&path).unwrap();
        assert_eq!(table.rules.len(), 2);
        assert_eq!(table.rules[0].spike, Some(SpikeLabel::Burst));
        assert!(table.rules[1].bypass_escalation);
    }
}
