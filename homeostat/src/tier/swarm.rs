//! Swarm tier: a small set of narrow remediation cells.
//!
//! Cells whose targets are disjoint fan out concurrently; cells aimed at
//! the same resource run sequentially to avoid racing writers. Cells are
//! idempotent by contract: a cell that outlives the tier deadline is not
//! cancelled; its late completion is drained and logged for audit while
//! the pipeline moves on.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::TierError;
use crate::event::Event;
use crate::tier::{Tier, TierAttempt};

/// The single concern a cell is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellCategory {
    /// Fast resource cleanup (temp files, caches, stale handles).
    Cleanup,
    /// Log digestion / triage.
    Digestion,
    /// Process or instance termination and restart.
    Termination,
    /// Read-only probing that can still contain by confirming recovery.
    Diagnostic,
}

impl fmt::Display for CellCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cleanup => write!(f, "cleanup"),
            Self::Digestion => write!(f, "digestion"),
            Self::Termination => write!(f, "termination"),
            Self::Diagnostic => write!(f, "diagnostic"),
        }
    }
}

/// Result of one cell invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellResult {
    /// What the cell actually did.
    pub action_taken: String,
    /// The cell's own work completed.
    pub succeeded: bool,
    /// The cell believes the incident is contained.
    pub contained: bool,
}

/// One narrow remediation routine. Implementations must be idempotent:
/// a timed-out invocation may still complete after the tier has moved on,
/// and the orchestrator may re-dispatch the same event signature later.
#[async_trait]
pub trait RemediationCell: Send + Sync {
    fn name(&self) -> &str;

    fn category(&self) -> CellCategory;

    /// Whether this cell's declared applicability covers the event.
    fn applies_to(&self, event: &Event) -> bool;

    /// The resource this invocation would touch. Cells sharing a target
    /// are serialized; disjoint targets run concurrently.
    fn target_resource(&self, event: &Event) -> String {
        event.resource.key()
    }

    async fn run(&self, event: &Event) -> Result<CellResult, TierError>;
}

/// Tier 2: dispatch applicable cells and wait for containment.
pub struct CellSwarm {
    cells: Vec<Arc<dyn RemediationCell>>,
    deadline: Duration,
}

impl CellSwarm {
    pub fn new(cells: Vec<Arc<dyn RemediationCell>>, config: &PipelineConfig) -> Self {
        Self {
            cells,
            deadline: config.swarm_deadline,
        }
    }

    /// Attempt containment. Succeeds iff at least one cell both succeeded
    /// and reported `contained`.
    pub async fn attempt(&self, event: &Event) -> TierAttempt {
        let started = Instant::now();

        let selected: Vec<Arc<dyn RemediationCell>> = self
            .cells
            .iter()
            .filter(|cell| cell.applies_to(event))
            .cloned()
            .collect();

        if selected.is_empty() {
            debug!(event_id = %event.id, kind = %event.kind, "No applicable swarm cells");
            return TierAttempt::failed(Tier::Swarm, "no_applicable_cells")
                .with_latency(started.elapsed());
        }

        let expected = selected.len();
        let mut groups: HashMap<String, Vec<Arc<dyn RemediationCell>>> = HashMap::new();
        for cell in selected {
            groups.entry(cell.target_resource(event)).or_default().push(cell);
        }
        debug!(
            event_id = %event.id,
            cells = expected,
            groups = groups.len(),
            "Dispatching swarm cells"
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        for (target, group) in groups {
            let tx = tx.clone();
            let event = event.clone();
            tokio::spawn(async move {
                for cell in group {
                    let name = cell.name().to_string();
                    let result = cell.run(&event).await;
                    // Receiver may be gone after a tier timeout; the cell
                    // still ran to completion, which is all the contract asks.
                    if tx.send((name, target.clone(), result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut completed: Vec<(String, Result<CellResult, TierError>)> = Vec::new();
        let mut timed_out = false;
        let tier_deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(tier_deadline);
        while completed.len() < expected {
            tokio::select! {
                _ = &mut tier_deadline => {
                    timed_out = true;
                    break;
                }
                msg = rx.recv() => match msg {
                    Some((name, _target, result)) => completed.push((name, result)),
                    None => break,
                },
            }
        }

        if timed_out {
            warn!(
                event_id = %event.id,
                completed = completed.len(),
                expected,
                "Swarm tier deadline exceeded; late cell results will be logged only"
            );
            let event_id = event.id.clone();
            tokio::spawn(async move {
                while let Some((name, target, result)) = rx.recv().await {
                    match result {
                        Ok(r) => warn!(
                            event_id = %event_id,
                            cell = %name,
                            target = %target,
                            contained = r.contained,
                            "Late cell completion after swarm deadline"
                        ),
                        Err(e) => warn!(
                            event_id = %event_id,
                            cell = %name,
                            target = %target,
                            error = %e,
                            "Late cell failure after swarm deadline"
                        ),
                    }
                }
            });
        }

        self.summarize(event, completed, expected, timed_out)
            .with_latency(started.elapsed())
    }

    fn summarize(
        &self,
        event: &Event,
        completed: Vec<(String, Result<CellResult, TierError>)>,
        expected: usize,
        timed_out: bool,
    ) -> TierAttempt {
        let mut actions = Vec::new();
        let mut contained_by: Option<String> = None;
        let mut errors = Vec::new();

        for (name, result) in &completed {
            match result {
                Ok(r) => {
                    actions.push(r.action_taken.clone());
                    if r.succeeded && r.contained && contained_by.is_none() {
                        contained_by = Some(name.clone());
                    }
                }
                Err(e) => errors.push(format!("{name}: {e}")),
            }
        }

        let succeeded = contained_by.is_some();
        let detail = if let Some(name) = &contained_by {
            format!("{name} contained `{}`", event.kind)
        } else if timed_out && completed.is_empty() {
            "deadline_exceeded".to_string()
        } else if !errors.is_empty() {
            format!(
                "{}/{expected} cells completed, none contained ({})",
                completed.len(),
                errors.join("; ")
            )
        } else {
            "no_containment".to_string()
        };

        TierAttempt {
            tier: Tier::Swarm,
            succeeded,
            actions,
            confidence: None,
            contained: Some(succeeded),
            latency: Duration::ZERO,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(kind: &str) -> Event {
        Event {
            id: "e1".into(),
            source: crate::event::SourceKind::MonitoringAlert,
            kind: kind.into(),
            severity: crate::event::Severity::Error,
            resource: crate::event::ResourceRef::new("gce_instance", "worker-3"),
            observed_at: Utc::now(),
            payload: Default::default(),
            metrics: Default::default(),
        }
    }

    struct StubCell {
        name: &'static str,
        category: CellCategory,
        kind: &'static str,
        target: Option<&'static str>,
        contained: bool,
        delay: Duration,
        runs: AtomicUsize,
    }

    impl StubCell {
        fn new(name: &'static str, kind: &'static str, contained: bool) -> Self {
            Self {
                name,
                category: CellCategory::Cleanup,
                kind,
                target: None,
                contained,
                delay: Duration::ZERO,
                runs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RemediationCell for StubCell {
        fn name(&self) -> &str {
            self.name
        }

        fn category(&self) -> CellCategory {
            self.category
        }

        fn applies_to(&self, event: &Event) -> bool {
            event.kind == self.kind
        }

        fn target_resource(&self, event: &Event) -> String {
            self.target
                .map(str::to_string)
                .unwrap_or_else(|| event.resource.key())
        }

        async fn run(&self, _event: &Event) -> Result<CellResult, TierError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(CellResult {
                action_taken: format!("{}_ran", self.name),
                succeeded: true,
                contained: self.contained,
            })
        }
    }

    fn swarm(cells: Vec<Arc<dyn RemediationCell>>) -> CellSwarm {
        CellSwarm::new(cells, &PipelineConfig::default())
    }

    #[tokio::test]
    async fn no_applicable_cells_fails_cleanly() {
        let cells: Vec<Arc<dyn RemediationCell>> =
            vec![Arc::new(StubCell::new("scrub", "disk_pressure", true))];
        let attempt = swarm(cells).attempt(&event("unrelated")).await;
        assert!(!attempt.succeeded);
        assert_eq!(attempt.detail, "no_applicable_cells");
        assert_eq!(attempt.contained, None);
    }

    #[tokio::test]
    async fn containment_by_any_cell_succeeds_the_tier() {
        let cells: Vec<Arc<dyn RemediationCell>> = vec![
            Arc::new(StubCell::new("digest", "disk_pressure", false)),
            Arc::new(StubCell::new("scrub", "disk_pressure", true)),
        ];
        let attempt = swarm(cells).attempt(&event("disk_pressure")).await;
        assert!(attempt.succeeded);
        assert_eq!(attempt.contained, Some(true));
        assert_eq!(attempt.actions.len(), 2);
        assert!(attempt.detail.contains("scrub"));
    }

    #[tokio::test]
    async fn no_containment_is_a_failed_attempt() {
        let cells: Vec<Arc<dyn RemediationCell>> =
            vec![Arc::new(StubCell::new("digest", "disk_pressure", false))];
        let attempt = swarm(cells).attempt(&event("disk_pressure")).await;
        assert!(!attempt.succeeded);
        assert_eq!(attempt.contained, Some(false));
        assert_eq!(attempt.detail, "no_containment");
    }

    #[tokio::test]
    async fn same_target_cells_run_sequentially() {
        // Both cells write the same resource; the serialized group still
        // reports both results.
        let a = Arc::new(StubCell::new("first", "disk_pressure", false));
        let b = Arc::new(StubCell::new("second", "disk_pressure", true));
        let cells: Vec<Arc<dyn RemediationCell>> = vec![a.clone(), b.clone()];
        let attempt = swarm(cells).attempt(&event("disk_pressure")).await;
        assert!(attempt.succeeded);
        assert_eq!(a.runs.load(Ordering::SeqCst), 1);
        assert_eq!(b.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cell_trips_the_deadline_without_blocking() {
        let mut slow = StubCell::new("slow", "disk_pressure", true);
        slow.delay = Duration::from_secs(60);
        let cells: Vec<Arc<dyn RemediationCell>> = vec![Arc::new(slow)];
        let attempt = swarm(cells).attempt(&event("disk_pressure")).await;
        assert!(!attempt.succeeded);
        assert_eq!(attempt.detail, "deadline_exceeded");
    }

    #[tokio::test(start_paused = true)]
    async fn fast_cells_still_count_when_a_sibling_times_out() {
        let mut slow = StubCell::new("slow", "disk_pressure", true);
        slow.delay = Duration::from_secs(60);
        slow.target = Some("other/resource");
        let fast = StubCell::new("fast", "disk_pressure", false);
        let cells: Vec<Arc<dyn RemediationCell>> = vec![Arc::new(slow), Arc::new(fast)];
        let attempt = swarm(cells).attempt(&event("disk_pressure")).await;
        // The fast cell completed but did not contain; the slow one is late.
        assert!(!attempt.succeeded);
        assert_eq!(attempt.actions, vec!["fast_ran"]);
    }
}
