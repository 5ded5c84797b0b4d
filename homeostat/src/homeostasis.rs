//! Rolling resolution-rate and latency aggregation across pipelines.
//!
//! The tracker holds a bounded window of recent outcomes behind a standard
//! mutex; every critical section is short and allocation-free, so it is
//! safe to share across however many concurrent pipelines the process
//! runs. Snapshots are computed on demand from the window contents.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::orchestrator::Outcome;
use crate::tier::Tier;

/// What the tracker keeps per outcome. Attempt latencies are copied out
/// so snapshots never walk full `Outcome` values.
#[derive(Debug, Clone)]
struct Sample {
    resolved: bool,
    total_latency: Duration,
    tier_latencies: Vec<(Tier, Duration)>,
}

/// Percentiles over one tier's attempt latencies within the window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatencyStats {
    pub p50: Duration,
    pub p95: Duration,
}

/// Point-in-time view of the rolling window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeostasisSnapshot {
    /// Resolved fraction over the window; 0.0 when empty.
    pub resolution_rate: f64,
    pub per_tier_latency: BTreeMap<Tier, LatencyStats>,
    pub sample_count: usize,
    pub window_size: usize,
}

/// Shared rolling aggregator. One instance per orchestrator.
pub struct HomeostasisTracker {
    window_size: usize,
    samples: Mutex<VecDeque<Sample>>,
}

impl HomeostasisTracker {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            samples: Mutex::new(VecDeque::with_capacity(window_size)),
        }
    }

    /// Record a terminal outcome, evicting the oldest sample once the
    /// window is full.
    pub fn record(&self, outcome: &Outcome) {
        let sample = Sample {
            resolved: outcome.resolved,
            total_latency: outcome.total_latency,
            tier_latencies: outcome
                .attempts
                .iter()
                .map(|a| (a.tier, a.latency))
                .collect(),
        };
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.len() == self.window_size {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    pub fn snapshot(&self) -> HomeostasisSnapshot {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let sample_count = samples.len();
        let resolution_rate = if sample_count == 0 {
            0.0
        } else {
            samples.iter().filter(|s| s.resolved).count() as f64 / sample_count as f64
        };

        let mut by_tier: BTreeMap<Tier, Vec<Duration>> = BTreeMap::new();
        for sample in samples.iter() {
            for (tier, latency) in &sample.tier_latencies {
                by_tier.entry(*tier).or_default().push(*latency);
            }
        }
        drop(samples);

        let per_tier_latency = by_tier
            .into_iter()
            .map(|(tier, mut latencies)| {
                latencies.sort_unstable();
                let stats = LatencyStats {
                    p50: percentile(&latencies, 0.50),
                    p95: percentile(&latencies, 0.95),
                };
                (tier, stats)
            })
            .collect();

        HomeostasisSnapshot {
            resolution_rate,
            per_tier_latency,
            sample_count,
            window_size: self.window_size,
        }
    }

    /// Mean end-to-end latency over the window, for operator summaries.
    pub fn mean_total_latency(&self) -> Duration {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = samples.iter().map(|s| s.total_latency).sum();
        total / samples.len() as u32
    }
}

/// Nearest-rank percentile over a sorted slice. Callers guarantee the
/// slice is non-empty.
fn percentile(sorted: &[Duration], q: f64) -> Duration {
    let rank = ((q * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}

/// Graded health of the rolling resolution rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Ok,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Ok => write!(f, "ok"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Resolution-rate objective with a warning band below target and a
/// hard floor below it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionSlo {
    pub target: f64,
    pub critical: f64,
}

impl Default for ResolutionSlo {
    fn default() -> Self {
        Self {
            target: 0.95,
            critical: 0.90,
        }
    }
}

impl ResolutionSlo {
    /// An empty window is `Ok`: no evidence is not a breach.
    pub fn evaluate(&self, snapshot: &HomeostasisSnapshot) -> AlertSeverity {
        if snapshot.sample_count == 0 || snapshot.resolution_rate >= self.target {
            AlertSeverity::Ok
        } else if snapshot.resolution_rate >= self.critical {
            AlertSeverity::Warning
        } else {
            AlertSeverity::Critical
        }
    }
}
