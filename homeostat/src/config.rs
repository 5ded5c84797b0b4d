//! Pipeline configuration with environment overrides.
//!
//! All knobs live on one explicitly constructed [`PipelineConfig`] that is
//! injected into the orchestrator and its tiers; no module-level mutable
//! state. `Default` reads `HOMEOSTAT_*` env vars so deployments can tune
//! deadlines without a config file.

use std::time::Duration;

/// Tuning knobs for the escalation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Hard deadline for the reflex tier (default 100ms).
    pub reflex_deadline: Duration,
    /// Overall deadline for the swarm tier (default 10s).
    pub swarm_deadline: Duration,
    /// Deadline for the adaptive collaborator call (default 60s).
    pub adaptive_deadline: Duration,
    /// A reflex match only counts as success above this confidence.
    pub reflex_confidence_threshold: f64,
    /// Readings kept per resource in the signal history.
    pub history_window: usize,
    /// Inter-arrival gap below which readings count toward a burst.
    pub burst_gap: Duration,
    /// Number of short gaps required to classify a burst.
    pub burst_repeats: usize,
    /// Max coefficient of variation of gaps for a tonic label.
    pub gap_cv_threshold: f64,
    /// Max coefficient of variation of values before a window is irregular.
    pub value_cv_threshold: f64,
    /// Outcomes kept in the homeostasis rolling window.
    pub tracker_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reflex_deadline: millis_from_env("HOMEOSTAT_REFLEX_DEADLINE_MS", 100),
            swarm_deadline: secs_from_env("HOMEOSTAT_SWARM_DEADLINE_SECS", 10),
            adaptive_deadline: secs_from_env("HOMEOSTAT_ADAPTIVE_DEADLINE_SECS", 60),
            reflex_confidence_threshold: f64_from_env("HOMEOSTAT_REFLEX_CONFIDENCE", 0.6),
            history_window: usize_from_env("HOMEOSTAT_HISTORY_WINDOW", 50),
            burst_gap: millis_from_env("HOMEOSTAT_BURST_GAP_MS", 1000),
            burst_repeats: usize_from_env("HOMEOSTAT_BURST_REPEATS", 3),
            gap_cv_threshold: f64_from_env("HOMEOSTAT_GAP_CV", 0.3),
            value_cv_threshold: f64_from_env("HOMEOSTAT_VALUE_CV", 1.0),
            tracker_window: usize_from_env("HOMEOSTAT_TRACKER_WINDOW", 256),
        }
    }
}

fn millis_from_env(var: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

fn secs_from_env(var: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

fn usize_from_env(var: &str, default: usize) -> usize {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn f64_from_env(var: &str, default: f64) -> f64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.reflex_deadline, Duration::from_millis(100));
        assert_eq!(config.swarm_deadline, Duration::from_secs(10));
        assert_eq!(config.adaptive_deadline, Duration::from_secs(60));
        assert!((config.reflex_confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.history_window, 50);
    }
}
