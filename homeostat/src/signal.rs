//! Per-resource rolling signal history and spike classification.
//!
//! Maintains a bounded window of recent metric readings per resource and
//! derives a coarse [`SpikeLabel`] from inter-arrival rhythm and value
//! spread. The label is advisory input to the reflex rule table only; it
//! never becomes part of the event and never drives escalation on its own.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::PipelineConfig;
use crate::event::{Event, ResourceRef};

/// Coarse classification of a resource's recent metric behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeLabel {
    /// Readings arriving in rapid succession, an imminent-danger signal.
    Burst,
    /// Regular, evenly spaced readings. Normal.
    Tonic,
    /// Readings present but rhythm or values vary beyond tolerance.
    Irregular,
    /// No readings in the window: system dead or quiet.
    Silent,
}

impl fmt::Display for SpikeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Burst => write!(f, "burst"),
            Self::Tonic => write!(f, "tonic"),
            Self::Irregular => write!(f, "irregular"),
            Self::Silent => write!(f, "silent"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Reading {
    at: DateTime<Utc>,
    value: f64,
}

/// Bounded per-resource reading windows, shared across pipelines.
///
/// Interior mutability keeps `record`/`classify` usable behind `&self` from
/// concurrently running event pipelines; the lock covers only map access.
#[derive(Debug)]
pub struct SignalHistory {
    window: usize,
    burst_gap: Duration,
    burst_repeats: usize,
    gap_cv_threshold: f64,
    value_cv_threshold: f64,
    inner: Mutex<HashMap<String, VecDeque<Reading>>>,
}

impl SignalHistory {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            window: config.history_window,
            burst_gap: config.burst_gap,
            burst_repeats: config.burst_repeats,
            gap_cv_threshold: config.gap_cv_threshold,
            value_cv_threshold: config.value_cv_threshold,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Record one reading for the event's resource: the mean of its metric
    /// values at the event's observation time. Events without metrics leave
    /// the window untouched so a quiet resource still classifies as silent.
    pub fn record(&self, event: &Event) {
        if event.metrics.is_empty() {
            return;
        }
        let mean = event.metrics.values().sum::<f64>() / event.metrics.len() as f64;
        self.record_reading(&event.resource, event.observed_at, mean);
    }

    /// Push one reading, evicting the oldest beyond the window bound.
    pub fn record_reading(&self, resource: &ResourceRef, at: DateTime<Utc>, value: f64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let readings = inner.entry(resource.key()).or_default();
        readings.push_back(Reading { at, value });
        while readings.len() > self.window {
            readings.pop_front();
        }
        trace!(resource = %resource, value, count = readings.len(), "Recorded signal reading");
    }

    /// Classify the resource's recent window.
    pub fn classify(&self, resource: &ResourceRef) -> SpikeLabel {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let readings = match inner.get(&resource.key()) {
            Some(r) if !r.is_empty() => r,
            _ => return SpikeLabel::Silent,
        };
        if readings.len() < 3 {
            // Too few readings to establish a rhythm.
            return SpikeLabel::Irregular;
        }

        let gaps: Vec<f64> = readings
            .iter()
            .zip(readings.iter().skip(1))
            .map(|(a, b)| {
                (b.at - a.at)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .as_secs_f64()
            })
            .collect();

        let short_gaps = gaps
            .iter()
            .filter(|g| **g < self.burst_gap.as_secs_f64())
            .count();
        if short_gaps >= self.burst_repeats {
            return SpikeLabel::Burst;
        }

        let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
        if coefficient_of_variation(&gaps) <= self.gap_cv_threshold
            && coefficient_of_variation(&values) <= self.value_cv_threshold
        {
            SpikeLabel::Tonic
        } else {
            SpikeLabel::Irregular
        }
    }
}

/// Std-dev over mean; 0 for degenerate inputs (empty or zero-mean).
fn coefficient_of_variation(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    if mean.abs() < f64::EPSILON {
        return 0.0;
    }
    let variance =
        samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    variance.sqrt() / mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn history() -> SignalHistory {
        SignalHistory::new(&PipelineConfig::default())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn resource() -> ResourceRef {
        ResourceRef::new("cloud_run_revision", "checkout")
    }

    #[test]
    fn empty_window_is_silent() {
        assert_eq!(history().classify(&resource()), SpikeLabel::Silent);
    }

    #[test]
    fn sparse_window_is_irregular() {
        let h = history();
        h.record_reading(&resource(), at(0), 1.0);
        h.record_reading(&resource(), at(10), 1.0);
        assert_eq!(h.classify(&resource()), SpikeLabel::Irregular);
    }

    #[test]
    fn rapid_arrivals_classify_as_burst() {
        let h = history();
        // Gaps of 0s: four short gaps, above the repeat threshold of 3.
        for i in 0..5 {
            h.record_reading(&resource(), at(i / 10), 1.0);
        }
        assert_eq!(h.classify(&resource()), SpikeLabel::Burst);
    }

    #[test]
    fn even_spacing_classifies_as_tonic() {
        let h = history();
        for i in 0..5 {
            h.record_reading(&resource(), at(i * 60), 1.0);
        }
        assert_eq!(h.classify(&resource()), SpikeLabel::Tonic);
    }

    #[test]
    fn uneven_spacing_classifies_as_irregular() {
        let h = history();
        for (i, secs) in [0i64, 5, 300, 305, 9000].iter().enumerate() {
            h.record_reading(&resource(), at(*secs), i as f64);
        }
        assert_eq!(h.classify(&resource()), SpikeLabel::Irregular);
    }

    #[test]
    fn wild_values_break_tonic_even_with_even_spacing() {
        let h = history();
        for (i, value) in [1.0, 1.0, 500.0, 1.0, 900.0].iter().enumerate() {
            h.record_reading(&resource(), at(i as i64 * 60), *value);
        }
        assert_eq!(h.classify(&resource()), SpikeLabel::Irregular);
    }

    #[test]
    fn window_is_bounded() {
        let mut config = PipelineConfig::default();
        config.history_window = 4;
        let h = SignalHistory::new(&config);
        // 10 readings, only the last 4 survive.
        for i in 0..10 {
            h.record_reading(&resource(), at(i), 1.0);
        }
        let inner = h.inner.lock().unwrap();
        assert_eq!(inner.get(&resource().key()).unwrap().len(), 4);
    }

    #[test]
    fn events_without_metrics_do_not_feed_the_window() {
        let h = history();
        let event = Event {
            id: "e1".into(),
            source: crate::event::SourceKind::PubSub,
            kind: "noop".into(),
            severity: Default::default(),
            resource: resource(),
            observed_at: at(0),
            payload: Default::default(),
            metrics: Default::default(),
        };
        h.record(&event);
        assert_eq!(h.classify(&resource()), SpikeLabel::Silent);
    }
}
