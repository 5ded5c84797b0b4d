//! Canonical event model.
//!
//! Exactly one [`Event`] is produced per raw payload; it is immutable once
//! built and is consumed exactly once by the orchestrator. Raw maps never
//! travel past the normalization boundary: every field consumed by logic
//! is a named, typed field here, with the original payload preserved as an
//! opaque map for audit only.

pub mod normalizer;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upstream signal families the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Structured log-based events from the platform's log router.
    #[serde(rename = "event-log")]
    EventLog,
    /// Pub/sub push messages (base64 data + attribute map).
    #[serde(rename = "pub-sub")]
    PubSub,
    /// Monitoring alert incidents (open/closed policy violations).
    #[serde(rename = "monitoring-alert")]
    MonitoringAlert,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventLog => write!(f, "event-log"),
            Self::PubSub => write!(f, "pub-sub"),
            Self::MonitoringAlert => write!(f, "monitoring-alert"),
        }
    }
}

impl std::error::Error for SourceKind {}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event-log" => Ok(Self::EventLog),
            "pub-sub" => Ok(Self::PubSub),
            "monitoring-alert" => Ok(Self::MonitoringAlert),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}

/// Event severity, ordered from least to most urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Case-insensitive parse with an `Info` fallback for unknown strings.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" | "emergency" | "alert" => Self::Critical,
            "error" | "err" => Self::Error,
            "warning" | "warn" => Self::Warning,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// The affected unit: a resource type plus its instance name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Resource type (e.g. `cloud_run_revision`, `gce_instance`).
    pub rtype: String,
    /// Instance name (e.g. the service or VM name).
    pub name: String,
}

impl ResourceRef {
    pub fn new(rtype: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            rtype: rtype.into(),
            name: name.into(),
        }
    }

    /// Stable key used for per-resource bookkeeping.
    pub fn key(&self) -> String {
        format!("{}/{}", self.rtype, self.name)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.rtype, self.name)
    }
}

/// One canonical operational event, created once per raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique per incoming payload (source-provided id or generated).
    pub id: String,
    /// Which upstream family produced the raw payload.
    pub source: SourceKind,
    /// Free-form event-type string from the source.
    pub kind: String,
    pub severity: Severity,
    pub resource: ResourceRef,
    /// Normalization time, not the source's own clock.
    pub observed_at: DateTime<Utc>,
    /// Original fields, preserved verbatim for audit.
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Named numeric signals extracted during normalization. May be empty.
    pub metrics: BTreeMap<String, f64>,
}
