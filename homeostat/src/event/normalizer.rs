//! Per-source adapters converting raw payload shapes into canonical events.
//!
//! Each adapter decodes its raw JSON into a closed, typed shape and copies
//! values out of it; the original payload map is never mutated. Malformed
//! input that cannot yield at minimum `{source, kind, severity}` returns a
//! [`NormalizationError`], which the orchestrator treats as an automatic
//! human escalation, never a crash.

use std::collections::{BTreeMap, HashMap};

use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::NormalizationError;
use crate::event::{Event, ResourceRef, Severity, SourceKind};

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Stateless normalizer front-end for the three source adapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventNormalizer;

impl EventNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Produce exactly one [`Event`] from one raw payload.
    pub fn normalize(
        &self,
        source: SourceKind,
        raw: &Value,
    ) -> Result<Event, NormalizationError> {
        let event = match source {
            SourceKind::EventLog => normalize_event_log(raw)?,
            SourceKind::PubSub => normalize_pub_sub(raw)?,
            SourceKind::MonitoringAlert => normalize_monitoring_alert(raw)?,
        };
        debug!(
            event_id = %event.id,
            source = %event.source,
            kind = %event.kind,
            severity = %event.severity,
            resource = %event.resource,
            metric_count = event.metrics.len(),
            "Normalized event"
        );
        Ok(event)
    }
}

/// Fallback id when the source supplies none. Unique per payload seen.
fn generated_id(source: SourceKind) -> String {
    format!("{source}-{}", Uuid::new_v4())
}

fn payload_map(source: SourceKind, raw: &Value) -> Result<serde_json::Map<String, Value>, NormalizationError> {
    raw.as_object()
        .cloned()
        .ok_or(NormalizationError::NotAnObject { source })
}

// ---------------------------------------------------------------------------
// event-log adapter
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LogEntryRaw {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    data: LogEntryData,
}

#[derive(Debug, Deserialize)]
struct LogEntryData {
    resource: Option<LogResource>,
    severity: Option<String>,
    #[serde(rename = "jsonPayload")]
    json_payload: Option<LogJsonPayload>,
}

#[derive(Debug, Deserialize)]
struct LogResource {
    #[serde(rename = "type")]
    rtype: Option<String>,
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct LogJsonPayload {
    cpu_utilization: Option<f64>,
    memory_utilization: Option<f64>,
    request_latency_ms: Option<f64>,
}

fn normalize_event_log(raw: &Value) -> Result<Event, NormalizationError> {
    let source = SourceKind::EventLog;
    let payload = payload_map(source, raw)?;
    let entry: LogEntryRaw =
        serde_json::from_value(raw.clone()).map_err(|e| NormalizationError::Malformed {
            source,
            reason: e.to_string(),
        })?;

    let resource = match entry.data.resource {
        Some(res) => ResourceRef::new(
            res.rtype.unwrap_or_else(|| "unknown".into()),
            res.labels
                .and_then(|labels| labels.get("service_name").cloned())
                .unwrap_or_else(|| "unknown".into()),
        ),
        None => ResourceRef::new("unknown", "unknown"),
    };

    let severity = entry
        .data
        .severity
        .as_deref()
        .map(Severity::parse_lenient)
        .unwrap_or_default();

    // Structured-log metrics default to 0 when absent so that downstream
    // classifiers always see the same key set for this source.
    let mut metrics = BTreeMap::new();
    let json_payload = entry.data.json_payload.unwrap_or(LogJsonPayload {
        cpu_utilization: None,
        memory_utilization: None,
        request_latency_ms: None,
    });
    metrics.insert("cpu".to_string(), json_payload.cpu_utilization.unwrap_or(0.0));
    metrics.insert(
        "memory".to_string(),
        json_payload.memory_utilization.unwrap_or(0.0),
    );
    metrics.insert(
        "latency_ms".to_string(),
        json_payload.request_latency_ms.unwrap_or(0.0),
    );

    Ok(Event {
        id: entry.id.unwrap_or_else(|| generated_id(source)),
        source,
        kind: entry.kind,
        severity,
        resource,
        observed_at: Utc::now(),
        payload,
        metrics,
    })
}

// ---------------------------------------------------------------------------
// pub-sub adapter
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PubSubRaw {
    #[serde(rename = "messageId")]
    message_id: Option<String>,
    data: Option<String>,
    attributes: Option<HashMap<String, String>>,
}

fn normalize_pub_sub(raw: &Value) -> Result<Event, NormalizationError> {
    let source = SourceKind::PubSub;
    payload_map(source, raw)?;
    let msg: PubSubRaw =
        serde_json::from_value(raw.clone()).map_err(|e| NormalizationError::Malformed {
            source,
            reason: e.to_string(),
        })?;

    let attributes = msg.attributes.unwrap_or_default();
    let kind = attributes
        .get("type")
        .cloned()
        .ok_or(NormalizationError::MissingField {
            source,
            field: "attributes.type",
        })?;

    let id = msg.message_id.unwrap_or_else(|| generated_id(source));

    // Decode the base64 data field to JSON when present. A missing field
    // falls back to the attribute map; an undecodable one is wrapped as
    // {"raw": <original>} rather than failing the whole event.
    let mut metrics = BTreeMap::new();
    let payload = match &msg.data {
        Some(data) => match decode_data(data) {
            Some(decoded) => {
                for (key, value) in &decoded {
                    if let Some(n) = value.as_f64() {
                        metrics.insert(key.clone(), n);
                    }
                }
                decoded
            }
            None => {
                debug!(message_id = %id, "pub-sub data not decodable; preserving raw");
                let mut wrapped = serde_json::Map::new();
                wrapped.insert("raw".to_string(), Value::String(data.clone()));
                wrapped
            }
        },
        None => attributes
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    };

    let severity = attributes
        .get("severity")
        .map(|s| Severity::parse_lenient(s))
        .unwrap_or_default();

    let resource = ResourceRef::new(
        attributes
            .get("resource_type")
            .cloned()
            .unwrap_or_else(|| "pubsub_topic".into()),
        attributes
            .get("resource_name")
            .cloned()
            .unwrap_or_else(|| id.clone()),
    );

    Ok(Event {
        id,
        source,
        kind,
        severity,
        resource,
        observed_at: Utc::now(),
        payload,
        metrics,
    })
}

fn decode_data(data: &str) -> Option<serde_json::Map<String, Value>> {
    let bytes = B64.decode(data.trim()).ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// monitoring-alert adapter
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AlertRaw {
    incident: IncidentRaw,
}

#[derive(Debug, Deserialize)]
struct IncidentRaw {
    incident_id: Option<String>,
    state: Option<String>,
    policy_name: Option<String>,
    resource_type_display_name: Option<String>,
    resource_name: Option<String>,
    threshold_value: Option<f64>,
    observed_value: Option<f64>,
}

fn normalize_monitoring_alert(raw: &Value) -> Result<Event, NormalizationError> {
    let source = SourceKind::MonitoringAlert;
    let payload = payload_map(source, raw)?;
    let alert: AlertRaw =
        serde_json::from_value(raw.clone()).map_err(|e| NormalizationError::Malformed {
            source,
            reason: e.to_string(),
        })?;
    let incident = alert.incident;

    let policy = incident.policy_name.unwrap_or_default();
    if policy.is_empty() {
        return Err(NormalizationError::MissingField {
            source,
            field: "incident.policy_name",
        });
    }

    // Precedence: open + "critical" policy > open > closed.
    let open = incident.state.as_deref() == Some("open");
    let severity = if open && policy.to_ascii_lowercase().contains("critical") {
        Severity::Critical
    } else if open {
        Severity::Error
    } else {
        Severity::Warning
    };

    let mut metrics = BTreeMap::new();
    if let Some(threshold) = incident.threshold_value {
        metrics.insert("threshold".to_string(), threshold);
    }
    if let Some(observed) = incident.observed_value {
        metrics.insert("observed".to_string(), observed);
    }

    Ok(Event {
        id: incident.incident_id.unwrap_or_else(|| generated_id(source)),
        source,
        kind: policy,
        severity,
        resource: ResourceRef::new(
            incident
                .resource_type_display_name
                .unwrap_or_else(|| "unknown".into()),
            incident.resource_name.unwrap_or_else(|| "unknown".into()),
        ),
        observed_at: Utc::now(),
        payload,
        metrics,
    })
}
