//! Command-line front end for the remediation pipeline.
//!
//! Reads JSONL from a file or stdin, one envelope per line:
//!
//! ```json
//! {"source": "monitoring-alert", "payload": {"incident": {...}}}
//! ```
//!
//! Each line is normalized and run through the escalation ladder; the
//! resulting outcome is printed as JSON on stdout. A homeostasis summary
//! is logged once the input is exhausted.
//!
//! ```bash
//! homeostat --rules rules.toml --input events.jsonl
//! RUST_LOG=debug homeostat --collaborator-url http://localhost:8080/reflect < events.jsonl
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use homeostat::{
    AdaptiveGateway, CellCategory, CellResult, CellSwarm, EscalationOrchestrator, Event,
    HttpCollaborator, InMemoryStore, LoggingActionRunner, PipelineConfig, ReasoningCollaborator,
    Reflection, ReflexTier, RemediationCell, ResolutionSlo, RuleTable, SourceKind, TierAttempt,
    TierError,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Tiered autonomous incident remediation", long_about = None)]
struct Args {
    /// Path to a TOML reflex rule table; empty table when omitted
    #[arg(long)]
    rules: Option<PathBuf>,

    /// JSONL input file, or "-" for stdin
    #[arg(long, default_value = "-")]
    input: String,

    /// Reasoning collaborator endpoint; adaptive tier reports unavailable
    /// when omitted
    #[arg(long)]
    collaborator_url: Option<String>,
}

/// One input line: which adapter to use plus the raw provider payload.
#[derive(Debug, Deserialize)]
struct Envelope {
    source: String,
    payload: Value,
}

/// Stands in for a reasoning endpoint when none is configured, so the
/// ladder still degrades cleanly to human escalation.
struct OfflineCollaborator;

#[async_trait]
impl ReasoningCollaborator for OfflineCollaborator {
    async fn reflect(
        &self,
        _event: &Event,
        _attempts: &[TierAttempt],
    ) -> Result<Reflection, TierError> {
        Err(TierError::CollaboratorUnavailable(
            "no collaborator endpoint configured".into(),
        ))
    }
}

/// Restarts the workload on the event's resource. Effective against
/// crash-loop and memory-leak signatures.
struct RestartCell;

#[async_trait]
impl RemediationCell for RestartCell {
    fn name(&self) -> &str {
        "restart-workload"
    }

    fn category(&self) -> CellCategory {
        CellCategory::Termination
    }

    fn applies_to(&self, event: &Event) -> bool {
        event.kind.contains("crash") || event.kind.contains("oom")
    }

    async fn run(&self, event: &Event) -> Result<CellResult, TierError> {
        info!(resource = %event.resource, "Restarting workload (log-only)");
        Ok(CellResult {
            action_taken: format!("restart {}", event.resource),
            succeeded: true,
            contained: true,
        })
    }
}

/// Clears temp storage on disk-pressure events.
struct ScrubCell;

#[async_trait]
impl RemediationCell for ScrubCell {
    fn name(&self) -> &str {
        "scrub-temp-storage"
    }

    fn category(&self) -> CellCategory {
        CellCategory::Cleanup
    }

    fn applies_to(&self, event: &Event) -> bool {
        event.kind.contains("disk")
    }

    async fn run(&self, event: &Event) -> Result<CellResult, TierError> {
        info!(resource = %event.resource, "Scrubbing temp storage (log-only)");
        Ok(CellResult {
            action_taken: format!("scrub {}", event.resource),
            succeeded: true,
            contained: true,
        })
    }
}

fn build_orchestrator(args: &Args) -> Result<EscalationOrchestrator> {
    let config = PipelineConfig::default();

    let table = match &args.rules {
        Some(path) => RuleTable::from_toml_file(path)?,
        None => RuleTable::new(Vec::new()),
    };
    let reflex = ReflexTier::new(table, Arc::new(LoggingActionRunner), &config);

    let cells: Vec<Arc<dyn RemediationCell>> = vec![Arc::new(RestartCell), Arc::new(ScrubCell)];
    let swarm = CellSwarm::new(cells, &config);

    let collaborator: Arc<dyn ReasoningCollaborator> = match &args.collaborator_url {
        Some(url) => Arc::new(HttpCollaborator::new(url.clone())),
        None => Arc::new(OfflineCollaborator),
    };
    let adaptive = AdaptiveGateway::new(collaborator, &config);

    Ok(EscalationOrchestrator::new(config, reflex, swarm, adaptive)
        .with_memory_store(Arc::new(InMemoryStore::new())))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let orchestrator = build_orchestrator(&args)?;

    let reader: Box<dyn BufRead> = if args.input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(&args.input)
            .with_context(|| format!("failed to open input file {}", args.input))?;
        Box::new(BufReader::new(file))
    };

    let mut processed = 0usize;
    for line in reader.lines() {
        let line = line.context("failed to read input line")?;
        if line.trim().is_empty() {
            continue;
        }
        let envelope: Envelope = match serde_json::from_str(&line) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "Skipping unparseable input line");
                continue;
            }
        };
        let source = match SourceKind::from_str(&envelope.source) {
            Ok(source) => source,
            Err(e) => {
                warn!(source = %envelope.source, error = %e, "Skipping line with unknown source");
                continue;
            }
        };

        let outcome = orchestrator.process_raw(source, &envelope.payload).await;
        println!("{}", serde_json::to_string(&outcome)?);
        processed += 1;
    }

    let snapshot = orchestrator.tracker().snapshot();
    let severity = ResolutionSlo::default().evaluate(&snapshot);
    info!(
        processed,
        resolution_rate = snapshot.resolution_rate,
        samples = snapshot.sample_count,
        slo = %severity,
        "Input exhausted"
    );

    Ok(())
}
