//! Persistence seam for learned outcomes.
//!
//! Outcomes whose attempts carry a substantive detail are persisted after
//! the pipeline returns, off the caller's critical path. Persistence
//! failure is logged by the orchestrator and never surfaces in an
//! [`Outcome`](crate::orchestrator::Outcome).

use std::sync::Mutex;

use async_trait::async_trait;

use crate::orchestrator::Outcome;

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn persist(&self, outcome: &Outcome) -> anyhow::Result<()>;
}

/// Process-local store backing tests and single-node deployments.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<Vec<Outcome>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Outcome> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn persist(&self, outcome: &Outcome) -> anyhow::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(outcome.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::AutonomyLevel;
    use std::time::Duration;

    #[tokio::test]
    async fn in_memory_store_accumulates_outcomes() {
        let store = InMemoryStore::new();
        let outcome = Outcome {
            event_id: "e1".into(),
            resolved: true,
            autonomy_level: AutonomyLevel::Adaptive,
            attempts: vec![],
            total_latency: Duration::from_millis(3),
            memory_formed: true,
            escalated_to_human: false,
        };
        store.persist(&outcome).await.unwrap();
        store.persist(&outcome).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.entries()[0].event_id, "e1");
    }
}
