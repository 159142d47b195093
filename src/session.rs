use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::kpi::KpiSet;

/// Per-request state passed explicitly through the pipeline.
///
/// Carries the caller's identity (the company name is never read from the
/// document) and the cancellation signal for in-flight extraction calls.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub session_id: String,
    pub company_name: String,
    cancellation: CancellationToken,
}

impl AnalysisContext {
    pub fn new(session_id: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            company_name: company_name.into(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Shares an existing token, e.g. one tied to the caller's connection.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Boundary store that lets a later request reuse computed KPIs without
/// re-running extraction.
pub trait KpiStore: Send + Sync {
    fn put(&self, session_id: &str, kpis: KpiSet);
    fn get(&self, session_id: &str) -> Option<KpiSet>;
}

#[derive(Debug, Clone)]
struct StoredKpis {
    kpis: KpiSet,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryKpiStore {
    entries: RwLock<HashMap<String, StoredKpis>>,
}

impl InMemoryKpiStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_at(&self, session_id: &str) -> Option<DateTime<Utc>> {
        self.entries.read().get(session_id).map(|e| e.stored_at)
    }

    pub fn remove(&self, session_id: &str) -> Option<KpiSet> {
        self.entries.write().remove(session_id).map(|e| e.kpis)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KpiStore for InMemoryKpiStore {
    fn put(&self, session_id: &str, kpis: KpiSet) {
        self.entries.write().insert(
            session_id.to_string(),
            StoredKpis {
                kpis,
                stored_at: Utc::now(),
            },
        );
    }

    fn get(&self, session_id: &str) -> Option<KpiSet> {
        self.entries.read().get(session_id).map(|e| e.kpis.clone())
    }
}
