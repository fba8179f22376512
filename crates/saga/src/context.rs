//! Per-attempt saga bookkeeping and the in-flight registry.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use payrun_core::{CompanyId, PeriodId, TransactionId};

use crate::operation::{Compensation, Operation};

/// The ordered phases of a liquidation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaPhase {
    Validate,
    MarkProcessing,
    ProcessEmployees,
    UpdateTotals,
    GenerateVouchers,
    Finalize,
    Audit,
}

impl SagaPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaPhase::Validate => "validate",
            SagaPhase::MarkProcessing => "mark_processing",
            SagaPhase::ProcessEmployees => "process_employees",
            SagaPhase::UpdateTotals => "update_totals",
            SagaPhase::GenerateVouchers => "generate_vouchers",
            SagaPhase::Finalize => "finalize",
            SagaPhase::Audit => "audit",
        }
    }
}

impl core::fmt::Display for SagaPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named, timestamped marker recorded before/after each phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub label: String,
    pub at: DateTime<Utc>,
}

/// The unit of work for one liquidation attempt.
///
/// Lives only for the duration of one `liquidate` call; never persisted.
/// Compensations are built as operations are applied, so the rollback
/// executor can replay them in reverse without re-deriving anything.
#[derive(Debug)]
pub struct SagaContext {
    pub transaction_id: TransactionId,
    pub period_id: PeriodId,
    pub company_id: CompanyId,
    pub started_at: DateTime<Utc>,
    operations: Vec<Operation>,
    compensations: Vec<Compensation>,
    checkpoints: Vec<Checkpoint>,
}

impl SagaContext {
    pub fn new(period_id: PeriodId, company_id: CompanyId) -> Self {
        Self {
            transaction_id: TransactionId::new(),
            period_id,
            company_id,
            started_at: Utc::now(),
            operations: Vec::new(),
            compensations: Vec::new(),
            checkpoints: Vec::new(),
        }
    }

    /// Record an applied operation together with its derived inverse.
    pub fn record(&mut self, operation: Operation) {
        self.compensations.push(operation.compensation());
        self.operations.push(operation);
    }

    pub fn checkpoint(&mut self, label: impl Into<String>) {
        self.checkpoints.push(Checkpoint {
            label: label.into(),
            at: Utc::now(),
        });
    }

    pub fn phase_start(&mut self, phase: SagaPhase) {
        self.checkpoint(format!("{phase}:start"));
    }

    pub fn phase_end(&mut self, phase: SagaPhase) {
        self.checkpoint(format!("{phase}:end"));
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Compensations in application order; rollback iterates in reverse.
    pub fn compensations(&self) -> &[Compensation] {
        &self.compensations
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn has_mutations(&self) -> bool {
        !self.operations.is_empty()
    }
}

/// Summary of an in-flight saga, as held by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightSaga {
    pub transaction_id: TransactionId,
    pub period_id: PeriodId,
    pub company_id: CompanyId,
    pub started_at: DateTime<Utc>,
}

/// Registry of in-flight sagas.
///
/// An explicit service object shared by reference — not a module-level
/// singleton. Entries are registered when a saga starts and dropped on every
/// terminal outcome of a live process; only a crashed process leaves one
/// behind, which the periodic [`SagaTracker::cleanup_abandoned`] sweep purges.
/// This is in-memory bookkeeping only, distinct from the persisted
/// stale-period check the consistency scanner performs.
#[derive(Debug, Default)]
pub struct SagaTracker {
    entries: Mutex<HashMap<TransactionId, InFlightSaga>>,
}

impl SagaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, context: &SagaContext) {
        let entry = InFlightSaga {
            transaction_id: context.transaction_id,
            period_id: context.period_id,
            company_id: context.company_id,
            started_at: context.started_at,
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.transaction_id, entry);
    }

    /// Drop a saga that reached a terminal state (success or rolled back).
    pub fn complete(&self, transaction_id: TransactionId) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&transaction_id);
    }

    pub fn in_flight(&self) -> Vec<InFlightSaga> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Purge entries older than `max_age_hours`; returns how many were removed.
    pub fn cleanup_abandoned(&self, max_age_hours: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| e.started_at >= cutoff);
        before - entries.len()
    }
}
