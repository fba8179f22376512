//! Shared audit trail.
//!
//! The liquidation saga and the recovery executor write into one audit
//! collection so operators can correlate a transaction/session id across both
//! subsystems. Appends are best-effort: an audit failure is logged and never
//! fails the business flow it records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use payrun_core::PeriodId;

use crate::client::{to_document, Collection, StoreClient};

/// Which subsystem produced the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    AtomicLiquidation,
    RecoveryOperation,
}

/// Outcome recorded for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Processing,
    Completed,
    Error,
}

/// One audit trail entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Saga transaction id or recovery session id.
    pub session_id: Uuid,
    pub period_id: Option<PeriodId>,
    pub kind: AuditKind,
    pub status: AuditStatus,
    /// Operations applied (saga) or actions run (recovery).
    pub operations_count: usize,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl AuditRecord {
    pub fn new(session_id: Uuid, period_id: Option<PeriodId>, kind: AuditKind) -> Self {
        Self {
            session_id,
            period_id,
            kind,
            status: AuditStatus::Processing,
            operations_count: 0,
            completed_at: None,
            error_message: None,
        }
    }

    pub fn completed(mut self, operations_count: usize, at: DateTime<Utc>) -> Self {
        self.status = AuditStatus::Completed;
        self.operations_count = operations_count;
        self.completed_at = Some(at);
        self
    }

    pub fn errored(
        mut self,
        operations_count: usize,
        at: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        self.status = AuditStatus::Error;
        self.operations_count = operations_count;
        self.completed_at = Some(at);
        self.error_message = Some(message.into());
        self
    }

    /// Append this record, swallowing (but logging) failures.
    pub async fn append_best_effort<S: StoreClient>(&self, store: &S) {
        let doc = match to_document(self) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "audit record serialization failed");
                return;
            }
        };
        if let Err(e) = store.insert(Collection::AuditLog, doc).await {
            warn!(session_id = %self.session_id, error = %e, "audit append failed");
        }
    }
}
