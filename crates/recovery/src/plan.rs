//! Recovery plan model.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use payrun_consistency::IssueScope;
use payrun_core::{PayrollRecordId, PeriodId};

/// Plan urgency. Declaration order is the total order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// How intrusive running a plan is expected to be.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Action classification exposed to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Cleanup,
    Repair,
    Regenerate,
    Rollback,
}

/// Typed parameters of one remediation step.
///
/// A closed union: the executor dispatches on this, never on strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Remedy {
    /// Force child record states into line with their closed period.
    SyncRecordStates { period_id: PeriodId },
    /// Create missing vouchers, skipping any that already exist.
    RegenerateVouchers { period_id: PeriodId },
    /// Re-link orphaned records by matching their label to a period name.
    RelinkOrphans {
        label: Option<String>,
        record_ids: Vec<PayrollRecordId>,
    },
    /// Reset an abandoned period to draft so liquidation can be retried.
    ResetToDraft { period_id: PeriodId },
    /// Reserved for manual interventions; never executed automatically.
    ManualRollback { period_id: PeriodId },
}

impl Remedy {
    pub fn kind(&self) -> ActionKind {
        match self {
            Remedy::SyncRecordStates { .. } | Remedy::RelinkOrphans { .. } => ActionKind::Repair,
            Remedy::RegenerateVouchers { .. } => ActionKind::Regenerate,
            Remedy::ResetToDraft { .. } => ActionKind::Cleanup,
            Remedy::ManualRollback { .. } => ActionKind::Rollback,
        }
    }

    /// Discarding a stuck attempt loses work; everything else is additive.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Remedy::ResetToDraft { .. })
    }
}

/// One remediation step in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub kind: ActionKind,
    pub description: String,
    pub requires_confirmation: bool,
    pub remedy: Remedy,
}

impl RecoveryAction {
    pub fn for_remedy(remedy: Remedy, description: impl Into<String>) -> Self {
        Self {
            kind: remedy.kind(),
            description: description.into(),
            requires_confirmation: remedy.requires_confirmation(),
            remedy,
        }
    }
}

/// Per-period (or unattributed) remediation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub scope: IssueScope,
    pub actions: Vec<RecoveryAction>,
    pub priority: RecoveryPriority,
    pub risk: RiskLevel,
    /// Operator-facing display figure, not a scheduling input.
    pub estimated_duration: Duration,
}

const ESTIMATE_BASE: Duration = Duration::from_secs(5);
const ESTIMATE_PER_ACTION: Duration = Duration::from_secs(3);

/// Linear display-only duration model.
pub fn estimate_duration(action_count: usize) -> Duration {
    ESTIMATE_BASE + ESTIMATE_PER_ACTION * action_count as u32
}

/// High when any action needs confirmation, medium for broad plans.
pub fn risk_for(actions: &[RecoveryAction]) -> RiskLevel {
    if actions.iter().any(|a| a.requires_confirmation) {
        RiskLevel::High
    } else if actions.len() > 2 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Outcome of running one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryExecution {
    pub session_id: Uuid,
    pub success: bool,
    pub actions_completed: usize,
    pub actions_total: usize,
    pub elapsed: Duration,
    /// Per-action progress messages, in execution order.
    pub messages: Vec<String>,
    /// Per-action failures, in execution order.
    pub errors: Vec<String>,
}
