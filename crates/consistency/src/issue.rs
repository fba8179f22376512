//! Issue and report model.
//!
//! Severities and health statuses are ordered enums with a total order, so
//! comparisons never fall through an unhandled string key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use payrun_core::{CompanyId, PayrollRecordId, PeriodId};

/// How bad one detected violation is. Declaration order is the total order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Overall store health derived from a scan's issue set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    MinorIssues,
    MajorIssues,
    Critical,
}

/// The four invariant-violation classes the scanner detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Closed period with at least one draft payroll record.
    StateMismatch,
    /// Closed period whose voucher count falls short of its employee count.
    MissingVouchers,
    /// Payroll records with no owning period identifier.
    OrphanedPayrolls,
    /// Period stuck in processing past the staleness threshold.
    IncompleteLiquidation,
}

/// Which period an issue belongs to, or a sentinel for records that cannot
/// be attributed to any period.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IssueScope {
    Period(PeriodId),
    Unattributed,
}

/// Structured, kind-specific payload of an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssueDetail {
    StateMismatch {
        draft_records: Vec<PayrollRecordId>,
    },
    MissingVouchers {
        expected: u32,
        found: u32,
    },
    OrphanedPayrolls {
        label: Option<String>,
        record_ids: Vec<PayrollRecordId>,
    },
    IncompleteLiquidation {
        stalled_hours: i64,
    },
}

/// One detected invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub scope: IssueScope,
    pub description: String,
    pub auto_repairable: bool,
    pub detail: IssueDetail,
}

/// Output of one diagnostic sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub company_id: CompanyId,
    pub health: HealthStatus,
    pub issues: Vec<ConsistencyIssue>,
    pub scanned_at: DateTime<Utc>,
}

impl ConsistencyReport {
    pub fn from_issues(company_id: CompanyId, issues: Vec<ConsistencyIssue>) -> Self {
        Self {
            company_id,
            health: aggregate_health(&issues),
            issues,
            scanned_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health == HealthStatus::Healthy
    }
}

/// Any critical issue dominates; more than five issues of any severity is
/// major; anything else with at least one issue is minor.
pub fn aggregate_health(issues: &[ConsistencyIssue]) -> HealthStatus {
    if issues.iter().any(|i| i.severity == Severity::Critical) {
        HealthStatus::Critical
    } else if issues.len() > 5 {
        HealthStatus::MajorIssues
    } else if !issues.is_empty() {
        HealthStatus::MinorIssues
    } else {
        HealthStatus::Healthy
    }
}
