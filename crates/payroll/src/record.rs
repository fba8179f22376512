use serde::{Deserialize, Serialize};

use payrun_core::{CompanyId, EmployeeId, PayrollRecordId, PeriodId};

use crate::calculation::Adjustment;

/// Payroll record lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Draft,
    Processed,
}

impl RecordState {
    /// Stable wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::Draft => "draft",
            RecordState::Processed => "processed",
        }
    }
}

/// One employee's computed pay within a period.
///
/// Created before liquidation begins (externally); the saga fills in computed
/// totals and flips `state` to `Processed`. `period_id` may be absent — such
/// records are *orphaned* and violate the ownership invariant until the
/// recovery executor re-links them via `period_label`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollRecord {
    pub id: PayrollRecordId,
    pub period_id: Option<PeriodId>,
    /// Denormalized owning-period name, kept for human reporting and used to
    /// re-link orphaned records by matching against current period names.
    pub period_label: Option<String>,
    pub company_id: CompanyId,
    pub employee_id: EmployeeId,
    pub employee_name: String,
    /// Amounts in smallest currency unit (e.g., cents).
    pub base_salary: i64,
    /// One-off adjustments forwarded to the payroll computation.
    #[serde(default)]
    pub adjustments: Vec<Adjustment>,
    #[serde(default)]
    pub gross_pay: i64,
    #[serde(default)]
    pub health_deduction: i64,
    #[serde(default)]
    pub pension_deduction: i64,
    #[serde(default)]
    pub net_pay: i64,
    pub state: RecordState,
}

impl PayrollRecord {
    pub fn is_draft(&self) -> bool {
        self.state == RecordState::Draft
    }

    pub fn is_orphaned(&self) -> bool {
        self.period_id.is_none()
    }
}
