use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use payrun_core::{CompanyId, PeriodId};

use crate::calculation::PeriodType;

/// Period lifecycle.
///
/// `Processing` doubles as the liquidation mutual-exclusion flag: a period in
/// this state has a saga running against it (or had one that died mid-flight,
/// which the stale-liquidation check eventually notices).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodState {
    Draft,
    Processing,
    Closed,
}

impl PeriodState {
    /// Stable wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodState::Draft => "draft",
            PeriodState::Processing => "processing",
            PeriodState::Closed => "closed",
        }
    }
}

/// Aggregated totals for a closed (or closing) period.
///
/// Amounts in smallest currency unit (e.g., cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub gross: i64,
    pub deductions: i64,
    pub net: i64,
}

/// One payroll cycle for a company.
///
/// Created externally in `Draft`; mutated only by the liquidation saga and the
/// recovery executor, never deleted by this subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: PeriodId,
    pub company_id: CompanyId,
    /// Human-facing period name (e.g. "2026-07"). Denormalized onto payroll
    /// records as `period_label`, which is what orphan re-linking matches on.
    pub name: String,
    pub state: PeriodState,
    pub period_type: PeriodType,
    #[serde(default)]
    pub totals: PeriodTotals,
    pub employee_count: u32,
    pub last_activity_at: DateTime<Utc>,
}

impl Period {
    pub fn is_closed(&self) -> bool {
        self.state == PeriodState::Closed
    }

    pub fn is_processing(&self) -> bool {
        self.state == PeriodState::Processing
    }

    /// How long this period has been sitting without progress.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_activity_at
    }
}
