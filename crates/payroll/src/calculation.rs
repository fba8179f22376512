use serde::{Deserialize, Serialize};

/// Payroll cycle cadence, passed through to the remote computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Monthly,
    Biweekly,
    Weekly,
}

/// A one-off adjustment (bonus, deduction) applied to an employee's pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub concept: String,
    /// Signed amount in smallest currency unit; negative for deductions.
    pub amount: i64,
}

/// Result of the opaque remote payroll computation.
///
/// The arithmetic itself lives behind the store's RPC; this subsystem only
/// transports the figures into records, totals and vouchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calculation {
    pub gross_pay: i64,
    pub health_deduction: i64,
    pub pension_deduction: i64,
    pub net_pay: i64,
}

impl Calculation {
    pub fn total_deductions(&self) -> i64 {
        self.health_deduction + self.pension_deduction
    }
}
