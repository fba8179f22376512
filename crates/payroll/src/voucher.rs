use serde::{Deserialize, Serialize};

use payrun_core::{CompanyId, EmployeeId, PayrollRecordId, PeriodId, VoucherId};

/// Voucher delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherStatus {
    Pending,
    Sent,
}

impl VoucherStatus {
    /// Stable wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherStatus::Pending => "pending",
            VoucherStatus::Sent => "sent",
        }
    }
}

/// Receipt document derived 1:1 from a processed payroll record.
///
/// Inserted by the saga's voucher phase, or by the recovery executor when one
/// is found missing for a closed period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: VoucherId,
    pub period_id: PeriodId,
    pub company_id: CompanyId,
    pub employee_id: EmployeeId,
    pub payroll_record_id: PayrollRecordId,
    /// Net amount in smallest currency unit.
    pub net_amount: i64,
    pub status: VoucherStatus,
}
