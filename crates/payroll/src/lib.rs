//! `payrun-payroll` — payroll domain entities.
//!
//! Periods, per-employee payroll records and payment vouchers, as persisted in
//! the remote store. These types carry no behavior beyond simple state
//! predicates; all mutation goes through the saga and recovery subsystems.

pub mod calculation;
pub mod period;
pub mod record;
pub mod voucher;

pub use calculation::{Adjustment, Calculation, PeriodType};
pub use period::{Period, PeriodState, PeriodTotals};
pub use record::{PayrollRecord, RecordState};
pub use voucher::{Voucher, VoucherStatus};
