//! `payrun-recovery` — remediation planning and execution.
//!
//! Turns a consistency report into per-period, prioritized plans and runs
//! them against the store. Actions are idempotent wherever the store allows
//! it, and each runs inside its own failure boundary, mirroring the rollback
//! executor's best-effort philosophy.

pub mod executor;
pub mod plan;
pub mod planner;

pub use executor::RecoveryExecutor;
pub use plan::{
    ActionKind, RecoveryAction, RecoveryExecution, RecoveryPlan, RecoveryPriority, Remedy,
    RiskLevel,
};
pub use planner::RecoveryPlanner;
