//! `payrun-consistency` — invariant-violation scanning.
//!
//! A read-only sweep over the store that detects drift the saga's rollback
//! could not (or did not get the chance to) undo: closed periods with draft
//! records, missing vouchers, orphaned records, abandoned liquidations.
//! Scans run unattended; a single check's query failure never aborts the
//! other checks.

pub mod issue;
pub mod scanner;

pub use issue::{
    aggregate_health, ConsistencyIssue, ConsistencyReport, HealthStatus, IssueDetail, IssueKind,
    IssueScope, Severity,
};
pub use scanner::{ConsistencyScanner, ScannerConfig};
