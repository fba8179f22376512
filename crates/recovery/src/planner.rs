//! Synthesizes remediation plans from a consistency report.

use std::collections::BTreeMap;

use tracing::warn;

use payrun_consistency::{
    ConsistencyIssue, ConsistencyReport, ConsistencyScanner, IssueDetail, IssueKind, IssueScope,
    Severity,
};
use payrun_core::CompanyId;
use payrun_store::StoreClient;

use crate::plan::{
    estimate_duration, risk_for, RecoveryAction, RecoveryPlan, RecoveryPriority, Remedy,
};

/// Stateless plan builder.
///
/// Groups issues by owning period, maps each issue kind to its fixed remedy,
/// and prioritizes plans by the worst severity observed.
#[derive(Debug, Default)]
pub struct RecoveryPlanner;

impl RecoveryPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Build plans from an existing report, sorted descending by priority.
    pub fn plan(&self, report: &ConsistencyReport) -> Vec<RecoveryPlan> {
        let mut groups: BTreeMap<IssueScope, Vec<&ConsistencyIssue>> = BTreeMap::new();
        for issue in &report.issues {
            groups.entry(issue.scope).or_default().push(issue);
        }

        let mut plans: Vec<RecoveryPlan> = groups
            .into_iter()
            .filter_map(|(scope, issues)| {
                let actions: Vec<RecoveryAction> =
                    issues.iter().filter_map(|i| action_for(i)).collect();
                if actions.is_empty() {
                    return None;
                }
                let priority = priority_for(&issues);
                let risk = risk_for(&actions);
                let estimated_duration = estimate_duration(actions.len());
                Some(RecoveryPlan {
                    scope,
                    actions,
                    priority,
                    risk,
                    estimated_duration,
                })
            })
            .collect();

        plans.sort_by(|a, b| b.priority.cmp(&a.priority));
        plans
    }

    /// Diagnose and plan in one call (the exposed `planRecovery`).
    pub async fn plan_for_company<S: StoreClient>(
        &self,
        scanner: &ConsistencyScanner<S>,
        company_id: CompanyId,
    ) -> Vec<RecoveryPlan> {
        self.plan(&scanner.diagnose(company_id).await)
    }
}

/// Fixed issue-kind → remediation mapping.
fn action_for(issue: &ConsistencyIssue) -> Option<RecoveryAction> {
    let remedy = match (issue.kind, issue.scope, &issue.detail) {
        (IssueKind::StateMismatch, IssueScope::Period(period_id), _) => {
            Remedy::SyncRecordStates { period_id }
        }
        (IssueKind::MissingVouchers, IssueScope::Period(period_id), _) => {
            Remedy::RegenerateVouchers { period_id }
        }
        (
            IssueKind::OrphanedPayrolls,
            _,
            IssueDetail::OrphanedPayrolls { label, record_ids },
        ) => Remedy::RelinkOrphans {
            label: label.clone(),
            record_ids: record_ids.clone(),
        },
        (IssueKind::IncompleteLiquidation, IssueScope::Period(period_id), _) => {
            Remedy::ResetToDraft { period_id }
        }
        _ => {
            warn!(kind = ?issue.kind, scope = ?issue.scope, "issue shape has no remediation; skipping");
            return None;
        }
    };
    Some(RecoveryAction::for_remedy(remedy, issue.description.clone()))
}

/// critical→critical, high→high, else medium for broad groups, else low.
fn priority_for(issues: &[&ConsistencyIssue]) -> RecoveryPriority {
    let worst = issues
        .iter()
        .map(|i| i.severity)
        .max()
        .unwrap_or(Severity::Low);
    match worst {
        Severity::Critical => RecoveryPriority::Critical,
        Severity::High => RecoveryPriority::High,
        _ if issues.len() > 2 => RecoveryPriority::Medium,
        _ => RecoveryPriority::Low,
    }
}
