//! Runs recovery plans against the store.
//!
//! Each action executes inside its own failure boundary: a failing action is
//! captured as an error entry and the remaining actions still run. Repairs
//! and cleanups are idempotent; regeneration checks for existing vouchers
//! before inserting. Start and end of every run land in the same audit trail
//! the liquidation saga writes to.

use chrono::Utc;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use payrun_core::{CompanyId, PayrollRecordId, PeriodId, UserId, VoucherId};
use payrun_payroll::{
    PayrollRecord, Period, PeriodState, RecordState, Voucher, VoucherStatus,
};
use payrun_store::{
    from_document, to_document, AuditKind, AuditRecord, Collection, Match, StoreClient,
};

use crate::plan::{RecoveryAction, RecoveryExecution, RecoveryPlan, Remedy};

/// Executes recovery plans, independent of whether their issues came from a
/// failed saga or a scheduled scan.
#[derive(Debug)]
pub struct RecoveryExecutor<S> {
    store: S,
}

impl<S: StoreClient> RecoveryExecutor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn execute(
        &self,
        plan: &RecoveryPlan,
        company_id: CompanyId,
        actor_id: UserId,
    ) -> RecoveryExecution {
        let session_id = Uuid::now_v7();
        let period_id = match plan.scope {
            payrun_consistency::IssueScope::Period(id) => Some(id),
            payrun_consistency::IssueScope::Unattributed => None,
        };
        let started = std::time::Instant::now();
        info!(
            %session_id,
            ?period_id,
            actor = %actor_id,
            actions = plan.actions.len(),
            "starting recovery run"
        );

        AuditRecord::new(session_id, period_id, AuditKind::RecoveryOperation)
            .append_best_effort(&self.store)
            .await;

        let mut messages = Vec::new();
        let mut errors = Vec::new();
        let mut completed = 0usize;
        for action in &plan.actions {
            match self.run_action(action, company_id).await {
                Ok(message) => {
                    completed += 1;
                    messages.push(message);
                }
                Err(e) => {
                    error!(%session_id, action = %action.description, error = %e, "recovery action failed; continuing");
                    errors.push(format!("{}: {e:#}", action.description));
                }
            }
        }

        let success = errors.is_empty();
        let closing = AuditRecord::new(session_id, period_id, AuditKind::RecoveryOperation);
        let closing = if success {
            closing.completed(completed, Utc::now())
        } else {
            closing.errored(completed, Utc::now(), errors.join("; "))
        };
        closing.append_best_effort(&self.store).await;

        RecoveryExecution {
            session_id,
            success,
            actions_completed: completed,
            actions_total: plan.actions.len(),
            elapsed: started.elapsed(),
            messages,
            errors,
        }
    }

    async fn run_action(
        &self,
        action: &RecoveryAction,
        company_id: CompanyId,
    ) -> anyhow::Result<String> {
        match &action.remedy {
            Remedy::SyncRecordStates { period_id } => self.sync_record_states(*period_id).await,
            Remedy::RegenerateVouchers { period_id } => {
                self.regenerate_vouchers(*period_id, company_id).await
            }
            Remedy::RelinkOrphans { label, record_ids } => {
                self.relink_orphans(company_id, label.as_deref(), record_ids)
                    .await
            }
            Remedy::ResetToDraft { period_id } => self.reset_to_draft(*period_id).await,
            Remedy::ManualRollback { period_id } => {
                anyhow::bail!("rollback of period {period_id} requires operator intervention")
            }
        }
    }

    /// Force draft records of a closed period to `processed`.
    async fn sync_record_states(&self, period_id: PeriodId) -> anyhow::Result<String> {
        let synced = self
            .store
            .update(
                Collection::PayrollRecords,
                &Match::new()
                    .field("period_id", period_id)
                    .field("state", RecordState::Draft),
                json!({"state": RecordState::Processed}),
            )
            .await?;
        Ok(format!(
            "synchronized {synced} payroll record(s) with closed period {period_id}"
        ))
    }

    /// Insert vouchers for processed records that lack one.
    async fn regenerate_vouchers(
        &self,
        period_id: PeriodId,
        company_id: CompanyId,
    ) -> anyhow::Result<String> {
        let records = self
            .store
            .query(
                Collection::PayrollRecords,
                &Match::new()
                    .field("period_id", period_id)
                    .field("state", RecordState::Processed),
            )
            .await?
            .into_iter()
            .map(from_document::<PayrollRecord>)
            .collect::<Result<Vec<_>, _>>()?;

        let covered: Vec<PayrollRecordId> = self
            .store
            .query(
                Collection::Vouchers,
                &Match::new().field("period_id", period_id),
            )
            .await?
            .into_iter()
            .map(from_document::<Voucher>)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|v| v.payroll_record_id)
            .collect();

        let mut created = 0usize;
        for record in records {
            if covered.contains(&record.id) {
                continue;
            }
            let voucher = Voucher {
                id: VoucherId::new(),
                period_id,
                company_id,
                employee_id: record.employee_id,
                payroll_record_id: record.id,
                net_amount: record.net_pay,
                status: VoucherStatus::Pending,
            };
            self.store
                .insert(Collection::Vouchers, to_document(&voucher)?)
                .await?;
            created += 1;
        }
        Ok(format!(
            "created {created} missing voucher(s) for period {period_id}"
        ))
    }

    /// Re-link orphans whose label matches exactly one current period name.
    async fn relink_orphans(
        &self,
        company_id: CompanyId,
        label: Option<&str>,
        record_ids: &[PayrollRecordId],
    ) -> anyhow::Result<String> {
        let Some(label) = label else {
            return Ok("orphaned records carry no label; left for manual review".to_string());
        };

        let candidates = self
            .store
            .query(
                Collection::Periods,
                &Match::new()
                    .field("company_id", company_id)
                    .field("name", label),
            )
            .await?
            .into_iter()
            .map(from_document::<Period>)
            .collect::<Result<Vec<_>, _>>()?;

        if candidates.len() != 1 {
            return Ok(format!(
                "label '{label}' matches {} period(s); left for manual review",
                candidates.len()
            ));
        }
        let target = &candidates[0];

        let mut relinked = 0u64;
        for record_id in record_ids {
            // Matching on a null period_id keeps re-runs from touching
            // records someone already linked.
            relinked += self
                .store
                .update(
                    Collection::PayrollRecords,
                    &Match::new().field("id", *record_id).null("period_id"),
                    json!({"period_id": target.id}),
                )
                .await?;
        }
        Ok(format!(
            "re-linked {relinked} orphaned record(s) to period '{label}'"
        ))
    }

    /// Reset an abandoned period so liquidation can be retried from scratch.
    async fn reset_to_draft(&self, period_id: PeriodId) -> anyhow::Result<String> {
        let reset = self
            .store
            .update(
                Collection::Periods,
                &Match::new()
                    .field("id", period_id)
                    .field("state", PeriodState::Processing),
                json!({
                    "state": PeriodState::Draft,
                    "last_activity_at": Utc::now(),
                }),
            )
            .await?;
        if reset == 0 {
            return Ok(format!(
                "period {period_id} is no longer processing; nothing to reset"
            ));
        }
        Ok(format!("reset period {period_id} to draft for a fresh attempt"))
    }
}
