//! The liquidation orchestrator.
//!
//! Runs the ordered phases of "liquidate a payroll period" against the
//! non-transactional store, recording every mutation in the operation log so
//! a phase failure can be compensated. The period's `state` field is the only
//! mutual-exclusion primitive; the draft→processing transition is a
//! conditional update whose matched-count is checked, so two racing attempts
//! for the same period fail closed instead of both proceeding.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use payrun_core::{CompanyId, PeriodId, TransactionId, UserId, VoucherId};
use payrun_payroll::{
    Calculation, PayrollRecord, Period, PeriodState, PeriodTotals, RecordState, Voucher,
    VoucherStatus,
};
use payrun_store::{
    from_document, to_document, AuditKind, AuditRecord, Collection, Document, Match, StoreClient,
    StoreError,
};

use crate::context::{Checkpoint, SagaContext, SagaPhase, SagaTracker};
use crate::operation::Operation;
use crate::rollback::RollbackExecutor;

/// Why a liquidation attempt failed.
///
/// Everything except `Store` is a precondition failure: detected before any
/// mutation, so there is nothing to roll back.
#[derive(Debug, Error)]
pub enum LiquidationError {
    #[error("period {0} not found")]
    PeriodNotFound(PeriodId),

    #[error("period {0} belongs to a different company")]
    CompanyMismatch(PeriodId),

    #[error("period {0} is already closed")]
    AlreadyClosed(PeriodId),

    #[error("a liquidation is already in progress for period {0}")]
    AlreadyInProgress(PeriodId),

    #[error("period {0} has no payroll records")]
    NoPayrollRecords(PeriodId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LiquidationError {
    pub fn is_precondition(&self) -> bool {
        !matches!(self, LiquidationError::Store(_))
    }
}

/// Caller-facing summary of one liquidation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResult {
    pub success: bool,
    pub transaction_id: TransactionId,
    pub operations_completed: usize,
    /// Planned mutation count (known once validation has counted records);
    /// zero when validation itself failed.
    pub operations_total: usize,
    pub error: Option<String>,
    pub rollback_required: bool,
    /// `Some(false)` means residual drift was left for the scanner.
    pub rollback_completed: Option<bool>,
    pub details: LiquidationDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationDetails {
    pub period_id: PeriodId,
    pub totals: Option<PeriodTotals>,
    pub voucher_count: usize,
    pub employees_processed: usize,
    pub failed_phase: Option<SagaPhase>,
    pub checkpoints: Vec<Checkpoint>,
}

struct PhaseOutput {
    totals: PeriodTotals,
    voucher_count: usize,
    employees_processed: usize,
}

/// Orchestrates the liquidation saga over an injected store client.
#[derive(Debug)]
pub struct LiquidationSaga<S> {
    store: S,
    tracker: Arc<SagaTracker>,
}

impl<S: StoreClient> LiquidationSaga<S> {
    pub fn new(store: S, tracker: Arc<SagaTracker>) -> Self {
        Self { store, tracker }
    }

    pub fn tracker(&self) -> &Arc<SagaTracker> {
        &self.tracker
    }

    /// Maintenance hook: purge in-memory bookkeeping for sagas whose process
    /// never reached a terminal state.
    pub fn cleanup_abandoned_saga_contexts(&self, max_age_hours: i64) -> usize {
        self.tracker.cleanup_abandoned(max_age_hours)
    }

    /// Liquidate one payroll period, all-or-nothing via compensation.
    pub async fn liquidate(
        &self,
        period_id: PeriodId,
        company_id: CompanyId,
        actor_id: UserId,
    ) -> LiquidationResult {
        let mut ctx = SagaContext::new(period_id, company_id);
        self.tracker.register(&ctx);
        info!(
            transaction_id = %ctx.transaction_id,
            %period_id,
            actor = %actor_id,
            "starting liquidation"
        );

        let mut planned_ops = 0usize;
        let outcome = self.run_phases(&mut ctx, &mut planned_ops).await;
        let result = match outcome {
            Ok(output) => {
                ctx.phase_start(SagaPhase::Audit);
                AuditRecord::new(
                    ctx.transaction_id.into(),
                    Some(period_id),
                    AuditKind::AtomicLiquidation,
                )
                .completed(ctx.operations().len(), Utc::now())
                .append_best_effort(&self.store)
                .await;
                ctx.phase_end(SagaPhase::Audit);

                info!(
                    transaction_id = %ctx.transaction_id,
                    vouchers = output.voucher_count,
                    "liquidation completed"
                );
                LiquidationResult {
                    success: true,
                    transaction_id: ctx.transaction_id,
                    operations_completed: ctx.operations().len(),
                    operations_total: planned_ops,
                    error: None,
                    rollback_required: false,
                    rollback_completed: None,
                    details: LiquidationDetails {
                        period_id,
                        totals: Some(output.totals),
                        voucher_count: output.voucher_count,
                        employees_processed: output.employees_processed,
                        failed_phase: None,
                        checkpoints: ctx.checkpoints().to_vec(),
                    },
                }
            }
            Err((phase, error)) => {
                warn!(
                    transaction_id = %ctx.transaction_id,
                    %phase,
                    %error,
                    "liquidation failed"
                );

                let rollback_required = ctx.has_mutations();
                let rollback_completed = if rollback_required {
                    let report = RollbackExecutor::new(&self.store).rollback(&ctx).await;
                    Some(report.completed)
                } else {
                    None
                };

                AuditRecord::new(
                    ctx.transaction_id.into(),
                    Some(period_id),
                    AuditKind::AtomicLiquidation,
                )
                .errored(ctx.operations().len(), Utc::now(), error.to_string())
                .append_best_effort(&self.store)
                .await;

                LiquidationResult {
                    success: false,
                    transaction_id: ctx.transaction_id,
                    operations_completed: ctx.operations().len(),
                    operations_total: planned_ops,
                    error: Some(error.to_string()),
                    rollback_required,
                    rollback_completed,
                    details: LiquidationDetails {
                        period_id,
                        totals: None,
                        voucher_count: 0,
                        employees_processed: 0,
                        failed_phase: Some(phase),
                        checkpoints: ctx.checkpoints().to_vec(),
                    },
                }
            }
        };

        self.tracker.complete(ctx.transaction_id);
        result
    }

    async fn run_phases(
        &self,
        ctx: &mut SagaContext,
        planned_ops: &mut usize,
    ) -> Result<PhaseOutput, (SagaPhase, LiquidationError)> {
        ctx.phase_start(SagaPhase::Validate);
        let (period, records) = self
            .validate(ctx.period_id, ctx.company_id)
            .await
            .map_err(|e| (SagaPhase::Validate, e))?;
        ctx.phase_end(SagaPhase::Validate);

        // mark + per-record update + totals + per-record voucher + finalize
        *planned_ops = records.len() * 2 + 3;

        ctx.phase_start(SagaPhase::MarkProcessing);
        self.mark_processing(ctx)
            .await
            .map_err(|e| (SagaPhase::MarkProcessing, e))?;
        ctx.phase_end(SagaPhase::MarkProcessing);

        ctx.phase_start(SagaPhase::ProcessEmployees);
        let calculations = self
            .process_employees(ctx, &period, &records)
            .await
            .map_err(|e| (SagaPhase::ProcessEmployees, e))?;
        ctx.phase_end(SagaPhase::ProcessEmployees);

        ctx.phase_start(SagaPhase::UpdateTotals);
        let totals = self
            .update_totals(ctx, &records, &calculations)
            .await
            .map_err(|e| (SagaPhase::UpdateTotals, e))?;
        ctx.phase_end(SagaPhase::UpdateTotals);

        ctx.phase_start(SagaPhase::GenerateVouchers);
        let voucher_count = self
            .generate_vouchers(ctx, &records, &calculations)
            .await
            .map_err(|e| (SagaPhase::GenerateVouchers, e))?;
        ctx.phase_end(SagaPhase::GenerateVouchers);

        ctx.phase_start(SagaPhase::Finalize);
        self.finalize(ctx)
            .await
            .map_err(|e| (SagaPhase::Finalize, e))?;
        ctx.phase_end(SagaPhase::Finalize);

        Ok(PhaseOutput {
            totals,
            voucher_count,
            employees_processed: records.len(),
        })
    }

    /// Phase 1: fail fast with nothing to roll back.
    async fn validate(
        &self,
        period_id: PeriodId,
        company_id: CompanyId,
    ) -> Result<(Period, Vec<PayrollRecord>), LiquidationError> {
        let docs = self
            .store
            .query(Collection::Periods, &Match::new().field("id", period_id))
            .await?;
        let doc = docs
            .into_iter()
            .next()
            .ok_or(LiquidationError::PeriodNotFound(period_id))?;
        let period: Period = from_document(doc)?;

        if period.company_id != company_id {
            return Err(LiquidationError::CompanyMismatch(period_id));
        }
        match period.state {
            PeriodState::Closed => return Err(LiquidationError::AlreadyClosed(period_id)),
            PeriodState::Processing => return Err(LiquidationError::AlreadyInProgress(period_id)),
            PeriodState::Draft => {}
        }

        let record_docs = self
            .store
            .query(
                Collection::PayrollRecords,
                &Match::new().field("period_id", period_id),
            )
            .await?;
        if record_docs.is_empty() {
            return Err(LiquidationError::NoPayrollRecords(period_id));
        }
        let records = record_docs
            .into_iter()
            .map(from_document)
            .collect::<Result<Vec<PayrollRecord>, _>>()?;

        Ok((period, records))
    }

    /// Phase 2: conditional draft→processing transition.
    async fn mark_processing(&self, ctx: &mut SagaContext) -> Result<(), LiquidationError> {
        let identity = Match::new().field("id", ctx.period_id);
        let prior = self.fetch_pre_image(Collection::Periods, &identity).await?;

        let guard = identity.clone().field("state", PeriodState::Draft);
        let changes = json!({
            "state": PeriodState::Processing,
            "last_activity_at": Utc::now(),
        });
        let touched = self
            .store
            .update(Collection::Periods, &guard, changes.clone())
            .await?;
        if touched == 0 {
            // A concurrent attempt won the transition after our validation read.
            return Err(LiquidationError::AlreadyInProgress(ctx.period_id));
        }

        ctx.record(Operation::Update {
            collection: Collection::Periods,
            matches: identity,
            changes,
            prior,
        });
        Ok(())
    }

    /// Phase 3: one remote computation + record update per employee.
    async fn process_employees(
        &self,
        ctx: &mut SagaContext,
        period: &Period,
        records: &[PayrollRecord],
    ) -> Result<Vec<Calculation>, LiquidationError> {
        let mut calculations = Vec::with_capacity(records.len());
        for record in records {
            let calculation = self
                .store
                .compute_payroll(
                    record.employee_id,
                    record.base_salary,
                    period.period_type,
                    &record.adjustments,
                )
                .await?;

            let identity = Match::new().field("id", record.id);
            let changes = json!({
                "gross_pay": calculation.gross_pay,
                "health_deduction": calculation.health_deduction,
                "pension_deduction": calculation.pension_deduction,
                "net_pay": calculation.net_pay,
                "state": RecordState::Processed,
            });
            self.recorded_update(ctx, Collection::PayrollRecords, identity, changes)
                .await?;
            calculations.push(calculation);
        }
        Ok(calculations)
    }

    /// Phase 4: aggregate per-employee results into the period.
    async fn update_totals(
        &self,
        ctx: &mut SagaContext,
        records: &[PayrollRecord],
        calculations: &[Calculation],
    ) -> Result<PeriodTotals, LiquidationError> {
        let totals = PeriodTotals {
            gross: calculations.iter().map(|c| c.gross_pay).sum(),
            deductions: calculations.iter().map(|c| c.total_deductions()).sum(),
            net: calculations.iter().map(|c| c.net_pay).sum(),
        };
        let changes = json!({
            "totals": totals,
            "employee_count": records.len() as u32,
            "last_activity_at": Utc::now(),
        });
        self.recorded_update(
            ctx,
            Collection::Periods,
            Match::new().field("id", ctx.period_id),
            changes,
        )
        .await?;
        Ok(totals)
    }

    /// Phase 5: one pending voucher per processed record.
    async fn generate_vouchers(
        &self,
        ctx: &mut SagaContext,
        records: &[PayrollRecord],
        calculations: &[Calculation],
    ) -> Result<usize, LiquidationError> {
        for (record, calculation) in records.iter().zip(calculations) {
            let voucher = Voucher {
                id: VoucherId::new(),
                period_id: ctx.period_id,
                company_id: ctx.company_id,
                employee_id: record.employee_id,
                payroll_record_id: record.id,
                net_amount: calculation.net_pay,
                status: VoucherStatus::Pending,
            };
            let doc = to_document(&voucher)?;
            self.store.insert(Collection::Vouchers, doc).await?;
            ctx.record(Operation::Insert {
                collection: Collection::Vouchers,
                key: Match::new().field("id", voucher.id),
            });
        }
        Ok(records.len())
    }

    /// Phase 6: close the period.
    async fn finalize(&self, ctx: &mut SagaContext) -> Result<(), LiquidationError> {
        let changes = json!({
            "state": PeriodState::Closed,
            "last_activity_at": Utc::now(),
        });
        self.recorded_update(
            ctx,
            Collection::Periods,
            Match::new().field("id", ctx.period_id),
            changes,
        )
        .await
    }

    async fn fetch_pre_image(
        &self,
        collection: Collection,
        matches: &Match,
    ) -> Result<Document, LiquidationError> {
        self.store
            .query(collection, matches)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(collection).into())
    }

    /// Update with the pre-image fetched immediately before the call, and
    /// record the operation with its derived compensation.
    async fn recorded_update(
        &self,
        ctx: &mut SagaContext,
        collection: Collection,
        identity: Match,
        changes: Document,
    ) -> Result<(), LiquidationError> {
        let prior = self.fetch_pre_image(collection, &identity).await?;
        self.store
            .update(collection, &identity, changes.clone())
            .await?;
        ctx.record(Operation::Update {
            collection,
            matches: identity,
            changes,
            prior,
        });
        Ok(())
    }
}
