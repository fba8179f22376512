//! End-to-end liquidation scenarios against the in-memory store.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value as JsonValue;

use payrun_core::{CompanyId, EmployeeId, PayrollRecordId, PeriodId, UserId, VoucherId};
use payrun_payroll::{
    Adjustment, Calculation, PayrollRecord, Period, PeriodState, PeriodTotals, PeriodType,
    RecordState,
};
use payrun_saga::{
    LiquidationSaga, Operation, RollbackExecutor, SagaContext, SagaPhase, SagaTracker,
};
use payrun_store::{Collection, Document, InMemoryStore, Match, StoreClient, StoreError};

fn period(company_id: CompanyId) -> Period {
    Period {
        id: PeriodId::new(),
        company_id,
        name: "2026-07".to_string(),
        state: PeriodState::Draft,
        period_type: PeriodType::Monthly,
        totals: PeriodTotals::default(),
        employee_count: 0,
        last_activity_at: Utc::now(),
    }
}

fn record(p: &Period, name: &str, base_salary: i64) -> PayrollRecord {
    PayrollRecord {
        id: PayrollRecordId::new(),
        period_id: Some(p.id),
        period_label: Some(p.name.clone()),
        company_id: p.company_id,
        employee_id: EmployeeId::new(),
        employee_name: name.to_string(),
        base_salary,
        adjustments: Vec::new(),
        gross_pay: 0,
        health_deduction: 0,
        pension_deduction: 0,
        net_pay: 0,
        state: RecordState::Draft,
    }
}

fn saga<S: StoreClient>(store: S) -> LiquidationSaga<S> {
    payrun_observability::init();
    LiquidationSaga::new(store, Arc::new(SagaTracker::new()))
}

fn seed(store: &InMemoryStore, p: &Period, records: &[PayrollRecord]) {
    store.seed(Collection::Periods, p).unwrap();
    for r in records {
        store.seed(Collection::PayrollRecords, r).unwrap();
    }
}

#[tokio::test]
async fn scenario_a_successful_liquidation_closes_period_and_issues_vouchers() {
    let store = Arc::new(InMemoryStore::new());
    let company_id = CompanyId::new();
    let p = period(company_id);
    let records = vec![
        record(&p, "ada", 100_000),
        record(&p, "grace", 250_000),
        record(&p, "edsger", 90_000),
    ];
    seed(&store, &p, &records);

    let result = saga(store.clone())
        .liquidate(p.id, company_id, UserId::new())
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert!(!result.rollback_required);
    assert_eq!(result.operations_completed, result.operations_total);
    assert_eq!(result.details.voucher_count, 3);

    let periods = store.snapshot(Collection::Periods);
    let closed: Period = serde_json::from_value(periods[0].clone()).unwrap();
    assert_eq!(closed.state, PeriodState::Closed);
    assert_eq!(closed.employee_count, 3);

    // Default calculator: gross minus the two 4% deductions.
    let processed: Vec<PayrollRecord> = store
        .snapshot(Collection::PayrollRecords)
        .into_iter()
        .map(|d| serde_json::from_value(d).unwrap())
        .collect();
    assert!(processed.iter().all(|r| r.state == RecordState::Processed));
    let expected_net: i64 = processed.iter().map(|r| r.net_pay).sum();
    assert_eq!(closed.totals.net, expected_net);
    assert_eq!(
        closed.totals.gross - closed.totals.deductions,
        closed.totals.net
    );

    // P2: vouchers == processed records == employee_count.
    let vouchers = store.snapshot(Collection::Vouchers);
    assert_eq!(vouchers.len(), processed.len());
    assert_eq!(vouchers.len() as u32, closed.employee_count);

    // Audit trail carries the transaction id.
    let audit = store.snapshot(Collection::AuditLog);
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0]["kind"], "atomic_liquidation");
    assert_eq!(audit[0]["status"], "completed");
    assert_eq!(
        audit[0]["session_id"],
        JsonValue::String(result.transaction_id.to_string())
    );
}

#[tokio::test]
async fn scenario_b_mid_saga_failure_rolls_back_every_mutation() {
    let company_id = CompanyId::new();
    let p = period(company_id);
    let records = vec![
        record(&p, "ada", 100_000),
        record(&p, "grace", 250_000),
        record(&p, "edsger", 90_000),
    ];
    let poisoned = records[1].employee_id;

    let store = Arc::new(InMemoryStore::with_calculator(
        move |employee_id, base_salary, _, _| {
            if employee_id == poisoned {
                return Err(StoreError::Backend("computation unavailable".to_string()));
            }
            Ok(Calculation {
                gross_pay: base_salary,
                health_deduction: 0,
                pension_deduction: 0,
                net_pay: base_salary,
            })
        },
    ));
    seed(&store, &p, &records);

    let before_periods = store.snapshot(Collection::Periods);
    let before_records = store.snapshot(Collection::PayrollRecords);

    let result = saga(store.clone())
        .liquidate(p.id, company_id, UserId::new())
        .await;

    assert!(!result.success);
    assert_eq!(result.details.failed_phase, Some(SagaPhase::ProcessEmployees));
    assert!(result.rollback_required);
    assert_eq!(result.rollback_completed, Some(true));
    // Mark-processing plus one employee update landed before the failure.
    assert_eq!(result.operations_completed, 2);

    // P1: every mutated entity equals its pre-saga value.
    assert_eq!(store.snapshot(Collection::Periods), before_periods);
    assert_eq!(store.snapshot(Collection::PayrollRecords), before_records);
    assert!(store.snapshot(Collection::Vouchers).is_empty());

    let audit = store.snapshot(Collection::AuditLog);
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0]["status"], "error");
}

#[tokio::test]
async fn precondition_failures_mutate_nothing() {
    let store = Arc::new(InMemoryStore::new());
    let company_id = CompanyId::new();

    // Period missing entirely.
    let result = saga(store.clone())
        .liquidate(PeriodId::new(), company_id, UserId::new())
        .await;
    assert!(!result.success);
    assert!(!result.rollback_required);
    assert_eq!(result.rollback_completed, None);
    assert_eq!(result.details.failed_phase, Some(SagaPhase::Validate));

    // Already closed.
    let mut closed = period(company_id);
    closed.state = PeriodState::Closed;
    seed(&store, &closed, &[record(&closed, "ada", 100_000)]);
    let result = saga(store.clone())
        .liquidate(closed.id, company_id, UserId::new())
        .await;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("already closed"));

    // In progress: a stuck or concurrent saga holds the state flag.
    let mut processing = period(company_id);
    processing.state = PeriodState::Processing;
    seed(&store, &processing, &[record(&processing, "ada", 100_000)]);
    let result = saga(store.clone())
        .liquidate(processing.id, company_id, UserId::new())
        .await;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("in progress"));

    // No payroll records.
    let empty = period(company_id);
    store.seed(Collection::Periods, &empty).unwrap();
    let result = saga(store.clone())
        .liquidate(empty.id, company_id, UserId::new())
        .await;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("no payroll records"));

    // Wrong company.
    let foreign = period(CompanyId::new());
    seed(&store, &foreign, &[record(&foreign, "ada", 100_000)]);
    let result = saga(store.clone())
        .liquidate(foreign.id, company_id, UserId::new())
        .await;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("different company"));

    assert!(store.snapshot(Collection::Vouchers).is_empty());
}

#[tokio::test]
async fn concurrent_attempts_on_one_period_yield_exactly_one_success() {
    let store = Arc::new(InMemoryStore::new());
    let company_id = CompanyId::new();
    let p = period(company_id);
    seed(
        &store,
        &p,
        &[record(&p, "ada", 100_000), record(&p, "grace", 250_000)],
    );

    let orchestrator = saga(store.clone());
    let (a, b) = tokio::join!(
        orchestrator.liquidate(p.id, company_id, UserId::new()),
        orchestrator.liquidate(p.id, company_id, UserId::new()),
    );

    assert_eq!(
        [a.success, b.success].iter().filter(|s| **s).count(),
        1,
        "exactly one attempt must win"
    );
    assert_eq!(store.snapshot(Collection::Vouchers).len(), 2);
    let closed: Period =
        serde_json::from_value(store.snapshot(Collection::Periods)[0].clone()).unwrap();
    assert_eq!(closed.state, PeriodState::Closed);
}

/// Store decorator that records the order of mutating calls.
struct RecordingStore {
    inner: InMemoryStore,
    calls: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl StoreClient for RecordingStore {
    async fn insert(
        &self,
        collection: Collection,
        document: Document,
    ) -> Result<Document, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("insert {collection}"));
        self.inner.insert(collection, document).await
    }

    async fn update(
        &self,
        collection: Collection,
        matches: &Match,
        changes: Document,
    ) -> Result<u64, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("update {collection} where {matches}"));
        self.inner.update(collection, matches, changes).await
    }

    async fn delete(&self, collection: Collection, matches: &Match) -> Result<u64, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("delete {collection} where {matches}"));
        self.inner.delete(collection, matches).await
    }

    async fn query(
        &self,
        collection: Collection,
        matches: &Match,
    ) -> Result<Vec<Document>, StoreError> {
        self.inner.query(collection, matches).await
    }

    async fn compute_payroll(
        &self,
        employee_id: EmployeeId,
        base_salary: i64,
        period_type: PeriodType,
        adjustments: &[Adjustment],
    ) -> Result<Calculation, StoreError> {
        self.inner
            .compute_payroll(employee_id, base_salary, period_type, adjustments)
            .await
    }
}

#[tokio::test]
async fn p3_compensations_replay_in_exact_reverse_order() {
    let inner = InMemoryStore::new();
    let record_id = PayrollRecordId::new();
    inner
        .seed(
            Collection::PayrollRecords,
            &serde_json::json!({"id": record_id, "state": "draft"}),
        )
        .unwrap();
    let store = RecordingStore::new(inner);

    let voucher_a = VoucherId::new();
    let voucher_b = VoucherId::new();
    let mut ctx = SagaContext::new(PeriodId::new(), CompanyId::new());
    // O1: insert voucher A, O2: update the record, O3: insert voucher B.
    ctx.record(Operation::Insert {
        collection: Collection::Vouchers,
        key: Match::new().field("id", voucher_a),
    });
    ctx.record(Operation::Update {
        collection: Collection::PayrollRecords,
        matches: Match::new().field("id", record_id),
        changes: serde_json::json!({"state": "processed"}),
        prior: serde_json::json!({"id": record_id, "state": "draft"}),
    });
    ctx.record(Operation::Insert {
        collection: Collection::Vouchers,
        key: Match::new().field("id", voucher_b),
    });

    let report = RollbackExecutor::new(&store).rollback(&ctx).await;
    assert!(report.completed);
    assert_eq!(report.attempted, 3);

    // O3⁻¹, O2⁻¹, O1⁻¹.
    let calls = store.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], format!("delete payment_vouchers where id=\"{voucher_b}\""));
    assert!(calls[1].starts_with("update payroll_records"));
    assert_eq!(calls[2], format!("delete payment_vouchers where id=\"{voucher_a}\""));
}

#[tokio::test]
async fn rollback_keeps_going_past_a_failed_compensation() {
    let store = InMemoryStore::new();
    let mut ctx = SagaContext::new(PeriodId::new(), CompanyId::new());
    // Restore of a document that no longer exists fails; the insert
    // compensation after it must still run.
    ctx.record(Operation::Insert {
        collection: Collection::Vouchers,
        key: Match::new().field("id", "v1"),
    });
    ctx.record(Operation::Update {
        collection: Collection::Periods,
        matches: Match::new().field("id", "gone"),
        changes: serde_json::json!({"state": "processing"}),
        prior: serde_json::json!({"id": "gone", "state": "draft"}),
    });

    store
        .seed(Collection::Vouchers, &serde_json::json!({"id": "v1"}))
        .unwrap();

    let report = RollbackExecutor::new(&store).rollback(&ctx).await;
    assert!(!report.completed);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(store.snapshot(Collection::Vouchers).is_empty());
}
