//! The diagnostic scanner.
//!
//! Pure read-only; safe to run concurrently with anything, including itself.
//! The four checks are independent: they run concurrently and a failing
//! check is logged and contributes zero issues.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::warn;

use payrun_core::{CompanyId, PayrollRecordId};
use payrun_payroll::{PayrollRecord, Period, PeriodState, RecordState};
use payrun_store::{from_document, Collection, Match, StoreClient, StoreError};

use crate::issue::{ConsistencyIssue, ConsistencyReport, IssueDetail, IssueKind, IssueScope, Severity};

/// Staleness thresholds for the incomplete-liquidation check.
#[derive(Debug, Clone, Copy)]
pub struct ScannerConfig {
    /// Hours in `processing` before a period counts as abandoned.
    pub staleness_hours: i64,
    /// Hours after which an abandoned period escalates from medium to high.
    pub escalation_hours: i64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            staleness_hours: 24,
            escalation_hours: 72,
        }
    }
}

impl ScannerConfig {
    pub fn with_staleness_hours(mut self, hours: i64) -> Self {
        self.staleness_hours = hours;
        self
    }

    pub fn with_escalation_hours(mut self, hours: i64) -> Self {
        self.escalation_hours = hours;
        self
    }
}

/// Read-only sweep over one company's payroll data.
#[derive(Debug)]
pub struct ConsistencyScanner<S> {
    store: S,
    config: ScannerConfig,
}

impl<S: StoreClient> ConsistencyScanner<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, ScannerConfig::default())
    }

    pub fn with_config(store: S, config: ScannerConfig) -> Self {
        Self { store, config }
    }

    /// Run all four checks and aggregate the report.
    pub async fn diagnose(&self, company_id: CompanyId) -> ConsistencyReport {
        let (state_mismatch, missing_vouchers, orphaned, stale) = tokio::join!(
            self.check_state_mismatch(company_id),
            self.check_missing_vouchers(company_id),
            self.check_orphaned_payrolls(company_id),
            self.check_stale_liquidations(company_id),
        );

        let mut issues = Vec::new();
        let outcomes = [
            ("state_mismatch", state_mismatch),
            ("missing_vouchers", missing_vouchers),
            ("orphaned_payrolls", orphaned),
            ("incomplete_liquidation", stale),
        ];
        for (check, outcome) in outcomes {
            match outcome {
                Ok(mut found) => issues.append(&mut found),
                Err(error) => {
                    warn!(check, %error, "consistency check failed; continuing with the others");
                }
            }
        }

        ConsistencyReport::from_issues(company_id, issues)
    }

    async fn closed_periods(&self, company_id: CompanyId) -> Result<Vec<Period>, StoreError> {
        let docs = self
            .store
            .query(
                Collection::Periods,
                &Match::new()
                    .field("company_id", company_id)
                    .field("state", PeriodState::Closed),
            )
            .await?;
        docs.into_iter().map(from_document).collect()
    }

    /// I1: a closed period must have no draft records.
    async fn check_state_mismatch(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<ConsistencyIssue>, StoreError> {
        let mut issues = Vec::new();
        for period in self.closed_periods(company_id).await? {
            let drafts = self
                .store
                .query(
                    Collection::PayrollRecords,
                    &Match::new()
                        .field("period_id", period.id)
                        .field("state", RecordState::Draft),
                )
                .await?;
            if drafts.is_empty() {
                continue;
            }
            let draft_records = drafts
                .into_iter()
                .map(from_document::<PayrollRecord>)
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|r| r.id)
                .collect::<Vec<_>>();
            issues.push(ConsistencyIssue {
                kind: IssueKind::StateMismatch,
                // Money has been reported final while records disagree.
                severity: Severity::Critical,
                scope: IssueScope::Period(period.id),
                description: format!(
                    "closed period '{}' still has {} draft payroll record(s)",
                    period.name,
                    draft_records.len()
                ),
                auto_repairable: true,
                detail: IssueDetail::StateMismatch { draft_records },
            });
        }
        Ok(issues)
    }

    /// I2: a closed period with employees has one voucher per employee.
    async fn check_missing_vouchers(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<ConsistencyIssue>, StoreError> {
        let mut issues = Vec::new();
        for period in self.closed_periods(company_id).await? {
            if period.employee_count == 0 {
                continue;
            }
            let vouchers = self
                .store
                .query(
                    Collection::Vouchers,
                    &Match::new().field("period_id", period.id),
                )
                .await?;
            let found = vouchers.len() as u32;
            if found >= period.employee_count {
                continue;
            }
            let severity = if found == 0 {
                Severity::High
            } else {
                Severity::Medium
            };
            issues.push(ConsistencyIssue {
                kind: IssueKind::MissingVouchers,
                severity,
                scope: IssueScope::Period(period.id),
                description: format!(
                    "closed period '{}' has {found} voucher(s) for {} employee(s)",
                    period.name, period.employee_count
                ),
                auto_repairable: true,
                detail: IssueDetail::MissingVouchers {
                    expected: period.employee_count,
                    found,
                },
            });
        }
        Ok(issues)
    }

    /// I3: every payroll record has an owning period.
    async fn check_orphaned_payrolls(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<ConsistencyIssue>, StoreError> {
        let docs = self
            .store
            .query(
                Collection::PayrollRecords,
                &Match::new()
                    .field("company_id", company_id)
                    .null("period_id"),
            )
            .await?;

        // Group by denormalized label for human reporting.
        let mut groups: BTreeMap<Option<String>, Vec<PayrollRecordId>> = BTreeMap::new();
        for doc in docs {
            let record: PayrollRecord = from_document(doc)?;
            groups
                .entry(record.period_label.clone())
                .or_default()
                .push(record.id);
        }

        Ok(groups
            .into_iter()
            .map(|(label, record_ids)| ConsistencyIssue {
                kind: IssueKind::OrphanedPayrolls,
                severity: Severity::Medium,
                scope: IssueScope::Unattributed,
                description: format!(
                    "{} payroll record(s) labeled {} have no owning period",
                    record_ids.len(),
                    label.as_deref().unwrap_or("<none>"),
                ),
                auto_repairable: true,
                detail: IssueDetail::OrphanedPayrolls { label, record_ids },
            })
            .collect())
    }

    /// I4: no period stays in `processing` past the staleness threshold.
    async fn check_stale_liquidations(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<ConsistencyIssue>, StoreError> {
        let docs = self
            .store
            .query(
                Collection::Periods,
                &Match::new()
                    .field("company_id", company_id)
                    .field("state", PeriodState::Processing),
            )
            .await?;

        let now = Utc::now();
        let mut issues = Vec::new();
        for doc in docs {
            let period: Period = from_document(doc)?;
            let stalled_hours = period.idle_for(now).num_hours();
            if stalled_hours < self.config.staleness_hours {
                continue;
            }
            let severity = if stalled_hours >= self.config.escalation_hours {
                Severity::High
            } else {
                Severity::Medium
            };
            issues.push(ConsistencyIssue {
                kind: IssueKind::IncompleteLiquidation,
                severity,
                scope: IssueScope::Period(period.id),
                description: format!(
                    "period '{}' has been processing for {stalled_hours}h without progress",
                    period.name
                ),
                // Resetting to draft discards the stuck attempt, so it needs
                // operator confirmation.
                auto_repairable: false,
                detail: IssueDetail::IncompleteLiquidation { stalled_hours },
            });
        }
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use payrun_core::{EmployeeId, PeriodId};
    use payrun_payroll::{Adjustment, Calculation, PeriodTotals, PeriodType, Voucher, VoucherStatus};
    use payrun_store::{Document, InMemoryStore};
    use std::sync::Arc;

    fn period(company_id: CompanyId, state: PeriodState) -> Period {
        Period {
            id: PeriodId::new(),
            company_id,
            name: "2026-07".to_string(),
            state,
            period_type: PeriodType::Monthly,
            totals: PeriodTotals::default(),
            employee_count: 0,
            last_activity_at: Utc::now(),
        }
    }

    fn record(p: &Period, state: RecordState) -> PayrollRecord {
        PayrollRecord {
            id: payrun_core::PayrollRecordId::new(),
            period_id: Some(p.id),
            period_label: Some(p.name.clone()),
            company_id: p.company_id,
            employee_id: EmployeeId::new(),
            employee_name: "ada".to_string(),
            base_salary: 100_000,
            adjustments: Vec::new(),
            gross_pay: 0,
            health_deduction: 0,
            pension_deduction: 0,
            net_pay: 0,
            state,
        }
    }

    #[tokio::test]
    async fn scenario_c_state_mismatch_is_critical_and_auto_repairable() {
        let store = Arc::new(InMemoryStore::new());
        let company_id = CompanyId::new();
        let mut p = period(company_id, PeriodState::Closed);
        p.employee_count = 2;
        store.seed(Collection::Periods, &p).unwrap();
        store
            .seed(Collection::PayrollRecords, &record(&p, RecordState::Processed))
            .unwrap();
        store
            .seed(Collection::PayrollRecords, &record(&p, RecordState::Draft))
            .unwrap();
        // Vouchers complete, so only the state mismatch should surface.
        for r in [record(&p, RecordState::Processed), record(&p, RecordState::Processed)] {
            let voucher = payrun_payroll::Voucher {
                id: payrun_core::VoucherId::new(),
                period_id: p.id,
                company_id,
                employee_id: r.employee_id,
                payroll_record_id: r.id,
                net_amount: 1,
                status: VoucherStatus::Pending,
            };
            store.seed(Collection::Vouchers, &voucher).unwrap();
        }

        let report = ConsistencyScanner::new(store).diagnose(company_id).await;

        let mismatches: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::StateMismatch)
            .collect();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].severity, Severity::Critical);
        assert!(mismatches[0].auto_repairable);
        assert_eq!(mismatches[0].scope, IssueScope::Period(p.id));
        assert_eq!(report.health, crate::issue::HealthStatus::Critical);
    }

    #[tokio::test]
    async fn scenario_d_stale_liquidation_severity_scales_with_age() {
        let store = Arc::new(InMemoryStore::new());
        let company_id = CompanyId::new();

        let mut p = period(company_id, PeriodState::Processing);
        p.last_activity_at = Utc::now() - Duration::hours(30);
        store.seed(Collection::Periods, &p).unwrap();

        let scanner = ConsistencyScanner::new(store.clone());
        let report = scanner.diagnose(company_id).await;
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::IncompleteLiquidation);
        assert_eq!(report.issues[0].severity, Severity::Medium);
        assert!(!report.issues[0].auto_repairable);

        // 80 hours in: past the escalation threshold.
        let store = Arc::new(InMemoryStore::new());
        let mut p = period(company_id, PeriodState::Processing);
        p.last_activity_at = Utc::now() - Duration::hours(80);
        store.seed(Collection::Periods, &p).unwrap();

        let report = ConsistencyScanner::new(store).diagnose(company_id).await;
        assert_eq!(report.issues[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn missing_vouchers_severity_depends_on_how_short_the_count_is() {
        let store = Arc::new(InMemoryStore::new());
        let company_id = CompanyId::new();

        let mut none = period(company_id, PeriodState::Closed);
        none.employee_count = 3;
        store.seed(Collection::Periods, &none).unwrap();

        let mut short = period(company_id, PeriodState::Closed);
        short.name = "2026-06".to_string();
        short.employee_count = 3;
        store.seed(Collection::Periods, &short).unwrap();
        let r = record(&short, RecordState::Processed);
        let voucher = Voucher {
            id: payrun_core::VoucherId::new(),
            period_id: short.id,
            company_id,
            employee_id: r.employee_id,
            payroll_record_id: r.id,
            net_amount: 1,
            status: VoucherStatus::Pending,
        };
        store.seed(Collection::Vouchers, &voucher).unwrap();

        let report = ConsistencyScanner::new(store).diagnose(company_id).await;
        let by_period = |id| {
            report
                .issues
                .iter()
                .find(|i| i.scope == IssueScope::Period(id))
                .unwrap()
        };
        assert_eq!(by_period(none.id).severity, Severity::High);
        assert_eq!(by_period(short.id).severity, Severity::Medium);
    }

    #[tokio::test]
    async fn orphans_are_grouped_by_label_under_the_unattributed_scope() {
        let store = Arc::new(InMemoryStore::new());
        let company_id = CompanyId::new();
        let p = period(company_id, PeriodState::Draft);

        for label in ["2026-05", "2026-05", "2026-06"] {
            let mut r = record(&p, RecordState::Draft);
            r.period_id = None;
            r.period_label = Some(label.to_string());
            store.seed(Collection::PayrollRecords, &r).unwrap();
        }

        let report = ConsistencyScanner::new(store).diagnose(company_id).await;
        let orphan_issues: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::OrphanedPayrolls)
            .collect();
        assert_eq!(orphan_issues.len(), 2);
        assert!(orphan_issues
            .iter()
            .all(|i| i.scope == IssueScope::Unattributed));
        let IssueDetail::OrphanedPayrolls { record_ids, .. } = &orphan_issues[0].detail else {
            panic!("wrong detail payload");
        };
        assert_eq!(record_ids.len(), 2);
    }

    #[tokio::test]
    async fn p4_scan_is_deterministic_without_intervening_mutation() {
        let store = Arc::new(InMemoryStore::new());
        let company_id = CompanyId::new();
        let mut p = period(company_id, PeriodState::Closed);
        p.employee_count = 1;
        store.seed(Collection::Periods, &p).unwrap();
        store
            .seed(Collection::PayrollRecords, &record(&p, RecordState::Draft))
            .unwrap();

        let scanner = ConsistencyScanner::new(store);
        let first = scanner.diagnose(company_id).await;
        let second = scanner.diagnose(company_id).await;
        assert_eq!(first.issues, second.issues);
        assert_eq!(first.health, second.health);
    }

    #[tokio::test]
    async fn healthy_company_reports_no_issues() {
        let store = Arc::new(InMemoryStore::new());
        let company_id = CompanyId::new();
        let p = period(company_id, PeriodState::Draft);
        store.seed(Collection::Periods, &p).unwrap();
        store
            .seed(Collection::PayrollRecords, &record(&p, RecordState::Draft))
            .unwrap();

        let report = ConsistencyScanner::new(store).diagnose(company_id).await;
        assert!(report.is_healthy());
        assert!(report.issues.is_empty());
    }

    /// Fails every query against one collection; the other checks must
    /// still produce their issues.
    struct BlindSpotStore {
        inner: Arc<InMemoryStore>,
        broken: Collection,
    }

    #[async_trait::async_trait]
    impl StoreClient for BlindSpotStore {
        async fn insert(
            &self,
            collection: Collection,
            document: Document,
        ) -> Result<Document, StoreError> {
            self.inner.insert(collection, document).await
        }

        async fn update(
            &self,
            collection: Collection,
            matches: &Match,
            changes: Document,
        ) -> Result<u64, StoreError> {
            self.inner.update(collection, matches, changes).await
        }

        async fn delete(
            &self,
            collection: Collection,
            matches: &Match,
        ) -> Result<u64, StoreError> {
            self.inner.delete(collection, matches).await
        }

        async fn query(
            &self,
            collection: Collection,
            matches: &Match,
        ) -> Result<Vec<Document>, StoreError> {
            if collection == self.broken {
                return Err(StoreError::Backend("collection offline".to_string()));
            }
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
    async fn one_failing_check_does_not_abort_the_others() {
        let inner = Arc::new(InMemoryStore::new());
        let company_id = CompanyId::new();
        let mut stale = period(company_id, PeriodState::Processing);
        stale.last_activity_at = Utc::now() - Duration::hours(30);
        inner.seed(Collection::Periods, &stale).unwrap();

        // Voucher queries fail, so the missing-voucher check is blind; the
        // stale-liquidation check must still report.
        let store = BlindSpotStore {
            inner,
            broken: Collection::Vouchers,
        };
        let report = ConsistencyScanner::new(store).diagnose(company_id).await;
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::IncompleteLiquidation);
    }
}
