//! Best-effort compensation replay.

use tracing::{error, info};

use payrun_store::StoreClient;

use crate::context::SagaContext;

/// Outcome of replaying a saga's compensations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// Per-compensation failure descriptions, in replay order.
    pub failures: Vec<String>,
    /// True only if every compensation succeeded.
    pub completed: bool,
}

/// Replays a saga's compensating operations in strict reverse order.
///
/// Reverse order matters: later operations may depend on state created by
/// earlier ones (a voucher referencing a payroll record must be deleted
/// before that record is reverted). Each compensation runs inside its own
/// failure boundary — one failure is recorded and the rest still run. There
/// are no automatic retries; whatever could not be undone is residual drift
/// for the consistency scanner to find on its next sweep.
#[derive(Debug)]
pub struct RollbackExecutor<'a, S> {
    store: &'a S,
}

impl<'a, S: StoreClient> RollbackExecutor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn rollback(&self, context: &SagaContext) -> RollbackReport {
        let compensations = context.compensations();
        info!(
            transaction_id = %context.transaction_id,
            count = compensations.len(),
            "rolling back saga"
        );

        let mut report = RollbackReport {
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
            completed: false,
        };

        for (index, compensation) in compensations.iter().enumerate().rev() {
            report.attempted += 1;
            match compensation.apply(self.store).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    error!(
                        transaction_id = %context.transaction_id,
                        index,
                        error = %e,
                        "compensation failed; continuing with remaining compensations"
                    );
                    report
                        .failures
                        .push(format!("{}: {e}", compensation.describe()));
                }
            }
        }

        report.completed = report.failures.is_empty();
        report
    }
}
