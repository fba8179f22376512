//! `payrun-saga` — the payroll liquidation saga.
//!
//! The store has no multi-statement transactions, so liquidation runs as a
//! saga: ordered phases, every mutation logged together with its inverse, and
//! a best-effort rollback that replays the inverses in reverse order when a
//! phase fails. Drift that rollback cannot undo is left for the consistency
//! scanner to find.

pub mod context;
pub mod operation;
pub mod orchestrator;
pub mod rollback;

pub use context::{Checkpoint, InFlightSaga, SagaContext, SagaPhase, SagaTracker};
pub use operation::{Compensation, Operation, OperationKind};
pub use orchestrator::{LiquidationDetails, LiquidationError, LiquidationResult, LiquidationSaga};
pub use rollback::{RollbackExecutor, RollbackReport};
