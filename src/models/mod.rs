//! Domain models shared across the whole fxrelay system.

pub mod execution;
pub mod order;
pub mod position;
pub mod signal;

pub use execution::{ExecutionRecord, Outcome};
pub use order::{AttemptSummary, OrderRequest, OrderResult, OrderType, RiskSpec};
pub use position::{OpenPosition, PositionSide, ReconcileOutcome};
pub use signal::{AlertPayload, RawAlert, Side, Signal};
