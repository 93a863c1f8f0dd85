//! Pure computation for deterministic auction resolution.
//!
//! Nothing in here touches the ledger; repositories and services feed it state
//! and apply what it decides.

pub mod audit;
pub mod digest;
pub mod intake;
pub mod period;
pub mod resolution;

pub use audit::{audit, AuditInput, Divergence, DivergenceKind};
pub use digest::ledger_digest;
pub use intake::{place, Placement};
pub use period::{advance_status, finalization_due};
pub use resolution::{
    chunk_ops, decide_settlement, plan_finalization, FinalizeOp, RiderPlan, SettleContext,
    SettleDecision, SettleOutcome, StatusChange,
};
