//! Services composing the ledger, the game configuration provider, and the engine.

pub mod auditor;
pub mod controller;
pub mod finalize;
pub mod intake;
pub mod scheduler;

pub use auditor::{divergences_to_csv, AuditError, AuditReport, Auditor, RepairReport};
pub use controller::{PeriodController, PeriodError, ReopenReport, SyncReport};
pub use finalize::{FinalizationReport, FinalizeError, Finalizer};
pub use intake::{BidError, BidIntake};
pub use scheduler::{Scheduler, TickReport};
