//! Traffic accounting: counter reconciliation and monthly accumulation.
pub mod monthly;
pub mod reconciler;

pub use monthly::{MonthlyState, ResetPolicy, accrue, roll_over, rows_due_for_reset};
pub use reconciler::{detect_reset, reconcile};
