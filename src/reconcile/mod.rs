//! Reconciliation core: action decision and execution.
//!
//! [`diff::reconcile`] is the pure decision function at the heart of the
//! engine; [`Executor`] carries the decided action out (or projects it,
//! in check mode).

pub mod diff;

mod executor;

pub use diff::{reconcile, Action, ActionKind};
pub use executor::{Applied, Executor};
