//! Query execution and saved-search alerting.
//!
//! - `aggregate`: fan a query out to its backends and merge the outcomes
//! - `diff`: pick out results not yet seen by a saved search
//! - `scheduler`: run saved searches (manual, test, sweep, watch)

pub mod aggregate;
pub mod diff;
pub mod lock;
pub mod notify;
pub mod scheduler;

pub use aggregate::{AggregateResponse, Aggregator, BackendOutcome};
pub use diff::{DiffCalculator, DiffResult, calculate_diff};
pub use lock::{KeyGuard, KeyedLocks};
pub use notify::{Alert, LogNotifier, Notifier};
pub use scheduler::AlertScheduler;
