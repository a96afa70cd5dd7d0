//! bqw-chain - Dataset chain builder for BQWizard
//!
//! A chain `[d1, d2, …, dn]` makes every dataset expose the tables of `d1`
//! as views over the previous dataset: `d2.t` selects from `d1.t`, `d3.t`
//! from `d2.t`, and so on.
//!
//! The work is split in two:
//! - [`planner`] turns a [`ChainSpec`] and a [`ChainSnapshot`] of remote
//!   state into an ordered [`ChainPlan`] without mutating anything.
//! - [`executor`] applies the plan hop by hop, creating missing datasets,
//!   retrying transient failures, and recording one [`Outcome`] per
//!   operation in a [`ChainResult`].
//!
//! The snapshot is read once before any mutation. Changes made to the
//! warehouse by someone else during a run are not noticed; re-running the
//! chain converges because every write is an idempotent upsert.

pub mod allow_list;
pub mod error;
pub mod executor;
pub mod planner;
pub mod result;
pub mod retry;
pub mod snapshot;
pub mod spec;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use allow_list::load_allow_list;
pub use error::ChainError;
pub use executor::{ChainExecutor, ChainObserver};
pub use planner::{plan, ChainOperation, ChainPlan, Hop, PlanWarning};
pub use result::{ChainResult, ChainSummary, DatasetEvent, DatasetEventKind, Outcome, TableOutcome};
pub use retry::{with_retry, RetryFailure, RetryPolicy};
pub use snapshot::ChainSnapshot;
pub use spec::ChainSpec;
