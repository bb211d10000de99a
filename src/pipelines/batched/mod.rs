//! Batched POA pipeline
//!
//! ```text
//! [Group] ─▶ CapacityPlanner ─▶ Plan ─▶ RunCoordinator
//!                                            │ one BatchState per pair
//!                                            ▼
//!                                       BatchDriver ─▶ ResultHarvester ─▶ ResultSink
//! ```

pub mod batch_state;
pub mod coordinator;
pub mod driver;
pub mod estimator;
pub mod harvest;
pub mod planner;
pub mod sink;

pub use batch_state::BatchState;
pub use coordinator::{ExecutionPolicy, RunCoordinator, RunOptions, RunStatistics};
pub use driver::{BatchDriver, DriverOptions, PairSummary};
pub use estimator::{BinnedEstimator, CapacityEstimator, PlanOptions};
pub use harvest::ResultHarvester;
pub use planner::{CapacityPlanner, Plan, PlanEntry};
pub use sink::{CollectingSink, FlushReport, ResultSink};
