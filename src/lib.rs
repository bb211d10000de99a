pub mod core;
pub mod defaults;
pub mod pipelines;
pub mod poa_opt; // Run options (CLI -> planner / coordinator bundles)
