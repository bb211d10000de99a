//! Scheduling pipelines.
//!
//! - `batched`: capacity planning and batch-at-a-time dispatch to a POA engine

pub mod batched;
