//! Core reusable components for the batch scheduler.
//!
//! This module contains the data model and the engine-facing pieces that are
//! agnostic to how batches are planned and driven.

pub mod compute;
pub mod graph;
pub mod io;
pub mod types;
