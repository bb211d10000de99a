//! Workload input and result output.

pub mod result_writer;
pub mod window_reader;
