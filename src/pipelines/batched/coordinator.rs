//! Run coordinator
//!
//! Owns the device context and walks the plan pair by pair. Each pair gets
//! its own batch, created from the pair's `CapacityConfig` and released
//! before the next one is created.
//!
//! # Pipeline Flow
//!
//! ```text
//! open_context ─▶ for each pair: create_batch ─▶ BatchDriver::run ─▶ drop batch
//!                                                     │
//!                                                     ▼
//!                                                ResultSink
//! ```
//!
//! Device and batch acquisition failures abort the run; everything below
//! that level is reported through the sink and the run continues.
//!
//! With [`ExecutionPolicy::Parallel`] pairs run on the rayon pool, each
//! with its own context and batch. Events are collected per pair and
//! replayed to the sink in plan order, so output matches a sequential run.

use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use thiserror::Error;

use crate::core::compute::{BatchFactory, DeviceContext, EngineError, ScoringParams};
use crate::core::types::Group;

use super::batch_state::BatchState;
use super::driver::{BatchDriver, DriverError, DriverOptions, PairSummary};
use super::planner::{Plan, PlanEntry, PlanError};
use super::sink::{CollectingSink, ResultSink};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("could not open compute device: {0}")]
    DeviceUnavailable(EngineError),

    #[error("could not create batch {batch}: {source}")]
    BatchCreation {
        batch: usize,
        #[source]
        source: EngineError,
    },

    #[error("invalid plan: {0}")]
    Plan(#[from] PlanError),

    #[error("result sink failed: {0}")]
    Sink(#[from] io::Error),

    #[error("group id {group_id} out of range ({num_groups} groups)")]
    UnknownGroup { group_id: usize, num_groups: usize },
}

impl From<DriverError> for CoordinatorError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Sink(e) => CoordinatorError::Sink(e),
            DriverError::UnknownGroup {
                group_id,
                num_groups,
            } => CoordinatorError::UnknownGroup {
                group_id,
                num_groups,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionPolicy {
    /// One batch at a time
    #[default]
    Sequential,
    /// Pairs in parallel on the rayon pool. Each batch gets
    /// `budget / workers` of device memory.
    Parallel { workers: usize },
}

impl ExecutionPolicy {
    pub fn from_threads(threads: usize) -> Self {
        if threads > 1 {
            ExecutionPolicy::Parallel { workers: threads }
        } else {
            ExecutionPolicy::Sequential
        }
    }

    pub fn workers(self) -> usize {
        match self {
            ExecutionPolicy::Sequential => 1,
            ExecutionPolicy::Parallel { workers } => workers.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub device_id: usize,
    /// Share of free device memory a run may use
    pub memory_fraction: f64,
    pub timeout: Option<Duration>,
    pub print_graph: bool,
    pub policy: ExecutionPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            device_id: crate::defaults::DEVICE_ID,
            memory_fraction: crate::defaults::MEMORY_FRACTION,
            timeout: None,
            print_graph: false,
            policy: ExecutionPolicy::Sequential,
        }
    }
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatistics {
    pub groups: usize,
    pub batches: usize,
    pub flushes: usize,
    /// Groups that went through a flush; compute failures among them are
    /// also counted in `failed`
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dropped_sequences: usize,
    pub wall_time_secs: f64,
}

impl RunStatistics {
    fn add_pair(&mut self, pair: &PairSummary) {
        self.batches += 1;
        self.flushes += pair.flushes;
        self.processed += pair.processed;
        self.succeeded += pair.succeeded;
        self.skipped += pair.skipped;
        self.failed += pair.failed;
        self.dropped_sequences += pair.dropped_sequences;
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} groups in {} batches ({} flushes): {} processed ({} succeeded), {} skipped, {} failed, {} sequences dropped, {:.2} sec",
            self.groups,
            self.batches,
            self.flushes,
            self.processed,
            self.succeeded,
            self.skipped,
            self.failed,
            self.dropped_sequences,
            self.wall_time_secs
        )
    }
}

pub struct RunCoordinator<'a, F: BatchFactory> {
    factory: &'a F,
    scoring: ScoringParams,
    options: RunOptions,
}

impl<'a, F: BatchFactory> RunCoordinator<'a, F> {
    pub fn new(factory: &'a F, scoring: ScoringParams, options: RunOptions) -> Self {
        Self {
            factory,
            scoring,
            options,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn open_context(&self) -> Result<DeviceContext, CoordinatorError> {
        self.factory
            .open_context(self.options.device_id)
            .map_err(CoordinatorError::DeviceUnavailable)
    }

    /// Per-batch memory budget: the configured share of free memory,
    /// divided across parallel workers.
    pub fn memory_budget(&self) -> Result<usize, CoordinatorError> {
        let ctx = self.open_context()?;
        let budget = ctx.memory_budget(self.options.memory_fraction);
        let per_batch = budget / self.options.policy.workers();
        log::info!(
            "Device {} ({}): {} MB free, {} MB per batch",
            ctx.device_id,
            ctx.name,
            ctx.free_memory / (1024 * 1024),
            per_batch / (1024 * 1024)
        );
        Ok(per_batch)
    }

    /// Drive every pair of `plan` and report results to `sink`.
    pub fn run(
        &self,
        groups: &[Group],
        plan: &Plan,
        sink: &mut dyn ResultSink,
    ) -> Result<RunStatistics, CoordinatorError> {
        let start = Instant::now();
        plan.validate(groups.len())?;

        let mut stats = RunStatistics {
            groups: groups.len(),
            ..RunStatistics::default()
        };
        let offsets = plan.offsets();

        match self.options.policy {
            ExecutionPolicy::Sequential => {
                let ctx = self.open_context()?;
                for (idx, (entry, &offset)) in plan.iter().zip(&offsets).enumerate() {
                    let summary = self.run_pair(&ctx, idx, entry, offset, groups, sink)?;
                    stats.add_pair(&summary);
                }
            }
            ExecutionPolicy::Parallel { workers } => {
                // Fail before any pair if the device cannot be opened
                self.open_context()?;
                log::debug!(
                    "Running {} pairs on {} workers",
                    plan.len(),
                    workers.min(rayon::current_num_threads())
                );
                let collected = plan
                    .entries()
                    .par_iter()
                    .zip(offsets.par_iter())
                    .enumerate()
                    .map(|(idx, (entry, &offset))| -> Result<_, CoordinatorError> {
                        let ctx = self.open_context()?;
                        let mut events = CollectingSink::new();
                        let summary =
                            self.run_pair(&ctx, idx, entry, offset, groups, &mut events)?;
                        Ok((events, summary))
                    })
                    .collect::<Result<Vec<_>, CoordinatorError>>()?;

                for (events, summary) in &collected {
                    events.replay(sink)?;
                    stats.add_pair(summary);
                }
            }
        }

        stats.wall_time_secs = start.elapsed().as_secs_f64();
        log::info!("Run complete: {}", stats);
        Ok(stats)
    }

    fn run_pair(
        &self,
        ctx: &DeviceContext,
        idx: usize,
        entry: &PlanEntry,
        offset: usize,
        groups: &[Group],
        sink: &mut dyn ResultSink,
    ) -> Result<PairSummary, CoordinatorError> {
        let handle = self
            .factory
            .create_batch(ctx, &entry.config, &self.scoring)
            .map_err(|source| CoordinatorError::BatchCreation { batch: idx, source })?;
        log::debug!(
            "batch {}: {} groups, {}",
            idx,
            entry.group_ids.len(),
            entry.config
        );

        let mut batch = BatchState::new(idx, entry.config.clone(), handle);
        let driver = BatchDriver::new(DriverOptions {
            timeout: self.options.timeout,
            print_graph: self.options.print_graph,
            offset,
        });
        let summary = driver.run(&mut batch, &entry.group_ids, groups, sink)?;
        drop(batch);
        Ok(summary)
    }
}
