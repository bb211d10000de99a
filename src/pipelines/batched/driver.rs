//! Batch driver: fills one batch from a pair's id list, flushes on overflow
//! and resumes until the list is exhausted.
//!
//! ```text
//!            ┌────────────── Accepted / Rejected (not last) ──────────┐
//!            ▼                                                        │
//!  Idle ─▶ Filling ── BatchFull / last id ──▶ Overflowed ──┬─ batch empty ─▶ skip or fail, advance
//!                                                          │
//!                                                          └─ batch full ─▶ Processing
//!                                                                           compute, harvest, reset
//!                                                                           Retry ─▶ Filling (same cursor)
//!                                                                           Complete / Rejected ─▶ Idle
//! ```
//!
//! Every exit from `Overflowed` on an empty batch advances the cursor, so
//! a group that cannot fit an empty batch is reported once and the loop
//! always terminates.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::core::compute::{AddOutcome, ComputeBatch};
use crate::core::types::{Group, GroupId, Status};

use super::batch_state::BatchState;
use super::harvest::{fail_all, ResultHarvester};
use super::sink::{DroppedSequence, FlushReport, HarvestError, ResultSink, SkippedGroup};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("result sink failed: {0}")]
    Sink(#[from] io::Error),

    #[error("group id {group_id} out of range ({num_groups} groups)")]
    UnknownGroup { group_id: GroupId, num_groups: usize },
}

/// What triggered an overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    /// The batch could not take the group at the cursor; offer it again
    /// after the flush.
    Retry,
    /// The group at the cursor was the last one and was accepted.
    Complete,
    /// The group at the cursor was the last one and was rejected.
    Rejected(Status),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Filling {
        cursor: usize,
        start: usize,
    },
    Overflowed {
        cursor: usize,
        start: usize,
        pending: Pending,
    },
    Processing {
        cursor: usize,
        start: usize,
        pending: Pending,
    },
}

impl DriverState {
    fn start(num_ids: usize) -> Self {
        if num_ids == 0 {
            DriverState::Idle
        } else {
            DriverState::Filling {
                cursor: 0,
                start: 0,
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Compute timeout per flush
    pub timeout: Option<Duration>,
    /// Fetch graphs after each successful harvest
    pub print_graph: bool,
    /// Added to in-pair positions in progress reports
    pub offset: usize,
}

/// Outcome of driving one pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairSummary {
    /// Final status of each id, in list order. Groups that failed in
    /// compute carry the engine status, or `OtherAddFailure` when the
    /// whole batch failed.
    pub statuses: Vec<(GroupId, Status)>,
    pub flushes: usize,
    /// Groups that went through a flush, whether or not compute succeeded
    pub processed: usize,
    /// Flushed groups with output
    pub succeeded: usize,
    pub skipped: usize,
    /// Rejected adds plus groups that failed in compute
    pub failed: usize,
    pub dropped_sequences: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BatchDriver {
    options: DriverOptions,
}

impl BatchDriver {
    pub fn new(options: DriverOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Drive `ids` through `batch`, reporting every event to `sink`.
    pub fn run<B: ComputeBatch>(
        &self,
        batch: &mut BatchState<B>,
        ids: &[GroupId],
        groups: &[Group],
        sink: &mut dyn ResultSink,
    ) -> Result<PairSummary, DriverError> {
        let mut pass = PairPass {
            options: &self.options,
            harvester: ResultHarvester::new(batch.config().output_mode),
            batch,
            ids,
            groups,
            sink,
            positions: vec![None; ids.len()],
            slots: Vec::new(),
            summary: PairSummary::default(),
        };

        let mut state = DriverState::start(ids.len());
        while state != DriverState::Idle {
            state = pass.step(state)?;
        }
        Ok(pass.finish())
    }
}

/// Mutable state of one `run` call.
struct PairPass<'r, B: ComputeBatch> {
    options: &'r DriverOptions,
    harvester: ResultHarvester,
    batch: &'r mut BatchState<B>,
    ids: &'r [GroupId],
    groups: &'r [Group],
    sink: &'r mut dyn ResultSink,
    /// Final status per list position
    positions: Vec<Option<Status>>,
    /// List positions of the buffered groups
    slots: Vec<usize>,
    summary: PairSummary,
}

impl<B: ComputeBatch> PairPass<'_, B> {
    fn step(&mut self, state: DriverState) -> Result<DriverState, DriverError> {
        let n = self.ids.len();
        let next = match state {
            DriverState::Idle => DriverState::Idle,

            DriverState::Filling { cursor, start } => {
                if cursor >= n {
                    return Ok(DriverState::Idle);
                }
                let last = cursor + 1 == n;
                match self.offer(cursor)? {
                    AddOutcome::Accepted { sequence_status } => {
                        self.positions[cursor] = Some(Status::Success);
                        self.slots.push(cursor);
                        self.report_dropped(cursor, &sequence_status)?;
                        if last {
                            DriverState::Overflowed {
                                cursor,
                                start,
                                pending: Pending::Complete,
                            }
                        } else {
                            DriverState::Filling {
                                cursor: cursor + 1,
                                start,
                            }
                        }
                    }
                    AddOutcome::BatchFull => DriverState::Overflowed {
                        cursor,
                        start,
                        pending: Pending::Retry,
                    },
                    AddOutcome::Rejected { status, .. } if last => DriverState::Overflowed {
                        cursor,
                        start,
                        pending: Pending::Rejected(status),
                    },
                    AddOutcome::Rejected { status, .. } => {
                        self.report_failed(cursor, status)?;
                        DriverState::Filling {
                            cursor: cursor + 1,
                            start,
                        }
                    }
                }
            }

            DriverState::Overflowed {
                cursor,
                start,
                pending,
            } => {
                if !self.batch.is_empty() {
                    DriverState::Processing {
                        cursor,
                        start,
                        pending,
                    }
                } else {
                    match pending {
                        Pending::Retry => {
                            self.report_skipped(cursor)?;
                            let next = cursor + 1;
                            if next < n {
                                DriverState::Filling {
                                    cursor: next,
                                    start: next,
                                }
                            } else {
                                DriverState::Idle
                            }
                        }
                        Pending::Rejected(status) => {
                            self.report_failed(cursor, status)?;
                            DriverState::Idle
                        }
                        Pending::Complete => DriverState::Idle,
                    }
                }
            }

            DriverState::Processing {
                cursor,
                start,
                pending,
            } => {
                let last = match pending {
                    Pending::Complete => cursor,
                    Pending::Retry | Pending::Rejected(_) => cursor.saturating_sub(1),
                };
                self.flush(start, last)?;
                match pending {
                    Pending::Retry => DriverState::Filling {
                        cursor,
                        start: cursor,
                    },
                    Pending::Complete => DriverState::Idle,
                    Pending::Rejected(status) => {
                        self.report_failed(cursor, status)?;
                        DriverState::Idle
                    }
                }
            }
        };
        log::trace!("batch {}: {:?} -> {:?}", self.batch.batch_index(), state, next);
        Ok(next)
    }

    fn offer(&mut self, cursor: usize) -> Result<AddOutcome, DriverError> {
        let group_id = self.ids[cursor];
        let group = self.groups.get(group_id).ok_or(DriverError::UnknownGroup {
            group_id,
            num_groups: self.groups.len(),
        })?;
        Ok(self.batch.offer(group_id, group))
    }

    /// Compute, harvest and reset; report positions `start..=last`.
    fn flush(&mut self, start: usize, last: usize) -> Result<(), DriverError> {
        let batch_index = self.batch.batch_index();

        let (results, warning) = match self.batch.generate(self.options.timeout) {
            Ok(()) => self.harvester.harvest(&*self.batch),
            Err(err) => {
                log::warn!("Compute failed for batch {}: {}", batch_index, err);
                (fail_all(self.batch.buffered(), &err.to_string()), Some(err))
            }
        };
        let graphs = if self.options.print_graph && warning.is_none() {
            self.harvester.graphs(&*self.batch)
        } else {
            Vec::new()
        };

        for (&slot, result) in self.slots.iter().zip(&results) {
            if let Err(err) = &result.outcome {
                self.positions[slot] = Some(match err {
                    HarvestError::Engine(status) => *status,
                    HarvestError::Batch(_) => Status::OtherAddFailure,
                });
            }
        }
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        self.summary.processed += results.len();
        self.summary.succeeded += succeeded;
        self.summary.failed += results.len() - succeeded;

        self.batch.reset();
        self.slots.clear();

        let report = FlushReport {
            batch: batch_index,
            first: self.options.offset + start,
            last: self.options.offset + last,
            results,
            graphs,
            warning: warning.map(|e| e.to_string()),
        };
        log::info!(
            "Processed groups {} - {} (batch {})",
            report.first,
            report.last,
            batch_index
        );
        self.sink.on_flush(&report)?;
        self.summary.flushes += 1;
        Ok(())
    }

    fn report_dropped(
        &mut self,
        cursor: usize,
        sequence_status: &[Status],
    ) -> Result<(), DriverError> {
        let group_id = self.ids[cursor];
        for (sequence_index, &status) in sequence_status.iter().enumerate() {
            if status.is_success() {
                continue;
            }
            if status == Status::ExceededMaximumSequenceSize {
                log::warn!(
                    "Dropping sequence {} of POA group {} because sequence exceeded maximum size",
                    sequence_index,
                    group_id
                );
            } else {
                log::warn!(
                    "Dropping sequence {} of POA group {}. Error code {}",
                    sequence_index,
                    group_id,
                    status
                );
            }
            self.sink.on_sequence_dropped(&DroppedSequence {
                batch: self.batch.batch_index(),
                group_id,
                sequence_index,
                status,
            })?;
            self.summary.dropped_sequences += 1;
        }
        Ok(())
    }

    fn report_skipped(&mut self, cursor: usize) -> Result<(), DriverError> {
        let skipped = SkippedGroup {
            batch: self.batch.batch_index(),
            group_id: self.ids[cursor],
            status: Status::ExceededMaximumPoas,
        };
        log::warn!(
            "Could not add POA group {} to batch {}",
            skipped.group_id,
            skipped.batch
        );
        self.positions[cursor] = Some(skipped.status);
        self.sink.on_group_skipped(&skipped)?;
        self.summary.skipped += 1;
        Ok(())
    }

    fn report_failed(&mut self, cursor: usize, status: Status) -> Result<(), DriverError> {
        let failed = SkippedGroup {
            batch: self.batch.batch_index(),
            group_id: self.ids[cursor],
            status,
        };
        log::warn!(
            "Could not add POA group {} to batch {}. Error code {}",
            failed.group_id,
            failed.batch,
            status
        );
        self.positions[cursor] = Some(status);
        self.sink.on_group_failed(&failed)?;
        self.summary.failed += 1;
        Ok(())
    }

    fn finish(self) -> PairSummary {
        let mut summary = self.summary;
        summary.statuses = self
            .ids
            .iter()
            .zip(self.positions)
            .map(|(&id, status)| (id, status.unwrap_or(Status::OtherAddFailure)))
            .collect();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compute::host::HostBatch;
    use crate::core::compute::{BandMode, CapacityConfig, ScoringParams};
    use crate::core::types::OutputMode;
    use crate::pipelines::batched::sink::CollectingSink;

    fn config(max_poas: usize) -> CapacityConfig {
        CapacityConfig {
            max_sequence_size: 8,
            max_consensus_size: 8,
            max_nodes_per_graph: 32,
            max_sequences_per_poa: 4,
            max_poas,
            memory_budget: usize::MAX,
            band_mode: BandMode::Banded { width: 4 },
            output_mode: OutputMode::Consensus,
        }
    }

    fn state(max_poas: usize) -> BatchState<HostBatch> {
        let cfg = config(max_poas);
        BatchState::new(0, cfg.clone(), HostBatch::new(cfg, ScoringParams::default()))
    }

    fn ranges(sink: &CollectingSink) -> Vec<(usize, usize)> {
        sink.flushes().map(|r| (r.first, r.last)).collect()
    }

    #[test]
    fn test_empty_list_is_idle() {
        let mut batch = state(3);
        let mut sink = CollectingSink::new();
        let summary = BatchDriver::default().run(&mut batch, &[], &[], &mut sink).unwrap();
        assert_eq!(summary, PairSummary::default());
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_flushes_at_capacity_and_at_end() {
        let groups: Vec<Group> = (0..7).map(|_| Group::from_strs(&["ACGT"])).collect();
        let ids: Vec<GroupId> = (0..7).collect();
        let mut batch = state(3);
        let mut sink = CollectingSink::new();
        let driver = BatchDriver::new(DriverOptions {
            offset: 10,
            ..DriverOptions::default()
        });

        let summary = driver.run(&mut batch, &ids, &groups, &mut sink).unwrap();
        assert_eq!(summary.flushes, 3);
        assert_eq!(summary.processed, 7);
        assert_eq!(summary.succeeded, 7);
        assert_eq!(ranges(&sink), vec![(10, 12), (13, 15), (16, 16)]);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_trailing_rejection_excludes_last_position() {
        let mut groups: Vec<Group> = (0..3).map(|_| Group::from_strs(&["ACGT"])).collect();
        groups.push(Group::new());
        let ids: Vec<GroupId> = (0..4).collect();
        let mut batch = state(8);
        let mut sink = CollectingSink::new();

        let summary = BatchDriver::default().run(&mut batch, &ids, &groups, &mut sink).unwrap();
        assert_eq!(ranges(&sink), vec![(0, 2)]);
        assert_eq!(sink.failed().count(), 1);
        assert_eq!(summary.statuses[3], (3, Status::OtherAddFailure));
    }

    #[test]
    fn test_lone_trailing_rejection_reported_once() {
        let groups = vec![Group::new()];
        let mut batch = state(3);
        let mut sink = CollectingSink::new();

        let summary = BatchDriver::default().run(&mut batch, &[0], &groups, &mut sink).unwrap();
        assert_eq!(sink.events.len(), 1);
        assert_eq!(sink.failed().count(), 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.flushes, 0);
    }

    #[test]
    fn test_compute_failure_marks_flush_failed() {
        let groups: Vec<Group> = (0..2).map(|_| Group::from_strs(&["ACGT"])).collect();
        let mut batch = state(4);
        let mut sink = CollectingSink::new();
        let driver = BatchDriver::new(DriverOptions {
            timeout: Some(Duration::ZERO),
            ..DriverOptions::default()
        });

        let summary = driver.run(&mut batch, &[0, 1], &groups, &mut sink).unwrap();
        let report = sink.flushes().next().unwrap();
        assert!(report.warning.is_some());
        assert_eq!(report.num_failed(), 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.succeeded, 0);
        assert!(summary
            .statuses
            .iter()
            .all(|&(_, s)| s == Status::OtherAddFailure));
    }

    #[test]
    fn test_every_dropped_sequence_reported() {
        let mut cfg = config(3);
        cfg.max_sequences_per_poa = 2;
        let mut batch =
            BatchState::new(0, cfg.clone(), HostBatch::new(cfg, ScoringParams::default()));
        let groups = vec![Group::from_strs(&["ACGT", "", "ACGT", "ACGTACGTACGT"])];
        let mut sink = CollectingSink::new();

        let summary = BatchDriver::default().run(&mut batch, &[0], &groups, &mut sink).unwrap();

        let dropped: Vec<(usize, Status)> = sink
            .dropped()
            .map(|d| (d.sequence_index, d.status))
            .collect();
        assert_eq!(
            dropped,
            vec![
                (1, Status::OtherAddFailure),
                (2, Status::OtherAddFailure),
                (3, Status::OtherAddFailure),
            ]
        );
        assert_eq!(summary.dropped_sequences, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(sink.flushes().next().unwrap().num_ok(), 1);
    }

    #[test]
    fn test_unknown_group_is_an_error() {
        let mut batch = state(3);
        let mut sink = CollectingSink::new();
        let err = BatchDriver::default()
            .run(&mut batch, &[5], &[Group::from_strs(&["A"])], &mut sink)
            .unwrap_err();
        assert!(matches!(err, DriverError::UnknownGroup { group_id: 5, .. }));
    }
}
