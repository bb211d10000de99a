//! Flush reports and the sink that consumes them.
//!
//! Results are transient: the driver hands every flush to a [`ResultSink`]
//! as soon as it is harvested, together with one event per skipped or failed
//! group and per dropped sequence.

use std::io;

use thiserror::Error;

use crate::core::graph::DirectedGraph;
use crate::core::types::{GroupId, Status};

/// Harvested output of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutput {
    Consensus { sequence: String, coverage: Vec<u16> },
    Msa { alignments: Vec<String> },
}

/// Why a buffered group produced no output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HarvestError {
    /// The engine reported a non-success status for this group.
    #[error("engine status {0}")]
    Engine(Status),
    /// The whole batch failed (compute error, timeout, missing output).
    #[error("batch failure: {0}")]
    Batch(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupResult {
    pub group_id: GroupId,
    pub outcome: Result<GroupOutput, HarvestError>,
}

impl GroupResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// One compute + harvest + reset round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Index of the plan pair the batch belongs to
    pub batch: usize,
    /// First reported position (run-wide progress coordinates)
    pub first: usize,
    /// Last reported position, inclusive
    pub last: usize,
    /// Results in submission order
    pub results: Vec<GroupResult>,
    /// Alignment graphs, when requested
    pub graphs: Vec<DirectedGraph>,
    /// Batch-level engine warning, if any
    pub warning: Option<String>,
}

impl FlushReport {
    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.results.iter().map(|r| r.group_id)
    }

    pub fn num_ok(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn num_failed(&self) -> usize {
        self.results.len() - self.num_ok()
    }
}

/// A group that never entered a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedGroup {
    pub batch: usize,
    pub group_id: GroupId,
    pub status: Status,
}

/// A sequence left out of an accepted group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DroppedSequence {
    pub batch: usize,
    pub group_id: GroupId,
    pub sequence_index: usize,
    /// Per-sequence status the engine returned
    pub status: Status,
}

/// Consumer of driver events.
///
/// `on_group_skipped` covers groups that are too large for an empty batch;
/// `on_group_failed` covers every other rejected add.
pub trait ResultSink {
    fn on_flush(&mut self, report: &FlushReport) -> io::Result<()>;

    fn on_group_skipped(&mut self, _skipped: &SkippedGroup) -> io::Result<()> {
        Ok(())
    }

    fn on_group_failed(&mut self, _failed: &SkippedGroup) -> io::Result<()> {
        Ok(())
    }

    fn on_sequence_dropped(&mut self, _dropped: &DroppedSequence) -> io::Result<()> {
        Ok(())
    }
}

/// Event recorded by [`CollectingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Flush(FlushReport),
    Skipped(SkippedGroup),
    Failed(SkippedGroup),
    Dropped(DroppedSequence),
}

/// Records every event in order.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    pub events: Vec<SinkEvent>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flushes(&self) -> impl Iterator<Item = &FlushReport> {
        self.events.iter().filter_map(|e| match e {
            SinkEvent::Flush(r) => Some(r),
            _ => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = &SkippedGroup> {
        self.events.iter().filter_map(|e| match e {
            SinkEvent::Skipped(s) => Some(s),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = &SkippedGroup> {
        self.events.iter().filter_map(|e| match e {
            SinkEvent::Failed(s) => Some(s),
            _ => None,
        })
    }

    pub fn dropped(&self) -> impl Iterator<Item = &DroppedSequence> {
        self.events.iter().filter_map(|e| match e {
            SinkEvent::Dropped(d) => Some(d),
            _ => None,
        })
    }

    /// Forward every recorded event to `sink`, in order.
    pub fn replay(&self, sink: &mut dyn ResultSink) -> io::Result<()> {
        for event in &self.events {
            match event {
                SinkEvent::Flush(r) => sink.on_flush(r)?,
                SinkEvent::Skipped(s) => sink.on_group_skipped(s)?,
                SinkEvent::Failed(s) => sink.on_group_failed(s)?,
                SinkEvent::Dropped(d) => sink.on_sequence_dropped(d)?,
            }
        }
        Ok(())
    }
}

impl ResultSink for CollectingSink {
    fn on_flush(&mut self, report: &FlushReport) -> io::Result<()> {
        self.events.push(SinkEvent::Flush(report.clone()));
        Ok(())
    }

    fn on_group_skipped(&mut self, skipped: &SkippedGroup) -> io::Result<()> {
        self.events.push(SinkEvent::Skipped(*skipped));
        Ok(())
    }

    fn on_group_failed(&mut self, failed: &SkippedGroup) -> io::Result<()> {
        self.events.push(SinkEvent::Failed(*failed));
        Ok(())
    }

    fn on_sequence_dropped(&mut self, dropped: &DroppedSequence) -> io::Result<()> {
        self.events.push(SinkEvent::Dropped(*dropped));
        Ok(())
    }
}
