//! Batch sizing classes.
//!
//! A [`CapacityConfig`] describes one batch shape: the largest sequence it
//! accepts, how many sequences a group may hold, how many groups fit in one
//! batch, and the memory the batch may use. The scheduler treats it as an
//! opaque sizing class; only `max_poas` and `memory_budget` are enforced on
//! the scheduler side (see `pipelines::batched::batch_state`).

use std::fmt;

use crate::core::types::{Group, OutputMode, Sequence};

/// Bytes per DP score cell (i16 scores).
const SCORE_BYTES: usize = 2;
/// Bytes per graph node: base, weight, edge lists, sorted-order slot.
const NODE_BYTES: usize = 48;
/// Bytes per input base: base + weight.
const INPUT_BYTES_PER_BASE: usize = 2;

/// DP matrix shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandMode {
    /// Full alignment; matrix width is the sequence size.
    Full,
    /// Static band of `width` cells around the diagonal.
    Banded { width: usize },
}

impl BandMode {
    pub fn is_banded(self) -> bool {
        matches!(self, BandMode::Banded { .. })
    }

    /// DP matrix width for sequences up to `max_sequence_size` bases.
    pub fn matrix_width(self, max_sequence_size: usize) -> usize {
        match self {
            BandMode::Full => max_sequence_size + 1,
            BandMode::Banded { width } => width.min(max_sequence_size + 1).max(1),
        }
    }
}

impl fmt::Display for BandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BandMode::Full => f.write_str("full"),
            BandMode::Banded { width } => write!(f, "banded(w={})", width),
        }
    }
}

/// Resource budget for one compute batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapacityConfig {
    /// Longest sequence a group may contain
    pub max_sequence_size: usize,
    /// Longest consensus the engine will emit
    pub max_consensus_size: usize,
    /// Graph node bound per group
    pub max_nodes_per_graph: usize,
    /// Sequences per group
    pub max_sequences_per_poa: usize,
    /// Groups per batch
    pub max_poas: usize,
    /// Device memory the batch may use (bytes)
    pub memory_budget: usize,
    pub band_mode: BandMode,
    pub output_mode: OutputMode,
}

impl CapacityConfig {
    /// Sequences of `group` an engine keeps under this configuration: the
    /// first `max_sequences_per_poa`, minus empty and oversize ones.
    pub fn kept_sequences<'g>(&self, group: &'g Group) -> impl Iterator<Item = &'g Sequence> {
        let max_len = self.max_sequence_size;
        group
            .sequences()
            .iter()
            .take(self.max_sequences_per_poa)
            .filter(move |seq| !seq.is_empty() && seq.len() <= max_len)
    }

    /// Estimated bytes one group occupies in a batch of this shape.
    ///
    /// Only kept sequences are charged. Graph nodes are bounded by both the
    /// kept base count and `max_nodes_per_graph`; the DP matrix is shared by
    /// the group's sequences so only one is counted.
    pub fn group_footprint(&self, group: &Group) -> usize {
        let (kept, kept_bases) = self
            .kept_sequences(group)
            .fold((0usize, 0usize), |(n, bases), seq| (n + 1, bases + seq.len()));
        let nodes = kept_bases.min(self.max_nodes_per_graph).max(1);
        let width = self.band_mode.matrix_width(self.max_sequence_size);
        let mut bytes = nodes * NODE_BYTES
            + nodes * width * SCORE_BYTES
            + kept_bases * INPUT_BYTES_PER_BASE;
        if self.output_mode.is_msa() {
            bytes += kept * self.max_consensus_size;
        } else {
            bytes += self.max_consensus_size * (1 + SCORE_BYTES);
        }
        bytes
    }

    /// Footprint of the largest group this configuration admits.
    pub fn worst_case_footprint(&self) -> usize {
        let nodes = self.max_nodes_per_graph.max(1);
        let width = self.band_mode.matrix_width(self.max_sequence_size);
        let input = self.max_sequences_per_poa * self.max_sequence_size * INPUT_BYTES_PER_BASE;
        let output = if self.output_mode.is_msa() {
            self.max_sequences_per_poa * self.max_consensus_size
        } else {
            self.max_consensus_size * (1 + SCORE_BYTES)
        };
        nodes * NODE_BYTES + nodes * width * SCORE_BYTES + input + output
    }
}

impl fmt::Display for CapacityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_seq={} max_seqs/poa={} max_poas={} nodes={} {} ({} MB)",
            self.max_sequence_size,
            self.max_sequences_per_poa,
            self.max_poas,
            self.max_nodes_per_graph,
            self.band_mode,
            self.memory_budget / (1024 * 1024)
        )
    }
}
