//! Capacity estimation: classing groups into batch shapes.
//!
//! The estimator decides *which* batch shapes exist and which groups go to
//! each; the planner (see `planner`) then normalizes and validates the
//! result. [`BinnedEstimator`] is the default heuristic:
//!
//! ```text
//! group ──longest sequence──▶ smallest size bin that holds it
//!                               │
//!                               ▼
//!          one CapacityConfig per non-empty bin
//!          max_poas = memory_budget / worst_case_footprint
//! ```

use crate::core::compute::{BandMode, CapacityConfig};
use crate::core::types::{Group, GroupId, OutputMode};
use crate::defaults;

use super::planner::{Plan, PlanEntry};

/// Sizing inputs shared by every estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOptions {
    pub banded: bool,
    pub band_width: usize,
    pub output_mode: OutputMode,
    /// Bytes each batch may use
    pub memory_budget: usize,
    /// Ascending sequence-size classes
    pub size_bins: Vec<usize>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            banded: true,
            band_width: defaults::BAND_WIDTH,
            output_mode: OutputMode::Consensus,
            memory_budget: defaults::HOST_MEMORY_MB * 1024 * 1024,
            size_bins: defaults::SIZE_BINS.to_vec(),
        }
    }
}

impl PlanOptions {
    pub fn band_mode(&self) -> BandMode {
        if self.banded {
            BandMode::Banded {
                width: self.band_width,
            }
        } else {
            BandMode::Full
        }
    }

    /// Build the configuration for one size class.
    pub fn config_for_bin(&self, capacity: usize, max_sequences_per_poa: usize) -> CapacityConfig {
        let nodes_per_base = if self.banded {
            defaults::NODES_PER_BASE_BANDED
        } else {
            defaults::NODES_PER_BASE_FULL
        };
        let mut config = CapacityConfig {
            max_sequence_size: capacity,
            max_consensus_size: capacity,
            max_nodes_per_graph: capacity * nodes_per_base,
            max_sequences_per_poa: max_sequences_per_poa.max(1),
            max_poas: 1,
            memory_budget: self.memory_budget,
            band_mode: self.band_mode(),
            output_mode: self.output_mode,
        };
        let worst = config.worst_case_footprint().max(1);
        config.max_poas = (self.memory_budget / worst).max(1);
        config
    }
}

/// Produces a capacity decision for a workload.
pub trait CapacityEstimator {
    fn estimate(&self, groups: &[Group], options: &PlanOptions) -> Plan;
}

/// Bins groups by their longest sequence.
///
/// Groups longer than the largest bin share one extra bin sized to the
/// longest of them, rounded up to `OVERSIZE_BIN_ROUNDING`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinnedEstimator;

impl BinnedEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl CapacityEstimator for BinnedEstimator {
    fn estimate(&self, groups: &[Group], options: &PlanOptions) -> Plan {
        let bins = &options.size_bins;
        let mut binned: Vec<Vec<GroupId>> = vec![Vec::new(); bins.len()];
        let mut oversize: Vec<GroupId> = Vec::new();
        let mut oversize_len = 0usize;

        for (id, group) in groups.iter().enumerate() {
            let len = group.max_sequence_len();
            match bins.iter().position(|&cap| len <= cap) {
                Some(bin) => binned[bin].push(id),
                None => {
                    oversize_len = oversize_len.max(len);
                    oversize.push(id);
                }
            }
        }

        let max_group_size =
            |ids: &[GroupId]| ids.iter().map(|&id| groups[id].len()).max().unwrap_or(1);

        let mut entries: Vec<PlanEntry> = bins
            .iter()
            .zip(binned)
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(&cap, ids)| PlanEntry {
                config: options.config_for_bin(cap, max_group_size(&ids)),
                group_ids: ids,
            })
            .collect();

        if !oversize.is_empty() {
            let cap = oversize_len.div_ceil(defaults::OVERSIZE_BIN_ROUNDING)
                * defaults::OVERSIZE_BIN_ROUNDING;
            log::debug!(
                "BinnedEstimator: {} groups exceed the largest bin, using capacity {}",
                oversize.len(),
                cap
            );
            entries.push(PlanEntry {
                config: options.config_for_bin(cap, max_group_size(&oversize)),
                group_ids: oversize,
            });
        }

        for entry in &entries {
            log::debug!(
                "BinnedEstimator: {} groups -> {}",
                entry.group_ids.len(),
                entry.config
            );
        }

        Plan::new(entries)
    }
}
