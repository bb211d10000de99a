//! Capacity planning: from a workload to an ordered list of batch shapes.
//!
//! The planner wraps a [`CapacityEstimator`] and guarantees the shape of its
//! output regardless of the heuristic:
//!
//! - every group id appears in exactly one entry,
//! - no entry is empty and no two entries share a configuration,
//! - ids within an entry are in input order,
//! - entry order is the estimator's order.

use thiserror::Error;

use crate::core::compute::CapacityConfig;
use crate::core::types::{Group, GroupId};

use super::estimator::{BinnedEstimator, CapacityEstimator, PlanOptions};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("group {group_id} assigned to more than one batch")]
    Duplicate { group_id: GroupId },

    #[error("group {group_id} not assigned to any batch")]
    Missing { group_id: GroupId },

    #[error("group id {group_id} out of range ({num_groups} groups)")]
    OutOfRange { group_id: GroupId, num_groups: usize },

    #[error("batch {entry} has zero capacity")]
    ZeroCapacity { entry: usize },
}

/// One batch shape and the groups assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub config: CapacityConfig,
    pub group_ids: Vec<GroupId>,
}

/// Ordered batch shapes covering a workload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn new(entries: Vec<PlanEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_groups(&self) -> usize {
        self.entries.iter().map(|e| e.group_ids.len()).sum()
    }

    /// Progress offset of each entry: the number of groups in all entries
    /// before it.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offset = 0;
        self.entries
            .iter()
            .map(|e| {
                let start = offset;
                offset += e.group_ids.len();
                start
            })
            .collect()
    }

    /// Check that every id in `0..num_groups` appears exactly once.
    pub fn validate(&self, num_groups: usize) -> Result<(), PlanError> {
        let mut seen = vec![false; num_groups];
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.config.max_poas == 0 {
                return Err(PlanError::ZeroCapacity { entry: idx });
            }
            for &group_id in &entry.group_ids {
                let Some(slot) = seen.get_mut(group_id) else {
                    return Err(PlanError::OutOfRange {
                        group_id,
                        num_groups,
                    });
                };
                if *slot {
                    return Err(PlanError::Duplicate { group_id });
                }
                *slot = true;
            }
        }
        match seen.iter().position(|s| !s) {
            Some(group_id) => Err(PlanError::Missing { group_id }),
            None => Ok(()),
        }
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a PlanEntry;
    type IntoIter = std::slice::Iter<'a, PlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Computes a minimal, validated [`Plan`].
#[derive(Debug, Clone, Default)]
pub struct CapacityPlanner<E = BinnedEstimator> {
    estimator: E,
}

impl CapacityPlanner<BinnedEstimator> {
    pub fn new() -> Self {
        Self {
            estimator: BinnedEstimator::new(),
        }
    }
}

impl<E: CapacityEstimator> CapacityPlanner<E> {
    pub fn with_estimator(estimator: E) -> Self {
        Self { estimator }
    }

    pub fn plan(&self, groups: &[Group], options: &PlanOptions) -> Result<Plan, PlanError> {
        if groups.is_empty() {
            return Ok(Plan::default());
        }

        let estimated = self.estimator.estimate(groups, options);
        let plan = normalize(estimated);
        plan.validate(groups.len())?;

        log::info!(
            "Planned {} groups into {} batch configuration(s)",
            groups.len(),
            plan.len()
        );
        Ok(plan)
    }
}

/// Drop empty entries, merge entries with equal configs (first occurrence
/// keeps its position) and restore input order within each entry.
fn normalize(plan: Plan) -> Plan {
    let mut merged: Vec<PlanEntry> = Vec::with_capacity(plan.entries.len());
    for entry in plan.entries {
        if entry.group_ids.is_empty() {
            continue;
        }
        match merged.iter_mut().find(|m| m.config == entry.config) {
            Some(existing) => existing.group_ids.extend(entry.group_ids),
            None => merged.push(entry),
        }
    }
    for entry in &mut merged {
        entry.group_ids.sort_unstable();
    }
    Plan::new(merged)
}
