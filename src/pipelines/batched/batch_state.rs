//! Scheduler-side view of one compute batch.
//!
//! [`BatchState`] owns the engine handle for the lifetime of one plan pair
//! and tracks what the scheduler has put into it. It enforces the pair's
//! `max_poas` and `memory_budget` before the engine is asked, so those
//! limits hold even for an engine with looser accounting.

use std::time::Duration;

use crate::core::compute::{AddOutcome, CapacityConfig, ComputeBatch, EngineError};
use crate::core::types::{Group, GroupId};

pub struct BatchState<B: ComputeBatch> {
    batch_index: usize,
    config: CapacityConfig,
    handle: B,
    buffered: Vec<GroupId>,
    used_bytes: usize,
    computed: bool,
}

impl<B: ComputeBatch> BatchState<B> {
    pub fn new(batch_index: usize, config: CapacityConfig, handle: B) -> Self {
        Self {
            batch_index,
            config,
            handle,
            buffered: Vec::new(),
            used_bytes: 0,
            computed: false,
        }
    }

    pub fn batch_index(&self) -> usize {
        self.batch_index
    }

    pub fn config(&self) -> &CapacityConfig {
        &self.config
    }

    pub fn handle(&self) -> &B {
        &self.handle
    }

    /// Ids of the buffered groups, in submission order.
    pub fn buffered(&self) -> &[GroupId] {
        &self.buffered
    }

    pub fn accepted_count(&self) -> usize {
        self.buffered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffered.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Whether compute has run since the last reset.
    pub fn has_computed(&self) -> bool {
        self.computed
    }

    /// Offer group `id` to the batch.
    pub fn offer(&mut self, id: GroupId, group: &Group) -> AddOutcome {
        if self.buffered.len() >= self.config.max_poas {
            return AddOutcome::BatchFull;
        }
        let footprint = self.config.group_footprint(group);
        if self.used_bytes.saturating_add(footprint) > self.config.memory_budget {
            log::trace!(
                "batch {}: group {} needs {} bytes, {} of {} used",
                self.batch_index,
                id,
                footprint,
                self.used_bytes,
                self.config.memory_budget
            );
            return AddOutcome::BatchFull;
        }

        let outcome = self.handle.add_group(group);
        if outcome.is_accepted() {
            self.buffered.push(id);
            self.used_bytes += footprint;
            self.computed = false;
            debug_assert_eq!(self.handle.accepted_count(), self.buffered.len());
        }
        outcome
    }

    /// Run compute on the buffered groups.
    pub fn generate(&mut self, timeout: Option<Duration>) -> Result<(), EngineError> {
        self.computed = true;
        self.handle.generate(timeout)
    }

    /// Return to the freshly-created state.
    pub fn reset(&mut self) {
        self.handle.reset();
        self.buffered.clear();
        self.used_bytes = 0;
        self.computed = false;
    }
}

impl<B: ComputeBatch> Drop for BatchState<B> {
    fn drop(&mut self) {
        if !self.buffered.is_empty() {
            log::debug!(
                "batch {}: releasing {} unflushed group(s)",
                self.batch_index,
                self.buffered.len()
            );
            self.handle.reset();
        }
    }
}
