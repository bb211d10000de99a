//! # Compute Batch Abstraction Layer
//!
//! This module defines the narrow interface between the batch scheduler and
//! the alignment engine that actually builds POA graphs and extracts
//! consensus / MSA output. The engine is a black box: the scheduler only
//! offers groups, asks it to compute, reads results back and resets it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       COMPUTE BATCH ENTRY POINT                         │
//! │                                                                         │
//! │  BatchFactory::open_context()   device selection + free memory query   │
//! │  BatchFactory::create_batch()   one batch per CapacityConfig           │
//! │                                                                         │
//! │  ComputeBatch::add_group()      -> AddOutcome (tagged, per-seq status) │
//! │  ComputeBatch::generate()       blocking compute, optional timeout     │
//! │  ComputeBatch::consensus()/msa()/graphs()                              │
//! │  ComputeBatch::reset()                                                  │
//! │                                                                         │
//! │  Backends:                                                              │
//! │  • Host (CPU) - always available, see `host`                           │
//! │  • Device engines plug in by implementing both traits                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod capacity;
pub mod host;

use std::time::Duration;

use thiserror::Error;

use crate::core::graph::DirectedGraph;
use crate::core::types::{Group, OutputMode, Status};

pub use capacity::{BandMode, CapacityConfig};

// ============================================================================
// ENGINE ERRORS
// ============================================================================

/// Failures reported by a compute engine.
///
/// Only `open_context` and `create_batch` failures are fatal to a run; the
/// rest are batch-level failures handled by the driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("no compute device available: {0}")]
    DeviceUnavailable(String),

    #[error("failed to allocate batch ({requested} bytes requested, {available} available)")]
    AllocationFailed { requested: usize, available: usize },

    #[error("compute did not finish within {0:?}")]
    Timeout(Duration),

    #[error("compute has not been run on this batch")]
    NotGenerated,

    #[error("output type {requested} not available from a {configured} batch")]
    WrongOutputMode {
        requested: OutputMode,
        configured: OutputMode,
    },

    #[error("engine failure: {0}")]
    Other(String),
}

// ============================================================================
// ENGINE DATA TYPES
// ============================================================================

/// Device handle and memory information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    pub device_id: usize,
    pub name: String,
    pub total_memory: usize,
    pub free_memory: usize,
}

impl DeviceContext {
    /// Memory available to batches when `fraction` of free memory is used.
    pub fn memory_budget(&self, fraction: f64) -> usize {
        (self.free_memory as f64 * fraction.clamp(0.0, 1.0)) as usize
    }
}

/// POA scoring parameters passed through to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringParams {
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_score: i32,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            match_score: crate::defaults::MATCH_SCORE,
            mismatch_score: crate::defaults::MISMATCH_SCORE,
            gap_score: crate::defaults::GAP_SCORE,
        }
    }
}

/// Result of offering one group to a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The group is buffered. `sequence_status` has one entry per input
    /// sequence; entries other than `Success` were left out of the group.
    Accepted { sequence_status: Vec<Status> },
    /// The batch cannot take this group now. Retry on an empty batch.
    BatchFull,
    /// The group can never be added.
    Rejected {
        status: Status,
        sequence_status: Vec<Status>,
    },
}

impl AddOutcome {
    /// Group-level status of this attempt.
    pub fn status(&self) -> Status {
        match self {
            AddOutcome::Accepted { .. } => Status::Success,
            AddOutcome::BatchFull => Status::ExceededMaximumPoas,
            AddOutcome::Rejected { status, .. } => *status,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, AddOutcome::Accepted { .. })
    }

    pub fn sequence_status(&self) -> &[Status] {
        match self {
            AddOutcome::Accepted { sequence_status }
            | AddOutcome::Rejected {
                sequence_status, ..
            } => sequence_status,
            AddOutcome::BatchFull => &[],
        }
    }

    /// Indices of sequences dropped for exceeding the size limit.
    pub fn dropped_sequences(&self) -> impl Iterator<Item = usize> + '_ {
        self.sequence_status()
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == Status::ExceededMaximumSequenceSize)
            .map(|(i, _)| i)
    }
}

/// Consensus output for every group in the batch, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsensusOutput {
    pub consensus: Vec<String>,
    pub coverage: Vec<Vec<u16>>,
    pub status: Vec<Status>,
}

/// MSA output for every group in the batch, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsaOutput {
    pub msa: Vec<Vec<String>>,
    pub status: Vec<Status>,
}

// ============================================================================
// ENGINE TRAITS
// ============================================================================

/// One fixed-capacity compute batch.
///
/// Implementations copy any group data they need during `add_group`; the
/// caller's `Group` is only borrowed for the duration of the call.
pub trait ComputeBatch {
    fn add_group(&mut self, group: &Group) -> AddOutcome;

    /// Run POA on all buffered groups. Blocks until done or until
    /// `timeout` expires.
    fn generate(&mut self, timeout: Option<Duration>) -> Result<(), EngineError>;

    fn consensus(&self) -> Result<ConsensusOutput, EngineError>;

    fn msa(&self) -> Result<MsaOutput, EngineError>;

    fn graphs(&self) -> Result<Vec<DirectedGraph>, EngineError>;

    /// Drop all buffered groups and results.
    fn reset(&mut self);

    /// Number of groups buffered since the last reset.
    fn accepted_count(&self) -> usize;
}

/// Creates device contexts and batches for one backend.
pub trait BatchFactory: Sync {
    type Batch: ComputeBatch + Send;

    /// Select `device_id` and query its memory.
    fn open_context(&self, device_id: usize) -> Result<DeviceContext, EngineError>;

    fn create_batch(
        &self,
        ctx: &DeviceContext,
        config: &CapacityConfig,
        scoring: &ScoringParams,
    ) -> Result<Self::Batch, EngineError>;
}
