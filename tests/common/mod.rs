// tests/common/mod.rs
// Scripted compute engine shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ferrous_poa::core::compute::{
    AddOutcome, BandMode, BatchFactory, CapacityConfig, ComputeBatch, ConsensusOutput,
    DeviceContext, EngineError, MsaOutput, ScoringParams,
};
use ferrous_poa::core::graph::DirectedGraph;
use ferrous_poa::core::types::{Group, OutputMode, Status};
use ferrous_poa::pipelines::batched::BatchState;

/// Engine behaviour knobs.
#[derive(Debug, Clone)]
pub struct Script {
    /// Groups per batch
    pub capacity: usize,
    /// Groups with a longer sequence never fit, even an empty batch
    pub max_group_len: usize,
    /// Longer sequences are dropped from an accepted group
    pub max_sequence_len: usize,
    /// Number of leading `generate` calls that time out
    pub failing_generates: usize,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            capacity: 3,
            max_group_len: 1000,
            max_sequence_len: 100,
            failing_generates: 0,
        }
    }
}

/// Counters shared by every batch of one factory.
#[derive(Debug, Default)]
pub struct Counters {
    pub peak_accepted: AtomicUsize,
    pub generates: AtomicUsize,
    pub batches_created: AtomicUsize,
}

pub struct ScriptedBatch {
    script: Script,
    counters: Arc<Counters>,
    mode: OutputMode,
    accepted: Vec<Group>,
    generated: bool,
}

impl ScriptedBatch {
    pub fn new(script: Script, mode: OutputMode) -> Self {
        Self::with_counters(script, mode, Arc::new(Counters::default()))
    }

    pub fn with_counters(script: Script, mode: OutputMode, counters: Arc<Counters>) -> Self {
        Self {
            script,
            counters,
            mode,
            accepted: Vec::new(),
            generated: false,
        }
    }
}

impl ComputeBatch for ScriptedBatch {
    fn add_group(&mut self, group: &Group) -> AddOutcome {
        if group.is_empty() {
            return AddOutcome::Rejected {
                status: Status::OtherAddFailure,
                sequence_status: Vec::new(),
            };
        }
        if group.max_sequence_len() > self.script.max_group_len
            || self.accepted.len() >= self.script.capacity
        {
            return AddOutcome::BatchFull;
        }

        let mut kept = Group::new();
        let sequence_status = group
            .sequences()
            .iter()
            .map(|seq| {
                if seq.len() > self.script.max_sequence_len {
                    Status::ExceededMaximumSequenceSize
                } else {
                    kept.push(seq.clone());
                    Status::Success
                }
            })
            .collect();
        if kept.is_empty() {
            return AddOutcome::Rejected {
                status: Status::ExceededMaximumSequenceSize,
                sequence_status,
            };
        }

        self.accepted.push(kept);
        self.generated = false;
        self.counters
            .peak_accepted
            .fetch_max(self.accepted.len(), Ordering::SeqCst);
        AddOutcome::Accepted { sequence_status }
    }

    fn generate(&mut self, timeout: Option<Duration>) -> Result<(), EngineError> {
        let call = self.counters.generates.fetch_add(1, Ordering::SeqCst);
        if call < self.script.failing_generates {
            return Err(EngineError::Timeout(timeout.unwrap_or(Duration::from_secs(1))));
        }
        self.generated = true;
        Ok(())
    }

    fn consensus(&self) -> Result<ConsensusOutput, EngineError> {
        if !self.generated {
            return Err(EngineError::NotGenerated);
        }
        if self.mode != OutputMode::Consensus {
            return Err(EngineError::WrongOutputMode {
                requested: OutputMode::Consensus,
                configured: self.mode,
            });
        }
        let mut out = ConsensusOutput::default();
        for group in &self.accepted {
            let first = &group.sequences()[0];
            out.consensus
                .push(String::from_utf8_lossy(first.bases()).into_owned());
            out.coverage.push(vec![group.len() as u16; first.len()]);
            out.status.push(Status::Success);
        }
        Ok(out)
    }

    fn msa(&self) -> Result<MsaOutput, EngineError> {
        if !self.generated {
            return Err(EngineError::NotGenerated);
        }
        let mut out = MsaOutput::default();
        for group in &self.accepted {
            out.msa.push(
                group
                    .sequences()
                    .iter()
                    .map(|s| String::from_utf8_lossy(s.bases()).into_owned())
                    .collect(),
            );
            out.status.push(Status::Success);
        }
        Ok(out)
    }

    fn graphs(&self) -> Result<Vec<DirectedGraph>, EngineError> {
        Ok(self.accepted.iter().map(|_| DirectedGraph::new()).collect())
    }

    fn reset(&mut self) {
        self.accepted.clear();
        self.generated = false;
    }

    fn accepted_count(&self) -> usize {
        self.accepted.len()
    }
}

pub struct ScriptedFactory {
    pub script: Script,
    pub counters: Arc<Counters>,
    pub device_available: bool,
    /// Pair index whose batch creation fails
    pub fail_create_at: Option<usize>,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            counters: Arc::new(Counters::default()),
            device_available: true,
            fail_create_at: None,
        }
    }
}

impl BatchFactory for ScriptedFactory {
    type Batch = ScriptedBatch;

    fn open_context(&self, device_id: usize) -> Result<DeviceContext, EngineError> {
        if !self.device_available {
            return Err(EngineError::DeviceUnavailable("scripted".to_string()));
        }
        Ok(DeviceContext {
            device_id,
            name: "scripted".to_string(),
            total_memory: 1 << 30,
            free_memory: 1 << 30,
        })
    }

    fn create_batch(
        &self,
        _ctx: &DeviceContext,
        config: &CapacityConfig,
        _scoring: &ScoringParams,
    ) -> Result<ScriptedBatch, EngineError> {
        let index = self.counters.batches_created.fetch_add(1, Ordering::SeqCst);
        if self.fail_create_at == Some(index) {
            return Err(EngineError::AllocationFailed {
                requested: config.memory_budget,
                available: 0,
            });
        }
        Ok(ScriptedBatch::with_counters(
            self.script.clone(),
            config.output_mode,
            Arc::clone(&self.counters),
        ))
    }
}

/// Configuration that leaves every admission decision to the engine.
pub fn open_config(output_mode: OutputMode) -> CapacityConfig {
    CapacityConfig {
        max_sequence_size: 4096,
        max_consensus_size: 4096,
        max_nodes_per_graph: 1 << 20,
        max_sequences_per_poa: 64,
        max_poas: usize::MAX,
        memory_budget: usize::MAX,
        band_mode: BandMode::Banded { width: 256 },
        output_mode,
    }
}

pub fn scripted_state(script: Script) -> BatchState<ScriptedBatch> {
    let config = open_config(OutputMode::Consensus);
    BatchState::new(0, config, ScriptedBatch::new(script, OutputMode::Consensus))
}

/// `n` small groups.
pub fn small_groups(n: usize) -> Vec<Group> {
    (0..n).map(|i| Group::from_strs(&[format!("ACGT{}", "A".repeat(i % 5))])).collect()
}
