//! Host (CPU) compute backend.
//!
//! Always available. Enforces every `CapacityConfig` limit the way a device
//! engine would, so the scheduler sees the same overflow and drop signals,
//! and produces a backbone consensus: the first kept sequence fixes the
//! columns, each column takes the weighted majority base of the sequences
//! covering it, and coverage counts the sequences agreeing with that base.

use std::time::{Duration, Instant};

use super::{
    AddOutcome, BatchFactory, CapacityConfig, ComputeBatch, ConsensusOutput, DeviceContext,
    EngineError, MsaOutput, ScoringParams,
};
use crate::core::graph::DirectedGraph;
use crate::core::types::{Group, OutputMode, Status};

const GAP: char = '-';

/// Factory for [`HostBatch`]es on the single host "device" 0.
#[derive(Debug, Clone)]
pub struct HostBatchFactory {
    memory_bytes: usize,
}

impl HostBatchFactory {
    /// `memory_bytes` is reported as the device's free memory.
    pub fn new(memory_bytes: usize) -> Self {
        Self { memory_bytes }
    }
}

impl BatchFactory for HostBatchFactory {
    type Batch = HostBatch;

    fn open_context(&self, device_id: usize) -> Result<DeviceContext, EngineError> {
        if device_id != 0 {
            return Err(EngineError::DeviceUnavailable(format!(
                "host backend has a single device 0, requested device {}",
                device_id
            )));
        }
        if self.memory_bytes == 0 {
            return Err(EngineError::DeviceUnavailable(
                "host backend configured with 0 bytes of memory".to_string(),
            ));
        }
        Ok(DeviceContext {
            device_id,
            name: "host".to_string(),
            total_memory: self.memory_bytes,
            free_memory: self.memory_bytes,
        })
    }

    fn create_batch(
        &self,
        ctx: &DeviceContext,
        config: &CapacityConfig,
        scoring: &ScoringParams,
    ) -> Result<HostBatch, EngineError> {
        if config.memory_budget > ctx.free_memory {
            return Err(EngineError::AllocationFailed {
                requested: config.memory_budget,
                available: ctx.free_memory,
            });
        }
        log::debug!(
            "HostBatch: {} (match={}, mismatch={}, gap={})",
            config,
            scoring.match_score,
            scoring.mismatch_score,
            scoring.gap_score
        );
        Ok(HostBatch::new(config.clone(), *scoring))
    }
}

/// Copy of an accepted group's kept sequences.
#[derive(Debug, Clone)]
struct BufferedGroup {
    sequences: Vec<Vec<u8>>,
    weights: Vec<Option<Vec<u8>>>,
}

impl BufferedGroup {
    fn weight_at(&self, seq: usize, pos: usize) -> u32 {
        match &self.weights[seq] {
            Some(w) => w.get(pos).map(|&x| x as u32).unwrap_or(0),
            None => 1,
        }
    }
}

#[derive(Debug, Clone)]
struct HostPoa {
    status: Status,
    consensus: String,
    coverage: Vec<u16>,
    msa: Vec<String>,
    graph: DirectedGraph,
}

/// CPU implementation of [`ComputeBatch`].
#[derive(Debug)]
pub struct HostBatch {
    config: CapacityConfig,
    scoring: ScoringParams,
    groups: Vec<BufferedGroup>,
    results: Option<Vec<HostPoa>>,
}

impl HostBatch {
    pub fn new(config: CapacityConfig, scoring: ScoringParams) -> Self {
        Self {
            groups: Vec::with_capacity(config.max_poas.min(1024)),
            config,
            scoring,
            results: None,
        }
    }

    pub fn config(&self) -> &CapacityConfig {
        &self.config
    }

    pub fn scoring(&self) -> &ScoringParams {
        &self.scoring
    }

    fn check_mode(&self, requested: OutputMode) -> Result<&[HostPoa], EngineError> {
        if self.config.output_mode != requested {
            return Err(EngineError::WrongOutputMode {
                requested,
                configured: self.config.output_mode,
            });
        }
        self.results.as_deref().ok_or(EngineError::NotGenerated)
    }
}

impl ComputeBatch for HostBatch {
    fn add_group(&mut self, group: &Group) -> AddOutcome {
        if self.groups.len() >= self.config.max_poas {
            return AddOutcome::BatchFull;
        }
        if group.is_empty() {
            return AddOutcome::Rejected {
                status: Status::OtherAddFailure,
                sequence_status: Vec::new(),
            };
        }

        let mut sequence_status = Vec::with_capacity(group.len());
        let mut kept = BufferedGroup {
            sequences: Vec::new(),
            weights: Vec::new(),
        };
        let mut any_oversize = false;

        for (idx, seq) in group.sequences().iter().enumerate() {
            let status = if idx >= self.config.max_sequences_per_poa || seq.is_empty() {
                Status::OtherAddFailure
            } else if seq.len() > self.config.max_sequence_size {
                any_oversize = true;
                Status::ExceededMaximumSequenceSize
            } else {
                Status::Success
            };
            if status.is_success() {
                kept.sequences.push(seq.bases().to_vec());
                kept.weights.push(seq.weights().map(<[u8]>::to_vec));
            }
            sequence_status.push(status);
        }

        if kept.sequences.is_empty() {
            let status = if any_oversize {
                Status::ExceededMaximumSequenceSize
            } else {
                Status::OtherAddFailure
            };
            return AddOutcome::Rejected {
                status,
                sequence_status,
            };
        }

        self.groups.push(kept);
        self.results = None;
        AddOutcome::Accepted { sequence_status }
    }

    fn generate(&mut self, timeout: Option<Duration>) -> Result<(), EngineError> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(self.groups.len());

        for group in &self.groups {
            results.push(backbone_poa(group, &self.config));
            if let Some(limit) = timeout {
                if start.elapsed() >= limit {
                    return Err(EngineError::Timeout(limit));
                }
            }
        }

        self.results = Some(results);
        Ok(())
    }

    fn consensus(&self) -> Result<ConsensusOutput, EngineError> {
        let results = self.check_mode(OutputMode::Consensus)?;
        let mut out = ConsensusOutput::default();
        for poa in results {
            out.consensus.push(poa.consensus.clone());
            out.coverage.push(poa.coverage.clone());
            out.status.push(poa.status);
        }
        Ok(out)
    }

    fn msa(&self) -> Result<MsaOutput, EngineError> {
        let results = self.check_mode(OutputMode::Msa)?;
        let mut out = MsaOutput::default();
        for poa in results {
            out.msa.push(poa.msa.clone());
            out.status.push(poa.status);
        }
        Ok(out)
    }

    fn graphs(&self) -> Result<Vec<DirectedGraph>, EngineError> {
        let results = self.results.as_deref().ok_or(EngineError::NotGenerated)?;
        Ok(results.iter().map(|poa| poa.graph.clone()).collect())
    }

    fn reset(&mut self) {
        self.groups.clear();
        self.results = None;
    }

    fn accepted_count(&self) -> usize {
        self.groups.len()
    }
}

fn backbone_poa(group: &BufferedGroup, config: &CapacityConfig) -> HostPoa {
    // Kept groups always hold at least one sequence
    let backbone = &group.sequences[0];
    // The graph is a chain over the backbone columns
    if backbone.len() > config.max_nodes_per_graph {
        return HostPoa {
            status: Status::OtherAddFailure,
            consensus: String::new(),
            coverage: Vec::new(),
            msa: Vec::new(),
            graph: DirectedGraph::new(),
        };
    }

    let mut consensus = Vec::with_capacity(backbone.len());
    let mut coverage = Vec::with_capacity(backbone.len());

    for (col, &backbone_base) in backbone.iter().enumerate() {
        let mut votes = [0u32; 256];
        for (s, seq) in group.sequences.iter().enumerate() {
            if let Some(&b) = seq.get(col) {
                votes[b as usize] += group.weight_at(s, col);
            }
        }
        let mut best = backbone_base;
        for (b, &v) in votes.iter().enumerate() {
            if v > votes[best as usize] {
                best = b as u8;
            }
        }
        let agree = group
            .sequences
            .iter()
            .filter(|seq| seq.get(col) == Some(&best))
            .count();
        consensus.push(best);
        coverage.push(agree.min(u16::MAX as usize) as u16);
    }

    let consensus_len = consensus.len().min(config.max_consensus_size);
    consensus.truncate(consensus_len);
    coverage.truncate(consensus_len);

    let msa_width = group.sequences.iter().map(Vec::len).max().unwrap_or(0);
    let msa = group
        .sequences
        .iter()
        .map(|seq| {
            let mut row = String::from_utf8_lossy(seq).into_owned();
            row.extend(std::iter::repeat(GAP).take(msa_width - seq.len()));
            row
        })
        .collect();

    let mut graph = DirectedGraph::new();
    let mut prev: Option<usize> = None;
    for (i, &base) in consensus.iter().enumerate() {
        let node = graph.add_node(base);
        if let Some(p) = prev {
            let weight = coverage[i - 1].min(coverage[i]) as u32;
            graph.add_edge(p, node, weight);
        }
        prev = Some(node);
    }

    HostPoa {
        status: Status::Success,
        consensus: String::from_utf8_lossy(&consensus).into_owned(),
        coverage,
        msa,
        graph,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compute::BandMode;
    use crate::core::types::Sequence;

    fn config(output_mode: OutputMode) -> CapacityConfig {
        CapacityConfig {
            max_sequence_size: 8,
            max_consensus_size: 8,
            max_nodes_per_graph: 64,
            max_sequences_per_poa: 4,
            max_poas: 2,
            memory_budget: 1 << 20,
            band_mode: BandMode::Banded { width: 4 },
            output_mode,
        }
    }

    #[test]
    fn test_open_context_rejects_unknown_device() {
        let factory = HostBatchFactory::new(1 << 20);
        assert!(factory.open_context(0).is_ok());
        assert!(matches!(
            factory.open_context(3),
            Err(EngineError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_create_batch_over_budget_fails() {
        let factory = HostBatchFactory::new(1024);
        let ctx = factory.open_context(0).unwrap();
        let result =
            factory.create_batch(&ctx, &config(OutputMode::Consensus), &ScoringParams::default());
        assert!(matches!(result, Err(EngineError::AllocationFailed { .. })));
    }

    #[test]
    fn test_batch_full_after_max_poas() {
        let mut batch = HostBatch::new(config(OutputMode::Consensus), ScoringParams::default());
        let group = Group::from_strs(&["ACGT"]);
        assert!(batch.add_group(&group).is_accepted());
        assert!(batch.add_group(&group).is_accepted());
        assert_eq!(batch.add_group(&group), AddOutcome::BatchFull);
        assert_eq!(batch.accepted_count(), 2);
    }

    #[test]
    fn test_oversize_sequence_dropped() {
        let mut batch = HostBatch::new(config(OutputMode::Consensus), ScoringParams::default());
        let group = Group::from_strs(&["ACGT", "ACGTACGTACGT"]);
        let outcome = batch.add_group(&group);
        assert_eq!(
            outcome,
            AddOutcome::Accepted {
                sequence_status: vec![Status::Success, Status::ExceededMaximumSequenceSize]
            }
        );

        batch.generate(None).unwrap();
        let out = batch.consensus().unwrap();
        assert_eq!(out.consensus, vec!["ACGT".to_string()]);
        assert_eq!(out.coverage, vec![vec![1, 1, 1, 1]]);
    }

    #[test]
    fn test_all_sequences_oversize_rejected() {
        let mut batch = HostBatch::new(config(OutputMode::Consensus), ScoringParams::default());
        let group = Group::from_strs(&["ACGTACGTACGT"]);
        match batch.add_group(&group) {
            AddOutcome::Rejected { status, .. } => {
                assert_eq!(status, Status::ExceededMaximumSequenceSize)
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(batch.accepted_count(), 0);
    }

    #[test]
    fn test_majority_consensus_and_coverage() {
        let mut batch = HostBatch::new(config(OutputMode::Consensus), ScoringParams::default());
        let group = Group::from_strs(&["ACGT", "ACCT", "ACCT"]);
        assert!(batch.add_group(&group).is_accepted());
        batch.generate(None).unwrap();
        let out = batch.consensus().unwrap();
        assert_eq!(out.consensus[0], "ACCT");
        assert_eq!(out.coverage[0], vec![3, 3, 2, 3]);
        assert_eq!(out.status, vec![Status::Success]);
    }

    #[test]
    fn test_weights_override_majority() {
        let mut batch = HostBatch::new(config(OutputMode::Consensus), ScoringParams::default());
        let group = Group::from_sequences(vec![
            Sequence::with_weights(b"AG".to_vec(), vec![1, 9]).unwrap(),
            Sequence::with_weights(b"AC".to_vec(), vec![1, 2]).unwrap(),
            Sequence::with_weights(b"AC".to_vec(), vec![1, 2]).unwrap(),
        ]);
        assert!(batch.add_group(&group).is_accepted());
        batch.generate(None).unwrap();
        assert_eq!(batch.consensus().unwrap().consensus[0], "AG");
    }

    #[test]
    fn test_msa_rows_padded() {
        let mut batch = HostBatch::new(config(OutputMode::Msa), ScoringParams::default());
        assert!(batch.add_group(&Group::from_strs(&["ACGT", "AC"])).is_accepted());
        batch.generate(None).unwrap();
        let out = batch.msa().unwrap();
        assert_eq!(out.msa, vec![vec!["ACGT".to_string(), "AC--".to_string()]]);
        assert!(matches!(
            batch.consensus(),
            Err(EngineError::WrongOutputMode { .. })
        ));
    }

    #[test]
    fn test_results_require_generate() {
        let mut batch = HostBatch::new(config(OutputMode::Consensus), ScoringParams::default());
        assert!(batch.add_group(&Group::from_strs(&["ACGT"])).is_accepted());
        assert_eq!(batch.consensus(), Err(EngineError::NotGenerated));
        assert_eq!(batch.graphs(), Err(EngineError::NotGenerated));
    }

    #[test]
    fn test_zero_timeout_expires() {
        let mut batch = HostBatch::new(config(OutputMode::Consensus), ScoringParams::default());
        assert!(batch.add_group(&Group::from_strs(&["ACGT"])).is_accepted());
        assert_eq!(
            batch.generate(Some(Duration::ZERO)),
            Err(EngineError::Timeout(Duration::ZERO))
        );
    }

    #[test]
    fn test_node_limit_fails_group_only() {
        let mut cfg = config(OutputMode::Consensus);
        cfg.max_nodes_per_graph = 3;
        let mut batch = HostBatch::new(cfg, ScoringParams::default());
        assert!(batch.add_group(&Group::from_strs(&["ACGT"])).is_accepted());
        assert!(batch.add_group(&Group::from_strs(&["ACG", "ACG", "ACG"])).is_accepted());
        batch.generate(None).unwrap();
        let out = batch.consensus().unwrap();
        assert_eq!(out.status, vec![Status::OtherAddFailure, Status::Success]);
        assert_eq!(out.consensus[1], "ACG");
    }

    #[test]
    fn test_deep_group_within_node_limit_succeeds() {
        // Eight full-length reads hold far more bases than graph nodes
        let mut cfg = config(OutputMode::Consensus);
        cfg.max_sequences_per_poa = 8;
        cfg.max_nodes_per_graph = cfg.max_sequence_size * 3;
        let reads: Vec<&str> = (0..8).map(|_| "ACGTACGT").collect();
        let mut batch = HostBatch::new(cfg, ScoringParams::default());
        assert!(batch.add_group(&Group::from_strs(&reads)).is_accepted());
        batch.generate(None).unwrap();
        let out = batch.consensus().unwrap();
        assert_eq!(out.status, vec![Status::Success]);
        assert_eq!(out.consensus[0], "ACGTACGT");
        assert_eq!(out.coverage[0], vec![8; 8]);
    }

    #[test]
    fn test_graph_is_linear_chain() {
        let mut batch = HostBatch::new(config(OutputMode::Consensus), ScoringParams::default());
        assert!(batch.add_group(&Group::from_strs(&["ACG", "ACG"])).is_accepted());
        batch.generate(None).unwrap();
        let graphs = batch.graphs().unwrap();
        assert_eq!(graphs.len(), 1);
        assert_eq!(graphs[0].nodes().len(), 3);
        assert_eq!(graphs[0].edges().len(), 2);
        assert_eq!(graphs[0].edges()[0].weight, 2);
    }

    #[test]
    fn test_reset_clears_batch() {
        let mut batch = HostBatch::new(config(OutputMode::Consensus), ScoringParams::default());
        assert!(batch.add_group(&Group::from_strs(&["ACGT"])).is_accepted());
        batch.generate(None).unwrap();
        batch.reset();
        assert_eq!(batch.accepted_count(), 0);
        assert_eq!(batch.consensus(), Err(EngineError::NotGenerated));
    }
}
