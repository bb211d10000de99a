//! Result harvesting after compute.
//!
//! Engine output vectors are zipped against the batch's buffered ids, so
//! result order is submission order within the flush. A failed group only
//! affects its own entry; a failed batch marks every buffered group failed
//! and surfaces the engine error as a warning.

use crate::core::compute::{ComputeBatch, EngineError};
use crate::core::graph::DirectedGraph;
use crate::core::types::{GroupId, OutputMode, Status};

use super::batch_state::BatchState;
use super::sink::{GroupOutput, GroupResult, HarvestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultHarvester {
    mode: OutputMode,
}

impl ResultHarvester {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Collect per-group results from a computed batch.
    pub fn harvest<B: ComputeBatch>(
        &self,
        batch: &BatchState<B>,
    ) -> (Vec<GroupResult>, Option<EngineError>) {
        let ids = batch.buffered();
        let outputs = match self.mode {
            OutputMode::Consensus => batch.handle().consensus().map(|out| {
                out.consensus
                    .into_iter()
                    .zip(out.coverage)
                    .zip(out.status)
                    .map(|((sequence, coverage), status)| {
                        (GroupOutput::Consensus { sequence, coverage }, status)
                    })
                    .collect::<Vec<_>>()
            }),
            OutputMode::Msa => batch.handle().msa().map(|out| {
                out.msa
                    .into_iter()
                    .zip(out.status)
                    .map(|(alignments, status)| (GroupOutput::Msa { alignments }, status))
                    .collect::<Vec<_>>()
            }),
        };

        match outputs {
            Ok(outputs) => (zip_outputs(batch.batch_index(), ids, outputs), None),
            Err(err) => {
                log::warn!(
                    "Could not generate {} for batch {}: {}",
                    self.mode,
                    batch.batch_index(),
                    err
                );
                (fail_all(ids, &err.to_string()), Some(err))
            }
        }
    }

    /// Fetch graphs for `--print-graph`. Failures are logged and yield none.
    pub fn graphs<B: ComputeBatch>(&self, batch: &BatchState<B>) -> Vec<DirectedGraph> {
        match batch.handle().graphs() {
            Ok(graphs) => graphs,
            Err(err) => {
                log::warn!(
                    "Could not fetch graphs for batch {}: {}",
                    batch.batch_index(),
                    err
                );
                Vec::new()
            }
        }
    }
}

fn zip_outputs(
    batch_index: usize,
    ids: &[GroupId],
    outputs: Vec<(GroupOutput, Status)>,
) -> Vec<GroupResult> {
    if outputs.len() != ids.len() {
        log::warn!(
            "Engine returned {} outputs for {} buffered groups in batch {}",
            outputs.len(),
            ids.len(),
            batch_index
        );
    }

    let mut outputs = outputs.into_iter();
    ids.iter()
        .map(|&group_id| {
            let outcome = match outputs.next() {
                Some((output, Status::Success)) => Ok(output),
                Some((_, status)) => {
                    log::warn!(
                        "Error generating output for POA group {} in batch {}. Error type {}",
                        group_id,
                        batch_index,
                        status
                    );
                    Err(HarvestError::Engine(status))
                }
                None => Err(HarvestError::Batch("no output returned".to_string())),
            };
            GroupResult { group_id, outcome }
        })
        .collect()
}

/// Mark every id failed with the same batch-level reason.
pub fn fail_all(ids: &[GroupId], reason: &str) -> Vec<GroupResult> {
    ids.iter()
        .map(|&group_id| GroupResult {
            group_id,
            outcome: Err(HarvestError::Batch(reason.to_string())),
        })
        .collect()
}
