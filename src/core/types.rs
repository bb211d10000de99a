//! Workload and status types shared by the planner, driver and engines.
//!
//! A workload is a slice of [`Group`]s. A group's identity is its index in
//! that slice ([`GroupId`]); every status line, skip report and result is
//! keyed by it.

use std::fmt;

use thiserror::Error;

/// Index of a group in the caller's input slice.
pub type GroupId = usize;

/// Errors raised while building sequences.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SequenceError {
    #[error("weight array length {weights} does not match sequence length {bases}")]
    WeightLengthMismatch { bases: usize, weights: usize },
}

/// One input sequence with optional per-base weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    bases: Vec<u8>,
    weights: Option<Vec<u8>>,
}

impl Sequence {
    pub fn new(bases: impl Into<Vec<u8>>) -> Self {
        Self {
            bases: bases.into(),
            weights: None,
        }
    }

    /// Create a weighted sequence. `weights` must have one entry per base.
    pub fn with_weights(
        bases: impl Into<Vec<u8>>,
        weights: impl Into<Vec<u8>>,
    ) -> Result<Self, SequenceError> {
        let bases = bases.into();
        let weights = weights.into();
        if bases.len() != weights.len() {
            return Err(SequenceError::WeightLengthMismatch {
                bases: bases.len(),
                weights: weights.len(),
            });
        }
        Ok(Self {
            bases,
            weights: Some(weights),
        })
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    pub fn weights(&self) -> Option<&[u8]> {
        self.weights.as_deref()
    }

    /// Weight of the base at `pos`; unweighted sequences count 1 per base.
    pub fn weight_at(&self, pos: usize) -> u32 {
        match &self.weights {
            Some(w) => w.get(pos).map(|&x| x as u32).unwrap_or(0),
            None => 1,
        }
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

/// Sequences aligned together as one POA.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    sequences: Vec<Sequence>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sequences(sequences: Vec<Sequence>) -> Self {
        Self { sequences }
    }

    /// Build an unweighted group from raw strings (window file entries).
    pub fn from_strs<S: AsRef<[u8]>>(seqs: &[S]) -> Self {
        Self {
            sequences: seqs.iter().map(|s| Sequence::new(s.as_ref())).collect(),
        }
    }

    pub fn push(&mut self, seq: Sequence) {
        self.sequences.push(seq);
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Length of the longest sequence (0 for an empty group).
    pub fn max_sequence_len(&self) -> usize {
        self.sequences.iter().map(Sequence::len).max().unwrap_or(0)
    }

    pub fn total_bases(&self) -> usize {
        self.sequences.iter().map(Sequence::len).sum()
    }

    pub fn has_weights(&self) -> bool {
        self.sequences.iter().any(|s| s.weights().is_some())
    }
}

/// Outcome of adding a group, or one sequence of a group, to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    /// The batch cannot take another group.
    ExceededMaximumPoas,
    /// The sequence is longer than the batch's `max_sequence_size`.
    ExceededMaximumSequenceSize,
    OtherAddFailure,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Success => "success",
            Status::ExceededMaximumPoas => "exceeded_maximum_poas",
            Status::ExceededMaximumSequenceSize => "exceeded_maximum_sequence_size",
            Status::OtherAddFailure => "other_add_failure",
        };
        f.write_str(name)
    }
}

/// Which result form a batch produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputMode {
    #[default]
    Consensus,
    Msa,
}

impl OutputMode {
    pub fn from_msa_flag(msa: bool) -> Self {
        if msa {
            OutputMode::Msa
        } else {
            OutputMode::Consensus
        }
    }

    pub fn is_msa(self) -> bool {
        self == OutputMode::Msa
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Consensus => f.write_str("consensus"),
            OutputMode::Msa => f.write_str("msa"),
        }
    }
}
