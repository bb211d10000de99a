use std::path::PathBuf;
use std::time::Duration;

use crate::core::compute::ScoringParams;
use crate::core::types::OutputMode;
use crate::defaults;
use crate::pipelines::batched::coordinator::{ExecutionPolicy, RunOptions};
use crate::pipelines::batched::estimator::PlanOptions;

/// Run options for the batched POA pipeline.
#[derive(Debug, Clone)]
pub struct PoaOpt {
    // Input
    pub input: PathBuf,
    pub max_windows: Option<usize>, // Windows to load; None = all

    // Alignment mode
    pub output_mode: OutputMode,
    pub banded: bool,      // Banded (default) or full alignment
    pub band_width: usize, // Band width for banded alignment
    pub size_bins: Vec<usize>,

    // Scoring parameters
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_score: i32,

    // Device parameters
    pub device_id: usize,
    pub memory_mb: usize,       // Memory reported by the host backend
    pub memory_fraction: f64,   // Share of free memory used for batches
    pub timeout: Option<Duration>,
    pub n_threads: usize,       // >1 runs pairs in parallel

    // Output
    pub print: bool,
    pub print_graph: bool,
    pub verbosity: i32, // 1=error, 2=warning, 3=message, 4=debug, 5+=trace
}

impl Default for PoaOpt {
    fn default() -> Self {
        PoaOpt {
            input: PathBuf::new(),
            max_windows: None,

            output_mode: OutputMode::Consensus,
            banded: true,
            band_width: defaults::BAND_WIDTH,
            size_bins: defaults::SIZE_BINS.to_vec(),

            match_score: defaults::MATCH_SCORE,
            mismatch_score: defaults::MISMATCH_SCORE,
            gap_score: defaults::GAP_SCORE,

            device_id: defaults::DEVICE_ID,
            memory_mb: defaults::HOST_MEMORY_MB,
            memory_fraction: defaults::MEMORY_FRACTION,
            timeout: None,
            n_threads: 1,

            print: false,
            print_graph: false,
            verbosity: defaults::VERBOSITY,
        }
    }
}

impl PoaOpt {
    // ========================================================================
    // PARAMETER BUNDLES
    // ========================================================================

    /// Planner inputs for a per-batch memory budget of `memory_budget` bytes
    pub fn plan_options(&self, memory_budget: usize) -> PlanOptions {
        PlanOptions {
            banded: self.banded,
            band_width: self.band_width,
            output_mode: self.output_mode,
            memory_budget,
            size_bins: self.size_bins.clone(),
        }
    }

    pub fn scoring_params(&self) -> ScoringParams {
        ScoringParams {
            match_score: self.match_score,
            mismatch_score: self.mismatch_score,
            gap_score: self.gap_score,
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            device_id: self.device_id,
            memory_fraction: self.memory_fraction,
            timeout: self.timeout,
            print_graph: self.print_graph,
            policy: ExecutionPolicy::from_threads(self.n_threads),
        }
    }

    /// Host backend memory in bytes
    pub fn memory_bytes(&self) -> usize {
        self.memory_mb.saturating_mul(1024 * 1024)
    }

    /// Validate parameters for consistency.
    /// Returns Ok(()) if valid, or Err listing every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.banded && self.band_width < 1 {
            errors.push(format!("band_width must be >= 1, got {}", self.band_width));
        }
        if self.size_bins.is_empty() {
            errors.push("size_bins must not be empty".to_string());
        }
        if self.size_bins.contains(&0) {
            errors.push("size_bins must be > 0".to_string());
        }
        if !self.size_bins.windows(2).all(|w| w[0] < w[1]) {
            errors.push(format!(
                "size_bins must be strictly ascending, got {:?}",
                self.size_bins
            ));
        }

        if self.match_score < 0 {
            errors.push(format!("match_score must be >= 0, got {}", self.match_score));
        }
        if self.mismatch_score > 0 {
            errors.push(format!(
                "mismatch_score must be <= 0, got {}",
                self.mismatch_score
            ));
        }
        if self.gap_score > 0 {
            errors.push(format!("gap_score must be <= 0, got {}", self.gap_score));
        }

        if self.memory_mb < 1 {
            errors.push(format!("memory_mb must be >= 1, got {}", self.memory_mb));
        }
        if !(self.memory_fraction > 0.0 && self.memory_fraction <= 1.0) {
            errors.push(format!(
                "memory_fraction must be in (0, 1], got {}",
                self.memory_fraction
            ));
        }
        if self.timeout == Some(Duration::ZERO) {
            errors.push("timeout must be > 0 seconds".to_string());
        }
        if self.n_threads < 1 {
            errors.push(format!("threads must be >= 1, got {}", self.n_threads));
        }
        if self.max_windows == Some(0) {
            errors.push("max_windows must be >= 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
