// src/defaults.rs

// Batch sizing
pub const BAND_WIDTH: usize = 256;
pub const SIZE_BINS: [usize; 6] = [256, 512, 1024, 2048, 3072, 4096];
pub const OVERSIZE_BIN_ROUNDING: usize = 256;
pub const NODES_PER_BASE_BANDED: usize = 3;
pub const NODES_PER_BASE_FULL: usize = 4;

// Device memory
pub const MEMORY_FRACTION: f64 = 0.9;
pub const HOST_MEMORY_MB: usize = 2048;
pub const DEVICE_ID: usize = 0;

// Scoring Constants
pub const MATCH_SCORE: i32 = 8;
pub const MISMATCH_SCORE: i32 = -6;
pub const GAP_SCORE: i32 = -8;

// Other Constants
pub const VERBOSITY: i32 = 3;
pub const SHORT_READ_MAX_WINDOWS: usize = 1000;
