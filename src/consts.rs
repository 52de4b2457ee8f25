//! Crate-level constants.

/// Default number of passes (full set-up/run/checksum/tear-down cycles) per kernel variant.
pub const PASSES: usize = 1;

/// Default relative tolerance for cross-variant checksum agreement.
pub const CHECKSUM_TOLERANCE: f64 = 1e-6;

/// Period of the index weights used by [`crate::data::checksum`].
pub const CHECKSUM_MODULUS: usize = 1000;

/// Scale factor applied to every term of [`crate::data::checksum`].
pub const CHECKSUM_SCALE: f64 = 1.0;

/// Seed for the integer data generator.
pub const INT_DATA_SEED: u64 = 4793;

/// Number of elements processed per chunk by the lane-based host sweep.
pub const SIMD_LANES: usize = 8;

/// Thread block (work-group) size used for explicitly configured device launches.
pub const BLOCK_SIZE: usize = 256;

/// Upper bound on the number of blocks of a device reduction; each block folds a grid-strided
/// share of the domain into one partial result.
pub const MAX_REDUCTION_BLOCKS: usize = 1024;
