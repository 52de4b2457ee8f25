//! Run parameters shared by every kernel of a suite run.

use crate::consts;

use clap::ValueEnum;

use std::fmt;

/// Problem size class, used by kernels whose dimensions come from a fixed table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum SizeSpec {
    Mini,
    Small,
    #[default]
    Medium,
    Large,
    #[value(name = "extralarge", alias = "extra-large")]
    ExtraLarge,
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mini => write!(f, "mini"),
            Self::Small => write!(f, "small"),
            Self::Medium => write!(f, "medium"),
            Self::Large => write!(f, "large"),
            Self::ExtraLarge => write!(f, "extralarge"),
        }
    }
}

/// Immutable per-run configuration.
///
/// Built once before any kernel runs. Kernels fall back to their own defaults for `size` and
/// `reps` when those are not overridden.
#[derive(Clone, Debug, PartialEq)]
pub struct RunParams {
    /// Problem size override.
    pub size: Option<usize>,
    /// Repetition count override.
    pub reps: Option<usize>,
    /// Size class for table-driven kernels.
    pub size_spec: SizeSpec,
    /// Number of full executions of each kernel variant.
    pub passes: usize,
    /// Relative tolerance for cross-variant checksum agreement.
    pub tolerance: f64,
    /// Seed for the integer data generator.
    pub seed: u64,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            size: None,
            reps: None,
            size_spec: SizeSpec::default(),
            passes: consts::PASSES,
            tolerance: consts::CHECKSUM_TOLERANCE,
            seed: consts::INT_DATA_SEED,
        }
    }
}

impl RunParams {
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_reps(mut self, reps: usize) -> Self {
        self.reps = Some(reps);
        self
    }

    pub fn with_size_spec(mut self, size_spec: SizeSpec) -> Self {
        self.size_spec = size_spec;
        self
    }

    pub fn with_passes(mut self, passes: usize) -> Self {
        self.passes = passes.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_do_not_override_kernels() {
        let params = RunParams::default();
        assert_eq!(params.size, None);
        assert_eq!(params.reps, None);
        assert_eq!(params.size_spec, SizeSpec::Medium);
        assert_eq!(params.passes, 1);
    }

    #[test]
    fn builders_set_overrides() {
        let params = RunParams::default()
            .with_size(64)
            .with_reps(3)
            .with_size_spec(SizeSpec::Mini)
            .with_passes(0);
        assert_eq!(params.size, Some(64));
        assert_eq!(params.reps, Some(3));
        assert_eq!(params.size_spec, SizeSpec::Mini);
        assert_eq!(params.passes, 1);
    }
}
