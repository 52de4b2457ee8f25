//! Performance report related structures and functions.
//!
//! This module defines the data structures needed to generate performance reports out of the
//! recorded execution times and checksums of the benchmarked kernel variants.

use crate::{
    data::relative_diff,
    kernels::{KernelBase, KernelId},
    variant::VariantId,
};

use statistical::{mean, standard_deviation};

use std::{fmt, io::Write};

/// Enum defining the target of a kernel variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    Host,
    Device,
}

impl From<VariantId> for TargetKind {
    fn from(variant: VariantId) -> Self {
        if variant.is_device_resident() {
            Self::Device
        } else {
            Self::Host
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Device => write!(f, "device"),
        }
    }
}

/// Outcome of a kernel variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Checksum within tolerance of the reference variant.
    Passed,
    /// Checksum outside tolerance of the reference variant.
    Failed,
    /// Variant not supported in this build.
    Skipped,
    /// Variant abandoned after a fatal error.
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Performance information and statistics of a kernel variant.
#[derive(Clone, Debug)]
pub struct PerfReport {
    /// Target platform: either `Host` or `Device`.
    target: TargetKind,
    kernel: KernelId,
    variant: VariantId,
    /// Problem size.
    run_size: usize,
    /// Repetitions per pass.
    reps: usize,
    /// Number of recorded passes.
    passes: usize,
    /// Bytes moved per repetition.
    nb_bytes: usize,
    /// Floating-point operations per repetition.
    nb_flops: usize,
    /// Minimum pass runtime in milliseconds.
    min_time: f64,
    /// Median pass runtime in milliseconds.
    median_time: f64,
    /// Maximum pass runtime in milliseconds.
    max_time: f64,
    /// Average pass runtime in milliseconds.
    avg_time: f64,
    /// Pass runtime standard deviation in milliseconds (zero with fewer than two passes).
    stddev_time: f64,
    /// Arithmetic intensity in FLOPs/byte.
    arithmetic_intensity: f64,
    /// Memory bandwidth in GiB/s.
    memory_bandwidth: f64,
    /// Computational performance in GFLOP/s.
    computational_performance: f64,
    /// Cumulative checksum over all passes.
    checksum: Option<f64>,
    /// Relative difference to the reference variant's checksum.
    checksum_diff: Option<f64>,
    status: Status,
}

impl PerfReport {
    pub fn print_csv_header(output: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            output,
            "target,kernel,variant,run_size,reps,passes,Bytes/rep,FLOPs/rep,min_runtime,median_runtime,max_runtime,avg_runtime,stddev,FLOPs/Byte,GiB/s,GFLOP/s,checksum,checksum_diff,status"
        )
    }

    /// Creates a new `PerfReport` from the bookkeeping of a kernel after its passes of `variant`.
    ///
    /// The status is provisional ([`Status::Passed`]) until [`PerfReport::compare`] runs.
    pub fn new(base: &KernelBase, variant: VariantId) -> Self {
        let mut report = Self::empty(base, variant, Status::Passed);

        let mut durations = base.samples(variant).to_vec();
        if durations.is_empty() {
            return report;
        }
        durations.sort_by(f64::total_cmp);

        let avg_time = mean(&durations);
        report.passes = durations.len();
        report.min_time = durations[0] * 1e3;
        report.median_time = durations[durations.len() / 2] * 1e3;
        report.max_time = durations[durations.len() - 1] * 1e3;
        report.avg_time = avg_time * 1e3;
        if durations.len() > 1 {
            report.stddev_time = standard_deviation(&durations, Some(avg_time)) * 1e3;
        }

        if report.nb_bytes > 0 {
            report.arithmetic_intensity = report.nb_flops as f64 / report.nb_bytes as f64;
        }
        if report.reps > 0 && avg_time > 0.0 {
            let rep_time = avg_time / report.reps as f64;
            report.memory_bandwidth = report.nb_bytes as f64 / 1024_f64.powi(3) / rep_time;
            report.computational_performance =
                report.nb_flops as f64 / (1024_f64.powi(3) * rep_time);
        }
        report.checksum = base.checksum(variant);
        report
    }

    /// Report of a variant that is not supported in this build.
    pub fn skipped(base: &KernelBase, variant: VariantId) -> Self {
        Self::empty(base, variant, Status::Skipped)
    }

    /// Report of a variant abandoned after a fatal error.
    pub fn failed(base: &KernelBase, variant: VariantId) -> Self {
        Self::empty(base, variant, Status::Error)
    }

    fn empty(base: &KernelBase, variant: VariantId, status: Status) -> Self {
        Self {
            target: variant.into(),
            kernel: base.id(),
            variant,
            run_size: base.run_size(),
            reps: base.run_reps(),
            passes: 0,
            nb_bytes: base.bytes_per_rep(),
            nb_flops: base.flops_per_rep(),
            min_time: 0.0,
            median_time: 0.0,
            max_time: 0.0,
            avg_time: 0.0,
            stddev_time: 0.0,
            arithmetic_intensity: 0.0,
            memory_bandwidth: 0.0,
            computational_performance: 0.0,
            checksum: None,
            checksum_diff: None,
            status,
        }
    }

    /// Compares the checksum against `reference`. Reports without a checksum are left as is.
    pub fn compare(&mut self, reference: f64, tolerance: f64) {
        let Some(checksum) = self.checksum else {
            return;
        };
        let diff = relative_diff(checksum, reference);
        self.checksum_diff = Some(diff);
        self.status = if diff <= tolerance {
            Status::Passed
        } else {
            Status::Failed
        };
    }

    pub fn variant(&self) -> VariantId {
        self.variant
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn checksum(&self) -> Option<f64> {
        self.checksum
    }

    pub fn checksum_diff(&self) -> Option<f64> {
        self.checksum_diff
    }

    pub fn passes(&self) -> usize {
        self.passes
    }
}

/// Writes `value` or an empty CSV cell.
struct Cell(Option<f64>);

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v:.15e}"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for PerfReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{},{:18.15},{:18.15},{:18.15},{:18.15},{},{},{},{},{},{},{}",
            self.target,
            self.kernel,
            self.variant,
            self.run_size,
            self.reps,
            self.passes,
            self.nb_bytes,
            self.nb_flops,
            self.min_time,
            self.median_time,
            self.max_time,
            self.avg_time,
            self.stddev_time,
            self.arithmetic_intensity,
            self.memory_bandwidth,
            self.computational_performance,
            Cell(self.checksum),
            Cell(self.checksum_diff),
            self.status,
        )
    }
}
