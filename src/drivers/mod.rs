//! Suite drivers.
//!
//! This module runs the selected kernels under the selected variants and post-processes the
//! results. It sits on top of the execution strategies: [`host`] sweeps for the sequential and
//! threaded variants, [`device`] sessions for the offload and device variants.
//!
//! # High-level approach for a suite run
//! ## 1. Passes
//! Every (kernel, variant) pair is executed `passes` times. A pass is one full lifecycle
//! (`set_up`, `run_kernel`, `update_checksum`, `tear_down`), and each pass records one timing
//! sample of `reps` repetitions of the kernel body. Checksums accumulate over the passes.
//!
//! ## 2. Failure isolation
//! A variant that is not compiled in still goes through the lifecycle, does no work and is
//! reported as skipped. A variant failing with a fatal error is abandoned and reported as such;
//! the remaining variants and kernels still run.
//!
//! ## 3. Post-processing
//! Checksums of each kernel are compared to a reference variant (`Base_Seq` when it ran,
//! otherwise the first variant that produced a checksum) within a relative tolerance, and the
//! reports are written as CSV to `stdout` or to a file.

pub mod device;
pub mod host;

use crate::{
    error::Result,
    kernels::{Kernel, KernelId},
    params::RunParams,
    perf_report::{PerfReport, Status},
    variant::VariantId,
};

use tracing::{debug, error, info, warn};

use std::{fs::OpenOptions, io::Write, path::Path};

/// Runs every kernel of `kernels` under every variant of `variants` and returns one report per
/// (kernel, variant) pair, in that order.
pub fn run_suite(
    params: &RunParams,
    kernels: &[KernelId],
    variants: &[VariantId],
) -> Vec<PerfReport> {
    let mut reports = Vec::with_capacity(kernels.len() * variants.len());

    for &id in kernels {
        let mut kernel = id.make(params);
        info!(
            kernel = %id,
            size = kernel.base().run_size(),
            reps = kernel.base().run_reps(),
            "running kernel"
        );

        let mut kernel_reports: Vec<_> = variants
            .iter()
            .map(|&variant| run_variant(kernel.as_mut(), variant, params.passes))
            .collect();
        compare_checksums(&mut kernel_reports, params.tolerance);

        for report in kernel_reports.iter().filter(|r| r.status() == Status::Failed) {
            warn!(
                kernel = %id,
                variant = %report.variant(),
                diff = report.checksum_diff(),
                "checksum outside tolerance"
            );
        }
        reports.extend(kernel_reports);
    }

    reports
}

/// Executes `passes` full lifecycles of `variant`.
pub fn run_variant(kernel: &mut dyn Kernel, variant: VariantId, passes: usize) -> PerfReport {
    for pass in 0..passes {
        debug!(kernel = %kernel.id(), %variant, pass, "pass");
        match kernel.execute(variant) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                error!(kernel = %kernel.id(), %variant, pass, "{e}");
                return PerfReport::failed(kernel.base(), variant);
            }
            Err(e) => {
                warn!(kernel = %kernel.id(), %variant, pass, "{e}");
                return PerfReport::skipped(kernel.base(), variant);
            }
        }
    }

    if variant.is_compiled() {
        PerfReport::new(kernel.base(), variant)
    } else {
        PerfReport::skipped(kernel.base(), variant)
    }
}

/// Compares the checksums of one kernel's reports against its reference variant.
pub fn compare_checksums(reports: &mut [PerfReport], tolerance: f64) {
    let reference = reports
        .iter()
        .find(|r| r.variant() == VariantId::BaseSeq && r.checksum().is_some())
        .or_else(|| reports.iter().find(|r| r.checksum().is_some()))
        .and_then(PerfReport::checksum);

    if let Some(reference) = reference {
        for report in reports.iter_mut() {
            report.compare(reference, tolerance);
        }
    }
}

/// Writes the reports as CSV to `output_file`, or to `stdout` if unspecified.
pub fn write_reports(reports: &[PerfReport], output_file: Option<&Path>) -> Result<()> {
    let mut output: Box<dyn Write> = match output_file {
        Some(name) => Box::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(name)?,
        ),
        None => Box::new(std::io::stdout()),
    };

    PerfReport::print_csv_header(&mut output)?;
    for report in reports {
        writeln!(output, "{report}")?;
    }
    output.flush()?;
    Ok(())
}

/// Writes the known kernels (with their defaults under `params`) and variants.
pub fn list(params: &RunParams, output: &mut dyn Write) -> Result<()> {
    writeln!(output, "kernel,group,default_size,default_reps")?;
    for id in KernelId::ALL {
        let kernel = id.make(params);
        writeln!(
            output,
            "{},{},{},{}",
            id,
            id.group(),
            kernel.base().default_size(),
            kernel.base().default_reps()
        )?;
    }

    writeln!(output)?;
    writeln!(output, "variant,backend,compiled")?;
    for variant in VariantId::ALL {
        writeln!(
            output,
            "{},{:?},{}",
            variant,
            variant.backend(),
            variant.is_compiled()
        )?;
    }
    Ok(())
}

/// Number of reports with a failed comparison or a fatal error.
pub fn count_failures(reports: &[PerfReport]) -> usize {
    reports
        .iter()
        .filter(|r| matches!(r.status(), Status::Failed | Status::Error))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::SuiteError, kernels::KernelBase};

    /// Kernel whose runs always fail with a fixed error.
    struct Failing {
        base: KernelBase,
        fatal: bool,
    }

    impl Kernel for Failing {
        fn base(&self) -> &KernelBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut KernelBase {
            &mut self.base
        }

        fn set_up(&mut self, _variant: VariantId) -> Result<()> {
            Ok(())
        }

        fn run_kernel(&mut self, variant: VariantId) -> Result<()> {
            Err(if self.fatal {
                SuiteError::Allocation { len: 1 }
            } else {
                SuiteError::UnsupportedVariant {
                    kernel: self.base.id(),
                    variant,
                }
            })
        }

        fn update_checksum(&mut self, _variant: VariantId) {}

        fn tear_down(&mut self, _variant: VariantId) {}
    }

    fn failing(fatal: bool) -> Failing {
        Failing {
            base: KernelBase::new(KernelId::StreamAdd, &small()),
            fatal,
        }
    }

    fn small() -> RunParams {
        RunParams::default().with_size(512).with_reps(2).with_passes(2)
    }

    #[test]
    fn host_variants_pass_against_base_seq() {
        let variants: Vec<_> = VariantId::compiled()
            .filter(|v| !v.is_device_resident())
            .collect();
        let kernels = [KernelId::StreamAdd, KernelId::BasicTrapInt];
        let reports = run_suite(&small(), &kernels, &variants);
        assert_eq!(reports.len(), 2 * variants.len());
        for report in &reports {
            assert_eq!(report.status(), Status::Passed, "{report}");
            assert_eq!(report.passes(), 2);
        }
        assert_eq!(count_failures(&reports), 0);
    }

    #[test]
    fn reference_falls_back_to_first_checksum() {
        let reports = run_suite(
            &small(),
            &[KernelId::AppsFir],
            &[VariantId::PortableThreaded, VariantId::PortableSeq],
        );
        assert_eq!(reports[0].checksum_diff(), Some(0.0));
        assert_eq!(reports[1].status(), Status::Passed);
    }

    #[cfg(not(feature = "opencl"))]
    #[test]
    fn uncompiled_variants_are_skipped() {
        let reports = run_suite(
            &small(),
            &[KernelId::AppsPressure],
            &[VariantId::BaseOffload, VariantId::BaseSeq],
        );
        assert_eq!(reports[0].status(), Status::Skipped);
        assert_eq!(reports[0].checksum(), None);
        assert_eq!(reports[1].status(), Status::Passed);
    }

    #[test]
    fn only_fatal_errors_are_reported_as_errors() {
        let report = run_variant(&mut failing(false), VariantId::BaseSeq, 2);
        assert_eq!(report.status(), Status::Skipped);
        assert_eq!(count_failures(&[report]), 0);

        let report = run_variant(&mut failing(true), VariantId::BaseSeq, 2);
        assert_eq!(report.status(), Status::Error);
        assert_eq!(count_failures(&[report]), 1);
    }

    #[test]
    fn listing_names_every_kernel_and_variant() {
        let mut out = Vec::new();
        list(&RunParams::default(), &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        for id in KernelId::ALL {
            assert!(out.contains(&id.to_string()));
        }
        assert!(out.contains("Stream_ADD,Stream,1000000,800"));
        assert!(out.contains("Base_Seq,Sequential,true"));
    }
}
