//! Command-Line Interface related code.
//!
//! This module handles the parsing of CLI arguments using the [`clap`][1] crate.
//! It defines the available runtime options and subcommands.
//!
//! [1]: https://crates.io/crates/clap

use crate::{
    consts,
    kernels::KernelId,
    params::{RunParams, SizeSpec},
    variant::VariantId,
};

use clap::{Args, Parser, Subcommand};

use std::path::PathBuf;

/// Performance suite of small numeric kernels.
///
/// Runs stream, stencil, reduction and matrix kernels under sequential, multi-threaded, offload
/// and device variants, and compares the checksums of every variant against a reference.
#[derive(Clone, Debug, Parser)]
#[command(name = "kperf", version)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Run kernels and print a CSV performance report.
    Run(RunArgs),
    /// List the available kernels and variants.
    List {
        /// Size class used to derive the defaults of table-driven kernels.
        #[arg(long, value_enum, default_value_t)]
        size_spec: SizeSpec,
    },
}

#[derive(Clone, Debug, PartialEq, Args)]
pub struct RunArgs {
    /// Number of passes (full set-up/run/tear-down cycles) per kernel variant.
    #[arg(
        short,
        long,
        value_name = "PASSES",
        default_value_t = consts::PASSES as u16,
        value_parser = clap::value_parser!(u16).range(1..),
    )]
    pub passes: u16,

    /// Problem size, overriding each kernel's default.
    #[arg(long, value_name = "SIZE")]
    pub size: Option<usize>,

    /// Repetitions per pass, overriding each kernel's default.
    #[arg(short, long, value_name = "REPS")]
    pub reps: Option<usize>,

    /// Size class for table-driven kernels.
    #[arg(long, value_enum, default_value_t)]
    pub size_spec: SizeSpec,

    /// Kernels to run: full names (`Stream_ADD`), short names (`ADD`) or groups (`Apps`).
    /// Defaults to every kernel.
    #[arg(short, long, value_name = "KERNEL", num_args = 1..)]
    pub kernels: Vec<String>,

    /// Variants to run (`Base_Seq`, `Portable_Threaded`, ...). Defaults to every variant.
    /// Unknown names are reported and skipped.
    #[arg(short, long, value_name = "VARIANT", num_args = 1..)]
    pub variants: Vec<String>,

    /// Relative tolerance for checksum agreement with the reference variant.
    #[arg(long, value_name = "TOL", default_value_t = consts::CHECKSUM_TOLERANCE)]
    pub tolerance: f64,

    /// Seed for the integer data generator.
    #[arg(short, long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Output file, defaults to `stdout` if unspecified.
    #[arg(short, long)]
    pub output_file: Option<PathBuf>,
}

impl RunArgs {
    /// Run parameters described by the arguments.
    pub fn params(&self) -> RunParams {
        let mut params = RunParams::default()
            .with_size_spec(self.size_spec)
            .with_passes(self.passes.into());
        params.size = self.size;
        params.reps = self.reps;
        params.tolerance = self.tolerance;
        if let Some(seed) = self.seed {
            params.seed = seed;
        }
        params
    }

    /// Selected kernels, in suite order.
    pub fn kernels(&self) -> Vec<KernelId> {
        KernelId::select(&self.kernels)
    }

    /// Selected variants, in reporting order and without duplicates.
    pub fn variants(&self) -> Vec<VariantId> {
        VariantId::select(&self.variants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    fn run_args(args: &[&str]) -> RunArgs {
        let cli = CliArgs::try_parse_from(["kperf", "run"].iter().chain(args)).unwrap();
        match cli.command {
            Command::Run(run) => run,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_is_well_formed() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn defaults_leave_kernel_defaults_alone() {
        let run = run_args(&[]);
        let params = run.params();
        assert_eq!(params, RunParams::default());
        assert_eq!(run.kernels().len(), KernelId::ALL.len());
        assert_eq!(run.variants(), VariantId::ALL.to_vec());
    }

    #[test]
    fn overrides_reach_run_params() {
        let run = run_args(&[
            "--passes",
            "3",
            "--size",
            "1000",
            "-r",
            "5",
            "--size-spec",
            "extralarge",
            "--seed",
            "7",
            "--tolerance",
            "1e-9",
        ]);
        let params = run.params();
        assert_eq!(params.passes, 3);
        assert_eq!(params.size, Some(1000));
        assert_eq!(params.reps, Some(5));
        assert_eq!(params.size_spec, SizeSpec::ExtraLarge);
        assert_eq!(params.seed, 7);
        assert_eq!(params.tolerance, 1e-9);
    }

    #[test]
    fn variants_are_parsed_and_ordered() {
        let run = run_args(&["-v", "portable_threaded", "Base_Seq", "BASE_SEQ"]);
        assert_eq!(
            run.variants(),
            vec![VariantId::BaseSeq, VariantId::PortableThreaded]
        );
    }

    #[test]
    fn unknown_names_do_not_stop_the_run() {
        let run = run_args(&["-v", "Turbo", "Base_Seq", "-k", "NOPE", "ADD"]);
        assert_eq!(run.variants(), vec![VariantId::BaseSeq]);
        assert_eq!(run.kernels(), vec![KernelId::StreamAdd]);
    }

    #[test]
    fn zero_passes_are_rejected() {
        assert!(CliArgs::try_parse_from(["kperf", "run", "--passes", "0"]).is_err());
    }

    #[test]
    fn kernel_groups_expand() {
        let run = run_args(&["-k", "Basic", "FIR"]);
        assert_eq!(
            run.kernels(),
            vec![KernelId::BasicReduce3Int, KernelId::BasicTrapInt, KernelId::AppsFir]
        );
    }
}
