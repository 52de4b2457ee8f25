use kperf::{
    cli::{CliArgs, Command},
    drivers,
    params::RunParams,
};

use anyhow::bail;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    match args.command {
        Command::List { size_spec } => {
            let params = RunParams::default().with_size_spec(size_spec);
            drivers::list(&params, &mut std::io::stdout())?;
        }
        Command::Run(run) => {
            let params = run.params();
            let kernels = run.kernels();
            let variants = run.variants();
            info!(
                kernels = kernels.len(),
                variants = variants.len(),
                passes = params.passes,
                "starting suite"
            );

            let reports = drivers::run_suite(&params, &kernels, &variants);
            drivers::write_reports(&reports, run.output_file.as_deref())?;

            let failures = drivers::count_failures(&reports);
            if failures > 0 {
                bail!("{failures} kernel variant(s) failed");
            }
        }
    }

    Ok(())
}
