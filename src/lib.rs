//! kperf - a performance suite of small numeric kernels
//!
//! # About
//! kperf measures the execution time of small numeric kernels under several execution variants
//! and checks that every variant computes the same result. Each kernel owns its buffers and goes
//! through a four-phase lifecycle per variant: set-up, timed repetitions, checksum update and
//! tear-down (see [`kernels::Kernel`]).
//!
//! The following kernels are implemented:
//! - `Basic_REDUCE3_INT` (sum, minimum and maximum of an integer vector)
//! - `Basic_TRAP_INT` (trapezoid-rule integration)
//! - `Stream_ADD` (vector addition)
//! - `Apps_DEL_DOT_VEC_2D` (divergence on a 2-D mesh)
//! - `Apps_FIR` (16-tap FIR filter)
//! - `Apps_PRESSURE` (equation-of-state pressure update)
//! - `Polybench_2MM` (two chained matrix products)
//!
//! Variants combine a coding style (hand-written loops or a portable sweep abstraction) with a
//! backend: sequential and multi-threaded on the host through [`rayon`][1], target offload through
//! OpenCL (`opencl` feature) and device execution through NVIDIA CUDA (`cuda` feature). Variants
//! whose backend is not compiled in are reported as skipped.
//!
//! # Quickstart
//! ```sh
//! cargo run --release -- list
//! cargo run --release -- run --kernels Apps --variants Base_Seq Portable_Threaded --passes 5
//! cargo run --release --features opencl -- run --kernels ADD
//! ```
//!
//! Diagnostics are written to `stderr` and filtered with `RUST_LOG` (default `info`); the CSV
//! report goes to `stdout` or to `--output-file`.
//!
//! [1]: https://crates.io/crates/rayon

pub mod cli;
pub mod consts;
pub mod data;
pub mod drivers;
pub mod error;
pub mod kernels;
pub mod params;
pub mod perf_report;
pub mod variant;

pub use error::{Result, SuiteError};
