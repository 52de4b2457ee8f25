//! Build script.
//!
//! When the `cuda` feature is enabled, every CUDA C++ kernel under `kernels/cuda/` is compiled to
//! PTX with `nvcc` and written to `$OUT_DIR`, where the device drivers pick it up with
//! `include_str!`. Nothing is done otherwise.

use std::{env, path::PathBuf, process::Command};

const CUDA_KERNELS: &[&str] = &[
    "add",
    "fir",
    "pressure",
    "del_dot_vec_2d",
    "reduce3_int",
    "trap_int",
    "polybench_2mm",
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=NVCC");
    println!("cargo:rerun-if-env-changed=CUDA_ARCH");

    if env::var_os("CARGO_FEATURE_CUDA").is_none() {
        return;
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("`OUT_DIR` is set by cargo"));
    let nvcc = env::var("NVCC").unwrap_or_else(|_| "nvcc".to_string());
    let arch = env::var("CUDA_ARCH").unwrap_or_else(|_| "sm_61".to_string());

    for name in CUDA_KERNELS {
        let src = PathBuf::from("kernels/cuda").join(format!("{name}.cu"));
        let dst = out_dir.join(format!("{name}.ptx"));
        println!("cargo:rerun-if-changed={}", src.display());

        let status = Command::new(&nvcc)
            .arg("--ptx")
            .arg(format!("-arch={arch}"))
            .arg("-o")
            .arg(&dst)
            .arg(&src)
            .status()
            .unwrap_or_else(|e| panic!("failed to run `{nvcc}` (needed by the `cuda` feature): {e}"));

        if !status.success() {
            panic!("`{nvcc}` failed to compile {}", src.display());
        }
    }
}
