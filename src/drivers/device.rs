//! Device execution support.
//!
//! This module implements the staging and launch helpers used by the offload and device variants
//! of the kernels.
//!
//! # Crates used for calling kernels on a device
//! - [`ocl`][1] for an idiomatic Rust implementation of OpenCL bindings (`opencl` feature);
//! - [`cust`][2] for launching CUDA kernels from Rust (`cuda` feature).
//!
//! Device buffers are owned by a session object created for a single `run_kernel` call. Input
//! data is staged before the timer starts and outputs are copied back after it stops. Every
//! device allocation is released when the session and its buffers go out of scope, including
//! early returns through `?`.
//!
//! [1]: https://crates.io/crates/ocl
//! [2]: https://crates.io/crates/cust

/// How a device launch is configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LaunchStyle {
    /// Fixed blocks of [`crate::consts::BLOCK_SIZE`] threads and a ceiling-divided grid.
    Explicit,
    /// Block size left to the runtime.
    Runtime,
}

/// Number of blocks of `block` threads needed to cover `extent` indices (at least one).
pub fn grid_size(extent: usize, block: usize) -> usize {
    extent.div_ceil(block.max(1)).max(1)
}

/// Number of [`BLOCK_SIZE`] blocks launched by a device reduction over `extent` indices.
///
/// [`BLOCK_SIZE`]: crate::consts::BLOCK_SIZE
pub fn reduction_blocks(extent: usize) -> usize {
    grid_size(extent, crate::consts::BLOCK_SIZE).min(crate::consts::MAX_REDUCTION_BLOCKS)
}

/// Represents a device kernel.
///
/// There is no generic way of writing a function that executes on an accelerator in Rust, so
/// kernels are written in the syntax of the target framework (OpenCL C or CUDA C++) and their
/// source is imported as raw text. For CUDA the text is the PTX produced by `build.rs`.
#[cfg(any(feature = "opencl", feature = "cuda"))]
pub struct DeviceKernel {
    kernel_name: &'static str,
    kernel_source: &'static str,
}

#[cfg(any(feature = "opencl", feature = "cuda"))]
impl DeviceKernel {
    /// Creates a `DeviceKernel` from the name of its entry point and its source code.
    pub const fn new(kernel_name: &'static str, kernel_source: &'static str) -> Self {
        Self {
            kernel_name,
            kernel_source,
        }
    }

    /// Returns the function name of the given kernel.
    pub fn name(&self) -> &'static str {
        self.kernel_name
    }

    /// Returns the source code for the given kernel.
    pub fn source(&self) -> &'static str {
        self.kernel_source
    }
}

#[cfg(any(feature = "opencl", feature = "cuda"))]
fn transfer_error(e: impl std::fmt::Display) -> crate::error::SuiteError {
    crate::error::SuiteError::DeviceTransfer(e.to_string())
}

#[cfg(feature = "opencl")]
pub mod opencl {
    //! OpenCL sessions.

    use super::{grid_size, transfer_error, DeviceKernel, LaunchStyle};
    use crate::{consts::BLOCK_SIZE, error::Result};

    use ocl::{builders::KernelBuilder, Buffer, Kernel, OclPrm, ProQue};
    use tracing::debug;

    /// Program, context and queue for one offload run.
    pub struct OclSession {
        pro_que: ProQue,
    }

    impl OclSession {
        /// Builds the program holding `kernel` for a default domain of `dims` work items.
        pub fn new(kernel: &DeviceKernel, dims: usize) -> Result<Self> {
            let pro_que = ProQue::builder()
                .src(kernel.source())
                .dims(dims.max(1))
                .build()?;
            debug!(
                kernel = kernel.name(),
                device = ?pro_que.device().name().ok(),
                "OpenCL program built"
            );
            Ok(Self { pro_que })
        }

        /// Copies `host` into a new device buffer.
        pub fn stage<T: OclPrm>(&self, host: &[T]) -> Result<Buffer<T>> {
            self.pro_que
                .buffer_builder::<T>()
                .len(host.len())
                .copy_host_slice(host)
                .build()
                .map_err(transfer_error)
        }

        /// Allocates a zero-filled device buffer.
        pub fn scratch<T: OclPrm>(&self, len: usize) -> Result<Buffer<T>> {
            self.pro_que
                .buffer_builder::<T>()
                .len(len.max(1))
                .fill_val(T::default())
                .build()
                .map_err(transfer_error)
        }

        /// Starts building the kernel named `name` from the session's program.
        pub fn kernel(&self, name: &str) -> KernelBuilder<'_> {
            self.pro_que.kernel_builder(name)
        }

        /// Enqueues `kernel` over `extent` work items.
        pub fn launch(&self, kernel: &Kernel, extent: usize, style: LaunchStyle) -> Result<()> {
            match style {
                LaunchStyle::Explicit => unsafe {
                    kernel
                        .cmd()
                        .global_work_size(grid_size(extent, BLOCK_SIZE) * BLOCK_SIZE)
                        .local_work_size(BLOCK_SIZE)
                        .enq()?;
                },
                LaunchStyle::Runtime => unsafe {
                    kernel.cmd().global_work_size(extent.max(1)).enq()?;
                },
            }
            Ok(())
        }

        /// Enqueues `kernel` over `blocks` work-groups of [`BLOCK_SIZE`] items.
        pub fn launch_blocks(&self, kernel: &Kernel, blocks: usize) -> Result<()> {
            unsafe {
                kernel
                    .cmd()
                    .global_work_size(blocks * BLOCK_SIZE)
                    .local_work_size(BLOCK_SIZE)
                    .enq()?;
            }
            Ok(())
        }

        /// Copies `src` into `dst` on the device.
        pub fn copy<T: OclPrm>(&self, src: &Buffer<T>, dst: &Buffer<T>) -> Result<()> {
            src.copy(dst, None, None).enq().map_err(transfer_error)
        }

        /// Copies a device buffer back into `host`.
        pub fn fetch<T: OclPrm>(&self, src: &Buffer<T>, host: &mut [T]) -> Result<()> {
            src.read(host).enq().map_err(transfer_error)
        }

        /// Blocks until every enqueued command has completed.
        pub fn finish(&self) -> Result<()> {
            self.pro_que.queue().finish()?;
            Ok(())
        }
    }
}

#[cfg(feature = "cuda")]
pub mod cuda {
    //! NVIDIA CUDA sessions.

    use super::{grid_size, transfer_error, DeviceKernel, LaunchStyle};
    use crate::{consts::BLOCK_SIZE, error::Result};

    use cust::{
        function::{BlockSize, GridSize},
        memory::DeviceCopy,
        prelude::*,
    };
    use tracing::debug;

    /// Module and stream for one device run.
    ///
    /// The context is declared last so that it outlives the module and the stream on drop.
    pub struct CudaSession {
        module: Module,
        stream: Stream,
        _ctx: Context,
    }

    impl CudaSession {
        pub fn new(kernel: &DeviceKernel) -> Result<Self> {
            // Initialize CUDA context
            let ctx = cust::quick_init()?;

            // Create CUDA module from compiled PTX
            let module = Module::from_ptx(kernel.source(), &[])?;

            // Create CUDA stream
            let stream = Stream::new(StreamFlags::NON_BLOCKING, None)?;

            debug!(kernel = kernel.name(), "CUDA module loaded");
            Ok(Self {
                module,
                stream,
                _ctx: ctx,
            })
        }

        pub fn stream(&self) -> &Stream {
            &self.stream
        }

        pub fn function(&self, name: &str) -> Result<Function<'_>> {
            Ok(self.module.get_function(name)?)
        }

        /// Copies `host` into a new device buffer.
        pub fn stage<T: DeviceCopy>(&self, host: &[T]) -> Result<DeviceBuffer<T>> {
            DeviceBuffer::from_slice(host).map_err(transfer_error)
        }

        /// Copies a device buffer back into `host`.
        pub fn fetch<T: DeviceCopy>(&self, src: &DeviceBuffer<T>, host: &mut [T]) -> Result<()> {
            src.copy_to(host).map_err(transfer_error)
        }

        /// Copies `src` into `dst` on the device.
        pub fn copy<T: DeviceCopy>(
            &self,
            src: &DeviceBuffer<T>,
            dst: &mut DeviceBuffer<T>,
        ) -> Result<()> {
            src.copy_to(dst).map_err(transfer_error)
        }

        /// Launch geometry covering `extent` threads.
        pub fn dims(
            &self,
            function: &Function<'_>,
            extent: usize,
            style: LaunchStyle,
        ) -> Result<(GridSize, BlockSize)> {
            let block = match style {
                LaunchStyle::Explicit => BLOCK_SIZE as u32,
                LaunchStyle::Runtime => {
                    let (_, block) = function.suggested_launch_configuration(0, BlockSize::x(0))?;
                    block.max(1)
                }
            };
            let grid = grid_size(extent, block as usize) as u32;
            Ok((GridSize::x(grid), BlockSize::x(block)))
        }

        /// Blocks until the stream is idle.
        pub fn synchronize(&self) -> Result<()> {
            self.stream.synchronize()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_covers_extent() {
        assert_eq!(grid_size(0, 256), 1);
        assert_eq!(grid_size(256, 256), 1);
        assert_eq!(grid_size(257, 256), 2);
        assert_eq!(grid_size(1_000_000, 256), 3907);
    }

    #[test]
    fn reductions_cap_their_block_count() {
        assert_eq!(reduction_blocks(0), 1);
        assert_eq!(reduction_blocks(1000), 4);
        assert_eq!(reduction_blocks(1_000_000), crate::consts::MAX_REDUCTION_BLOCKS);
    }
}
