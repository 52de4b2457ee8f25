//! Basic TRAP_INT: trapezoid-rule integration of `1 / sqrt((x - xp)² + (y - yp)²)`.
//!
//! The kernel has no array inputs: its scalars come from the init sequence. Each repetition
//! computes `sumx = sumx_init + Σ f(x0 + i*h)` and adds `sumx * h` to a running total.

use super::{Kernel, KernelBase, KernelId};
use crate::{
    error::{Result, SuiteError},
    params::RunParams,
    variant::{Target, VariantId},
};

#[cfg(any(feature = "opencl", feature = "cuda"))]
use crate::drivers::device::{reduction_blocks, DeviceKernel};

#[cfg(feature = "opencl")]
static CL_TRAP: DeviceKernel =
    DeviceKernel::new("trap_int", include_str!("../../kernels/opencl/trap_int.cl"));

#[cfg(feature = "cuda")]
static CUDA_TRAP: DeviceKernel = DeviceKernel::new(
    "trap_int",
    include_str!(concat!(env!("OUT_DIR"), "/trap_int.ptx")),
);

#[inline(always)]
pub fn trap_int_func(x: f64, y: f64, xp: f64, yp: f64) -> f64 {
    let denom = (x - xp) * (x - xp) + (y - yp) * (y - yp);
    1.0 / denom.sqrt()
}

/// Integration parameters derived in `set_up`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrapParams {
    pub x0: f64,
    pub xp: f64,
    pub y: f64,
    pub yp: f64,
    pub h: f64,
    pub sumx_init: f64,
}

impl TrapParams {
    #[inline(always)]
    fn sample(&self, i: usize) -> f64 {
        trap_int_func(self.x0 + i as f64 * self.h, self.y, self.xp, self.yp)
    }
}

pub struct TrapInt {
    base: KernelBase,
    params: Option<TrapParams>,
    sumx: f64,
}

impl TrapInt {
    pub fn new(params: &RunParams) -> Self {
        let mut base = KernelBase::new(KernelId::BasicTrapInt, params);
        base.set_default_size(100_000);
        base.set_default_reps(2_000);

        let n = base.run_size();
        base.set_work_per_rep(0, 10 * n);

        Self {
            base,
            params: None,
            sumx: 0.0,
        }
    }

    pub fn params(&self) -> Option<TrapParams> {
        self.params
    }

    /// Running total of `sumx * h` since the last `set_up`.
    pub fn total(&self) -> f64 {
        self.sumx
    }
}

impl Kernel for TrapInt {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut KernelBase {
        &mut self.base
    }

    fn set_up(&mut self, variant: VariantId) -> Result<()> {
        let init = self.base.init();
        let xn = init.scalar(variant);
        let x0 = init.scalar(variant);
        let xp = init.scalar(variant);
        let y = init.scalar(variant);
        let yp = init.scalar(variant);

        self.params = Some(TrapParams {
            x0,
            xp,
            y,
            yp,
            h: xn - x0,
            sumx_init: 0.5 * (trap_int_func(x0, y, xp, yp) + trap_int_func(xn, y, xp, yp)),
        });
        self.sumx = 0.0;
        Ok(())
    }

    fn run_kernel(&mut self, variant: VariantId) -> Result<()> {
        let Some(target) = self.base.resolve(variant) else {
            return Ok(());
        };
        let trap = self.params.ok_or_else(|| self.base.not_set_up())?;
        let n = self.base.run_size();
        let total = &mut self.sumx;

        match target {
            Target::Host(sweep) => {
                self.base.time_reps(variant, |_| {
                    let sum = sweep.reduce(n, 0.0, |i| trap.sample(i), |a, b| a + b);
                    let sumx = trap.sumx_init + sum;
                    *total += sumx * trap.h;
                });
                Ok(())
            }
            #[cfg(feature = "opencl")]
            Target::Offload(_) => offload(&mut self.base, trap, n, total, variant),
            #[cfg(feature = "cuda")]
            Target::Device(_) => device(&mut self.base, trap, n, total, variant),
            #[allow(unreachable_patterns)]
            _ => Err(SuiteError::UnsupportedVariant {
                kernel: self.base.id(),
                variant,
            }),
        }
    }

    fn update_checksum(&mut self, variant: VariantId) {
        if self.params.is_some() {
            self.base.add_checksum(variant, self.sumx);
        }
    }

    fn tear_down(&mut self, _variant: VariantId) {
        self.params = None;
    }
}

#[cfg(feature = "opencl")]
fn offload(
    base: &mut KernelBase,
    trap: TrapParams,
    n: usize,
    total: &mut f64,
    variant: VariantId,
) -> Result<()> {
    use crate::{consts::BLOCK_SIZE, drivers::device::opencl::OclSession};

    let blocks = reduction_blocks(n);
    let session = OclSession::new(&CL_TRAP, blocks * BLOCK_SIZE)?;
    let d_partials = session.scratch::<f64>(blocks)?;

    let kernel = session
        .kernel(CL_TRAP.name())
        .arg(&d_partials)
        .arg_local::<f64>(BLOCK_SIZE)
        .arg(trap.x0)
        .arg(trap.xp)
        .arg(trap.y)
        .arg(trap.yp)
        .arg(trap.h)
        .arg(n as u64)
        .build()?;

    let mut partials = vec![0.0; blocks];

    base.time_device_reps(
        variant,
        |_| {
            session.launch_blocks(&kernel, blocks)?;
            session.fetch(&d_partials, &mut partials)?;
            let sumx = trap.sumx_init + partials.iter().sum::<f64>();
            *total += sumx * trap.h;
            Ok(())
        },
        || session.finish(),
    )
}

#[cfg(feature = "cuda")]
fn device(
    base: &mut KernelBase,
    trap: TrapParams,
    n: usize,
    total: &mut f64,
    variant: VariantId,
) -> Result<()> {
    use crate::{consts::BLOCK_SIZE, drivers::device::cuda::CudaSession};
    use cust::launch;

    let blocks = reduction_blocks(n);
    let session = CudaSession::new(&CUDA_TRAP)?;
    let d_partials = session.stage(&vec![0.0_f64; blocks])?;

    let trap_int = session.function(CUDA_TRAP.name())?;
    let stream = session.stream();
    let shared = (BLOCK_SIZE * std::mem::size_of::<f64>()) as u32;

    let mut partials = vec![0.0; blocks];

    base.time_device_reps(
        variant,
        |_| {
            unsafe {
                launch!(
                    trap_int<<<blocks as u32, BLOCK_SIZE as u32, shared, stream>>>(
                        d_partials.as_device_ptr(),
                        trap.x0,
                        trap.xp,
                        trap.y,
                        trap.yp,
                        trap.h,
                        n
                    )
                )?;
            }
            session.synchronize()?;
            session.fetch(&d_partials, &mut partials)?;
            let sumx = trap.sumx_init + partials.iter().sum::<f64>();
            *total += sumx * trap.h;
            Ok(())
        },
        || session.synchronize(),
    )
}
