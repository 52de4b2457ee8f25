//! Basic REDUCE3_INT: sum, minimum and maximum of an integer vector in one sweep.
//!
//! Every repetition starts its accumulators from the init values and folds its result into
//! running totals, which are only reset by `set_up`.

use super::{Kernel, KernelBase, KernelId};
use crate::{
    data::{release, Buffer},
    error::{Result, SuiteError},
    params::RunParams,
    variant::{Target, VariantId},
};

#[cfg(any(feature = "opencl", feature = "cuda"))]
use crate::drivers::device::{reduction_blocks, DeviceKernel};

use std::mem::size_of;

#[cfg(feature = "opencl")]
static CL_REDUCE3: DeviceKernel = DeviceKernel::new(
    "reduce3_int",
    include_str!("../../kernels/opencl/reduce3_int.cl"),
);

#[cfg(feature = "cuda")]
static CUDA_REDUCE3: DeviceKernel = DeviceKernel::new(
    "reduce3_int",
    include_str!(concat!(env!("OUT_DIR"), "/reduce3_int.ptx")),
);

/// Sum, minimum and maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reduce3 {
    pub sum: i64,
    pub min: i32,
    pub max: i32,
}

impl Reduce3 {
    /// Accumulator values at the start of every repetition.
    pub const INIT: Reduce3 = Reduce3 {
        sum: 0,
        min: i32::MAX,
        max: i32::MIN,
    };

    #[inline(always)]
    fn of(v: i32) -> Self {
        Self {
            sum: v as i64,
            min: v,
            max: v,
        }
    }

    #[inline(always)]
    fn combine(self, other: Self) -> Self {
        Self {
            sum: self.sum + other.sum,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

pub struct Reduce3Int {
    base: KernelBase,
    vec: Option<Buffer<i32>>,
    totals: Reduce3,
}

impl Reduce3Int {
    pub fn new(params: &RunParams) -> Self {
        let mut base = KernelBase::new(KernelId::BasicReduce3Int, params);
        base.set_default_size(1_000_000);
        base.set_default_reps(5_000);

        let n = base.run_size();
        base.set_work_per_rep(size_of::<i32>() * n, n);

        Self {
            base,
            vec: None,
            totals: Reduce3::INIT,
        }
    }

    /// Running totals over every repetition since the last `set_up`.
    pub fn totals(&self) -> Reduce3 {
        self.totals
    }
}

impl Kernel for Reduce3Int {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut KernelBase {
        &mut self.base
    }

    fn set_up(&mut self, variant: VariantId) -> Result<()> {
        let n = self.base.run_size();
        self.vec = Some(self.base.init().ints(n, variant)?);
        self.totals = Reduce3::INIT;
        Ok(())
    }

    fn run_kernel(&mut self, variant: VariantId) -> Result<()> {
        let Some(target) = self.base.resolve(variant) else {
            return Ok(());
        };
        let vec = self.vec.as_deref().ok_or_else(|| self.base.not_set_up())?;
        let totals = &mut self.totals;

        match target {
            Target::Host(sweep) => {
                self.base.time_reps(variant, |_| {
                    let rep = sweep.reduce(
                        vec.len(),
                        Reduce3::INIT,
                        |i| Reduce3::of(vec[i]),
                        Reduce3::combine,
                    );
                    *totals = Reduce3 {
                        sum: totals.sum + rep.sum,
                        min: totals.min.min(rep.min),
                        max: totals.max.max(rep.max),
                    };
                });
                Ok(())
            }
            #[cfg(feature = "opencl")]
            Target::Offload(_) => offload(&mut self.base, vec, totals, variant),
            #[cfg(feature = "cuda")]
            Target::Device(_) => device(&mut self.base, vec, totals, variant),
            #[allow(unreachable_patterns)]
            _ => Err(SuiteError::UnsupportedVariant {
                kernel: self.base.id(),
                variant,
            }),
        }
    }

    fn update_checksum(&mut self, variant: VariantId) {
        if self.vec.is_some() {
            let Reduce3 { sum, min, max } = self.totals;
            self.base
                .add_checksum(variant, sum as f64 + min as f64 + max as f64);
        }
    }

    fn tear_down(&mut self, _variant: VariantId) {
        if let Some(vec) = self.vec.take() {
            release(vec);
        }
    }
}

/// Folds one repetition's per-block partials into the running totals.
#[cfg(any(feature = "opencl", feature = "cuda"))]
fn fold_partials(totals: &mut Reduce3, sums: &[i64], mins: &[i32], maxs: &[i32]) {
    let rep = sums
        .iter()
        .zip(mins)
        .zip(maxs)
        .fold(Reduce3::INIT, |acc, ((&sum, &min), &max)| {
            acc.combine(Reduce3 { sum, min, max })
        });
    *totals = Reduce3 {
        sum: totals.sum + rep.sum,
        min: totals.min.min(rep.min),
        max: totals.max.max(rep.max),
    };
}

#[cfg(feature = "opencl")]
fn offload(
    base: &mut KernelBase,
    vec: &[i32],
    totals: &mut Reduce3,
    variant: VariantId,
) -> Result<()> {
    use crate::{consts::BLOCK_SIZE, drivers::device::opencl::OclSession};

    let n = vec.len();
    let blocks = reduction_blocks(n);
    let session = OclSession::new(&CL_REDUCE3, blocks * BLOCK_SIZE)?;
    let d_vec = session.stage(vec)?;
    let d_sums = session.scratch::<i64>(blocks)?;
    let d_mins = session.scratch::<i32>(blocks)?;
    let d_maxs = session.scratch::<i32>(blocks)?;

    let kernel = session
        .kernel(CL_REDUCE3.name())
        .arg(&d_vec)
        .arg(&d_sums)
        .arg(&d_mins)
        .arg(&d_maxs)
        .arg_local::<i64>(BLOCK_SIZE)
        .arg_local::<i32>(BLOCK_SIZE)
        .arg_local::<i32>(BLOCK_SIZE)
        .arg(n as u64)
        .build()?;

    let mut sums = vec![0_i64; blocks];
    let mut mins = vec![0_i32; blocks];
    let mut maxs = vec![0_i32; blocks];

    base.time_device_reps(
        variant,
        |_| {
            session.launch_blocks(&kernel, blocks)?;
            session.fetch(&d_sums, &mut sums)?;
            session.fetch(&d_mins, &mut mins)?;
            session.fetch(&d_maxs, &mut maxs)?;
            fold_partials(totals, &sums, &mins, &maxs);
            Ok(())
        },
        || session.finish(),
    )
}

#[cfg(feature = "cuda")]
fn device(
    base: &mut KernelBase,
    vec: &[i32],
    totals: &mut Reduce3,
    variant: VariantId,
) -> Result<()> {
    use crate::{consts::BLOCK_SIZE, drivers::device::cuda::CudaSession};
    use cust::launch;

    let n = vec.len();
    let blocks = reduction_blocks(n);
    let session = CudaSession::new(&CUDA_REDUCE3)?;
    let d_vec = session.stage(vec)?;
    let d_sums = session.stage(&vec![0_i64; blocks])?;
    let d_mins = session.stage(&vec![0_i32; blocks])?;
    let d_maxs = session.stage(&vec![0_i32; blocks])?;

    let reduce = session.function(CUDA_REDUCE3.name())?;
    let stream = session.stream();
    let shared = (BLOCK_SIZE * (size_of::<i64>() + 2 * size_of::<i32>())) as u32;

    let mut sums = vec![0_i64; blocks];
    let mut mins = vec![0_i32; blocks];
    let mut maxs = vec![0_i32; blocks];

    base.time_device_reps(
        variant,
        |_| {
            unsafe {
                launch!(
                    reduce<<<blocks as u32, BLOCK_SIZE as u32, shared, stream>>>(
                        d_vec.as_device_ptr(),
                        d_sums.as_device_ptr(),
                        d_mins.as_device_ptr(),
                        d_maxs.as_device_ptr(),
                        n
                    )
                )?;
            }
            session.synchronize()?;
            session.fetch(&d_sums, &mut sums)?;
            session.fetch(&d_mins, &mut mins)?;
            session.fetch(&d_maxs, &mut maxs)?;
            fold_partials(totals, &sums, &mins, &maxs);
            Ok(())
        },
        || session.synchronize(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals_after(reps: usize, variant: VariantId) -> Reduce3 {
        let params = RunParams::default().with_size(10_000).with_reps(reps);
        let mut kernel = Reduce3Int::new(&params);
        kernel.set_up(variant).unwrap();
        kernel.run_kernel(variant).unwrap();
        let totals = kernel.totals();
        kernel.tear_down(variant);
        totals
    }

    #[test]
    fn finds_planted_extremes() {
        let totals = totals_after(1, VariantId::BaseSeq);
        assert_eq!(totals.min, -58);
        assert_eq!(totals.max, 19);
    }

    #[test]
    fn sum_accumulates_across_repetitions() {
        let once = totals_after(1, VariantId::BaseSeq);
        let thrice = totals_after(3, VariantId::BaseSeq);
        assert_eq!(thrice.sum, 3 * once.sum);
        assert_eq!((thrice.min, thrice.max), (once.min, once.max));
    }

    #[test]
    fn host_variants_agree_exactly() {
        let reference = totals_after(2, VariantId::BaseSeq);
        for variant in VariantId::compiled().filter(|v| !v.is_device_resident()) {
            assert_eq!(totals_after(2, variant), reference, "{variant}");
        }
    }

    #[test]
    fn zero_repetitions_keep_init_values() {
        assert_eq!(totals_after(0, VariantId::PortableThreaded), Reduce3::INIT);
    }

    #[test]
    fn checksum_is_sum_plus_extremes() {
        let params = RunParams::default().with_size(500).with_reps(2);
        let mut kernel = Reduce3Int::new(&params);
        kernel.execute(VariantId::BaseSeq).unwrap();

        let mut init = crate::data::DataInit::new(params.seed);
        let vec = init.ints(500, VariantId::BaseSeq).unwrap();
        let sum: i64 = vec.iter().map(|&v| v as i64).sum();
        assert_eq!(
            kernel.base().checksum(VariantId::BaseSeq),
            Some((2 * sum) as f64 - 58.0 + 19.0)
        );
    }
}
