//! Polybench 2MM: two chained matrix products, `D = alpha*A*B*C + beta*D`.
//!
//! Matrices are row-major. Each repetition computes `tmp = alpha*A*B`, restores `D` from its
//! pristine copy `DD`, then updates `D = beta*D + tmp*C`. Dimensions and the default repetition
//! count come from the size class; a size override only changes the reported problem size.

use super::{Kernel, KernelBase, KernelId};
use crate::{
    data::{checksum, release, Buffer},
    error::{Result, SuiteError},
    params::{RunParams, SizeSpec},
    variant::{Target, VariantId},
};

#[cfg(any(feature = "opencl", feature = "cuda"))]
use crate::drivers::device::{DeviceKernel, LaunchStyle};

use std::mem::size_of;

#[cfg(feature = "opencl")]
static CL_2MM: DeviceKernel = DeviceKernel::new(
    "poly_2mm_2",
    include_str!("../../kernels/opencl/polybench_2mm.cl"),
);

#[cfg(feature = "cuda")]
static CUDA_2MM: DeviceKernel = DeviceKernel::new(
    "poly_2mm_2",
    include_str!(concat!(env!("OUT_DIR"), "/polybench_2mm.ptx")),
);

const ALPHA: f64 = 1.5;
const BETA: f64 = 1.2;

/// Matrix dimensions: `A` is `ni×nk`, `B` is `nk×nj`, `C` is `nj×nl`, `D` is `ni×nl`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolybenchDims {
    pub ni: usize,
    pub nj: usize,
    pub nk: usize,
    pub nl: usize,
    pub reps: usize,
}

impl PolybenchDims {
    pub fn for_size(spec: SizeSpec) -> Self {
        let (ni, nj, nk, nl, reps) = match spec {
            SizeSpec::Mini => (16, 18, 22, 24, 10_000),
            SizeSpec::Small => (40, 50, 70, 80, 1_000),
            SizeSpec::Medium => (180, 190, 210, 220, 100),
            SizeSpec::Large => (800, 900, 1_100, 1_200, 1),
            SizeSpec::ExtraLarge => (1_600, 1_800, 2_200, 2_400, 1),
        };
        Self {
            ni,
            nj,
            nk,
            nl,
            reps,
        }
    }

    /// Problem size reported for these dimensions.
    pub fn run_size(&self) -> usize {
        self.ni * self.nj * (1 + self.nk) + self.ni * self.nl * (1 + self.nj)
    }
}

struct MatrixData {
    tmp: Buffer<f64>,
    a: Buffer<f64>,
    b: Buffer<f64>,
    c: Buffer<f64>,
    d: Buffer<f64>,
    dd: Buffer<f64>,
}

pub struct Polybench2mm {
    base: KernelBase,
    dims: PolybenchDims,
    data: Option<MatrixData>,
}

impl Polybench2mm {
    pub fn new(params: &RunParams) -> Self {
        let mut base = KernelBase::new(KernelId::Polybench2mm, params);
        let dims = PolybenchDims::for_size(params.size_spec);
        base.set_default_size(dims.run_size());
        base.set_default_reps(dims.reps);

        let PolybenchDims { ni, nj, nk, nl, .. } = dims;
        base.set_work_per_rep(
            size_of::<f64>() * (ni * nk + nk * nj + 2 * ni * nj + nj * nl + 3 * ni * nl),
            2 * ni * nj * nk + 2 * ni * nl * nj + ni * nl,
        );

        Self {
            base,
            dims,
            data: None,
        }
    }

    pub fn dims(&self) -> PolybenchDims {
        self.dims
    }

    /// Result matrix `D`, available between `set_up` and `tear_down`.
    pub fn output(&self) -> Option<&[f64]> {
        self.data.as_ref().map(|d| &d.d[..])
    }
}

impl Kernel for Polybench2mm {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut KernelBase {
        &mut self.base
    }

    fn set_up(&mut self, variant: VariantId) -> Result<()> {
        let PolybenchDims { ni, nj, nk, nl, .. } = self.dims;
        let init = self.base.init();
        self.data = Some(MatrixData {
            tmp: init.reals(ni * nj, variant)?,
            a: init.reals(ni * nk, variant)?,
            b: init.reals(nk * nj, variant)?,
            c: init.reals(nj * nl, variant)?,
            d: init.reals(ni * nl, variant)?,
            dd: init.reals(ni * nl, variant)?,
        });
        Ok(())
    }

    fn run_kernel(&mut self, variant: VariantId) -> Result<()> {
        let Some(target) = self.base.resolve(variant) else {
            return Ok(());
        };
        let dims = self.dims;
        let data = self.data.as_mut().ok_or_else(|| self.base.not_set_up())?;

        match target {
            Target::Host(sweep) => {
                let PolybenchDims { nj, nk, nl, .. } = dims;
                let MatrixData {
                    tmp,
                    a,
                    b,
                    c,
                    d,
                    dd,
                } = data;
                let (a, b, c, dd) = (&a[..], &b[..], &c[..], &dd[..]);

                self.base.time_reps(variant, |_| {
                    sweep.for_each(&mut tmp[..], |ij, t| {
                        let (i, j) = (ij / nj, ij % nj);
                        let mut acc = 0.0;
                        for k in 0..nk {
                            acc += ALPHA * a[i * nk + k] * b[k * nj + j];
                        }
                        *t = acc;
                    });

                    d.copy_from_slice(dd);

                    let tmp = &tmp[..];
                    sweep.for_each(&mut d[..], |il, v| {
                        let (i, l) = (il / nl, il % nl);
                        let mut acc = *v * BETA;
                        for j in 0..nj {
                            acc += tmp[i * nj + j] * c[j * nl + l];
                        }
                        *v = acc;
                    });
                });
                Ok(())
            }
            #[cfg(feature = "opencl")]
            Target::Offload(style) => offload(&mut self.base, dims, data, variant, style),
            #[cfg(feature = "cuda")]
            Target::Device(style) => device(&mut self.base, dims, data, variant, style),
            #[allow(unreachable_patterns)]
            _ => Err(SuiteError::UnsupportedVariant {
                kernel: self.base.id(),
                variant,
            }),
        }
    }

    fn update_checksum(&mut self, variant: VariantId) {
        if let Some(data) = &self.data {
            let value = checksum(&data.d, self.dims.ni * self.dims.nl);
            self.base.add_checksum(variant, value);
        }
    }

    fn tear_down(&mut self, _variant: VariantId) {
        if let Some(data) = self.data.take() {
            release(data.tmp);
            release(data.a);
            release(data.b);
            release(data.c);
            release(data.d);
            release(data.dd);
        }
    }
}

#[cfg(feature = "opencl")]
fn offload(
    base: &mut KernelBase,
    dims: PolybenchDims,
    data: &mut MatrixData,
    variant: VariantId,
    style: LaunchStyle,
) -> Result<()> {
    use crate::drivers::device::opencl::OclSession;

    let PolybenchDims { ni, nj, nk, nl, .. } = dims;
    let session = OclSession::new(&CL_2MM, ni * nl)?;
    let d_tmp = session.stage(&data.tmp)?;
    let d_a = session.stage(&data.a)?;
    let d_b = session.stage(&data.b)?;
    let d_c = session.stage(&data.c)?;
    let d_d = session.stage(&data.d)?;
    let d_dd = session.stage(&data.dd)?;

    let mm1 = session
        .kernel("poly_2mm_1")
        .arg(&d_tmp)
        .arg(&d_a)
        .arg(&d_b)
        .arg(ALPHA)
        .arg(ni as u64)
        .arg(nj as u64)
        .arg(nk as u64)
        .build()?;
    let mm2 = session
        .kernel(CL_2MM.name())
        .arg(&d_d)
        .arg(&d_tmp)
        .arg(&d_c)
        .arg(BETA)
        .arg(ni as u64)
        .arg(nj as u64)
        .arg(nl as u64)
        .build()?;

    base.time_device_reps(
        variant,
        |_| {
            session.launch(&mm1, ni * nj, style)?;
            session.copy(&d_dd, &d_d)?;
            session.launch(&mm2, ni * nl, style)
        },
        || session.finish(),
    )?;

    session.fetch(&d_tmp, &mut data.tmp)?;
    session.fetch(&d_d, &mut data.d)
}

#[cfg(feature = "cuda")]
fn device(
    base: &mut KernelBase,
    dims: PolybenchDims,
    data: &mut MatrixData,
    variant: VariantId,
    style: LaunchStyle,
) -> Result<()> {
    use crate::drivers::device::cuda::CudaSession;
    use cust::launch;

    let PolybenchDims { ni, nj, nk, nl, .. } = dims;
    let session = CudaSession::new(&CUDA_2MM)?;
    let d_tmp = session.stage(&data.tmp)?;
    let d_a = session.stage(&data.a)?;
    let d_b = session.stage(&data.b)?;
    let d_c = session.stage(&data.c)?;
    let mut d_d = session.stage(&data.d)?;
    let d_dd = session.stage(&data.dd)?;

    let mm1 = session.function("poly_2mm_1")?;
    let mm2 = session.function(CUDA_2MM.name())?;
    let (grid1, block1) = session.dims(&mm1, ni * nj, style)?;
    let (grid2, block2) = session.dims(&mm2, ni * nl, style)?;
    let stream = session.stream();

    base.time_device_reps(
        variant,
        |_| {
            unsafe {
                launch!(
                    mm1<<<grid1.clone(), block1.clone(), 0, stream>>>(
                        d_tmp.as_device_ptr(),
                        d_a.as_device_ptr(),
                        d_b.as_device_ptr(),
                        ALPHA,
                        ni,
                        nj,
                        nk
                    )
                )?;
            }
            // The copy below is synchronous with respect to the host, not to `stream`.
            session.synchronize()?;
            session.copy(&d_dd, &mut d_d)?;
            unsafe {
                launch!(
                    mm2<<<grid2.clone(), block2.clone(), 0, stream>>>(
                        d_d.as_device_ptr(),
                        d_tmp.as_device_ptr(),
                        d_c.as_device_ptr(),
                        BETA,
                        ni,
                        nj,
                        nl
                    )
                )?;
            }
            Ok(())
        },
        || session.synchronize(),
    )?;

    session.fetch(&d_tmp, &mut data.tmp)?;
    session.fetch(&d_d, &mut data.d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_follow_the_size_spec() {
        let mini = PolybenchDims::for_size(SizeSpec::Mini);
        assert_eq!((mini.ni, mini.nj, mini.nk, mini.nl), (16, 18, 22, 24));
        assert_eq!(mini.run_size(), 16 * 18 * 23 + 16 * 24 * 19);

        let kernel = Polybench2mm::new(&RunParams::default().with_size_spec(SizeSpec::Small));
        assert_eq!(kernel.base().run_reps(), 1_000);
        assert_eq!(kernel.base().run_size(), kernel.dims().run_size());
    }

    #[test]
    fn matches_a_naive_product() {
        let params = RunParams::default()
            .with_size_spec(SizeSpec::Mini)
            .with_reps(1);
        let mut kernel = Polybench2mm::new(&params);
        kernel.set_up(VariantId::BaseSeq).unwrap();
        kernel.run_kernel(VariantId::BaseSeq).unwrap();
        let got = kernel.output().unwrap().to_vec();
        kernel.tear_down(VariantId::BaseSeq);

        let PolybenchDims { ni, nj, nk, nl, .. } = kernel.dims();
        let mut init = crate::data::DataInit::new(params.seed);
        let _tmp = init.reals(ni * nj, VariantId::BaseSeq).unwrap();
        let a = init.reals(ni * nk, VariantId::BaseSeq).unwrap();
        let b = init.reals(nk * nj, VariantId::BaseSeq).unwrap();
        let c = init.reals(nj * nl, VariantId::BaseSeq).unwrap();
        let _d = init.reals(ni * nl, VariantId::BaseSeq).unwrap();
        let dd = init.reals(ni * nl, VariantId::BaseSeq).unwrap();

        for i in 0..ni {
            for l in 0..nl {
                let mut expected = BETA * dd[i * nl + l];
                for j in 0..nj {
                    let ab: f64 = (0..nk).map(|k| ALPHA * a[i * nk + k] * b[k * nj + j]).sum();
                    expected += ab * c[j * nl + l];
                }
                let g = got[i * nl + l];
                assert!(((g - expected) / expected).abs() < 1e-12, "D[{i},{l}]");
            }
        }
    }

    #[test]
    fn repetitions_restore_d_first() {
        let run = |reps| {
            let params = RunParams::default()
                .with_size_spec(SizeSpec::Mini)
                .with_reps(reps);
            let mut kernel = Polybench2mm::new(&params);
            kernel.execute(VariantId::PortableThreaded).unwrap();
            kernel.base().checksum(VariantId::PortableThreaded).unwrap()
        };
        assert_eq!(run(1), run(4));
    }
}
