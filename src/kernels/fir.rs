//! Apps FIR: 16-tap finite impulse response filter.
//!
//! `out[i] = Σ_j coeff[j] * in[i + j]` over the first `n - FIR_COEFFLEN` indices. The filter
//! window reads past `i`, so the last `FIR_COEFFLEN` outputs keep their initial values.

use super::{Kernel, KernelBase, KernelId};
use crate::{
    data::{checksum, release, Buffer},
    error::{Result, SuiteError},
    params::RunParams,
    variant::{Target, VariantId},
};

#[cfg(any(feature = "opencl", feature = "cuda"))]
use crate::drivers::device::{DeviceKernel, LaunchStyle};

use std::mem::size_of;

pub const FIR_COEFFLEN: usize = 16;

pub const FIR_COEFF: [f64; FIR_COEFFLEN] = [
    3.0, -1.0, -1.0, -1.0, //
    -1.0, 3.0, -1.0, -1.0, //
    -1.0, -1.0, 3.0, -1.0, //
    -1.0, -1.0, -1.0, 3.0,
];

#[cfg(feature = "opencl")]
static CL_FIR: DeviceKernel = DeviceKernel::new("fir", include_str!("../../kernels/opencl/fir.cl"));

#[cfg(feature = "cuda")]
static CUDA_FIR: DeviceKernel =
    DeviceKernel::new("fir", include_str!(concat!(env!("OUT_DIR"), "/fir.ptx")));

#[inline(always)]
fn filter(input: &[f64], i: usize) -> f64 {
    let mut sum = 0.0;
    for (j, c) in FIR_COEFF.iter().enumerate() {
        sum += c * input[i + j];
    }
    sum
}

struct FirData {
    input: Buffer<f64>,
    out: Buffer<f64>,
}

pub struct Fir {
    base: KernelBase,
    data: Option<FirData>,
}

impl Fir {
    pub fn new(params: &RunParams) -> Self {
        let mut base = KernelBase::new(KernelId::AppsFir, params);
        base.set_default_size(100_000);
        base.set_default_reps(1_600);

        let n = base.run_size();
        let domain = n.saturating_sub(FIR_COEFFLEN);
        base.set_work_per_rep(
            size_of::<f64>() * (n + domain),
            2 * FIR_COEFFLEN * domain,
        );

        Self { base, data: None }
    }

    /// Number of outputs computed per repetition.
    pub fn domain(&self) -> usize {
        self.base.run_size().saturating_sub(FIR_COEFFLEN)
    }

    pub fn output(&self) -> Option<&[f64]> {
        self.data.as_ref().map(|d| &d.out[..])
    }
}

impl Kernel for Fir {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut KernelBase {
        &mut self.base
    }

    fn set_up(&mut self, variant: VariantId) -> Result<()> {
        let n = self.base.run_size();
        let init = self.base.init();
        self.data = Some(FirData {
            input: init.reals(n, variant)?,
            out: init.reals(n, variant)?,
        });
        Ok(())
    }

    fn run_kernel(&mut self, variant: VariantId) -> Result<()> {
        let Some(target) = self.base.resolve(variant) else {
            return Ok(());
        };
        let domain = self.domain();
        let data = self.data.as_mut().ok_or_else(|| self.base.not_set_up())?;

        match target {
            Target::Host(sweep) => {
                let (input, out) = (&data.input[..], &mut data.out[..domain]);
                self.base.time_reps(variant, |_| {
                    sweep.for_each(out, |i, o| *o = filter(input, i));
                });
                Ok(())
            }
            #[cfg(feature = "opencl")]
            Target::Offload(style) => offload(&mut self.base, data, domain, variant, style),
            #[cfg(feature = "cuda")]
            Target::Device(style) => device(&mut self.base, data, domain, variant, style),
            #[allow(unreachable_patterns)]
            _ => Err(SuiteError::UnsupportedVariant {
                kernel: self.base.id(),
                variant,
            }),
        }
    }

    fn update_checksum(&mut self, variant: VariantId) {
        if let Some(data) = &self.data {
            let value = checksum(&data.out, self.domain());
            self.base.add_checksum(variant, value);
        }
    }

    fn tear_down(&mut self, _variant: VariantId) {
        if let Some(FirData { input, out }) = self.data.take() {
            release(input);
            release(out);
        }
    }
}

#[cfg(feature = "opencl")]
fn offload(
    base: &mut KernelBase,
    data: &mut FirData,
    domain: usize,
    variant: VariantId,
    style: LaunchStyle,
) -> Result<()> {
    use crate::drivers::device::opencl::OclSession;

    let session = OclSession::new(&CL_FIR, domain)?;
    let d_in = session.stage(&data.input)?;
    let d_out = session.stage(&data.out)?;
    let d_coeff = session.stage(&FIR_COEFF)?;

    let kernel = session
        .kernel(CL_FIR.name())
        .arg(&d_out)
        .arg(&d_in)
        .arg(&d_coeff)
        .arg(FIR_COEFFLEN as u64)
        .arg(domain as u64)
        .build()?;

    base.time_device_reps(
        variant,
        |_| session.launch(&kernel, domain, style),
        || session.finish(),
    )?;

    session.fetch(&d_out, &mut data.out)
}

#[cfg(feature = "cuda")]
fn device(
    base: &mut KernelBase,
    data: &mut FirData,
    domain: usize,
    variant: VariantId,
    style: LaunchStyle,
) -> Result<()> {
    use crate::drivers::device::cuda::CudaSession;
    use cust::launch;

    let session = CudaSession::new(&CUDA_FIR)?;
    let d_in = session.stage(&data.input)?;
    let d_out = session.stage(&data.out)?;
    let d_coeff = session.stage(&FIR_COEFF)?;

    let fir = session.function(CUDA_FIR.name())?;
    let (grid, block) = session.dims(&fir, domain, style)?;
    let stream = session.stream();

    base.time_device_reps(
        variant,
        |_| {
            unsafe {
                launch!(
                    fir<<<grid.clone(), block.clone(), 0, stream>>>(
                        d_out.as_device_ptr(),
                        d_in.as_device_ptr(),
                        d_coeff.as_device_ptr(),
                        FIR_COEFFLEN,
                        domain
                    )
                )?;
            }
            Ok(())
        },
        || session.synchronize(),
    )?;

    session.fetch(&d_out, &mut data.out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataInit;

    #[test]
    fn computes_windowed_domain_only() {
        let params = RunParams::default().with_size(100).with_reps(1);
        let mut kernel = Fir::new(&params);
        assert_eq!(kernel.domain(), 100 - FIR_COEFFLEN);

        kernel.set_up(VariantId::BaseSeq).unwrap();
        kernel.run_kernel(VariantId::BaseSeq).unwrap();
        let out = kernel.output().unwrap().to_vec();
        kernel.tear_down(VariantId::BaseSeq);

        let mut init = DataInit::new(params.seed);
        let input = init.reals(100, VariantId::BaseSeq).unwrap();
        let untouched = init.reals(100, VariantId::BaseSeq).unwrap();

        for i in 0..kernel.domain() {
            assert_eq!(out[i], filter(&input, i));
        }
        assert_eq!(&out[kernel.domain()..], &untouched[kernel.domain()..]);
    }

    #[test]
    fn filter_of_constant_input_sums_coefficients() {
        let input = vec![2.0; FIR_COEFFLEN];
        let taps: f64 = FIR_COEFF.iter().sum();
        assert_eq!(filter(&input, 0), 2.0 * taps);
        assert_eq!(taps, 0.0);
    }

    #[test]
    fn short_input_has_empty_domain() {
        let params = RunParams::default().with_size(FIR_COEFFLEN - 3).with_reps(2);
        let mut kernel = Fir::new(&params);
        assert_eq!(kernel.domain(), 0);
        kernel.execute(VariantId::BaseSeq).unwrap();
        assert_eq!(kernel.base().checksum(VariantId::BaseSeq), Some(0.0));
    }
}
