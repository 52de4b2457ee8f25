//! Stream ADD: `c[i] = a[i] + b[i]`.

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

/// Name and source code of the OpenCL ADD.
#[cfg(feature = "opencl")]
static CL_ADD: DeviceKernel = DeviceKernel::new("add", include_str!("../../kernels/opencl/add.cl"));

/// Name and PTX of the CUDA ADD.
#[cfg(feature = "cuda")]
static CUDA_ADD: DeviceKernel =
    DeviceKernel::new("add", include_str!(concat!(env!("OUT_DIR"), "/add.ptx")));

struct AddData {
    a: Buffer<f64>,
    b: Buffer<f64>,
    c: Buffer<f64>,
}

pub struct Add {
    base: KernelBase,
    data: Option<AddData>,
}

impl Add {
    pub fn new(params: &RunParams) -> Self {
        let mut base = KernelBase::new(KernelId::StreamAdd, params);
        base.set_default_size(1_000_000);
        base.set_default_reps(800);

        let n = base.run_size();
        base.set_work_per_rep(3 * size_of::<f64>() * n, n);

        Self { base, data: None }
    }

    /// Output vector, available between `set_up` and `tear_down`.
    pub fn output(&self) -> Option<&[f64]> {
        self.data.as_ref().map(|d| &d.c[..])
    }
}

impl Kernel for Add {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut KernelBase {
        &mut self.base
    }

    fn set_up(&mut self, variant: VariantId) -> Result<()> {
        let n = self.base.run_size();
        let init = self.base.init();
        self.data = Some(AddData {
            a: init.reals(n, variant)?,
            b: init.reals(n, variant)?,
            c: init.reals(n, variant)?,
        });
        Ok(())
    }

    fn run_kernel(&mut self, variant: VariantId) -> Result<()> {
        let Some(target) = self.base.resolve(variant) else {
            return Ok(());
        };
        let data = self.data.as_mut().ok_or_else(|| self.base.not_set_up())?;

        match target {
            Target::Host(sweep) => {
                let (a, b, c) = (&data.a[..], &data.b[..], &mut data.c[..]);
                self.base.time_reps(variant, |_| {
                    sweep.for_each(c, |i, ci| *ci = a[i] + b[i]);
                });
                Ok(())
            }
            #[cfg(feature = "opencl")]
            Target::Offload(style) => offload(&mut self.base, data, variant, style),
            #[cfg(feature = "cuda")]
            Target::Device(style) => device(&mut self.base, data, variant, style),
            #[allow(unreachable_patterns)]
            _ => Err(SuiteError::UnsupportedVariant {
                kernel: self.base.id(),
                variant,
            }),
        }
    }

    fn update_checksum(&mut self, variant: VariantId) {
        if let Some(data) = &self.data {
            let value = checksum(&data.c, self.base.run_size());
            self.base.add_checksum(variant, value);
        }
    }

    fn tear_down(&mut self, _variant: VariantId) {
        if let Some(AddData { a, b, c }) = self.data.take() {
            release(a);
            release(b);
            release(c);
        }
    }
}

#[cfg(feature = "opencl")]
fn offload(
    base: &mut KernelBase,
    data: &mut AddData,
    variant: VariantId,
    style: LaunchStyle,
) -> Result<()> {
    use crate::drivers::device::opencl::OclSession;

    let n = data.c.len();
    let session = OclSession::new(&CL_ADD, n)?;
    let d_a = session.stage(&data.a)?;
    let d_b = session.stage(&data.b)?;
    let d_c = session.stage(&data.c)?;

    let kernel = session
        .kernel(CL_ADD.name())
        .arg(&d_c)
        .arg(&d_a)
        .arg(&d_b)
        .arg(n as u64)
        .build()?;

    base.time_device_reps(
        variant,
        |_| session.launch(&kernel, n, style),
        || session.finish(),
    )?;

    session.fetch(&d_c, &mut data.c)
}

#[cfg(feature = "cuda")]
fn device(
    base: &mut KernelBase,
    data: &mut AddData,
    variant: VariantId,
    style: LaunchStyle,
) -> Result<()> {
    use crate::drivers::device::cuda::CudaSession;
    use cust::launch;

    let n = data.c.len();
    let session = CudaSession::new(&CUDA_ADD)?;
    let d_a = session.stage(&data.a)?;
    let d_b = session.stage(&data.b)?;
    let d_c = session.stage(&data.c)?;

    let add = session.function(CUDA_ADD.name())?;
    let (grid, block) = session.dims(&add, n, style)?;
    let stream = session.stream();

    base.time_device_reps(
        variant,
        |_| {
            unsafe {
                launch!(
                    add<<<grid.clone(), block.clone(), 0, stream>>>(
                        d_c.as_device_ptr(),
                        d_a.as_device_ptr(),
                        d_b.as_device_ptr(),
                        n
                    )
                )?;
            }
            Ok(())
        },
        || session.synchronize(),
    )?;

    session.fetch(&d_c, &mut data.c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(params: &RunParams, variant: VariantId) -> Vec<f64> {
        let mut kernel = Add::new(params);
        kernel.set_up(variant).unwrap();
        kernel.run_kernel(variant).unwrap();
        let out = kernel.output().unwrap().to_vec();
        kernel.tear_down(variant);
        out
    }

    #[test]
    fn adds_elementwise() {
        let params = RunParams::default().with_size(100).with_reps(1);
        let out = run(&params, VariantId::BaseSeq);

        let mut init = crate::data::DataInit::new(params.seed);
        let a = init.reals(100, VariantId::BaseSeq).unwrap();
        let b = init.reals(100, VariantId::BaseSeq).unwrap();
        for i in 0..100 {
            assert_eq!(out[i], a[i] + b[i]);
        }
    }

    #[test]
    fn repetitions_do_not_change_output() {
        let once = run(&RunParams::default().with_size(1000).with_reps(1), VariantId::BaseSeq);
        let many = run(&RunParams::default().with_size(1000).with_reps(7), VariantId::BaseSeq);
        assert_eq!(once, many);
    }

    #[test]
    fn host_variants_produce_identical_checksums() {
        let params = RunParams::default().with_size(4099).with_reps(2);
        let mut kernel = Add::new(&params);
        for variant in VariantId::compiled().filter(|v| !v.is_device_resident()) {
            kernel.execute(variant).unwrap();
        }
        let reference = kernel.base().checksum(VariantId::BaseSeq).unwrap();
        for (variant, value) in kernel.base().checksums() {
            assert_eq!(*value, reference, "{variant}");
        }
    }
}
