//! Apps PRESSURE: equation-of-state pressure update in two sweeps.
//!
//! ```text
//! bvc[i]   = cls * (compression[i] + 1)
//! p_new[i] = bvc[i] * e_old[i]
//!            then 0    if |p_new| < p_cut
//!            then 0    if vnewc[i] >= eosvmax
//!            then pmin if p_new < pmin
//! ```

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

#[cfg(feature = "opencl")]
static CL_PRESSURE: DeviceKernel =
    DeviceKernel::new("pressure", include_str!("../../kernels/opencl/pressure.cl"));

#[cfg(feature = "cuda")]
static CUDA_PRESSURE: DeviceKernel = DeviceKernel::new(
    "pressure",
    include_str!(concat!(env!("OUT_DIR"), "/pressure.ptx")),
);

/// Scalar coefficients of the equation of state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PressureCoeffs {
    pub cls: f64,
    pub p_cut: f64,
    pub pmin: f64,
    pub eosvmax: f64,
}

impl PressureCoeffs {
    #[inline(always)]
    fn bvc(&self, compression: f64) -> f64 {
        self.cls * (compression + 1.0)
    }

    #[inline(always)]
    fn pressure(&self, bvc: f64, e_old: f64, vnewc: f64) -> f64 {
        let mut p = bvc * e_old;
        if p.abs() < self.p_cut {
            p = 0.0;
        }
        if vnewc >= self.eosvmax {
            p = 0.0;
        }
        if p < self.pmin {
            p = self.pmin;
        }
        p
    }
}

struct PressureData {
    compression: Buffer<f64>,
    bvc: Buffer<f64>,
    p_new: Buffer<f64>,
    e_old: Buffer<f64>,
    vnewc: Buffer<f64>,
}

pub struct Pressure {
    base: KernelBase,
    coeffs: PressureCoeffs,
    data: Option<PressureData>,
}

impl Pressure {
    pub fn new(params: &RunParams) -> Self {
        let mut base = KernelBase::new(KernelId::AppsPressure, params);
        base.set_default_size(100_000);
        base.set_default_reps(7_000);

        let n = base.run_size();
        base.set_work_per_rep(size_of::<f64>() * 6 * n, 3 * n);

        Self {
            base,
            coeffs: PressureCoeffs::default(),
            data: None,
        }
    }

    pub fn coeffs(&self) -> PressureCoeffs {
        self.coeffs
    }

    /// New pressures, available between `set_up` and `tear_down`.
    pub fn output(&self) -> Option<&[f64]> {
        self.data.as_ref().map(|d| &d.p_new[..])
    }
}

impl Kernel for Pressure {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut KernelBase {
        &mut self.base
    }

    fn set_up(&mut self, variant: VariantId) -> Result<()> {
        let n = self.base.run_size();
        let init = self.base.init();
        let data = PressureData {
            compression: init.reals(n, variant)?,
            bvc: init.reals(n, variant)?,
            p_new: init.reals(n, variant)?,
            e_old: init.reals(n, variant)?,
            vnewc: init.reals(n, variant)?,
        };
        self.coeffs = PressureCoeffs {
            cls: init.scalar(variant),
            p_cut: init.scalar(variant),
            pmin: init.scalar(variant),
            eosvmax: init.scalar(variant),
        };
        self.data = Some(data);
        Ok(())
    }

    fn run_kernel(&mut self, variant: VariantId) -> Result<()> {
        let Some(target) = self.base.resolve(variant) else {
            return Ok(());
        };
        let coeffs = self.coeffs;
        let data = self.data.as_mut().ok_or_else(|| self.base.not_set_up())?;

        match target {
            Target::Host(sweep) => {
                let PressureData {
                    compression,
                    bvc,
                    p_new,
                    e_old,
                    vnewc,
                } = data;
                let (compression, e_old, vnewc) = (&compression[..], &e_old[..], &vnewc[..]);
                self.base.time_reps(variant, |_| {
                    sweep.for_each(&mut bvc[..], |i, b| *b = coeffs.bvc(compression[i]));
                    let bvc = &bvc[..];
                    sweep.for_each(&mut p_new[..], |i, p| {
                        *p = coeffs.pressure(bvc[i], e_old[i], vnewc[i])
                    });
                });
                Ok(())
            }
            #[cfg(feature = "opencl")]
            Target::Offload(style) => offload(&mut self.base, data, coeffs, variant, style),
            #[cfg(feature = "cuda")]
            Target::Device(style) => device(&mut self.base, data, coeffs, variant, style),
            #[allow(unreachable_patterns)]
            _ => Err(SuiteError::UnsupportedVariant {
                kernel: self.base.id(),
                variant,
            }),
        }
    }

    fn update_checksum(&mut self, variant: VariantId) {
        if let Some(data) = &self.data {
            let value = checksum(&data.p_new, self.base.run_size());
            self.base.add_checksum(variant, value);
        }
    }

    fn tear_down(&mut self, _variant: VariantId) {
        if let Some(data) = self.data.take() {
            release(data.compression);
            release(data.bvc);
            release(data.p_new);
            release(data.e_old);
            release(data.vnewc);
        }
    }
}

#[cfg(feature = "opencl")]
fn offload(
    base: &mut KernelBase,
    data: &mut PressureData,
    coeffs: PressureCoeffs,
    variant: VariantId,
    style: LaunchStyle,
) -> Result<()> {
    use crate::drivers::device::opencl::OclSession;

    let n = data.p_new.len();
    let session = OclSession::new(&CL_PRESSURE, n)?;
    let d_compression = session.stage(&data.compression)?;
    let d_bvc = session.stage(&data.bvc)?;
    let d_p_new = session.stage(&data.p_new)?;
    let d_e_old = session.stage(&data.e_old)?;
    let d_vnewc = session.stage(&data.vnewc)?;

    let calc_bvc = session
        .kernel("pressure_bvc")
        .arg(&d_bvc)
        .arg(&d_compression)
        .arg(coeffs.cls)
        .arg(n as u64)
        .build()?;
    let calc_p = session
        .kernel(CL_PRESSURE.name())
        .arg(&d_p_new)
        .arg(&d_bvc)
        .arg(&d_e_old)
        .arg(&d_vnewc)
        .arg(coeffs.p_cut)
        .arg(coeffs.pmin)
        .arg(coeffs.eosvmax)
        .arg(n as u64)
        .build()?;

    base.time_device_reps(
        variant,
        |_| {
            session.launch(&calc_bvc, n, style)?;
            session.launch(&calc_p, n, style)
        },
        || session.finish(),
    )?;

    session.fetch(&d_bvc, &mut data.bvc)?;
    session.fetch(&d_p_new, &mut data.p_new)
}

#[cfg(feature = "cuda")]
fn device(
    base: &mut KernelBase,
    data: &mut PressureData,
    coeffs: PressureCoeffs,
    variant: VariantId,
    style: LaunchStyle,
) -> Result<()> {
    use crate::drivers::device::cuda::CudaSession;
    use cust::launch;

    let n = data.p_new.len();
    let session = CudaSession::new(&CUDA_PRESSURE)?;
    let d_compression = session.stage(&data.compression)?;
    let d_bvc = session.stage(&data.bvc)?;
    let d_p_new = session.stage(&data.p_new)?;
    let d_e_old = session.stage(&data.e_old)?;
    let d_vnewc = session.stage(&data.vnewc)?;

    let calc_bvc = session.function("pressure_bvc")?;
    let calc_p = session.function(CUDA_PRESSURE.name())?;
    let (grid_bvc, block_bvc) = session.dims(&calc_bvc, n, style)?;
    let (grid_p, block_p) = session.dims(&calc_p, n, style)?;
    let stream = session.stream();

    base.time_device_reps(
        variant,
        |_| {
            unsafe {
                launch!(
                    calc_bvc<<<grid_bvc.clone(), block_bvc.clone(), 0, stream>>>(
                        d_bvc.as_device_ptr(),
                        d_compression.as_device_ptr(),
                        coeffs.cls,
                        n
                    )
                )?;
                launch!(
                    calc_p<<<grid_p.clone(), block_p.clone(), 0, stream>>>(
                        d_p_new.as_device_ptr(),
                        d_bvc.as_device_ptr(),
                        d_e_old.as_device_ptr(),
                        d_vnewc.as_device_ptr(),
                        coeffs.p_cut,
                        coeffs.pmin,
                        coeffs.eosvmax,
                        n
                    )
                )?;
            }
            Ok(())
        },
        || session.synchronize(),
    )?;

    session.fetch(&d_bvc, &mut data.bvc)?;
    session.fetch(&d_p_new, &mut data.p_new)
}
