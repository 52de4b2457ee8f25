//! Apps DEL_DOT_VEC_2D: divergence of a vector field on a 2-D structured mesh.
//!
//! Nodal arrays cover the full mesh including ghost layers. Each real zone reads its four corner
//! nodes through [`StridedView`]s over the same array (`v4 = v`, `v1 = v + 1`, `v2 = v1 + jp`,
//! `v3 = v4 + jp`) and writes the zone's divergence at the zone's own index.

use super::{Kernel, KernelBase, KernelId};
use crate::{
    data::{checksum, release, Buffer, StridedView},
    error::{Result, SuiteError},
    params::RunParams,
    variant::{Target, VariantId},
};

#[cfg(any(feature = "opencl", feature = "cuda"))]
use crate::drivers::device::{DeviceKernel, LaunchStyle};

use std::mem::size_of;

#[cfg(feature = "opencl")]
static CL_DEL_DOT: DeviceKernel = DeviceKernel::new(
    "del_dot_vec_2d",
    include_str!("../../kernels/opencl/del_dot_vec_2d.cl"),
);

#[cfg(feature = "cuda")]
static CUDA_DEL_DOT: DeviceKernel = DeviceKernel::new(
    "del_dot_vec_2d",
    include_str!(concat!(env!("OUT_DIR"), "/del_dot_vec_2d.ptx")),
);

const PTINY: f64 = 1.0e-20;
const HALF: f64 = 0.5;

/// Ghost layers below and above the real zones, in each direction.
const NPNL: usize = 2;
const NPNR: usize = 1;

/// Square 2-D mesh built from `zones` nodes per side: `(zones - 1)²` real zones in
/// `imin..imax × jmin..jmax`, surrounded by ghost layers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshDomain {
    pub imin: usize,
    pub imax: usize,
    pub jmin: usize,
    pub jmax: usize,
    /// Stride between consecutive rows.
    pub jp: usize,
    /// Number of nodes, ghosts included.
    pub nnalls: usize,
    real_zones: Vec<usize>,
}

impl MeshDomain {
    pub fn new(zones: usize) -> Self {
        let (imin, jmin) = (NPNL, NPNL);
        let (imax, jmax) = (zones + NPNR, zones + NPNR);
        let jp = zones + NPNL + NPNR;
        let nnalls = jp * jp;

        let real_zones = (jmin..jmax)
            .flat_map(|j| (imin..imax).map(move |i| i + j * jp))
            .collect();

        Self {
            imin,
            imax,
            jmin,
            jmax,
            jp,
            nnalls,
            real_zones,
        }
    }

    /// Flat indices of the real zones, row by row.
    pub fn real_zones(&self) -> &[usize] {
        &self.real_zones
    }

    pub fn n_real_zones(&self) -> usize {
        self.real_zones.len()
    }

    fn corners(&self) -> Corners {
        Corners {
            c1: StridedView::new(1, 1),
            c2: StridedView::new(1 + self.jp, 1),
            c3: StridedView::new(self.jp, 1),
            c4: StridedView::new(0, 1),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Corners {
    c1: StridedView,
    c2: StridedView,
    c3: StridedView,
    c4: StridedView,
}

impl Corners {
    #[inline(always)]
    fn read(&self, v: &[f64], zone: usize) -> [f64; 4] {
        [
            self.c1.at(v, zone),
            self.c2.at(v, zone),
            self.c3.at(v, zone),
            self.c4.at(v, zone),
        ]
    }
}

#[derive(Clone, Copy)]
struct Fields<'a> {
    x: &'a [f64],
    y: &'a [f64],
    xdot: &'a [f64],
    ydot: &'a [f64],
}

#[inline(always)]
fn divergence(corners: &Corners, f: Fields<'_>, zone: usize) -> f64 {
    let [x1, x2, x3, x4] = corners.read(f.x, zone);
    let [y1, y2, y3, y4] = corners.read(f.y, zone);
    let [fx1, fx2, fx3, fx4] = corners.read(f.xdot, zone);
    let [fy1, fy2, fy3, fy4] = corners.read(f.ydot, zone);

    let xi = HALF * (x1 + x2 - x3 - x4);
    let xj = HALF * (x2 + x3 - x4 - x1);

    let yi = HALF * (y1 + y2 - y3 - y4);
    let yj = HALF * (y2 + y3 - y4 - y1);

    let fxi = HALF * (fx1 + fx2 - fx3 - fx4);
    let fxj = HALF * (fx2 + fx3 - fx4 - fx1);

    let fyi = HALF * (fy1 + fy2 - fy3 - fy4);
    let fyj = HALF * (fy2 + fy3 - fy4 - fy1);

    let rarea = 1.0 / (xi * yj - xj * yi + PTINY);

    let dfxdx = rarea * (fxi * yj - fxj * yi);
    let dfydy = rarea * (fyj * xi - fyi * xj);

    let affine = (fy1 + fy2 + fy3 + fy4) / (y1 + y2 + y3 + y4);

    dfxdx + dfydy + affine
}

struct MeshData {
    x: Buffer<f64>,
    y: Buffer<f64>,
    xdot: Buffer<f64>,
    ydot: Buffer<f64>,
    div: Buffer<f64>,
}

pub struct DelDotVec2d {
    base: KernelBase,
    domain: MeshDomain,
    data: Option<MeshData>,
}

impl DelDotVec2d {
    pub fn new(params: &RunParams) -> Self {
        let mut base = KernelBase::new(KernelId::AppsDelDotVec2d, params);
        base.set_default_size(312);
        base.set_default_reps(1_050);

        let domain = MeshDomain::new(base.run_size());
        let zones = domain.n_real_zones();
        base.set_work_per_rep(size_of::<f64>() * (domain.nnalls * 4 + zones), 54 * zones);

        Self {
            base,
            domain,
            data: None,
        }
    }

    pub fn domain(&self) -> &MeshDomain {
        &self.domain
    }

    /// Divergence over every node, available between `set_up` and `tear_down`.
    pub fn output(&self) -> Option<&[f64]> {
        self.data.as_ref().map(|d| &d.div[..])
    }
}

impl Kernel for DelDotVec2d {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut KernelBase {
        &mut self.base
    }

    fn set_up(&mut self, variant: VariantId) -> Result<()> {
        let n = self.domain.nnalls;
        let init = self.base.init();
        self.data = Some(MeshData {
            x: init.reals(n, variant)?,
            y: init.reals(n, variant)?,
            xdot: init.reals(n, variant)?,
            ydot: init.reals(n, variant)?,
            div: init.reals(n, variant)?,
        });
        Ok(())
    }

    fn run_kernel(&mut self, variant: VariantId) -> Result<()> {
        let Some(target) = self.base.resolve(variant) else {
            return Ok(());
        };
        let domain = &self.domain;
        let data = self.data.as_mut().ok_or_else(|| self.base.not_set_up())?;

        match target {
            Target::Host(sweep) => {
                let corners = domain.corners();
                let fields = Fields {
                    x: &data.x,
                    y: &data.y,
                    xdot: &data.xdot,
                    ydot: &data.ydot,
                };
                let div = &mut data.div[..];
                let (rows, cols) = (domain.jmin..domain.jmax, domain.imin..domain.imax);
                let jp = domain.jp;

                self.base.time_reps(variant, |_| {
                    sweep.for_each_row(div, jp, |j, row| {
                        if !rows.contains(&j) {
                            return;
                        }
                        for i in cols.clone() {
                            row[i] = divergence(&corners, fields, i + j * jp);
                        }
                    });
                });
                Ok(())
            }
            #[cfg(feature = "opencl")]
            Target::Offload(style) => offload(&mut self.base, domain, data, variant, style),
            #[cfg(feature = "cuda")]
            Target::Device(style) => device(&mut self.base, domain, data, variant, style),
            #[allow(unreachable_patterns)]
            _ => Err(SuiteError::UnsupportedVariant {
                kernel: self.base.id(),
                variant,
            }),
        }
    }

    fn update_checksum(&mut self, variant: VariantId) {
        if let Some(data) = &self.data {
            let value = checksum(&data.div, self.domain.nnalls);
            self.base.add_checksum(variant, value);
        }
    }

    fn tear_down(&mut self, _variant: VariantId) {
        if let Some(data) = self.data.take() {
            release(data.x);
            release(data.y);
            release(data.xdot);
            release(data.ydot);
            release(data.div);
        }
    }
}

#[cfg(feature = "opencl")]
fn offload(
    base: &mut KernelBase,
    domain: &MeshDomain,
    data: &mut MeshData,
    variant: VariantId,
    style: LaunchStyle,
) -> Result<()> {
    use crate::drivers::device::opencl::OclSession;

    let zones = domain.n_real_zones();
    let session = OclSession::new(&CL_DEL_DOT, zones)?;
    let d_x = session.stage(&data.x)?;
    let d_y = session.stage(&data.y)?;
    let d_xdot = session.stage(&data.xdot)?;
    let d_ydot = session.stage(&data.ydot)?;
    let d_div = session.stage(&data.div)?;

    let kernel = session
        .kernel(CL_DEL_DOT.name())
        .arg(&d_div)
        .arg(&d_x)
        .arg(&d_y)
        .arg(&d_xdot)
        .arg(&d_ydot)
        .arg(domain.imin as u64)
        .arg((domain.imax - domain.imin) as u64)
        .arg(domain.jmin as u64)
        .arg(domain.jp as u64)
        .arg(zones as u64)
        .arg(HALF)
        .arg(PTINY)
        .build()?;

    base.time_device_reps(
        variant,
        |_| session.launch(&kernel, zones, style),
        || session.finish(),
    )?;

    session.fetch(&d_div, &mut data.div)
}

#[cfg(feature = "cuda")]
fn device(
    base: &mut KernelBase,
    domain: &MeshDomain,
    data: &mut MeshData,
    variant: VariantId,
    style: LaunchStyle,
) -> Result<()> {
    use crate::drivers::device::cuda::CudaSession;
    use cust::launch;

    let zones = domain.n_real_zones();
    let session = CudaSession::new(&CUDA_DEL_DOT)?;
    let d_x = session.stage(&data.x)?;
    let d_y = session.stage(&data.y)?;
    let d_xdot = session.stage(&data.xdot)?;
    let d_ydot = session.stage(&data.ydot)?;
    let d_div = session.stage(&data.div)?;

    let del_dot = session.function(CUDA_DEL_DOT.name())?;
    let (grid, block) = session.dims(&del_dot, zones, style)?;
    let stream = session.stream();
    let width = domain.imax - domain.imin;

    base.time_device_reps(
        variant,
        |_| {
            unsafe {
                launch!(
                    del_dot<<<grid.clone(), block.clone(), 0, stream>>>(
                        d_div.as_device_ptr(),
                        d_x.as_device_ptr(),
                        d_y.as_device_ptr(),
                        d_xdot.as_device_ptr(),
                        d_ydot.as_device_ptr(),
                        domain.imin,
                        width,
                        domain.jmin,
                        domain.jp,
                        zones,
                        HALF,
                        PTINY
                    )
                )?;
            }
            Ok(())
        },
        || session.synchronize(),
    )?;

    session.fetch(&d_div, &mut data.div)
}
