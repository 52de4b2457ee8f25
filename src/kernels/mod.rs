//! Kernel implementations.
//!
//! Each kernel owns its buffers and implements the four-phase [`Kernel`] lifecycle:
//! `set_up` → `run_kernel` → `update_checksum` → `tear_down`, invoked once per variant.
//! [`KernelBase`] carries the bookkeeping shared by all kernels: defaults, run parameters, the
//! per-variant checksum and timing maps, and the deterministic data initializer.
//!
//! `run_kernel` resolves the variant once through [`KernelBase::resolve`], then times the
//! repetitions with [`KernelBase::time_reps`] (host) or [`KernelBase::time_device_reps`]
//! (offload and device, where staging happens outside the timed region).

mod add;
mod del_dot_vec_2d;
mod fir;
mod polybench_2mm;
mod pressure;
mod reduce3_int;
mod trap_int;

pub use add::Add;
pub use del_dot_vec_2d::{DelDotVec2d, MeshDomain};
pub use fir::{Fir, FIR_COEFF, FIR_COEFFLEN};
pub use polybench_2mm::{Polybench2mm, PolybenchDims};
pub use pressure::{Pressure, PressureCoeffs};
pub use reduce3_int::{Reduce3, Reduce3Int};
pub use trap_int::{trap_int_func, TrapInt, TrapParams};

use crate::{
    data::DataInit,
    error::{Result, SuiteError},
    params::RunParams,
    variant::{Target, VariantId},
};

use tracing::{debug, warn};

use std::{
    collections::BTreeMap,
    fmt,
    time::{Duration, Instant},
};

/// Kernel group, following the suite's categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Group {
    Basic,
    Stream,
    Apps,
    Polybench,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "Basic"),
            Self::Stream => write!(f, "Stream"),
            Self::Apps => write!(f, "Apps"),
            Self::Polybench => write!(f, "Polybench"),
        }
    }
}

/// List of implemented kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KernelId {
    BasicReduce3Int,
    BasicTrapInt,
    StreamAdd,
    AppsDelDotVec2d,
    AppsFir,
    AppsPressure,
    Polybench2mm,
}

impl KernelId {
    pub const ALL: [KernelId; 7] = [
        Self::BasicReduce3Int,
        Self::BasicTrapInt,
        Self::StreamAdd,
        Self::AppsDelDotVec2d,
        Self::AppsFir,
        Self::AppsPressure,
        Self::Polybench2mm,
    ];

    pub fn group(self) -> Group {
        match self {
            Self::BasicReduce3Int | Self::BasicTrapInt => Group::Basic,
            Self::StreamAdd => Group::Stream,
            Self::AppsDelDotVec2d | Self::AppsFir | Self::AppsPressure => Group::Apps,
            Self::Polybench2mm => Group::Polybench,
        }
    }

    /// Kernel name without its group prefix.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::BasicReduce3Int => "REDUCE3_INT",
            Self::BasicTrapInt => "TRAP_INT",
            Self::StreamAdd => "ADD",
            Self::AppsDelDotVec2d => "DEL_DOT_VEC_2D",
            Self::AppsFir => "FIR",
            Self::AppsPressure => "PRESSURE",
            Self::Polybench2mm => "2MM",
        }
    }

    /// Full kernel name, e.g. `Stream_ADD`.
    pub fn name(self) -> String {
        format!("{}_{}", self.group(), self.short_name())
    }

    /// Whether `pattern` names this kernel (full or short name) or its group.
    pub fn matches(self, pattern: &str) -> bool {
        let pattern = pattern.trim();
        pattern.eq_ignore_ascii_case(&self.name())
            || pattern.eq_ignore_ascii_case(self.short_name())
            || pattern.eq_ignore_ascii_case(&self.group().to_string())
    }

    /// Resolves kernel names and group names, keeping the suite order and dropping duplicates.
    /// An empty selection means every kernel. Unknown names are reported and skipped.
    pub fn select<S: AsRef<str>>(patterns: &[S]) -> Vec<KernelId> {
        if patterns.is_empty() {
            return Self::ALL.to_vec();
        }
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if !Self::ALL.iter().any(|k| k.matches(pattern)) {
                warn!("{}", SuiteError::UnknownKernel(pattern.to_string()));
            }
        }
        Self::ALL
            .into_iter()
            .filter(|k| patterns.iter().any(|p| k.matches(p.as_ref())))
            .collect()
    }

    /// Constructs the kernel with the given run parameters.
    pub fn make(self, params: &RunParams) -> Box<dyn Kernel> {
        match self {
            Self::BasicReduce3Int => Box::new(Reduce3Int::new(params)),
            Self::BasicTrapInt => Box::new(TrapInt::new(params)),
            Self::StreamAdd => Box::new(Add::new(params)),
            Self::AppsDelDotVec2d => Box::new(DelDotVec2d::new(params)),
            Self::AppsFir => Box::new(Fir::new(params)),
            Self::AppsPressure => Box::new(Pressure::new(params)),
            Self::Polybench2mm => Box::new(Polybench2mm::new(params)),
        }
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.group(), self.short_name())
    }
}

/// Bookkeeping shared by every kernel.
#[derive(Debug)]
pub struct KernelBase {
    id: KernelId,
    params: RunParams,
    default_size: usize,
    default_reps: usize,
    bytes_per_rep: usize,
    flops_per_rep: usize,
    checksums: BTreeMap<VariantId, f64>,
    times: BTreeMap<VariantId, Duration>,
    samples: BTreeMap<VariantId, Vec<f64>>,
    init: DataInit,
}

impl KernelBase {
    pub fn new(id: KernelId, params: &RunParams) -> Self {
        Self {
            id,
            params: params.clone(),
            default_size: 0,
            default_reps: 0,
            bytes_per_rep: 0,
            flops_per_rep: 0,
            checksums: BTreeMap::new(),
            times: BTreeMap::new(),
            samples: BTreeMap::new(),
            init: DataInit::new(params.seed),
        }
    }

    pub fn id(&self) -> KernelId {
        self.id
    }

    pub fn params(&self) -> &RunParams {
        &self.params
    }

    pub fn set_default_size(&mut self, size: usize) {
        self.default_size = size;
    }

    pub fn set_default_reps(&mut self, reps: usize) {
        self.default_reps = reps;
    }

    pub fn default_size(&self) -> usize {
        self.default_size
    }

    pub fn default_reps(&self) -> usize {
        self.default_reps
    }

    /// Problem size: the run parameters' override, or the kernel default.
    pub fn run_size(&self) -> usize {
        self.params.size.unwrap_or(self.default_size)
    }

    /// Repetition count: the run parameters' override, or the kernel default.
    pub fn run_reps(&self) -> usize {
        self.params.reps.unwrap_or(self.default_reps)
    }

    /// Sets the traffic and arithmetic of one repetition, used for bandwidth and FLOP rates.
    pub fn set_work_per_rep(&mut self, bytes: usize, flops: usize) {
        self.bytes_per_rep = bytes;
        self.flops_per_rep = flops;
    }

    pub fn bytes_per_rep(&self) -> usize {
        self.bytes_per_rep
    }

    pub fn flops_per_rep(&self) -> usize {
        self.flops_per_rep
    }

    /// Data initializer for `set_up`.
    pub fn init(&mut self) -> &mut DataInit {
        &mut self.init
    }

    pub fn reset_data_init(&mut self) {
        self.init.reset();
    }

    /// Resolves `variant` to its execution strategy.
    ///
    /// Variants that are not compiled in are reported and yield `None`; the caller then returns
    /// without doing any work.
    pub fn resolve(&self, variant: VariantId) -> Option<Target> {
        let target = variant.target();
        if target.is_none() {
            warn!(
                "{}",
                SuiteError::UnsupportedVariant {
                    kernel: self.id,
                    variant
                }
            );
        }
        target
    }

    /// Runs `rep` for every repetition, in order, and accumulates the elapsed time.
    pub fn time_reps<F>(&mut self, variant: VariantId, mut rep: F)
    where
        F: FnMut(usize),
    {
        let reps = self.run_reps();
        let start = Instant::now();
        for r in 0..reps {
            rep(r);
        }
        self.record_time(variant, start.elapsed());
    }

    /// Device flavour of [`KernelBase::time_reps`]: repetitions may fail, and `sync` waits for
    /// the device before the timer stops. A failed repetition abandons the run and records no
    /// time.
    pub fn time_device_reps<F, S>(&mut self, variant: VariantId, mut rep: F, sync: S) -> Result<()>
    where
        F: FnMut(usize) -> Result<()>,
        S: FnOnce() -> Result<()>,
    {
        let reps = self.run_reps();
        let start = Instant::now();
        for r in 0..reps {
            rep(r)?;
        }
        sync()?;
        self.record_time(variant, start.elapsed());
        Ok(())
    }

    fn record_time(&mut self, variant: VariantId, elapsed: Duration) {
        debug!(kernel = %self.id, %variant, ?elapsed, "repetitions done");
        *self.times.entry(variant).or_default() += elapsed;
        self.samples
            .entry(variant)
            .or_default()
            .push(elapsed.as_secs_f64());
    }

    /// Adds `value` to the cumulative checksum of `variant`. Ignored for variants that cannot
    /// run in this build.
    pub fn add_checksum(&mut self, variant: VariantId, value: f64) {
        if !variant.is_compiled() {
            debug!(kernel = %self.id, %variant, "no checksum for an unsupported variant");
            return;
        }
        *self.checksums.entry(variant).or_insert(0.0) += value;
    }

    /// Cumulative checksum of `variant`, if it contributed one.
    pub fn checksum(&self, variant: VariantId) -> Option<f64> {
        self.checksums.get(&variant).copied()
    }

    /// Cumulative elapsed time of `variant` (zero when it never ran).
    pub fn elapsed(&self, variant: VariantId) -> Duration {
        self.times.get(&variant).copied().unwrap_or_default()
    }

    /// Elapsed time of every `run_kernel` call of `variant`, in seconds.
    pub fn samples(&self, variant: VariantId) -> &[f64] {
        self.samples.get(&variant).map_or(&[], Vec::as_slice)
    }

    pub fn checksums(&self) -> &BTreeMap<VariantId, f64> {
        &self.checksums
    }

    pub fn times(&self) -> &BTreeMap<VariantId, Duration> {
        &self.times
    }

    pub(crate) fn not_set_up(&self) -> SuiteError {
        SuiteError::NotSetUp(self.id)
    }
}

/// Lifecycle contract of a kernel.
pub trait Kernel: Send {
    fn base(&self) -> &KernelBase;

    fn base_mut(&mut self) -> &mut KernelBase;

    /// Allocates and initializes the kernel's buffers at the current run size.
    fn set_up(&mut self, variant: VariantId) -> Result<()>;

    /// Times the kernel's repetitions under `variant`.
    fn run_kernel(&mut self, variant: VariantId) -> Result<()>;

    /// Adds the outputs' checksum to the variant's cumulative checksum.
    fn update_checksum(&mut self, variant: VariantId);

    /// Releases every buffer allocated in `set_up`.
    fn tear_down(&mut self, variant: VariantId);

    fn id(&self) -> KernelId {
        self.base().id()
    }

    /// Runs the four phases for `variant`. Buffers are torn down even when the run fails.
    fn execute(&mut self, variant: VariantId) -> Result<()> {
        self.base_mut().reset_data_init();
        self.set_up(variant)?;
        let result = self.run_kernel(variant);
        if result.is_ok() {
            self.update_checksum(variant);
        }
        self.tear_down(variant);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_accepts_names_and_groups() {
        assert_eq!(
            KernelId::select(&["apps"]),
            vec![
                KernelId::AppsDelDotVec2d,
                KernelId::AppsFir,
                KernelId::AppsPressure
            ]
        );
        assert_eq!(
            KernelId::select(&["2mm", "Stream_ADD", "add"]),
            vec![KernelId::StreamAdd, KernelId::Polybench2mm]
        );
        assert_eq!(KernelId::select::<&str>(&[]).len(), 7);
    }

    #[test]
    fn unknown_kernel_names_are_skipped() {
        assert_eq!(KernelId::select(&["NOPE", "ADD"]), vec![KernelId::StreamAdd]);
        assert!(KernelId::select(&["NOPE"]).is_empty());
    }

    #[test]
    fn overrides_take_precedence_over_defaults() {
        let mut base = KernelBase::new(KernelId::StreamAdd, &RunParams::default().with_reps(3));
        base.set_default_size(100);
        base.set_default_reps(800);
        assert_eq!(base.run_size(), 100);
        assert_eq!(base.run_reps(), 3);
    }

    #[test]
    fn times_and_checksums_accumulate() {
        let mut base = KernelBase::new(KernelId::StreamAdd, &RunParams::default().with_reps(2));
        let mut seen = Vec::new();
        base.time_reps(VariantId::BaseSeq, |r| seen.push(r));
        base.time_reps(VariantId::BaseSeq, |r| seen.push(r));
        assert_eq!(seen, vec![0, 1, 0, 1]);
        assert_eq!(base.samples(VariantId::BaseSeq).len(), 2);

        base.add_checksum(VariantId::BaseSeq, 1.5);
        base.add_checksum(VariantId::BaseSeq, 2.0);
        assert_eq!(base.checksum(VariantId::BaseSeq), Some(3.5));
        assert_eq!(base.elapsed(VariantId::PortableSeq), Duration::ZERO);
    }

    #[test]
    fn failed_device_repetition_records_nothing() {
        let mut base = KernelBase::new(KernelId::StreamAdd, &RunParams::default().with_reps(4));
        let result = base.time_device_reps(
            VariantId::BaseSeq,
            |r| {
                if r == 2 {
                    Err(SuiteError::DeviceTransfer("lost".into()))
                } else {
                    Ok(())
                }
            },
            || Ok(()),
        );
        assert!(matches!(result, Err(SuiteError::DeviceTransfer(_))));
        assert!(base.times().is_empty());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn unsupported_variant_is_unresolved_and_unchecksummed() {
        let mut base = KernelBase::new(KernelId::AppsFir, &RunParams::default());
        assert_eq!(base.resolve(VariantId::BaseDevice), None);
        base.add_checksum(VariantId::BaseDevice, 1.0);
        assert!(base.checksums().is_empty());
    }
}
