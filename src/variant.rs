//! Kernel variants (execution strategies).
//!
//! Every kernel can be run under a set of variants. A variant combines a coding style (hand-written
//! loops or the portable abstraction layer of [`crate::drivers::host`]) with a backend (sequential,
//! multi-threaded, target offload or device). Offload and device variants are only compiled in
//! with the `opencl` and `cuda` features respectively.

use crate::drivers::{device::LaunchStyle, host::HostSweep};
use crate::error::SuiteError;

use tracing::warn;

use std::{fmt, str::FromStr};

/// Coding style of a variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Style {
    /// Hand-written loops.
    Base,
    /// Portable-parallelism abstraction layer.
    Portable,
}

/// Execution backend of a variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    Sequential,
    Threaded,
    Offload,
    Device,
}

/// Concrete execution strategy a variant resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Host(HostSweep),
    Offload(LaunchStyle),
    Device(LaunchStyle),
}

/// Identifier of a kernel variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariantId {
    BaseSeq,
    PortableSeq,
    BaseThreaded,
    PortableThreaded,
    BaseOffload,
    PortableOffload,
    BaseDevice,
    PortableDevice,
}

impl VariantId {
    /// All known variants, in reporting order.
    pub const ALL: [VariantId; 8] = [
        Self::BaseSeq,
        Self::PortableSeq,
        Self::BaseThreaded,
        Self::PortableThreaded,
        Self::BaseOffload,
        Self::PortableOffload,
        Self::BaseDevice,
        Self::PortableDevice,
    ];

    /// Resolves variant names, keeping the reporting order and dropping duplicates.
    /// An empty selection means every variant. Unknown names are reported and skipped.
    pub fn select<S: AsRef<str>>(names: &[S]) -> Vec<VariantId> {
        if names.is_empty() {
            return Self::ALL.to_vec();
        }
        let requested: Vec<VariantId> = names
            .iter()
            .filter_map(|name| {
                name.as_ref()
                    .parse()
                    .map_err(|e: SuiteError| warn!("{e}"))
                    .ok()
            })
            .collect();
        Self::ALL
            .into_iter()
            .filter(|v| requested.contains(v))
            .collect()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::BaseSeq => "Base_Seq",
            Self::PortableSeq => "Portable_Seq",
            Self::BaseThreaded => "Base_Threaded",
            Self::PortableThreaded => "Portable_Threaded",
            Self::BaseOffload => "Base_Offload",
            Self::PortableOffload => "Portable_Offload",
            Self::BaseDevice => "Base_Device",
            Self::PortableDevice => "Portable_Device",
        }
    }

    pub fn style(self) -> Style {
        match self {
            Self::BaseSeq | Self::BaseThreaded | Self::BaseOffload | Self::BaseDevice => Style::Base,
            _ => Style::Portable,
        }
    }

    pub fn backend(self) -> Backend {
        match self {
            Self::BaseSeq | Self::PortableSeq => Backend::Sequential,
            Self::BaseThreaded | Self::PortableThreaded => Backend::Threaded,
            Self::BaseOffload | Self::PortableOffload => Backend::Offload,
            Self::BaseDevice | Self::PortableDevice => Backend::Device,
        }
    }

    /// Whether the variant's backend is compiled into this build.
    pub fn is_compiled(self) -> bool {
        match self.backend() {
            Backend::Sequential | Backend::Threaded => true,
            Backend::Offload => cfg!(feature = "opencl"),
            Backend::Device => cfg!(feature = "cuda"),
        }
    }

    /// Whether the variant runs on an accelerator rather than on the host.
    pub fn is_device_resident(self) -> bool {
        matches!(self.backend(), Backend::Offload | Backend::Device)
    }

    /// Resolves the variant to its execution strategy, or `None` when it is not compiled in.
    pub fn target(self) -> Option<Target> {
        if !self.is_compiled() {
            return None;
        }

        let launch = match self.style() {
            Style::Base => LaunchStyle::Explicit,
            Style::Portable => LaunchStyle::Runtime,
        };
        Some(match self {
            Self::BaseSeq => Target::Host(HostSweep::Loop),
            Self::PortableSeq => Target::Host(HostSweep::Lanes),
            Self::BaseThreaded => Target::Host(HostSweep::StaticThreads),
            Self::PortableThreaded => Target::Host(HostSweep::WorkStealing),
            Self::BaseOffload | Self::PortableOffload => Target::Offload(launch),
            Self::BaseDevice | Self::PortableDevice => Target::Device(launch),
        })
    }

    /// Variants compiled into this build.
    pub fn compiled() -> impl Iterator<Item = VariantId> {
        Self::ALL.into_iter().filter(|v| v.is_compiled())
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for VariantId {
    type Err = SuiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SuiteError::UnknownVariant(s.to_string()))
    }
}
